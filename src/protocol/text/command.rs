use bytes::Bytes;

/// Storage verb of a text protocol mutation; decides both the store call
/// and how store errors map back onto wire tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Cas,
    Append,
    Prepend,
}

impl StoreVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreVerb::Set => "set",
            StoreVerb::Add => "add",
            StoreVerb::Replace => "replace",
            StoreVerb::Cas => "cas",
            StoreVerb::Append => "append",
            StoreVerb::Prepend => "prepend",
        }
    }
}

/// Parsed storage command header plus its data block.
#[derive(Debug, PartialEq)]
pub struct StoreCommand {
    pub(crate) verb: StoreVerb,
    pub(crate) key: Bytes,
    pub(crate) flags: u32,
    pub(crate) expiration: u32,
    pub(crate) cas: u64,
    pub(crate) noreply: bool,
    pub(crate) value: Bytes,
}

/// Protocol level failures the processor reports without losing stream
/// synchronization.
#[derive(Debug, PartialEq, Eq)]
pub enum TextProtocolError {
    /// Unknown command or wrong token count, answered with `ERROR`.
    UnknownCommand,
    /// Malformed request, answered with `CLIENT_ERROR <msg>`.
    Client(&'static str),
}

pub const BAD_COMMAND_LINE: &str = "bad command line format";
pub const BAD_DATA_CHUNK: &str = "bad data chunk";
pub const INVALID_DELTA: &str = "invalid numeric delta argument";

/// One parsed text protocol request.
#[derive(Debug, PartialEq)]
pub enum TextCommand {
    Store(StoreCommand),
    Get {
        keys: Vec<Bytes>,
        with_cas: bool,
    },
    Delete {
        key: Bytes,
        noreply: bool,
    },
    Touch {
        key: Bytes,
        expiration: u32,
        noreply: bool,
    },
    Incr {
        key: Bytes,
        delta: u64,
        noreply: bool,
    },
    Decr {
        key: Bytes,
        delta: u64,
        noreply: bool,
    },
    FlushAll {
        delay: u32,
        noreply: bool,
    },
    Stats {
        argument: Option<Bytes>,
    },
    LruCrawlerMetadump,
    Version,
    Quit,
    /// Storage command whose declared body exceeds the item cap. The
    /// connection drains `body_len` bytes plus the trailing CRLF before
    /// the error is answered.
    TooLarge {
        body_len: u64,
        noreply: bool,
    },
    Error(TextProtocolError),
}
