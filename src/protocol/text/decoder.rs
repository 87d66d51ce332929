use crate::memory_store::value_pool::ValuePool;
use crate::protocol::text::command::{
    StoreCommand, StoreVerb, TextCommand, TextProtocolError, BAD_COMMAND_LINE, BAD_DATA_CHUNK,
    INVALID_DELTA,
};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use std::io::{Error, ErrorKind};
use std::str;
use std::sync::Arc;
use tokio_util::codec::Decoder;

const MAX_KEY_LEN: usize = 250;
// Generous enough for a multi-get of a few hundred max-length keys.
const MAX_LINE_LEN: usize = 512 * 1024;
const CRLF_LEN: usize = 2;

/// Header of a storage command still waiting for its data block.
struct StoreHeader {
    verb: StoreVerb,
    key: Bytes,
    flags: u32,
    expiration: u32,
    cas: u64,
    noreply: bool,
    body_len: u64,
}

/// What a parsed header line asks the decoder to do next.
enum LineOutcome {
    /// The line is the whole request.
    Complete(TextCommand),
    /// A data block of `body_len` bytes plus CRLF follows the line.
    NeedsBody(StoreHeader),
}

/// Line oriented request decoder.
///
/// Decoding is stateless: a command is produced only once its header
/// line and declared data block are fully buffered, except for oversize
/// bodies which surface as [`TextCommand::TooLarge`] so the connection
/// can drain them instead of buffering.
pub struct MemcacheTextDecoder {
    item_size_limit: u32,
    pool: Arc<ValuePool>,
}

impl MemcacheTextDecoder {
    pub fn new(item_size_limit: u32, pool: Arc<ValuePool>) -> MemcacheTextDecoder {
        MemcacheTextDecoder {
            item_size_limit,
            pool,
        }
    }

    fn parse_tokens(&self, line: &[u8]) -> LineOutcome {
        let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
        let verb = tokens.next().unwrap_or(b"");
        match verb {
            b"set" => parse_store(StoreVerb::Set, tokens),
            b"add" => parse_store(StoreVerb::Add, tokens),
            b"replace" => parse_store(StoreVerb::Replace, tokens),
            b"cas" => parse_store(StoreVerb::Cas, tokens),
            b"append" => parse_store(StoreVerb::Append, tokens),
            b"prepend" => parse_store(StoreVerb::Prepend, tokens),
            b"get" => LineOutcome::Complete(parse_get(tokens, false)),
            b"gets" => LineOutcome::Complete(parse_get(tokens, true)),
            b"delete" => LineOutcome::Complete(parse_delete(tokens)),
            b"touch" => LineOutcome::Complete(parse_touch(tokens)),
            b"incr" => LineOutcome::Complete(parse_delta(tokens, true)),
            b"decr" => LineOutcome::Complete(parse_delta(tokens, false)),
            b"flush_all" => LineOutcome::Complete(parse_flush_all(tokens)),
            b"stats" => LineOutcome::Complete(parse_stats(tokens)),
            b"lru_crawler" => LineOutcome::Complete(parse_lru_crawler(tokens)),
            b"version" => LineOutcome::Complete(expect_bare(tokens, TextCommand::Version)),
            b"quit" => LineOutcome::Complete(expect_bare(tokens, TextCommand::Quit)),
            _ => LineOutcome::Complete(TextCommand::Error(TextProtocolError::UnknownCommand)),
        }
    }
}

impl Decoder for MemcacheTextDecoder {
    type Item = TextCommand;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line_len = match src.iter().position(|&b| b == b'\n') {
            Some(position) => position,
            None => {
                if src.len() > MAX_LINE_LEN {
                    error!("Command line over {} bytes", MAX_LINE_LEN);
                    return Err(Error::new(ErrorKind::InvalidData, "Command line too long"));
                }
                return Ok(None);
            }
        };
        let consumed_line = line_len + 1;

        let outcome = {
            let line = &src[..line_len];
            let line = match line.last() {
                Some(b'\r') => &line[..line_len - 1],
                _ => line,
            };
            self.parse_tokens(line)
        };

        let header = match outcome {
            LineOutcome::Complete(command) => {
                src.advance(consumed_line);
                return Ok(Some(command));
            }
            LineOutcome::NeedsBody(header) => header,
        };

        if header.body_len > self.item_size_limit as u64 {
            src.advance(consumed_line);
            return Ok(Some(TextCommand::TooLarge {
                body_len: header.body_len,
                noreply: header.noreply,
            }));
        }

        let body_len = header.body_len as usize;
        let total = consumed_line + body_len + CRLF_LEN;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        if &src[consumed_line + body_len..total] != b"\r\n" {
            src.advance(total);
            return Ok(Some(TextCommand::Error(TextProtocolError::Client(
                BAD_DATA_CHUNK,
            ))));
        }

        let mut buffer = self.pool.acquire(body_len);
        buffer.extend_from_slice(&src[consumed_line..consumed_line + body_len]);
        src.advance(total);

        Ok(Some(TextCommand::Store(StoreCommand {
            verb: header.verb,
            key: header.key,
            flags: header.flags,
            expiration: header.expiration,
            cas: header.cas,
            noreply: header.noreply,
            value: buffer.freeze(),
        })))
    }
}

fn parse_store<'t>(verb: StoreVerb, mut tokens: impl Iterator<Item = &'t [u8]>) -> LineOutcome {
    let error = |error| LineOutcome::Complete(TextCommand::Error(error));

    let header = (tokens.next(), tokens.next(), tokens.next(), tokens.next());
    let (key, flags, expiration, bytes) = match header {
        (Some(key), Some(flags), Some(expiration), Some(bytes)) => {
            (key, flags, expiration, bytes)
        }
        _ => return error(TextProtocolError::UnknownCommand),
    };

    let cas = if verb == StoreVerb::Cas {
        match tokens.next() {
            Some(token) => match parse_u64(token) {
                Some(cas) => cas,
                None => return error(TextProtocolError::Client(BAD_COMMAND_LINE)),
            },
            None => return error(TextProtocolError::UnknownCommand),
        }
    } else {
        0
    };

    let noreply = match tokens.next() {
        None => false,
        Some(b"noreply") => true,
        Some(_other) => return error(TextProtocolError::UnknownCommand),
    };
    if tokens.next().is_some() {
        return error(TextProtocolError::UnknownCommand);
    }

    if !valid_key(key) {
        return error(TextProtocolError::Client(BAD_COMMAND_LINE));
    }
    match (parse_u32(flags), parse_u32(expiration), parse_u64(bytes)) {
        (Some(flags), Some(expiration), Some(body_len)) => LineOutcome::NeedsBody(StoreHeader {
            verb,
            key: Bytes::copy_from_slice(key),
            flags,
            expiration,
            cas,
            noreply,
            body_len,
        }),
        _ => error(TextProtocolError::Client(BAD_COMMAND_LINE)),
    }
}

fn expect_bare<'t>(mut tokens: impl Iterator<Item = &'t [u8]>, command: TextCommand) -> TextCommand {
    if tokens.next().is_some() {
        TextCommand::Error(TextProtocolError::UnknownCommand)
    } else {
        command
    }
}

fn parse_get<'t>(tokens: impl Iterator<Item = &'t [u8]>, with_cas: bool) -> TextCommand {
    let mut keys = Vec::new();
    for token in tokens {
        if !valid_key(token) {
            return TextCommand::Error(TextProtocolError::Client(BAD_COMMAND_LINE));
        }
        keys.push(Bytes::copy_from_slice(token));
    }
    if keys.is_empty() {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    TextCommand::Get { keys, with_cas }
}

fn parse_delete<'t>(mut tokens: impl Iterator<Item = &'t [u8]>) -> TextCommand {
    let key = match tokens.next() {
        Some(key) => key,
        None => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    let noreply = match tokens.next() {
        None => false,
        Some(b"noreply") => true,
        Some(_other) => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    if tokens.next().is_some() || !valid_key(key) {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    TextCommand::Delete {
        key: Bytes::copy_from_slice(key),
        noreply,
    }
}

fn parse_touch<'t>(mut tokens: impl Iterator<Item = &'t [u8]>) -> TextCommand {
    let (key, expiration) = match (tokens.next(), tokens.next()) {
        (Some(key), Some(expiration)) => (key, expiration),
        _ => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    let noreply = match tokens.next() {
        None => false,
        Some(b"noreply") => true,
        Some(_other) => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    if tokens.next().is_some() || !valid_key(key) {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    let expiration = match parse_u32(expiration) {
        Some(expiration) => expiration,
        None => return TextCommand::Error(TextProtocolError::Client(BAD_COMMAND_LINE)),
    };
    TextCommand::Touch {
        key: Bytes::copy_from_slice(key),
        expiration,
        noreply,
    }
}

fn parse_delta<'t>(mut tokens: impl Iterator<Item = &'t [u8]>, increment: bool) -> TextCommand {
    let (key, delta) = match (tokens.next(), tokens.next()) {
        (Some(key), Some(delta)) => (key, delta),
        _ => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    let noreply = match tokens.next() {
        None => false,
        Some(b"noreply") => true,
        Some(_other) => return TextCommand::Error(TextProtocolError::UnknownCommand),
    };
    if tokens.next().is_some() || !valid_key(key) {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    let delta = match parse_u64(delta) {
        Some(delta) => delta,
        None => return TextCommand::Error(TextProtocolError::Client(INVALID_DELTA)),
    };
    let key = Bytes::copy_from_slice(key);
    if increment {
        TextCommand::Incr {
            key,
            delta,
            noreply,
        }
    } else {
        TextCommand::Decr {
            key,
            delta,
            noreply,
        }
    }
}

fn parse_flush_all<'t>(mut tokens: impl Iterator<Item = &'t [u8]>) -> TextCommand {
    let (delay, noreply) = match tokens.next() {
        None => (0, false),
        Some(b"noreply") => (0, true),
        Some(token) => {
            let delay = match parse_u32(token) {
                Some(delay) => delay,
                None => return TextCommand::Error(TextProtocolError::Client(BAD_COMMAND_LINE)),
            };
            match tokens.next() {
                None => (delay, false),
                Some(b"noreply") => (delay, true),
                Some(_other) => return TextCommand::Error(TextProtocolError::UnknownCommand),
            }
        }
    };
    if tokens.next().is_some() {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    TextCommand::FlushAll { delay, noreply }
}

fn parse_stats<'t>(mut tokens: impl Iterator<Item = &'t [u8]>) -> TextCommand {
    let argument = tokens.next().map(Bytes::copy_from_slice);
    if tokens.next().is_some() {
        return TextCommand::Error(TextProtocolError::UnknownCommand);
    }
    TextCommand::Stats { argument }
}

fn parse_lru_crawler<'t>(mut tokens: impl Iterator<Item = &'t [u8]>) -> TextCommand {
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(b"metadump"), Some(b"all"), None) => TextCommand::LruCrawlerMetadump,
        _ => TextCommand::Error(TextProtocolError::UnknownCommand),
    }
}

fn valid_key(key: &[u8]) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN && key.iter().all(|&b| b > 32 && b != 127)
}

fn parse_u32(token: &[u8]) -> Option<u32> {
    str::from_utf8(token).ok()?.parse().ok()
}

fn parse_u64(token: &[u8]) -> Option<u64> {
    str::from_utf8(token).ok()?.parse().ok()
}
