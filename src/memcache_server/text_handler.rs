use crate::cache::cache::DELTA_NO_INITIAL_VALUE;
use crate::cache::error::CacheError;
use crate::memcache::store;
use crate::memory_store::value_pool::ValuePool;
use crate::protocol::text::command::{
    StoreCommand, StoreVerb, TextCommand, TextProtocolError,
};
use crate::version::MEMCD_VERSION;
use bytes::Bytes;
use std::sync::Arc;

const STORED: &[u8] = b"STORED\r\n";
const NOT_STORED: &[u8] = b"NOT_STORED\r\n";
const EXISTS: &[u8] = b"EXISTS\r\n";
const NOT_FOUND: &[u8] = b"NOT_FOUND\r\n";
const DELETED: &[u8] = b"DELETED\r\n";
const TOUCHED: &[u8] = b"TOUCHED\r\n";
const OK: &[u8] = b"OK\r\n";
const END: &[u8] = b"END\r\n";
const ERROR: &[u8] = b"ERROR\r\n";
const SERVER_ERROR_TOO_LARGE: &[u8] = b"SERVER_ERROR object too large for cache\r\n";
const SERVER_ERROR_OOM: &[u8] = b"SERVER_ERROR out of memory\r\n";
const CLIENT_ERROR_NON_NUMERIC: &[u8] =
    b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n";

/// Either a semantic status line, which `noreply` suppresses, or an
/// error line, which is always written.
enum Reply {
    Status(Bytes),
    Error(Bytes),
}

impl Reply {
    fn into_response(self, noreply: bool) -> Option<Bytes> {
        match self {
            Reply::Status(_) if noreply => None,
            Reply::Status(status) => Some(status),
            Reply::Error(error) => Some(error),
        }
    }
}

pub struct TextHandler {
    storage: Arc<store::MemcStore>,
    pool: Arc<ValuePool>,
}

impl TextHandler {
    pub fn new(store: Arc<store::MemcStore>, pool: Arc<ValuePool>) -> TextHandler {
        TextHandler {
            storage: store,
            pool,
        }
    }

    /// Handles a single text request; `None` means nothing goes on the
    /// wire (`noreply`). The quit command never reaches this point, the
    /// connection loop closes the socket instead.
    pub fn handle_command(&self, command: TextCommand) -> Option<Bytes> {
        match command {
            TextCommand::Store(store_command) => self.store(store_command),
            TextCommand::Get { keys, with_cas } => Some(self.get(keys, with_cas)),
            TextCommand::Delete { key, noreply } => self.delete(key, noreply),
            TextCommand::Touch {
                key,
                expiration,
                noreply,
            } => self.touch(key, expiration, noreply),
            TextCommand::Incr {
                key,
                delta,
                noreply,
            } => self.incr_decr(key, delta, true, noreply),
            TextCommand::Decr {
                key,
                delta,
                noreply,
            } => self.incr_decr(key, delta, false, noreply),
            TextCommand::FlushAll { delay, noreply } => self.flush_all(delay, noreply),
            TextCommand::Stats { argument } => Some(self.stats(argument)),
            TextCommand::LruCrawlerMetadump => Some(Bytes::from_static(END)),
            TextCommand::Version => {
                let mut response = self.pool.acquire(32);
                response.extend_from_slice(b"VERSION ");
                response.extend_from_slice(MEMCD_VERSION.as_bytes());
                response.extend_from_slice(b"\r\n");
                Some(response.freeze())
            }
            TextCommand::TooLarge {
                body_len: _,
                noreply: _,
            } => Some(Bytes::from_static(SERVER_ERROR_TOO_LARGE)),
            TextCommand::Error(TextProtocolError::UnknownCommand) => {
                Some(Bytes::from_static(ERROR))
            }
            TextCommand::Error(TextProtocolError::Client(message)) => {
                let mut response = self.pool.acquire(16 + message.len());
                response.extend_from_slice(b"CLIENT_ERROR ");
                response.extend_from_slice(message.as_bytes());
                response.extend_from_slice(b"\r\n");
                Some(response.freeze())
            }
            TextCommand::Quit => None,
        }
    }

    fn store(&self, command: StoreCommand) -> Option<Bytes> {
        let StoreCommand {
            verb,
            key,
            flags,
            expiration,
            cas,
            noreply,
            value,
        } = command;
        let record = store::Record::new(value, cas, flags, expiration);
        let result = match verb {
            StoreVerb::Set | StoreVerb::Cas => self.storage.set(key, record),
            StoreVerb::Add => self.storage.add(key, record),
            StoreVerb::Replace => self.storage.replace(key, record),
            StoreVerb::Append => self.storage.append(key, record),
            StoreVerb::Prepend => self.storage.prepend(key, record),
        };

        let reply = match result {
            Ok(_status) => Reply::Status(Bytes::from_static(STORED)),
            Err(err) => storage_error_to_reply(verb, err),
        };
        reply.into_response(noreply)
    }

    fn get(&self, keys: Vec<Bytes>, with_cas: bool) -> Bytes {
        let mut response = self.pool.acquire(64 * keys.len());
        for key in keys {
            if let Ok(record) = self.storage.get(&key) {
                let header = if with_cas {
                    format!(
                        "VALUE {} {} {} {}\r\n",
                        String::from_utf8_lossy(&key),
                        record.header.flags,
                        record.value.len(),
                        record.header.cas
                    )
                } else {
                    format!(
                        "VALUE {} {} {}\r\n",
                        String::from_utf8_lossy(&key),
                        record.header.flags,
                        record.value.len()
                    )
                };
                response.extend_from_slice(header.as_bytes());
                response.extend_from_slice(&record.value);
                response.extend_from_slice(b"\r\n");
            }
        }
        response.extend_from_slice(END);
        response.freeze()
    }

    fn delete(&self, key: Bytes, noreply: bool) -> Option<Bytes> {
        let reply = match self.storage.delete(key, store::Meta::new(0, 0, 0)) {
            Ok(_record) => Reply::Status(Bytes::from_static(DELETED)),
            Err(_err) => Reply::Status(Bytes::from_static(NOT_FOUND)),
        };
        reply.into_response(noreply)
    }

    fn touch(&self, key: Bytes, expiration: u32, noreply: bool) -> Option<Bytes> {
        let reply = match self.storage.touch(key, expiration) {
            Ok(_status) => Reply::Status(Bytes::from_static(TOUCHED)),
            Err(_err) => Reply::Status(Bytes::from_static(NOT_FOUND)),
        };
        reply.into_response(noreply)
    }

    fn incr_decr(&self, key: Bytes, delta: u64, increment: bool, noreply: bool) -> Option<Bytes> {
        // The sentinel expiration keeps the store from creating missing
        // counters; the text protocol has no initial value.
        let meta = store::Meta::new(0, 0, DELTA_NO_INITIAL_VALUE);
        let param = store::IncrementParam { delta, value: 0 };
        let result = if increment {
            self.storage.increment(meta, key, param)
        } else {
            self.storage.decrement(meta, key, param)
        };

        let reply = match result {
            Ok(delta_result) => {
                let mut response = self.pool.acquire(24);
                response.extend_from_slice(delta_result.value.to_string().as_bytes());
                response.extend_from_slice(b"\r\n");
                Reply::Status(response.freeze())
            }
            Err(CacheError::NotFound) => Reply::Status(Bytes::from_static(NOT_FOUND)),
            Err(CacheError::ArithOnNonNumeric) => {
                Reply::Error(Bytes::from_static(CLIENT_ERROR_NON_NUMERIC))
            }
            Err(CacheError::OutOfMemory) => Reply::Error(Bytes::from_static(SERVER_ERROR_OOM)),
            Err(err) => Reply::Error(server_error(err)),
        };
        reply.into_response(noreply)
    }

    fn flush_all(&self, delay: u32, noreply: bool) -> Option<Bytes> {
        self.storage.flush(store::Meta::new(0, 0, delay));
        Reply::Status(Bytes::from_static(OK)).into_response(noreply)
    }

    fn stats(&self, argument: Option<Bytes>) -> Bytes {
        match argument.as_deref() {
            None => {
                let stats = self.storage.stats();
                let mut response = self.pool.acquire(256);
                let lines = format!(
                    "STAT curr_items {}\r\nSTAT bytes {}\r\nSTAT cmd_get {}\r\nSTAT cmd_set {}\r\nSTAT get_hits {}\r\nSTAT get_misses {}\r\nSTAT evictions {}\r\n",
                    stats.curr_items,
                    stats.bytes,
                    stats.cmd_get,
                    stats.cmd_set,
                    stats.get_hits,
                    stats.get_misses,
                    stats.evictions,
                );
                response.extend_from_slice(lines.as_bytes());
                response.extend_from_slice(END);
                response.freeze()
            }
            Some(b"items") | Some(b"slabs") | Some(b"sizes") => Bytes::from_static(END),
            Some(_other) => Bytes::from_static(ERROR),
        }
    }
}

fn storage_error_to_reply(verb: StoreVerb, err: CacheError) -> Reply {
    match err {
        CacheError::KeyExists => match verb {
            StoreVerb::Cas => Reply::Status(Bytes::from_static(EXISTS)),
            _ => Reply::Status(Bytes::from_static(NOT_STORED)),
        },
        CacheError::NotFound => match verb {
            StoreVerb::Cas => Reply::Status(Bytes::from_static(NOT_FOUND)),
            _ => Reply::Status(Bytes::from_static(NOT_STORED)),
        },
        CacheError::ItemNotStored => Reply::Status(Bytes::from_static(NOT_STORED)),
        CacheError::ValueTooLarge => Reply::Error(Bytes::from_static(SERVER_ERROR_TOO_LARGE)),
        CacheError::OutOfMemory => Reply::Error(Bytes::from_static(SERVER_ERROR_OOM)),
        other => Reply::Error(server_error(other)),
    }
}

fn server_error(err: CacheError) -> Bytes {
    Bytes::from(format!("SERVER_ERROR {}\r\n", err.to_static_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::mock_server::create_storage;
    use crate::protocol::text::command::{BAD_COMMAND_LINE, BAD_DATA_CHUNK};

    fn create_handler() -> TextHandler {
        TextHandler::new(create_storage(), Arc::new(ValuePool::default()))
    }

    fn store_command(verb: StoreVerb, key: &str, value: &str) -> TextCommand {
        TextCommand::Store(StoreCommand {
            verb,
            key: Bytes::copy_from_slice(key.as_bytes()),
            flags: 0,
            expiration: 0,
            cas: 0,
            noreply: false,
            value: Bytes::copy_from_slice(value.as_bytes()),
        })
    }

    fn response(handler: &TextHandler, command: TextCommand) -> Bytes {
        handler.handle_command(command).expect("response expected")
    }

    #[test]
    fn set_then_get_round_trips() {
        let handler = create_handler();
        let reply = response(&handler, store_command(StoreVerb::Set, "foo", "hello"));
        assert_eq!(reply[..], b"STORED\r\n"[..]);

        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: false,
            },
        );
        assert_eq!(reply[..], b"VALUE foo 0 5\r\nhello\r\nEND\r\n"[..]);
    }

    #[test]
    fn get_miss_returns_bare_end() {
        let handler = create_handler();
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("missing")],
                with_cas: false,
            },
        );
        assert_eq!(reply[..], b"END\r\n"[..]);
    }

    #[test]
    fn multi_get_emits_value_block_per_hit() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "a", "1"));
        response(&handler, store_command(StoreVerb::Set, "c", "3"));
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")],
                with_cas: false,
            },
        );
        assert_eq!(
            reply[..],
            b"VALUE a 0 1\r\n1\r\nVALUE c 0 1\r\n3\r\nEND\r\n"[..]
        );
    }

    #[test]
    fn gets_includes_cas_token() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "x"));
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: true,
            },
        );
        let text = String::from_utf8(reply.to_vec()).unwrap();
        assert!(text.starts_with("VALUE foo 0 1 "));
        let cas_token: u64 = text
            .lines()
            .next()
            .unwrap()
            .split(' ')
            .nth(4)
            .unwrap()
            .parse()
            .unwrap();
        assert_ne!(cas_token, 0);
    }

    #[test]
    fn add_on_existing_key_is_not_stored() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "hello"));
        let reply = response(&handler, store_command(StoreVerb::Add, "foo", "x"));
        assert_eq!(reply[..], b"NOT_STORED\r\n"[..]);
        // the failed add must not clobber the stored value
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: false,
            },
        );
        assert_eq!(reply[..], b"VALUE foo 0 5\r\nhello\r\nEND\r\n"[..]);
    }

    #[test]
    fn replace_on_missing_key_is_not_stored() {
        let handler = create_handler();
        let reply = response(&handler, store_command(StoreVerb::Replace, "foo", "x"));
        assert_eq!(reply[..], b"NOT_STORED\r\n"[..]);
    }

    #[test]
    fn cas_with_stale_version_is_exists() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "hello"));
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: true,
            },
        );
        let text = String::from_utf8(reply.to_vec()).unwrap();
        let cas_token: u64 = text
            .lines()
            .next()
            .unwrap()
            .split(' ')
            .nth(4)
            .unwrap()
            .parse()
            .unwrap();

        let stale = TextCommand::Store(StoreCommand {
            verb: StoreVerb::Cas,
            key: Bytes::from("foo"),
            flags: 0,
            expiration: 0,
            cas: cas_token + 1,
            noreply: false,
            value: Bytes::from("world"),
        });
        assert_eq!(response(&handler, stale)[..], b"EXISTS\r\n"[..]);

        let fresh = TextCommand::Store(StoreCommand {
            verb: StoreVerb::Cas,
            key: Bytes::from("foo"),
            flags: 0,
            expiration: 0,
            cas: cas_token,
            noreply: false,
            value: Bytes::from("world"),
        });
        assert_eq!(response(&handler, fresh)[..], b"STORED\r\n"[..]);
    }

    #[test]
    fn cas_on_missing_key_is_not_found() {
        let handler = create_handler();
        let command = TextCommand::Store(StoreCommand {
            verb: StoreVerb::Cas,
            key: Bytes::from("missing"),
            flags: 0,
            expiration: 0,
            cas: 7,
            noreply: false,
            value: Bytes::from("x"),
        });
        assert_eq!(response(&handler, command)[..], b"NOT_FOUND\r\n"[..]);
    }

    #[test]
    fn append_and_prepend_concatenate() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "mid"));
        assert_eq!(
            response(&handler, store_command(StoreVerb::Append, "foo", ">"))[..],
            b"STORED\r\n"[..]
        );
        assert_eq!(
            response(&handler, store_command(StoreVerb::Prepend, "foo", "<"))[..],
            b"STORED\r\n"[..]
        );
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: false,
            },
        );
        assert_eq!(reply[..], b"VALUE foo 0 5\r\n<mid>\r\nEND\r\n"[..]);
    }

    #[test]
    fn append_on_missing_key_is_not_stored() {
        let handler = create_handler();
        let reply = response(&handler, store_command(StoreVerb::Append, "foo", "x"));
        assert_eq!(reply[..], b"NOT_STORED\r\n"[..]);
    }

    #[test]
    fn noreply_suppresses_statuses_but_not_errors() {
        let handler = create_handler();
        let command = TextCommand::Store(StoreCommand {
            verb: StoreVerb::Set,
            key: Bytes::from("foo"),
            flags: 0,
            expiration: 0,
            cas: 0,
            noreply: true,
            value: Bytes::from("hello"),
        });
        assert!(handler.handle_command(command).is_none());

        let command = TextCommand::Delete {
            key: Bytes::from("missing"),
            noreply: true,
        };
        assert!(handler.handle_command(command).is_none());

        // errors stay on the wire even with noreply
        response(&handler, store_command(StoreVerb::Set, "foo", "hello"));
        let command = TextCommand::Incr {
            key: Bytes::from("foo"),
            delta: 1,
            noreply: true,
        };
        assert_eq!(
            response(&handler, command)[..],
            CLIENT_ERROR_NON_NUMERIC[..]
        );
    }

    #[test]
    fn delete_reports_deleted_then_not_found() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "x"));
        let command = TextCommand::Delete {
            key: Bytes::from("foo"),
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"DELETED\r\n"[..]);
        let command = TextCommand::Delete {
            key: Bytes::from("foo"),
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"NOT_FOUND\r\n"[..]);
    }

    #[test]
    fn touch_reports_touched_then_not_found() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "x"));
        let command = TextCommand::Touch {
            key: Bytes::from("foo"),
            expiration: 100,
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"TOUCHED\r\n"[..]);
        let command = TextCommand::Touch {
            key: Bytes::from("missing"),
            expiration: 100,
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"NOT_FOUND\r\n"[..]);
    }

    #[test]
    fn incr_returns_new_value() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "counter", "41"));
        let command = TextCommand::Incr {
            key: Bytes::from("counter"),
            delta: 1,
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"42\r\n"[..]);
    }

    #[test]
    fn incr_on_missing_key_is_not_found() {
        let handler = create_handler();
        let command = TextCommand::Incr {
            key: Bytes::from("counter"),
            delta: 1,
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"NOT_FOUND\r\n"[..]);
    }

    #[test]
    fn incr_saturates_at_max() {
        let handler = create_handler();
        response(
            &handler,
            store_command(StoreVerb::Set, "counter", &u64::MAX.to_string()),
        );
        let command = TextCommand::Incr {
            key: Bytes::from("counter"),
            delta: 5,
            noreply: false,
        };
        let expected = format!("{}\r\n", u64::MAX);
        assert_eq!(response(&handler, command)[..], expected.as_bytes()[..]);
    }

    #[test]
    fn decr_clamps_at_zero() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "counter", "3"));
        let command = TextCommand::Decr {
            key: Bytes::from("counter"),
            delta: 10,
            noreply: false,
        };
        assert_eq!(response(&handler, command)[..], b"0\r\n"[..]);
    }

    #[test]
    fn flush_all_answers_ok_and_empties_store() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "x"));
        let reply = response(
            &handler,
            TextCommand::FlushAll {
                delay: 0,
                noreply: false,
            },
        );
        assert_eq!(reply[..], b"OK\r\n"[..]);
        let reply = response(
            &handler,
            TextCommand::Get {
                keys: vec![Bytes::from("foo")],
                with_cas: false,
            },
        );
        assert_eq!(reply[..], b"END\r\n"[..]);
    }

    #[test]
    fn stats_without_argument_reports_counters() {
        let handler = create_handler();
        response(&handler, store_command(StoreVerb::Set, "foo", "hello"));
        let reply = response(&handler, TextCommand::Stats { argument: None });
        let text = String::from_utf8(reply.to_vec()).unwrap();
        assert!(text.contains("STAT curr_items 1\r\n"));
        assert!(text.contains("STAT bytes 5\r\n"));
        assert!(text.contains("STAT cmd_set 1\r\n"));
        assert!(text.ends_with("END\r\n"));
    }

    #[test]
    fn stats_subcommands_answer_end() {
        let handler = create_handler();
        for argument in ["items", "slabs", "sizes"] {
            let reply = response(
                &handler,
                TextCommand::Stats {
                    argument: Some(Bytes::copy_from_slice(argument.as_bytes())),
                },
            );
            assert_eq!(reply[..], b"END\r\n"[..]);
        }
        let reply = response(
            &handler,
            TextCommand::Stats {
                argument: Some(Bytes::from("nope")),
            },
        );
        assert_eq!(reply[..], b"ERROR\r\n"[..]);
    }

    #[test]
    fn version_reports_crate_version() {
        let handler = create_handler();
        let reply = response(&handler, TextCommand::Version);
        let expected = format!("VERSION {}\r\n", MEMCD_VERSION);
        assert_eq!(reply[..], expected.as_bytes()[..]);
    }

    #[test]
    fn protocol_errors_map_to_wire_tokens() {
        let handler = create_handler();
        assert_eq!(
            response(
                &handler,
                TextCommand::Error(TextProtocolError::UnknownCommand)
            )[..],
            b"ERROR\r\n"[..]
        );
        assert_eq!(
            response(
                &handler,
                TextCommand::Error(TextProtocolError::Client(BAD_COMMAND_LINE))
            )[..],
            b"CLIENT_ERROR bad command line format\r\n"[..]
        );
        assert_eq!(
            response(
                &handler,
                TextCommand::Error(TextProtocolError::Client(BAD_DATA_CHUNK))
            )[..],
            b"CLIENT_ERROR bad data chunk\r\n"[..]
        );
        assert_eq!(
            response(
                &handler,
                TextCommand::TooLarge {
                    body_len: 10_000_000,
                    noreply: false
                }
            )[..],
            SERVER_ERROR_TOO_LARGE[..]
        );
    }
}
