use crate::protocol::binary::network;
use bytes::{Buf, BytesMut};
use num_traits::FromPrimitive;
use std::io;
use std::io::{Error, ErrorKind};
use tokio_util::codec::Decoder;

/// Client request
#[derive(Debug)]
pub enum BinaryRequest {
    Delete(network::DeleteRequest),
    DeleteQuiet(network::DeleteRequest),
    Get(network::GetRequest),
    GetQuietly(network::GetQuietRequest),
    GetKey(network::GetKeyRequest),
    GetKeyQuietly(network::GetKeyQuietRequest),
    Set(network::SetRequest),
    SetQuietly(network::SetRequest),
    Append(network::AppendRequest),
    AppendQuietly(network::AppendRequest),
    Prepend(network::PrependRequest),
    PrependQuietly(network::PrependRequest),
    Add(network::AddRequest),
    AddQuietly(network::AddRequest),
    Replace(network::ReplaceRequest),
    ReplaceQuietly(network::ReplaceRequest),
    Increment(network::IncrementRequest),
    IncrementQuiet(network::IncrementRequest),
    Decrement(network::DecrementRequest),
    DecrementQuiet(network::DecrementRequest),
    Noop(network::NoopRequest),
    Flush(network::FlushRequest),
    FlushQuietly(network::FlushRequest),
    Version(network::VersionRequest),
    Quit(network::QuitRequest),
    QuitQuietly(network::QuitRequest),
    Stats(network::StatsRequest),

    // Header-only rejections. The request body was not consumed; the
    // connection drains it to stay framed before answering.
    ItemTooLarge(network::RequestHeader),
    InvalidArguments(network::RequestHeader),
    NotSupported(network::RequestHeader),
    UnknownCommand(network::RequestHeader),
}

impl BinaryRequest {
    pub fn get_header(&'_ self) -> &'_ network::RequestHeader {
        match self {
            BinaryRequest::Delete(request)
            | BinaryRequest::DeleteQuiet(request)
            | BinaryRequest::Get(request)
            | BinaryRequest::GetKey(request)
            | BinaryRequest::GetKeyQuietly(request)
            | BinaryRequest::GetQuietly(request) => &request.header,

            BinaryRequest::Set(request)
            | BinaryRequest::SetQuietly(request)
            | BinaryRequest::Replace(request)
            | BinaryRequest::ReplaceQuietly(request)
            | BinaryRequest::Add(request)
            | BinaryRequest::AddQuietly(request) => &request.header,

            BinaryRequest::Prepend(request)
            | BinaryRequest::PrependQuietly(request)
            | BinaryRequest::Append(request)
            | BinaryRequest::AppendQuietly(request) => &request.header,

            BinaryRequest::Increment(request)
            | BinaryRequest::IncrementQuiet(request)
            | BinaryRequest::Decrement(request)
            | BinaryRequest::DecrementQuiet(request) => &request.header,

            BinaryRequest::Noop(request)
            | BinaryRequest::Version(request)
            | BinaryRequest::Stats(request) => &request.header,

            BinaryRequest::Flush(request) | BinaryRequest::FlushQuietly(request) => &request.header,

            BinaryRequest::Quit(request) | BinaryRequest::QuitQuietly(request) => &request.header,

            BinaryRequest::ItemTooLarge(header)
            | BinaryRequest::InvalidArguments(header)
            | BinaryRequest::NotSupported(header)
            | BinaryRequest::UnknownCommand(header) => header,
        }
    }

    /// Bytes still on the wire for a request rejected at the header
    /// stage; the connection must skip them before the next frame.
    pub fn drain_len(&self) -> Option<u32> {
        match self {
            BinaryRequest::ItemTooLarge(header)
            | BinaryRequest::InvalidArguments(header)
            | BinaryRequest::NotSupported(header)
            | BinaryRequest::UnknownCommand(header) => Some(header.body_length),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug)]
enum RequestParserState {
    None,
    HeaderParsed,
}

pub struct MemcacheBinaryDecoder {
    header: network::RequestHeader,
    state: RequestParserState,
    item_size_limit: u32,
}

impl MemcacheBinaryDecoder {
    const HEADER_LEN: usize = 24;
    const MAX_KEY_LEN: u16 = 250;
    const SET_EXTRAS_LEN: u8 = 8;
    const DELTA_EXTRAS_LEN: u8 = 20;

    pub fn new(item_size_limit: u32) -> MemcacheBinaryDecoder {
        MemcacheBinaryDecoder {
            header: Default::default(),
            state: RequestParserState::None,
            item_size_limit,
        }
    }

    fn init_parser(&mut self) {
        self.header = Default::default();
        self.state = RequestParserState::None;
    }

    fn parse_header(&mut self, src: &mut BytesMut) -> Result<(), io::Error> {
        if src.len() < MemcacheBinaryDecoder::HEADER_LEN {
            error!("Buffer len is less than MemcacheBinaryDecoder::HEADER_LEN");
            return Err(Error::new(
                ErrorKind::InvalidData,
                "Buffer too small cannot parse header",
            ));
        }

        self.header = network::RequestHeader {
            magic: src.get_u8(),
            opcode: src.get_u8(),
            key_length: src.get_u16(),
            extras_length: src.get_u8(),
            data_type: src.get_u8(),
            vbucket_id: src.get_u16(),
            body_length: src.get_u32(),
            opaque: src.get_u32(),
            cas: src.get_u64(),
        };
        self.state = RequestParserState::HeaderParsed;

        if self.header.magic != network::Magic::Request as u8 {
            // The stream cannot be resynchronized without a request magic.
            error!("Invalid header: magic != binary::Magic::Request");
            return Err(Error::new(ErrorKind::InvalidData, "Incorrect magic"));
        }
        Ok(())
    }

    /// Rejections decided from the header alone, before any body byte is
    /// consumed. The connection drains the body for these.
    fn header_reject(&mut self) -> Option<BinaryRequest> {
        let header = self.header;
        let command: Option<network::Command> = FromPrimitive::from_u8(header.opcode);
        let reject = match command {
            None => Some(BinaryRequest::UnknownCommand(header)),
            Some(command) if command.is_rejected() => Some(BinaryRequest::NotSupported(header)),
            Some(command) => {
                if header.data_type != network::DataTypes::RawBytes as u8 {
                    Some(BinaryRequest::InvalidArguments(header))
                } else if header.body_length > self.item_size_limit {
                    Some(BinaryRequest::ItemTooLarge(header))
                } else if !self.request_valid(command) {
                    Some(BinaryRequest::InvalidArguments(header))
                } else {
                    None
                }
            }
        };
        if reject.is_some() {
            self.init_parser();
        }
        reject
    }

    fn request_valid(&self, command: network::Command) -> bool {
        use network::Command;

        let key = self.header.key_length as u32;
        let extras = self.header.extras_length as u32;
        let body = self.header.body_length;
        if self.header.key_length > MemcacheBinaryDecoder::MAX_KEY_LEN {
            return false;
        }
        if body < key + extras {
            return false;
        }

        match command {
            Command::Get | Command::GetQuiet | Command::GetKey | Command::GetKeyQuiet => {
                extras == 0 && key >= 1 && body == key
            }
            Command::Set
            | Command::SetQuiet
            | Command::Add
            | Command::AddQuiet
            | Command::Replace
            | Command::ReplaceQuiet => {
                extras == MemcacheBinaryDecoder::SET_EXTRAS_LEN as u32 && key >= 1
            }
            Command::Append
            | Command::AppendQuiet
            | Command::Prepend
            | Command::PrependQuiet => extras == 0 && key >= 1,
            Command::Delete | Command::DeleteQuiet => extras == 0 && key >= 1 && body == key,
            Command::Increment
            | Command::IncrementQuiet
            | Command::Decrement
            | Command::DecrementQuiet => {
                extras == MemcacheBinaryDecoder::DELTA_EXTRAS_LEN as u32
                    && key >= 1
                    && body == key + extras
            }
            Command::Quit | Command::QuitQuiet | Command::Noop | Command::Version => {
                extras == 0 && key == 0 && body == 0
            }
            Command::Flush | Command::FlushQuiet => {
                (extras == 0 || extras == 4) && key == 0 && body == extras
            }
            Command::Stat => extras == 0 && body == key,
            _ => false,
        }
    }

    fn parse_request(&mut self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        use network::Command;

        if self.state != RequestParserState::HeaderParsed {
            error!("Incorrect parser state ({:?})", self.state);
            return Err(Error::new(ErrorKind::Other, "Header is not parsed"));
        }

        let command: Option<Command> = FromPrimitive::from_u8(self.header.opcode);
        let result = match command {
            Some(Command::Get)
            | Some(Command::GetQuiet)
            | Some(Command::GetKey)
            | Some(Command::GetKeyQuiet) => self.parse_get_request(src),

            Some(Command::Set)
            | Some(Command::SetQuiet)
            | Some(Command::Add)
            | Some(Command::AddQuiet)
            | Some(Command::Replace)
            | Some(Command::ReplaceQuiet) => self.parse_set_request(src),

            Some(Command::Append)
            | Some(Command::AppendQuiet)
            | Some(Command::Prepend)
            | Some(Command::PrependQuiet) => self.parse_append_prepend_request(src),

            Some(Command::Delete) | Some(Command::DeleteQuiet) => self.parse_delete_request(src),

            Some(Command::Increment)
            | Some(Command::IncrementQuiet)
            | Some(Command::Decrement)
            | Some(Command::DecrementQuiet) => self.parse_delta_request(src),

            Some(Command::Flush) | Some(Command::FlushQuiet) => self.parse_flush_request(src),

            Some(Command::Quit) => Ok(Some(BinaryRequest::Quit(network::QuitRequest {
                header: self.header,
            }))),
            Some(Command::QuitQuiet) => {
                Ok(Some(BinaryRequest::QuitQuietly(network::QuitRequest {
                    header: self.header,
                })))
            }
            Some(Command::Noop) => Ok(Some(BinaryRequest::Noop(network::NoopRequest {
                header: self.header,
            }))),
            Some(Command::Version) => Ok(Some(BinaryRequest::Version(network::VersionRequest {
                header: self.header,
            }))),
            Some(Command::Stat) => self.parse_stat_request(src),

            _ => {
                // header_reject() already filtered these opcodes out
                error!("Cannot parse command opcode: {:?}", self.header.opcode);
                Err(Error::new(ErrorKind::InvalidData, "Incorrect op code"))
            }
        };
        self.init_parser();
        result
    }

    fn parse_get_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        let key = src.split_to(self.header.key_length as usize).freeze();
        let request = network::GetRequest {
            header: self.header,
            key,
        };
        let result = match FromPrimitive::from_u8(self.header.opcode) {
            Some(network::Command::Get) => BinaryRequest::Get(request),
            Some(network::Command::GetQuiet) => BinaryRequest::GetQuietly(request),
            Some(network::Command::GetKey) => BinaryRequest::GetKey(request),
            _ => BinaryRequest::GetKeyQuietly(request),
        };
        Ok(Some(result))
    }

    fn parse_set_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        let value_len = self.header.body_length as usize
            - self.header.key_length as usize
            - self.header.extras_length as usize;
        let set_request = network::SetRequest {
            header: self.header,
            flags: src.get_u32(),
            expiration: src.get_u32(),
            key: src.split_to(self.header.key_length as usize).freeze(),
            value: src.split_to(value_len).freeze(),
        };

        let result = match FromPrimitive::from_u8(self.header.opcode) {
            Some(network::Command::Set) => BinaryRequest::Set(set_request),
            Some(network::Command::SetQuiet) => BinaryRequest::SetQuietly(set_request),
            Some(network::Command::Add) => BinaryRequest::Add(set_request),
            Some(network::Command::AddQuiet) => BinaryRequest::AddQuietly(set_request),
            Some(network::Command::Replace) => BinaryRequest::Replace(set_request),
            _ => BinaryRequest::ReplaceQuietly(set_request),
        };
        Ok(Some(result))
    }

    fn parse_append_prepend_request(
        &self,
        src: &mut BytesMut,
    ) -> Result<Option<BinaryRequest>, io::Error> {
        let value_len = self.header.body_length as usize - self.header.key_length as usize;
        let request = network::AppendRequest {
            header: self.header,
            key: src.split_to(self.header.key_length as usize).freeze(),
            value: src.split_to(value_len).freeze(),
        };

        let result = match FromPrimitive::from_u8(self.header.opcode) {
            Some(network::Command::Append) => BinaryRequest::Append(request),
            Some(network::Command::AppendQuiet) => BinaryRequest::AppendQuietly(request),
            Some(network::Command::Prepend) => BinaryRequest::Prepend(request),
            _ => BinaryRequest::PrependQuietly(request),
        };
        Ok(Some(result))
    }

    fn parse_delete_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        let request = network::DeleteRequest {
            header: self.header,
            key: src.split_to(self.header.key_length as usize).freeze(),
        };
        let result = if self.header.opcode == network::Command::Delete as u8 {
            BinaryRequest::Delete(request)
        } else {
            BinaryRequest::DeleteQuiet(request)
        };
        Ok(Some(result))
    }

    fn parse_delta_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        let request = network::IncrementRequest {
            header: self.header,
            delta: src.get_u64(),
            initial: src.get_u64(),
            expiration: src.get_u32(),
            key: src.split_to(self.header.key_length as usize).freeze(),
        };

        let result = match FromPrimitive::from_u8(self.header.opcode) {
            Some(network::Command::Increment) => BinaryRequest::Increment(request),
            Some(network::Command::IncrementQuiet) => BinaryRequest::IncrementQuiet(request),
            Some(network::Command::Decrement) => BinaryRequest::Decrement(request),
            _ => BinaryRequest::DecrementQuiet(request),
        };
        Ok(Some(result))
    }

    fn parse_flush_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        let expiration = if self.header.extras_length == 4 {
            src.get_u32()
        } else {
            0
        };
        let request = network::FlushRequest {
            header: self.header,
            expiration,
        };
        let result = if self.header.opcode == network::Command::Flush as u8 {
            BinaryRequest::Flush(request)
        } else {
            BinaryRequest::FlushQuietly(request)
        };
        Ok(Some(result))
    }

    fn parse_stat_request(&self, src: &mut BytesMut) -> Result<Option<BinaryRequest>, io::Error> {
        // A stat key selects a subgroup; none are served, the key is
        // consumed and the terminator answered either way.
        let _key = src.split_to(self.header.key_length as usize);
        Ok(Some(BinaryRequest::Stats(network::StatsRequest {
            header: self.header,
        })))
    }
}

impl Decoder for MemcacheBinaryDecoder {
    type Item = BinaryRequest;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.state == RequestParserState::None {
            if src.len() < MemcacheBinaryDecoder::HEADER_LEN {
                return Ok(None);
            }
            self.parse_header(src)?;
        }

        if let Some(rejected) = self.header_reject() {
            return Ok(Some(rejected));
        }

        if (self.header.body_length as usize) > src.len() {
            src.reserve(self.header.body_length as usize - src.len());
            return Ok(None);
        }
        self.parse_request(src)
    }
}
