#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Plain blocking text protocol client for end to end checks.
pub struct TextClient {
    stream: TcpStream,
}

impl TextClient {
    pub fn connect(port: u16) -> TextClient {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to test server");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("set read timeout");
        stream.set_nodelay(true).expect("set nodelay");
        TextClient { stream }
    }

    pub fn send(&mut self, request: &[u8]) {
        self.stream.write_all(request).expect("request written");
    }

    /// Reads exactly as many bytes as `expected` and asserts equality.
    pub fn expect(&mut self, expected: &[u8]) {
        let mut received = vec![0u8; expected.len()];
        self.stream
            .read_exact(&mut received)
            .expect("response read");
        assert_eq!(
            String::from_utf8_lossy(&received),
            String::from_utf8_lossy(expected)
        );
    }

    pub fn roundtrip(&mut self, request: &[u8], expected: &[u8]) {
        self.send(request);
        self.expect(expected);
    }

    /// Reads a single CRLF terminated line.
    pub fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.stream.read_exact(&mut byte).expect("line byte read");
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        String::from_utf8(line).expect("utf8 response line")
    }

    /// True once the peer has closed the connection.
    pub fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(self.stream.read(&mut byte), Ok(0))
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

const REQUEST_MAGIC: u8 = 0x80;
const RESPONSE_MAGIC: u8 = 0x81;
const HEADER_LEN: usize = 24;

/// Builds one binary protocol request frame.
pub fn binary_request(
    opcode: u8,
    key: &[u8],
    extras: &[u8],
    value: &[u8],
    opaque: u32,
    cas: u64,
) -> Vec<u8> {
    let body_len = key.len() + extras.len() + value.len();
    let mut frame = Vec::with_capacity(HEADER_LEN + body_len);
    frame.push(REQUEST_MAGIC);
    frame.push(opcode);
    frame.extend_from_slice(&(key.len() as u16).to_be_bytes());
    frame.push(extras.len() as u8);
    frame.push(0); // data type
    frame.extend_from_slice(&0u16.to_be_bytes()); // vbucket id
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.extend_from_slice(&opaque.to_be_bytes());
    frame.extend_from_slice(&cas.to_be_bytes());
    frame.extend_from_slice(extras);
    frame.extend_from_slice(key);
    frame.extend_from_slice(value);
    frame
}

pub struct BinaryResponsePacket {
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub status: u16,
    pub body_length: u32,
    pub opaque: u32,
    pub cas: u64,
    pub body: Vec<u8>,
}

impl BinaryResponsePacket {
    /// Response value with extras and key stripped.
    pub fn value(&self) -> &[u8] {
        &self.body[(self.extras_length as usize + self.key_length as usize)..]
    }

    pub fn extras(&self) -> &[u8] {
        &self.body[..self.extras_length as usize]
    }
}

/// Reads one binary response frame off the socket.
pub fn read_binary_response(stream: &mut TcpStream) -> BinaryResponsePacket {
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).expect("response header");
    assert_eq!(header[0], RESPONSE_MAGIC, "response magic");

    let body_length = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    let mut body = vec![0u8; body_length as usize];
    stream.read_exact(&mut body).expect("response body");

    BinaryResponsePacket {
        opcode: header[1],
        key_length: u16::from_be_bytes([header[2], header[3]]),
        extras_length: header[4],
        status: u16::from_be_bytes([header[6], header[7]]),
        body_length,
        opaque: u32::from_be_bytes([header[12], header[13], header[14], header[15]]),
        cas: u64::from_be_bytes([
            header[16], header[17], header[18], header[19], header[20], header[21], header[22],
            header[23],
        ]),
        body,
    }
}
