use crate::memory_store::value_pool::ValuePool;
use crate::protocol::binary::decoder::{BinaryRequest, MemcacheBinaryDecoder};
use crate::protocol::binary::encoder::{BinaryResponse, MemcacheBinaryEncoder};
use crate::protocol::binary::network;
use crate::protocol::text::command::TextCommand;
use crate::protocol::text::decoder::MemcacheTextDecoder;
use bytes::{Buf, Bytes, BytesMut};
use std::cmp;
use std::io;
use std::io::{Error, ErrorKind};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;

const SKIP_CHUNK: usize = 8 * 1024;
const CRLF_LEN: u64 = 2;

/// Which interpreter serves the connection, decided by its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedProtocol {
    Binary,
    Text,
}

/// Buffered socket shared by both protocol processors.
///
/// The read buffer is filled before the first byte is inspected, so the
/// protocol can be chosen without consuming anything. Oversized or
/// rejected request bodies are drained through the same buffer to keep
/// the stream framed.
pub struct MemcacheConnection {
    stream: TcpStream,
    buffer: BytesMut,
    binary_decoder: MemcacheBinaryDecoder,
    text_decoder: MemcacheTextDecoder,
    encoder: MemcacheBinaryEncoder,
    pool: Arc<ValuePool>,
}

impl MemcacheConnection {
    pub fn new(socket: TcpStream, item_size_limit: u32, pool: Arc<ValuePool>) -> Self {
        MemcacheConnection {
            stream: socket,
            buffer: BytesMut::with_capacity(4 * 1024),
            binary_decoder: MemcacheBinaryDecoder::new(item_size_limit),
            text_decoder: MemcacheTextDecoder::new(item_size_limit, pool.clone()),
            encoder: MemcacheBinaryEncoder::new(),
            pool,
        }
    }

    /// Peeks the first request byte without consuming it. `None` means
    /// the peer closed before sending anything.
    pub async fn sniff_protocol(&mut self) -> io::Result<Option<SniffedProtocol>> {
        while self.buffer.is_empty() {
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                return Ok(None);
            }
        }
        if self.buffer[0] == network::Magic::Request as u8 {
            Ok(Some(SniffedProtocol::Binary))
        } else {
            Ok(Some(SniffedProtocol::Text))
        }
    }

    pub async fn read_frame(&mut self) -> io::Result<Option<BinaryRequest>> {
        loop {
            if let Some(frame) = self.binary_decoder.decode(&mut self.buffer)? {
                if let Some(drain) = frame.drain_len() {
                    self.drain_body(drain as u64).await?;
                }
                return Ok(Some(frame));
            }

            // There is not enough buffered data to read a frame. Attempt
            // to read more data from the socket. `0` indicates "end of
            // stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                // The remote closed the connection. For this to be a
                // clean shutdown, there should be no data in the read
                // buffer. If there is, the peer closed the socket while
                // sending a frame.
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(connection_reset());
            }
        }
    }

    pub async fn read_command(&mut self) -> io::Result<Option<TextCommand>> {
        loop {
            if let Some(command) = self.text_decoder.decode(&mut self.buffer)? {
                if let TextCommand::TooLarge { body_len, .. } = &command {
                    self.drain_body(body_len + CRLF_LEN).await?;
                }
                return Ok(Some(command));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(connection_reset());
            }
        }
    }

    /// Discards `total` body bytes, first from the read buffer, then
    /// from the socket.
    async fn drain_body(&mut self, total: u64) -> io::Result<()> {
        let buffered = cmp::min(total, self.buffer.len() as u64);
        self.buffer.advance(buffered as usize);
        let mut remaining = total - buffered;
        debug!("Draining {} bytes from socket", remaining);

        let mut scratch = [0u8; SKIP_CHUNK];
        while remaining > 0 {
            let take = cmp::min(remaining, SKIP_CHUNK as u64) as usize;
            let read = self.stream.read(&mut scratch[..take]).await?;
            if read == 0 {
                return Err(connection_reset());
            }
            remaining -= read as u64;
        }
        Ok(())
    }

    pub async fn write(&mut self, msg: &BinaryResponse) -> io::Result<()> {
        let message = self.encoder.encode_message(msg);
        self.stream.write_all(&message.data[..]).await?;
        self.pool.recycle(message.data);
        Ok(())
    }

    pub async fn write_response(&mut self, response: Bytes) -> io::Result<()> {
        self.stream.write_all(&response[..]).await?;
        self.pool.recycle(response);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

fn connection_reset() -> Error {
    Error::new(ErrorKind::ConnectionReset, "Connection reset by peer")
}
