use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error};

use super::connection::{MemcacheConnection, SniffedProtocol};
use super::handler;
use super::text_handler;
use crate::memcache::store as storage;
use crate::memory_store::value_pool::ValuePool;
use crate::protocol::binary::decoder::BinaryRequest;
use crate::protocol::binary::encoder::BinaryResponse;
use crate::protocol::text::command::TextCommand;

pub struct ClientConfig {
    pub(crate) item_memory_limit: u32,
    pub(crate) rx_timeout_secs: u32,
}

pub struct Client {
    stream: MemcacheConnection,
    addr: SocketAddr,
    config: ClientConfig,
    binary_handler: handler::BinaryHandler,
    text_handler: text_handler::TextHandler,
    /// Max connection semaphore.
    ///
    /// When the handler is dropped, a permit is returned to this semaphore. If
    /// the listener is waiting for connections to close, it will be notified of
    /// the newly available permit and resume accepting connections.
    limit_connections: Arc<Semaphore>,
}

impl Client {
    pub fn new(
        store: Arc<storage::MemcStore>,
        socket: TcpStream,
        addr: SocketAddr,
        config: ClientConfig,
        pool: Arc<ValuePool>,
        limit_connections: Arc<Semaphore>,
    ) -> Self {
        Client {
            stream: MemcacheConnection::new(socket, config.item_memory_limit, pool.clone()),
            addr,
            config,
            binary_handler: handler::BinaryHandler::new(store.clone()),
            text_handler: text_handler::TextHandler::new(store, pool),
            limit_connections,
        }
    }

    pub async fn handle(&mut self) {
        debug!("New client connected: {}", self.addr);

        let rx_timeout = Duration::from_secs(self.config.rx_timeout_secs as u64);
        let protocol = match timeout(rx_timeout, self.stream.sniff_protocol()).await {
            Ok(Ok(Some(protocol))) => protocol,
            Ok(Ok(None)) => {
                debug!("Connection closed before first request: {}", self.addr);
                return;
            }
            Ok(Err(err)) => {
                log_error(err);
                return;
            }
            Err(err) => {
                debug!(
                    "Timeout {}s elapsed, disconnecting client: {}, error: {}",
                    self.config.rx_timeout_secs, self.addr, err
                );
                return;
            }
        };

        debug!("Client {} speaks {:?}", self.addr, protocol);
        match protocol {
            SniffedProtocol::Binary => self.handle_binary().await,
            SniffedProtocol::Text => self.handle_text().await,
        }
    }

    async fn handle_binary(&mut self) {
        let rx_timeout = Duration::from_secs(self.config.rx_timeout_secs as u64);
        loop {
            match timeout(rx_timeout, self.stream.read_frame()).await {
                Ok(req_or_none) => {
                    if self.handle_frame(req_or_none).await {
                        return;
                    }
                }
                Err(err) => {
                    debug!(
                        "Timeout {}s elapsed, disconnecting client: {}, error: {}",
                        self.config.rx_timeout_secs, self.addr, err
                    );
                    return;
                }
            }
        }
    }

    async fn handle_frame(&mut self, req: Result<Option<BinaryRequest>, io::Error>) -> bool {
        match req {
            Ok(Some(request)) => self.handle_request(request).await,
            Ok(None) => {
                debug!("Connection closed: {}", self.addr);
                true
            }
            Err(err) => {
                error!("Error when reading frame; error = {:?}", err);
                true
            }
        }
    }

    /// Handles a single binary request.
    /// Returns true if we should leave the client receive loop.
    async fn handle_request(&mut self, request: BinaryRequest) -> bool {
        debug!("Got request {:?}", request.get_header());

        if let BinaryRequest::QuitQuietly(_req) = request {
            debug!("Closing client socket quit quietly");
            if let Err(_e) = self.stream.shutdown().await.map_err(log_error) {}
            return true;
        }

        let resp = self.binary_handler.handle_request(request);
        match resp {
            Some(response) => {
                let mut socket_close = false;
                if let BinaryResponse::Quit(_resp) = &response {
                    socket_close = true;
                }

                debug!("Sending response {:?}", response);
                if let Err(e) = self.stream.write(&response).await {
                    error!("error on sending response; error = {:?}", e);
                    return true;
                }

                if socket_close {
                    debug!("Closing client socket quit command");
                    if let Err(_e) = self.stream.shutdown().await.map_err(log_error) {}
                    return true;
                }
                false
            }
            None => false,
        }
    }

    async fn handle_text(&mut self) {
        let rx_timeout = Duration::from_secs(self.config.rx_timeout_secs as u64);
        loop {
            match timeout(rx_timeout, self.stream.read_command()).await {
                Ok(Ok(Some(command))) => {
                    if matches!(command, TextCommand::Quit) {
                        debug!("Closing client socket quit command");
                        if let Err(_e) = self.stream.shutdown().await.map_err(log_error) {}
                        return;
                    }
                    if let Some(response) = self.text_handler.handle_command(command) {
                        if let Err(e) = self.stream.write_response(response).await {
                            error!("error on sending response; error = {:?}", e);
                            return;
                        }
                    }
                }
                Ok(Ok(None)) => {
                    debug!("Connection closed: {}", self.addr);
                    return;
                }
                Ok(Err(err)) => {
                    error!("Error when reading command; error = {:?}", err);
                    return;
                }
                Err(err) => {
                    debug!(
                        "Timeout {}s elapsed, disconnecting client: {}, error: {}",
                        self.config.rx_timeout_secs, self.addr, err
                    );
                    return;
                }
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // Add a permit back to the semaphore.
        //
        // Doing so unblocks the listener if the max number of
        // connections has been reached.
        //
        // This is done in a `Drop` implementation in order to guarantee that
        // the permit is added even if the task handling the connection panics.
        // If `add_permit` was called at the end of the `run` function and some
        // bug causes a panic. The permit would never be returned to the
        // semaphore.
        self.limit_connections.add_permits(1);
    }
}

fn log_error(e: io::Error) {
    // in most cases its not an error
    // client may just drop connection i.e. like
    // php client does
    if e.kind() == io::ErrorKind::NotConnected {
        info!("Error: {}", e);
    } else {
        error!("Error: {}", e);
    }
}
