use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs as TokioToSocketAddrs};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::client_handler::{Client, ClientConfig};
use crate::cache::cache::Cache;
use crate::memcache::store;
use crate::memory_store::value_pool::ValuePool;

#[derive(Clone, Copy)]
pub struct MemcacheServerConfig {
    timeout_secs: u32,
    connection_limit: u32,
    item_memory_limit: u32,
}

impl MemcacheServerConfig {
    pub fn new(
        timeout_secs: u32,
        connection_limit: u32,
        item_memory_limit: u32,
    ) -> MemcacheServerConfig {
        MemcacheServerConfig {
            timeout_secs,
            connection_limit,
            item_memory_limit,
        }
    }
}

pub struct MemcacheTcpServer {
    config: MemcacheServerConfig,
    storage: Arc<store::MemcStore>,
    value_pool: Arc<ValuePool>,
    limit_connections: Arc<Semaphore>,
    cancellation_token: CancellationToken,
}

impl MemcacheTcpServer {
    pub fn new(
        config: MemcacheServerConfig,
        store: Arc<dyn Cache + Send + Sync>,
        value_pool: Arc<ValuePool>,
        cancellation_token: CancellationToken,
    ) -> MemcacheTcpServer {
        MemcacheTcpServer {
            config,
            storage: Arc::new(store::MemcStore::new(store)),
            value_pool,
            limit_connections: Arc::new(Semaphore::new(config.connection_limit as usize)),
            cancellation_token,
        }
    }

    pub async fn run<A: ToSocketAddrs + TokioToSocketAddrs>(&mut self, addr: A) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on: {}", listener.local_addr()?);

        loop {
            tokio::select! {
                connection = listener.accept() => {
                    match connection {
                        Ok((socket, peer_addr)) => {
                            self.start_client(socket, peer_addr).await?;
                        },
                        Err(err) => {
                            error!("{}", err);
                        }
                    }
                },
                _ = self.cancellation_token.cancelled() => {
                    info!("Stopped accepting connections");
                    return Ok(());
                },
            }
        }
    }

    async fn start_client(&mut self, socket: TcpStream, peer_addr: SocketAddr) -> io::Result<()> {
        socket.set_nodelay(true)?;
        socket.set_linger(None)?;
        let client_config = ClientConfig {
            item_memory_limit: self.config.item_memory_limit,
            rx_timeout_secs: self.config.timeout_secs,
        };
        let mut client = Client::new(
            self.storage.clone(),
            socket,
            peer_addr,
            client_config,
            self.value_pool.clone(),
            self.limit_connections.clone(),
        );

        match self.limit_connections.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_closed) => return Ok(()),
        }
        debug!("Spawning client task for {}", peer_addr);
        // Like with other small servers, we'll `spawn` this client to
        // ensure it runs concurrently with all other clients.
        tokio::spawn(async move { client.handle().await });
        Ok(())
    }
}
