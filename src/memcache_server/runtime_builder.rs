use crate::memcache;
use crate::memcache::cli::parser::{MemcdConfig, RuntimeType};
use crate::memcache_server;
use crate::memcache_server::server_context::ServerContext;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;

const CLIENT_RX_TIMEOUT_SECS: u32 = 60;

fn get_worker_thread_name() -> String {
    static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
    let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
    format!("memcdd-wrk-{}", id)
}

fn create_multi_thread_runtime(worker_threads: usize) -> tokio::runtime::Runtime {
    Builder::new_multi_thread()
        .thread_name_fn(get_worker_thread_name)
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .expect("Cannot build multi thread runtime")
}

fn create_current_thread_runtime() -> tokio::runtime::Runtime {
    Builder::new_current_thread()
        .thread_name_fn(get_worker_thread_name)
        .enable_all()
        .build()
        .expect("Cannot build current thread runtime")
}

fn register_ctrlc_handler(
    runtime: &tokio::runtime::Runtime,
    cancellation_token: CancellationToken,
) {
    runtime.handle().spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down...");
                cancellation_token.cancel();
            }
            Err(err) => {
                error!("Failed to listen for ctrl-c signal: {}", err);
            }
        }
    });
}

pub fn start_memcd_server(config: MemcdConfig) {
    let store_config = memcache::builder::MemcacheStoreConfig::new(
        config.memory_limit_bytes(),
        config.item_size_limit as u32,
    );
    let ctxt = ServerContext::get_default_server_context(store_config);
    start_memcd_server_with_ctxt(config, ctxt)
}

pub fn start_memcd_server_with_ctxt(config: MemcdConfig, ctxt: ServerContext) {
    let runtime = match config.runtime_type {
        RuntimeType::CurrentThread => create_current_thread_runtime(),
        RuntimeType::MultiThread => create_multi_thread_runtime(config.threads),
    };

    let cancellation_token = ctxt.cancellation_token();
    let system_timer = ctxt.system_timer();

    let addr = SocketAddr::new(config.listen_address, config.port);
    let memc_config = memcache_server::memc_tcp::MemcacheServerConfig::new(
        CLIENT_RX_TIMEOUT_SECS,
        config.connection_limit,
        config.item_size_limit as u32,
    );
    let mut tcp_server = memcache_server::memc_tcp::MemcacheTcpServer::new(
        memc_config,
        ctxt.store(),
        ctxt.value_pool(),
        cancellation_token.clone(),
    );

    register_ctrlc_handler(&runtime, cancellation_token);
    runtime.spawn(async move {
        if let Err(err) = tcp_server.run(addr).await {
            error!("Server error: {}", err);
        }
    });
    runtime.block_on(system_timer.run())
}
