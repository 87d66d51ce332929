use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use memcd::memcache;
use memcd::memcache_server::{
    runtime_builder::start_memcd_server_with_ctxt, server_context::ServerContext,
};
use tokio_util::sync::CancellationToken;

use super::random_port::pseudo_random_port;
use super::MemcdServerParamsBuilder;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MemcdTestServer {
    thread_join_handle: Option<thread::JoinHandle<()>>,
    cancellation_token: CancellationToken,
    port: u16,
}

impl MemcdTestServer {
    fn new(
        thread_join_handle: thread::JoinHandle<()>,
        cancellation_token: CancellationToken,
        port: u16,
    ) -> MemcdTestServer {
        MemcdTestServer {
            thread_join_handle: Some(thread_join_handle),
            cancellation_token,
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn kill(&mut self) {
        self.cancellation_token.cancel();
        if let Some(thread_join_handle) = self.thread_join_handle.take() {
            if thread_join_handle.join().is_err() {
                eprintln!("Server thread panicked");
            }
        }
    }
}

impl Drop for MemcdTestServer {
    fn drop(&mut self) {
        self.kill();
    }
}

fn wait_until_listening(port: u16) {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(_stream) => return,
            Err(err) => {
                if Instant::now() > deadline {
                    panic!("Server did not start on port {}: {}", port, err);
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

fn spawn_server_args(args: Vec<String>) -> MemcdTestServer {
    let config = memcache::cli::parser::parse(args).expect("valid test arguments");
    let store_config = memcache::builder::MemcacheStoreConfig::new(
        config.memory_limit_bytes(),
        config.item_size_limit as u32,
    );
    let ctxt = ServerContext::get_default_server_context(store_config);
    let cancellation_token = ctxt.cancellation_token();
    let port = config.port;
    let handle = thread::spawn(move || start_memcd_server_with_ctxt(config, ctxt));
    wait_until_listening(port);
    MemcdTestServer::new(handle, cancellation_token, port)
}

pub fn spawn_server(mut params: MemcdServerParamsBuilder) -> MemcdTestServer {
    let port = pseudo_random_port.lock().unwrap().get_next_port();
    params.with_port(port);
    let args = params.build();
    spawn_server_args(args)
}
