use log::info;
use std::env;
use std::process;

extern crate memcd;

fn main() {
    let cli_config = match memcd::memcache::cli::parser::parse(env::args().collect()) {
        Ok(config) => config,
        Err(err) => {
            eprint!("{}", err);
            process::exit(1);
        }
    };

    // Vary the output based on how many times the user used the "verbose"
    // flag (i.e. 'memcdd -v -v' vs 'memcdd -v')
    tracing_subscriber::fmt()
        .with_max_level(cli_config.log_level())
        .init();

    info!("Listen address: {}", cli_config.listen_address);
    info!("Listen port: {}", cli_config.port);
    info!("Connection limit: {}", cli_config.connection_limit);
    info!("Number of threads: {}", cli_config.threads);
    info!("Runtime type: {}", cli_config.runtime_type.as_str());
    info!("Max item size: {}", cli_config.item_size_limit);
    info!("Memory limit: {} MB", cli_config.memory_limit);

    memcd::memcache_server::runtime_builder::start_memcd_server(cli_config);
}
