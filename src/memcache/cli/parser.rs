use byte_unit::Byte;
use clap::{command, Parser, ValueEnum};
use std::{net::IpAddr, ops::RangeInclusive};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum RuntimeType {
    /// single threaded runtime, no work stealing
    CurrentThread,
    /// work stealing threadpool runtime
    MultiThread,
}

impl RuntimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeType::CurrentThread => "Work handled within current thread runtime",
            RuntimeType::MultiThread => "Work stealing threadpool runtime",
        }
    }
}

const DEFAULT_PORT: u16 = 11211;
const DEFAULT_ADDRESS: &str = "127.0.0.1";
const CONNECTION_LIMIT: u32 = 1024;
const MEMORY_LIMIT_MB: u64 = 512;
const MAX_ITEM_SIZE: &str = "1MiB";

const MIB: u64 = 1024 * 1024;

fn get_default_threads_number() -> usize {
    num_cpus::get_physical()
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
/// memcached compatible server implementation in Rust
pub struct MemcdConfig {
    #[arg(short, long, value_name = "PORT", value_parser = port_in_range, default_value_t = DEFAULT_PORT)]
    /// TCP port to listen on
    pub port: u16,

    #[arg(short, long, value_name = "CONNECTION-LIMIT", default_value_t = CONNECTION_LIMIT)]
    /// max simultaneous connections
    pub connection_limit: u32,

    #[arg(short, long, value_name = "MEMORY-LIMIT", default_value_t = MEMORY_LIMIT_MB)]
    /// item memory budget in megabytes
    pub memory_limit: u64,

    #[arg(short = 'I', long, value_name = "MAX-ITEM-SIZE", value_parser = parse_byte_size, default_value = MAX_ITEM_SIZE)]
    /// adjusts max item size, accepts plain bytes or unit suffixes
    pub item_size_limit: u64,

    #[arg(short, long, value_name = "THREADS", default_value_t = get_default_threads_number())]
    /// number of threads to use (defaults to number of physical cores)
    pub threads: usize,

    #[arg(short, long, action = clap::ArgAction::Count)]
    /// sets the level of verbosity
    pub verbose: u8,

    #[arg(short, long, value_name = "listen", default_value = DEFAULT_ADDRESS)]
    /// interface to listen on
    pub listen_address: IpAddr,

    #[arg(short, long, value_name = "RUNTIME-TYPE", default_value_t = RuntimeType::MultiThread, value_enum)]
    /// runtime type to use
    pub runtime_type: RuntimeType,
}

impl MemcdConfig {
    /// Byte budget for the store, `-m` is given in megabytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit * MIB
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    fn from_args(args: Vec<String>) -> Result<MemcdConfig, String> {
        MemcdConfig::try_parse_from(args.iter()).map_err(|err| err.to_string())
    }
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

fn parse_byte_size(s: &str) -> Result<u64, String> {
    match Byte::parse_str(s, true) {
        Ok(bytes) => Ok(bytes.as_u64()),
        Err(byte_error) => Err(format!("{}", byte_error)),
    }
}

pub fn parse(args: Vec<String>) -> Result<MemcdConfig, String> {
    MemcdConfig::from_args(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        MemcdConfig::command().debug_assert()
    }

    #[test]
    fn test_default_config() {
        let args: Vec<String> = vec!["memcdd".to_string()];
        let config = parse(args).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connection_limit, CONNECTION_LIMIT);
        assert_eq!(config.memory_limit, MEMORY_LIMIT_MB);
        assert_eq!(config.memory_limit_bytes(), 512 * 1024 * 1024);
        assert_eq!(config.item_size_limit, 1024 * 1024);
        assert_eq!(config.threads, get_default_threads_number());
        assert_eq!(config.verbose, 0);
        assert_eq!(
            config.listen_address,
            DEFAULT_ADDRESS.parse::<IpAddr>().unwrap()
        );
        assert_eq!(config.runtime_type, RuntimeType::MultiThread);
    }

    #[test]
    fn test_custom_port() {
        let args = vec!["memcdd".to_string(), "--port".to_string(), "8080".to_string()];
        let config = parse(args).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_port() {
        let args = vec!["memcdd".to_string(), "--port".to_string(), "70000".to_string()];
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_memory_limit_converted_to_bytes() {
        let args = vec!["memcdd".to_string(), "-m".to_string(), "64".to_string()];
        let config = parse(args).unwrap();
        assert_eq!(config.memory_limit, 64);
        assert_eq!(config.memory_limit_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_item_size_limit_plain_bytes() {
        let args = vec!["memcdd".to_string(), "-I".to_string(), "1048576".to_string()];
        let config = parse(args).unwrap();
        assert_eq!(config.item_size_limit, 1048576);
    }

    #[test]
    fn test_item_size_limit_unit_suffix() {
        let args = vec!["memcdd".to_string(), "-I".to_string(), "2MiB".to_string()];
        let config = parse(args).unwrap();
        assert_eq!(config.item_size_limit, 2 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_item_size_limit() {
        let args = vec!["memcdd".to_string(), "-I".to_string(), "invalid".to_string()];
        assert!(parse(args).is_err());
    }

    #[test]
    fn test_runtime_type() {
        let args = vec![
            "memcdd".to_string(),
            "--runtime-type".to_string(),
            "current-thread".to_string(),
        ];
        let config = parse(args).unwrap();
        assert_eq!(config.runtime_type, RuntimeType::CurrentThread);
    }

    #[test]
    fn test_verbose_flag() {
        let args = vec!["memcdd".to_string(), "-v".to_string(), "-v".to_string()];
        let config = parse(args).unwrap();
        assert_eq!(config.verbose, 2);
        assert_eq!(config.log_level(), tracing::Level::TRACE);
    }
}
