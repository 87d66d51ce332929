pub const MEMCD_VERSION: &str = env!("CARGO_PKG_VERSION");
