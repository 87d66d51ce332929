pub struct MemcdServerParamsBuilder {
    port: u16,
    memory_limit_mb: u64,
    item_size_limit: Option<String>,
    connection_limit: u32,
}

impl Default for MemcdServerParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemcdServerParamsBuilder {
    pub fn new() -> MemcdServerParamsBuilder {
        MemcdServerParamsBuilder {
            port: 0,
            memory_limit_mb: 64,
            item_size_limit: None,
            connection_limit: 128,
        }
    }

    pub fn with_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn with_memory_limit_mb(&mut self, megabytes: u64) -> &mut Self {
        self.memory_limit_mb = megabytes;
        self
    }

    #[allow(dead_code)]
    pub fn with_item_size_limit(&mut self, limit: &str) -> &mut Self {
        self.item_size_limit = Some(String::from(limit));
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args = vec![
            String::from("memcdd"),
            String::from("--port"),
            self.port.to_string(),
            String::from("--memory-limit"),
            self.memory_limit_mb.to_string(),
            String::from("--connection-limit"),
            self.connection_limit.to_string(),
            String::from("--runtime-type"),
            String::from("multi-thread"),
            String::from("--threads"),
            String::from("2"),
        ];
        if let Some(limit) = &self.item_size_limit {
            args.push(String::from("-I"));
            args.push(limit.clone());
        }
        args
    }
}
