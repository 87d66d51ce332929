use crate::cache::cache::Cache;
use crate::memory_store::bounded_store::BoundedMemoryStore;
use crate::memory_store::value_pool::ValuePool;
use crate::server::timer;
use std::sync::Arc;

pub struct MemcacheStoreConfig {
    memory_limit: u64,
    item_size_limit: u32,
}

impl MemcacheStoreConfig {
    pub fn new(memory_limit: u64, item_size_limit: u32) -> MemcacheStoreConfig {
        MemcacheStoreConfig {
            memory_limit,
            item_size_limit,
        }
    }
}

#[derive(Default)]
pub struct MemcacheStoreBuilder {}

impl MemcacheStoreBuilder {
    pub fn new() -> MemcacheStoreBuilder {
        MemcacheStoreBuilder {}
    }

    pub fn from_config(
        config: MemcacheStoreConfig,
        timer: Arc<dyn timer::Timer + Send + Sync>,
        pool: Arc<ValuePool>,
    ) -> Arc<dyn Cache + Send + Sync> {
        Arc::new(BoundedMemoryStore::new(
            timer,
            pool,
            config.memory_limit,
            config.item_size_limit,
        ))
    }
}
