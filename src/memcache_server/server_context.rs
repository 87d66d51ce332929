use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::cache::Cache, memcache, memory_store::value_pool::ValuePool, server::timer,
};

/// Long lived process state, built once at startup and passed explicitly
/// into the server pieces.
pub struct ServerContext {
    cancellation_token: CancellationToken,
    system_timer: Arc<timer::SystemTimer>,
    store: Arc<dyn Cache + Send + Sync>,
    value_pool: Arc<ValuePool>,
}

impl ServerContext {
    pub fn get_default_server_context(
        store_config: memcache::builder::MemcacheStoreConfig,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let system_timer = Arc::new(timer::SystemTimer::new(cancellation_token.clone()));
        let value_pool = Arc::new(ValuePool::default());
        let store = memcache::builder::MemcacheStoreBuilder::from_config(
            store_config,
            system_timer.clone(),
            value_pool.clone(),
        );
        Self {
            cancellation_token,
            system_timer,
            store,
            value_pool,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn system_timer(&self) -> Arc<timer::SystemTimer> {
        self.system_timer.clone()
    }

    pub fn store(&self) -> Arc<dyn Cache + Send + Sync> {
        self.store.clone()
    }

    pub fn value_pool(&self) -> Arc<ValuePool> {
        self.value_pool.clone()
    }
}
