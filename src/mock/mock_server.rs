use crate::memcache::store::MemcStore;
use crate::memory_store::bounded_store::BoundedMemoryStore;
use crate::memory_store::value_pool::ValuePool;
use crate::server::timer;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_MEMORY_LIMIT: u64 = 64 * 1024 * 1024;
pub const TEST_ITEM_SIZE_LIMIT: u32 = 1024 * 1024;

pub struct MockSystemTimer {
    pub current_time: AtomicUsize,
}

pub trait SetableTimer: timer::Timer {
    fn set(&self, time: u64);
}

impl MockSystemTimer {
    pub fn new() -> Self {
        MockSystemTimer {
            current_time: AtomicUsize::new(0),
        }
    }
}

impl timer::Timer for MockSystemTimer {
    fn timestamp(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed) as u64
    }
}

impl SetableTimer for MockSystemTimer {
    fn set(&self, time: u64) {
        self.current_time.store(time as usize, Ordering::Relaxed)
    }
}

pub struct MockServer {
    pub timer: Arc<MockSystemTimer>,
    pub pool: Arc<ValuePool>,
    pub storage: MemcStore,
}

impl MockServer {
    pub fn new(timer: Arc<MockSystemTimer>, pool: Arc<ValuePool>, storage: MemcStore) -> Self {
        MockServer {
            timer,
            pool,
            storage,
        }
    }
}

pub fn create_server_with_limits(memory_limit: u64, item_size_limit: u32) -> MockServer {
    let timer = Arc::new(MockSystemTimer::new());
    let pool = Arc::new(ValuePool::default());
    let store = Arc::new(BoundedMemoryStore::new(
        timer.clone(),
        pool.clone(),
        memory_limit,
        item_size_limit,
    ));
    MockServer::new(timer, pool, MemcStore::new(store))
}

pub fn create_bounded_server() -> MockServer {
    create_server_with_limits(TEST_MEMORY_LIMIT, TEST_ITEM_SIZE_LIMIT)
}

pub fn create_storage() -> Arc<MemcStore> {
    let timer = Arc::new(MockSystemTimer::new());
    let pool = Arc::new(ValuePool::default());
    let store = Arc::new(BoundedMemoryStore::new(
        timer,
        pool,
        TEST_MEMORY_LIMIT,
        TEST_ITEM_SIZE_LIMIT,
    ));
    Arc::new(MemcStore::new(store))
}
