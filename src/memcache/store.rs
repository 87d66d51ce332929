use crate::cache::cache::{
    Cache, CacheMetaData as CacheMeta, DeltaParam, DeltaResult, KeyType as CacheKeyType,
    Record as CacheRecord, SetStatus as CacheSetStatus, StoreStats,
};
use crate::cache::error::Result;

use std::sync::Arc;

pub type Record = CacheRecord;
pub type Meta = CacheMeta;
pub type SetStatus = CacheSetStatus;
pub type KeyType = CacheKeyType;

pub type IncrementParam = DeltaParam;
pub type DecrementParam = IncrementParam;

pub use crate::cache::cache::DeltaResultValueType;

/**
 * Implements Memcache commands based
 * on Key Value Store
 */
pub struct MemcStore {
    store: Arc<dyn Cache + Send + Sync>,
}

impl MemcStore {
    pub fn new(store: Arc<dyn Cache + Send + Sync>) -> MemcStore {
        MemcStore { store }
    }

    pub fn set(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store.set(key, record)
    }

    pub fn get(&self, key: &KeyType) -> Result<Record> {
        self.store.get(key)
    }

    pub fn add(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store.add(key, record)
    }

    pub fn replace(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store.replace(key, record)
    }

    pub fn append(&self, key: KeyType, new_record: Record) -> Result<SetStatus> {
        self.store.append(key, new_record)
    }

    pub fn prepend(&self, key: KeyType, new_record: Record) -> Result<SetStatus> {
        self.store.prepend(key, new_record)
    }

    pub fn increment(
        &self,
        header: Meta,
        key: KeyType,
        increment: IncrementParam,
    ) -> Result<DeltaResult> {
        self.add_delta(header, key, increment, true)
    }

    pub fn decrement(
        &self,
        header: Meta,
        key: KeyType,
        decrement: DecrementParam,
    ) -> Result<DeltaResult> {
        self.add_delta(header, key, decrement, false)
    }

    fn add_delta(
        &self,
        header: Meta,
        key: KeyType,
        delta: DeltaParam,
        increment: bool,
    ) -> Result<DeltaResult> {
        self.store.incr_decr(header, key, delta, increment)
    }

    pub fn delete(&self, key: KeyType, header: Meta) -> Result<Record> {
        self.store.delete(key, header)
    }

    pub fn touch(&self, key: KeyType, expiration: u32) -> Result<SetStatus> {
        self.store.touch(key, expiration)
    }

    pub fn flush(&self, header: Meta) {
        self.store.flush(header)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod eviction_tests;
#[cfg(test)]
mod touch_tests;
