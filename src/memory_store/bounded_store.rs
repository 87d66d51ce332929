use crate::cache::cache::{
    impl_details, impl_details::CacheImplDetails, Cache, CacheMetaData, DeltaParam, DeltaResult,
    KeyType, Record, SetStatus, StoreStats, DELTA_NO_INITIAL_VALUE, REALTIME_MAX_DELTA,
};
use crate::cache::error::{CacheError, Result};
use crate::memory_store::value_pool::ValuePool;
use crate::server::timer;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Storage = DashMap<KeyType, Record>;

enum StoreMode {
    Set,
    Add,
    Replace,
}

/// Bounded concurrent store backing the memcache command set.
///
/// Byte accounting, CAS versioning and the recency sequence live in
/// atomics beside the map; per-key atomicity comes from the map's entry
/// locks. Capacity overruns are resolved by [`BoundedMemoryStore::reclaim`]
/// before a write commits.
pub struct BoundedMemoryStore {
    memory: Storage,
    timer: Arc<dyn timer::Timer + Send + Sync>,
    cas_id: AtomicU64,
    access_id: AtomicU64,
    used_bytes: AtomicU64,
    memory_limit: u64,
    item_size_limit: u32,
    /// Flush deadline; records written strictly before it die once it
    /// passes. Zero means no flush is pending.
    oldest_live: AtomicU64,
    pool: Arc<ValuePool>,
    cmd_get: AtomicU64,
    cmd_set: AtomicU64,
    get_hits: AtomicU64,
    get_misses: AtomicU64,
    evictions: AtomicU64,
}

impl BoundedMemoryStore {
    pub fn new(
        timer: Arc<dyn timer::Timer + Send + Sync>,
        pool: Arc<ValuePool>,
        memory_limit: u64,
        item_size_limit: u32,
    ) -> BoundedMemoryStore {
        BoundedMemoryStore {
            memory: DashMap::new(),
            timer,
            cas_id: AtomicU64::new(1),
            access_id: AtomicU64::new(1),
            used_bytes: AtomicU64::new(0),
            memory_limit,
            item_size_limit,
            oldest_live: AtomicU64::new(0),
            pool,
            cmd_get: AtomicU64::new(0),
            cmd_set: AtomicU64::new(0),
            get_hits: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn value_pool(&self) -> Arc<ValuePool> {
        self.pool.clone()
    }

    fn now(&self) -> u64 {
        self.timer.timestamp()
    }

    fn next_cas(&self) -> u64 {
        self.cas_id.fetch_add(1, Ordering::Relaxed)
    }

    fn next_access(&self) -> u64 {
        self.access_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Client exptime to stored deadline: zero stays "never", small
    /// values are relative seconds, anything above thirty days is
    /// already an absolute unix timestamp.
    fn normalize_expiration(&self, expiration: u32) -> u32 {
        if expiration == 0 || expiration > REALTIME_MAX_DELTA {
            expiration
        } else {
            (self.now() as u32).saturating_add(expiration)
        }
    }

    fn is_dead(&self, record: &Record) -> bool {
        let now = self.now();
        let oldest_live = self.oldest_live.load(Ordering::Acquire);
        if oldest_live != 0 && record.header.timestamp < oldest_live && oldest_live <= now {
            return true;
        }
        let expiration = record.header.expiration;
        expiration != 0 && (expiration as u64) <= now
    }

    /// Accounting and buffer recovery for a record leaving the store.
    fn discard(&self, record: Record) {
        self.used_bytes
            .fetch_sub(record.value.len() as u64, Ordering::Relaxed);
        self.pool.recycle(record.value);
    }

    fn fits(&self, additional: u64) -> bool {
        self.used_bytes.load(Ordering::Relaxed) + additional <= self.memory_limit
    }

    /// Makes room for `additional` incoming bytes, failing with
    /// OutOfMemory when a full reclaim pass cannot free enough.
    fn make_room(&self, additional: u64, protect: &KeyType) -> Result<()> {
        if self.fits(additional) {
            return Ok(());
        }
        self.reclaim(additional, protect);
        if self.fits(additional) {
            Ok(())
        } else {
            Err(CacheError::OutOfMemory)
        }
    }

    /// Post-commit correction: concurrent writers may each have passed
    /// the pre-commit check, so trim back under the budget.
    fn shrink_to_limit(&self, protect: &KeyType) {
        if !self.fits(0) {
            self.reclaim(0, protect);
        }
    }

    /// One reclaim pass: dead records go first and for free, then live
    /// records in least-recently-used order until `additional` bytes fit.
    /// The record at `protect` is never a victim. Removals re-verify the
    /// stored version so a concurrently mutated record is spared.
    fn reclaim(&self, additional: u64, protect: &KeyType) {
        let mut dead: Vec<(KeyType, u64)> = Vec::new();
        let mut candidates: Vec<(KeyType, u64, u64)> = Vec::new();
        for entry in self.memory.iter() {
            if entry.key() == protect {
                continue;
            }
            let record = entry.value();
            if self.is_dead(record) {
                dead.push((entry.key().clone(), record.header.cas));
            } else {
                candidates.push((
                    entry.key().clone(),
                    record.header.access_seq,
                    record.header.cas,
                ));
            }
        }

        for (key, cas) in dead {
            if let Some((_key, record)) = self
                .memory
                .remove_if(&key, |_key, record| record.header.cas == cas)
            {
                trace!("Reclaimed dead record, {} bytes", record.value.len());
                self.discard(record);
            }
        }
        if self.fits(additional) {
            return;
        }

        candidates.sort_unstable_by_key(|(_key, access_seq, _cas)| *access_seq);
        for (key, _access_seq, cas) in candidates {
            if self.fits(additional) {
                break;
            }
            if let Some((_key, record)) = self
                .memory
                .remove_if(&key, |_key, record| record.header.cas == cas)
            {
                debug!("Evicted record, {} bytes", record.value.len());
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.discard(record);
            }
        }
    }

    fn store_record(&self, key: KeyType, mut record: Record, mode: StoreMode) -> Result<SetStatus> {
        self.cmd_set.fetch_add(1, Ordering::Relaxed);
        let new_len = record.value.len();
        if new_len as u64 > self.item_size_limit as u64 {
            return Err(CacheError::ValueTooLarge);
        }
        // A record that can never fit must fail before eviction runs,
        // otherwise a doomed set would empty the store.
        if new_len as u64 > self.memory_limit {
            return Err(CacheError::OutOfMemory);
        }

        let old_len = self
            .memory
            .get(&key)
            .map(|existing| existing.value.len())
            .unwrap_or(0);
        let additional = (new_len as u64).saturating_sub(old_len as u64);
        self.make_room(additional, &key)?;

        let expected_cas = record.header.cas;
        record.header.expiration = self.normalize_expiration(record.header.expiration);
        record.header.timestamp = self.now();
        record.header.access_seq = self.next_access();

        let protect = key.clone();
        let status = match self.memory.entry(key) {
            Entry::Occupied(mut occupied) => {
                if self.is_dead(occupied.get()) {
                    if let StoreMode::Replace = mode {
                        let (_key, corpse) = occupied.remove_entry();
                        self.discard(corpse);
                        return Err(CacheError::NotFound);
                    }
                    if expected_cas != 0 {
                        let (_key, corpse) = occupied.remove_entry();
                        self.discard(corpse);
                        return Err(CacheError::NotFound);
                    }
                } else {
                    if let StoreMode::Add = mode {
                        return Err(CacheError::KeyExists);
                    }
                    if expected_cas != 0 && occupied.get().header.cas != expected_cas {
                        return Err(CacheError::KeyExists);
                    }
                }
                record.header.cas = self.next_cas();
                let cas = record.header.cas;
                let old = occupied.insert(record);
                self.used_bytes.fetch_add(new_len as u64, Ordering::Relaxed);
                self.discard(old);
                SetStatus { cas }
            }
            Entry::Vacant(vacant) => {
                if let StoreMode::Replace = mode {
                    return Err(CacheError::NotFound);
                }
                if expected_cas != 0 {
                    return Err(CacheError::NotFound);
                }
                record.header.cas = self.next_cas();
                let cas = record.header.cas;
                self.used_bytes.fetch_add(new_len as u64, Ordering::Relaxed);
                vacant.insert(record);
                SetStatus { cas }
            }
        };
        self.shrink_to_limit(&protect);
        Ok(status)
    }

    fn concat(&self, key: KeyType, new_record: Record, append: bool) -> Result<SetStatus> {
        self.cmd_set.fetch_add(1, Ordering::Relaxed);
        let appended_len = new_record.value.len();
        let old_len = self
            .memory
            .get(&key)
            .map(|existing| existing.value.len())
            .unwrap_or(0);
        // A concatenation that can never fit must fail before eviction
        // runs; the appended bytes reserve room the same way a set does.
        if (old_len + appended_len) as u64 > self.memory_limit {
            return Err(CacheError::OutOfMemory);
        }
        self.make_room(appended_len as u64, &key)?;

        let protect = key.clone();
        let status = match self.memory.entry(key) {
            Entry::Occupied(mut occupied) => {
                if self.is_dead(occupied.get()) {
                    let (_key, corpse) = occupied.remove_entry();
                    self.discard(corpse);
                    return Err(CacheError::ItemNotStored);
                }
                let expected_cas = new_record.header.cas;
                if expected_cas != 0 && occupied.get().header.cas != expected_cas {
                    return Err(CacheError::KeyExists);
                }

                let existing = occupied.get();
                let combined_len = existing.value.len() + new_record.value.len();
                if combined_len as u64 > self.item_size_limit as u64 {
                    return Err(CacheError::ValueTooLarge);
                }
                if combined_len as u64 > self.memory_limit {
                    return Err(CacheError::OutOfMemory);
                }
                let mut buffer = self.pool.acquire(combined_len);
                if append {
                    buffer.extend_from_slice(&existing.value);
                    buffer.extend_from_slice(&new_record.value);
                } else {
                    buffer.extend_from_slice(&new_record.value);
                    buffer.extend_from_slice(&existing.value);
                }

                let mut header = existing.header.clone();
                header.cas = self.next_cas();
                header.timestamp = self.now();
                header.access_seq = self.next_access();
                let cas = header.cas;
                let old = occupied.insert(Record {
                    header,
                    value: buffer.freeze(),
                });
                self.used_bytes
                    .fetch_add(combined_len as u64, Ordering::Relaxed);
                self.discard(old);
                SetStatus { cas }
            }
            Entry::Vacant(_vacant) => return Err(CacheError::ItemNotStored),
        };
        self.shrink_to_limit(&protect);
        Ok(status)
    }

    fn get_live(&self, key: &KeyType) -> Option<Record> {
        match self.memory.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if self.is_dead(occupied.get()) {
                    let (_key, corpse) = occupied.remove_entry();
                    self.discard(corpse);
                    None
                } else {
                    occupied.get_mut().header.access_seq = self.next_access();
                    Some(occupied.get().clone())
                }
            }
            Entry::Vacant(_vacant) => None,
        }
    }

    /// Counter record for a miss: created with the caller's initial
    /// value, unless the sentinel expiration forbids creation.
    fn initial_delta_record(&self, header: &CacheMetaData, delta: &DeltaParam) -> Result<Record> {
        if header.expiration == DELTA_NO_INITIAL_VALUE {
            return Err(CacheError::NotFound);
        }
        let mut record = Record::new(
            Bytes::from(delta.value.to_string()),
            0,
            0,
            self.normalize_expiration(header.expiration),
        );
        record.header.cas = self.next_cas();
        record.header.timestamp = self.now();
        record.header.access_seq = self.next_access();
        Ok(record)
    }
}

impl impl_details::CacheImplDetails for BoundedMemoryStore {}

impl Cache for BoundedMemoryStore {
    fn get(&self, key: &KeyType) -> Result<Record> {
        self.cmd_get.fetch_add(1, Ordering::Relaxed);
        match self.get_live(key) {
            Some(record) => {
                self.get_hits.fetch_add(1, Ordering::Relaxed);
                Ok(record)
            }
            None => {
                self.get_misses.fetch_add(1, Ordering::Relaxed);
                Err(CacheError::NotFound)
            }
        }
    }

    fn set(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store_record(key, record, StoreMode::Set)
    }

    fn add(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store_record(key, record, StoreMode::Add)
    }

    fn replace(&self, key: KeyType, record: Record) -> Result<SetStatus> {
        self.store_record(key, record, StoreMode::Replace)
    }

    fn append(&self, key: KeyType, new_record: Record) -> Result<SetStatus> {
        self.concat(key, new_record, true)
    }

    fn prepend(&self, key: KeyType, new_record: Record) -> Result<SetStatus> {
        self.concat(key, new_record, false)
    }

    fn incr_decr(
        &self,
        header: CacheMetaData,
        key: KeyType,
        delta: DeltaParam,
        increment: bool,
    ) -> Result<DeltaResult> {
        // Predict how many bytes the ASCII result adds over the stored
        // value and reserve them before committing, so a widening
        // counter evicts or fails like any other write. The snapshot may
        // race with another writer; shrink_to_limit mops that up.
        let additional = match self.memory.get(&key) {
            Some(existing) if !self.is_dead(&existing) => self
                .incr_decr_common(&existing, &delta, increment)
                .map(|value| value.to_string().len().saturating_sub(existing.value.len()))
                .unwrap_or(0),
            _ => {
                if header.expiration == DELTA_NO_INITIAL_VALUE {
                    0
                } else {
                    delta.value.to_string().len()
                }
            }
        };
        self.make_room(additional as u64, &key)?;

        let protect = key.clone();
        let result = match self.memory.entry(key) {
            Entry::Occupied(mut occupied) => {
                if self.is_dead(occupied.get()) {
                    let record = self.initial_delta_record(&header, &delta)?;
                    let cas = record.header.cas;
                    self.used_bytes
                        .fetch_add(record.value.len() as u64, Ordering::Relaxed);
                    let corpse = occupied.insert(record);
                    self.discard(corpse);
                    DeltaResult {
                        cas,
                        value: delta.value,
                    }
                } else {
                    let value = self.incr_decr_common(occupied.get(), &delta, increment)?;
                    let text = value.to_string();
                    let new_len = text.len();
                    let old_len = occupied.get().value.len();

                    let record = occupied.get_mut();
                    record.value = Bytes::from(text);
                    record.header.cas = self.next_cas();
                    record.header.timestamp = self.now();
                    record.header.access_seq = self.next_access();
                    let cas = record.header.cas;
                    self.used_bytes.fetch_add(new_len as u64, Ordering::Relaxed);
                    self.used_bytes.fetch_sub(old_len as u64, Ordering::Relaxed);
                    DeltaResult { cas, value }
                }
            }
            Entry::Vacant(vacant) => {
                let record = self.initial_delta_record(&header, &delta)?;
                let cas = record.header.cas;
                self.used_bytes
                    .fetch_add(record.value.len() as u64, Ordering::Relaxed);
                vacant.insert(record);
                DeltaResult {
                    cas,
                    value: delta.value,
                }
            }
        };
        self.shrink_to_limit(&protect);
        Ok(result)
    }

    fn delete(&self, key: KeyType, header: CacheMetaData) -> Result<Record> {
        match self.memory.entry(key) {
            Entry::Occupied(occupied) => {
                if self.is_dead(occupied.get()) {
                    let (_key, corpse) = occupied.remove_entry();
                    self.discard(corpse);
                    return Err(CacheError::NotFound);
                }
                if header.cas != 0 && occupied.get().header.cas != header.cas {
                    return Err(CacheError::KeyExists);
                }
                let (_key, record) = occupied.remove_entry();
                self.used_bytes
                    .fetch_sub(record.value.len() as u64, Ordering::Relaxed);
                Ok(record)
            }
            Entry::Vacant(_vacant) => Err(CacheError::NotFound),
        }
    }

    fn touch(&self, key: KeyType, expiration: u32) -> Result<SetStatus> {
        match self.memory.entry(key) {
            Entry::Occupied(mut occupied) => {
                if self.is_dead(occupied.get()) {
                    let (_key, corpse) = occupied.remove_entry();
                    self.discard(corpse);
                    return Err(CacheError::NotFound);
                }
                let record = occupied.get_mut();
                record.header.expiration = self.normalize_expiration(expiration);
                record.header.cas = self.next_cas();
                record.header.access_seq = self.next_access();
                Ok(SetStatus {
                    cas: record.header.cas,
                })
            }
            Entry::Vacant(_vacant) => Err(CacheError::NotFound),
        }
    }

    fn flush(&self, header: CacheMetaData) {
        if header.expiration == 0 {
            debug!("Flushing store immediately");
            self.memory.clear();
            self.used_bytes.store(0, Ordering::Relaxed);
        } else {
            let deadline = self.now() + header.expiration as u64;
            debug!("Flush scheduled at {}", deadline);
            self.oldest_live.store(deadline, Ordering::Release);
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            curr_items: self.memory.len() as u64,
            bytes: self.used_bytes.load(Ordering::Relaxed),
            cmd_get: self.cmd_get.load(Ordering::Relaxed),
            cmd_set: self.cmd_set.load(Ordering::Relaxed),
            get_hits: self.get_hits.load(Ordering::Relaxed),
            get_misses: self.get_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn len(&self) -> usize {
        self.memory.len()
    }

    fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
