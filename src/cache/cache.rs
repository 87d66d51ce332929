use super::error::{CacheError, Result};
use bytes::Bytes;

/// Cache key type
pub type KeyType = Bytes;

/// Cache value associated with a key
pub type ValueType = Bytes;

/// Relative expirations larger than this are absolute unix timestamps.
pub const REALTIME_MAX_DELTA: u32 = 60 * 60 * 24 * 30;

/// Expiration sentinel for increment/decrement: do not create a missing
/// counter, report a miss instead.
pub const DELTA_NO_INITIAL_VALUE: u32 = 0xffff_ffff;

#[derive(Clone)]
pub struct DeltaParam {
    pub(crate) delta: u64,
    pub(crate) value: u64,
}

pub type IncrementParam = DeltaParam;
pub type DecrementParam = IncrementParam;

pub type DeltaResultValueType = u64;

#[derive(Debug)]
pub struct DeltaResult {
    pub cas: u64,
    pub value: DeltaResultValueType,
}

/// Meta data stored with cache value
#[derive(Clone, Debug)]
pub struct CacheMetaData {
    pub(crate) cas: u64,
    pub(crate) flags: u32,
    /// Absolute unix-seconds deadline once stored; raw client exptime on
    /// the way in. Zero never expires.
    pub(crate) expiration: u32,
    /// Unix seconds of the last mutation, compared against the flush
    /// deadline.
    pub(crate) timestamp: u64,
    /// Store-global recency sequence, the eviction signal.
    pub(crate) access_seq: u64,
}

impl CacheMetaData {
    pub fn new(cas: u64, flags: u32, expiration: u32) -> CacheMetaData {
        CacheMetaData {
            cas,
            flags,
            expiration,
            timestamp: 0,
            access_seq: 0,
        }
    }

    pub fn get_expiration(&self) -> u32 {
        self.expiration
    }
}

/// Value and meta data stored in cache
#[derive(Clone, Debug)]
pub struct Record {
    pub(crate) header: CacheMetaData,
    pub(crate) value: ValueType,
}

impl Record {
    pub fn new(value: ValueType, cas: u64, flags: u32, expiration: u32) -> Record {
        let header = CacheMetaData::new(cas, flags, expiration);
        Record { header, value }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// Result of a successful store operation, carrying the assigned version.
#[derive(Debug)]
pub struct SetStatus {
    pub cas: u64,
}

/// Counter snapshot reported by the `stats` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreStats {
    pub curr_items: u64,
    pub bytes: u64,
    pub cmd_get: u64,
    pub cmd_set: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    pub evictions: u64,
}

// Not a part of the Cache public API
pub mod impl_details {
    use super::*;
    use std::str;

    pub trait CacheImplDetails {
        /// Shared arithmetic for increment/decrement. Parses the record's
        /// value as an ASCII u64; increment saturates at u64::MAX,
        /// decrement clamps at zero.
        fn incr_decr_common(
            &self,
            record: &Record,
            delta: &DeltaParam,
            increment: bool,
        ) -> Result<u64> {
            let value = str::from_utf8(&record.value)
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or(CacheError::ArithOnNonNumeric)?;
            if increment {
                Ok(value.saturating_add(delta.delta))
            } else {
                Ok(value.saturating_sub(delta.delta))
            }
        }
    }
}

/// An abstraction over a bounded key <=> value store.
///
/// All operations are safe to call concurrently; a single client command
/// maps to a single trait call and is observed atomically per key.
pub trait Cache: impl_details::CacheImplDetails {
    /// Returns the value associated with a key. An expired or flushed
    /// record is removed in the same critical section and reported as a
    /// miss. A hit refreshes the record's recency signal.
    fn get(&self, key: &KeyType) -> Result<Record>;

    /// Inserts or replaces a value.
    ///
    /// If `record.header.cas` is non-zero the stored version is compared
    /// first: a mismatch fails with KeyExists, a missing key with
    /// NotFound. The operation assigns a fresh version, enforces the
    /// per-item size cap and runs eviction when the byte budget would be
    /// exceeded; an exhausted eviction pass fails with OutOfMemory and
    /// leaves the store untouched.
    fn set(&self, key: KeyType, record: Record) -> Result<SetStatus>;

    /// As `set`, but fails with KeyExists when a live record is present.
    fn add(&self, key: KeyType, record: Record) -> Result<SetStatus>;

    /// As `set`, but fails with NotFound when no live record is present.
    fn replace(&self, key: KeyType, record: Record) -> Result<SetStatus>;

    /// Appends the new value to the existing value of a live record.
    /// Fails with ItemNotStored when the key is absent.
    fn append(&self, key: KeyType, new_record: Record) -> Result<SetStatus>;

    /// Prepends the new value to the existing value of a live record.
    /// Fails with ItemNotStored when the key is absent.
    fn prepend(&self, key: KeyType, new_record: Record) -> Result<SetStatus>;

    /// Increments or decrements an ASCII-decimal counter value.
    ///
    /// On a miss the record is created with `delta.value` unless
    /// `header.expiration` is `DELTA_NO_INITIAL_VALUE`, which reports
    /// NotFound instead. A non-numeric stored value fails with
    /// ArithOnNonNumeric.
    fn incr_decr(
        &self,
        header: CacheMetaData,
        key: KeyType,
        delta: DeltaParam,
        increment: bool,
    ) -> Result<DeltaResult>;

    /// Removes the value associated with a key and returns it. A non-zero
    /// `header.cas` must match the stored version, otherwise KeyExists.
    fn delete(&self, key: KeyType, header: CacheMetaData) -> Result<Record>;

    /// Updates the expiration of a live record without changing its
    /// value; bumps the version.
    fn touch(&self, key: KeyType, expiration: u32) -> Result<SetStatus>;

    /// Removes all values.
    ///
    /// - `header.expiration == 0`: immediate removal,
    /// - `header.expiration == d`: records written before the deadline
    ///   `now + d` become unreadable once the deadline passes.
    fn flush(&self, header: CacheMetaData);

    /// Counter snapshot for the `stats` command.
    fn stats(&self) -> StoreStats;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool;
}
