use bytes::{Bytes, BytesMut};
use std::sync::Mutex;

const DEFAULT_MAX_POOLED: usize = 64;
// Buffers above this size are dropped instead of pooled, so one burst of
// large values cannot pin memory forever.
const MAX_POOLED_CAPACITY: usize = 1024 * 1024;

/// Process wide pool of reusable value buffers.
///
/// Set paths stage incoming bodies in pooled buffers and destroyed
/// records hand their allocation back through [`ValuePool::recycle`].
/// The pool is advisory: a miss allocates and a poisoned lock degrades
/// to plain allocation, correctness never depends on the hit rate.
pub struct ValuePool {
    buffers: Mutex<Vec<BytesMut>>,
    max_pooled: usize,
}

impl Default for ValuePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOLED)
    }
}

impl ValuePool {
    pub fn new(max_pooled: usize) -> ValuePool {
        ValuePool {
            buffers: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
        }
    }

    /// Returns an empty buffer with at least `min_capacity` bytes of
    /// capacity, reusing a pooled allocation when one fits.
    pub fn acquire(&self, min_capacity: usize) -> BytesMut {
        if let Ok(mut buffers) = self.buffers.lock() {
            if let Some(position) = buffers
                .iter()
                .rposition(|buffer| buffer.capacity() >= min_capacity)
            {
                let mut buffer = buffers.swap_remove(position);
                buffer.clear();
                return buffer;
            }
            if let Some(mut buffer) = buffers.pop() {
                buffer.clear();
                buffer.reserve(min_capacity);
                return buffer;
            }
        }
        BytesMut::with_capacity(min_capacity)
    }

    /// Hands a buffer back to the pool.
    pub fn release(&self, buffer: BytesMut) {
        if buffer.capacity() == 0 || buffer.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        if let Ok(mut buffers) = self.buffers.lock() {
            if buffers.len() < self.max_pooled {
                buffers.push(buffer);
            }
        }
    }

    /// Recovers the allocation behind a destroyed record's value. Only a
    /// uniquely owned value can be reclaimed; shared ones are dropped.
    pub fn recycle(&self, value: Bytes) {
        if let Ok(buffer) = value.try_into_mut() {
            self.release(buffer);
        }
    }

    #[cfg(test)]
    fn pooled(&self) -> usize {
        self.buffers.lock().map(|buffers| buffers.len()).unwrap_or(0)
    }
}
