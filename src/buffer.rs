//! Pooled response buffers.
//!
//! SOAP replies cluster in the 4-32 KB range, so the daemon keeps a small
//! fixed set of preallocated buffers and hands them out for the lifetime of
//! one response. Exhaustion is a miss, not an error: callers fall back to a
//! plain heap allocation and the pool statistics record the event.
//!
//! A lease is represented by [`PooledBuffer`], which returns itself to the
//! pool when dropped. `into_owned()` detaches the storage for responses that
//! must outlive the lease; the pool replenishes the slot so capacity stays
//! constant.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Number of buffers held by the pool.
pub const BUFFER_POOL_SIZE: usize = 8;

/// Capacity of each pooled buffer in bytes.
pub const BUFFER_CAPACITY: usize = 16 * 1024;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful leases.
    pub hits: u64,
    /// Lease attempts that fell back to dynamic allocation.
    pub misses: u64,
    /// Buffers currently leased out.
    pub current_used: usize,
    /// High-water mark of concurrently leased buffers.
    pub peak_used: usize,
    /// `current_used` as a percentage of the pool size.
    pub utilization_percent: u32,
}

struct PoolShared {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_capacity: usize,
    pool_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    current_used: AtomicUsize,
    peak_used: AtomicUsize,
}

impl PoolShared {
    fn release(&self, mut data: Vec<u8>) {
        data.clear();
        self.free.lock().push(data);
        self.current_used.fetch_sub(1, Ordering::SeqCst);
    }

    fn replenish(&self) {
        self.free.lock().push(Vec::with_capacity(self.buffer_capacity));
        self.current_used.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-capacity pool of recyclable response buffers.
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool with the default size and per-buffer capacity.
    pub fn new() -> Self {
        Self::with_sizes(BUFFER_POOL_SIZE, BUFFER_CAPACITY)
    }

    /// Create a pool with explicit dimensions (primarily for tests).
    pub fn with_sizes(pool_size: usize, buffer_capacity: usize) -> Self {
        let free = (0..pool_size)
            .map(|_| Vec::with_capacity(buffer_capacity))
            .collect();

        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(free),
                buffer_capacity,
                pool_size,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                current_used: AtomicUsize::new(0),
                peak_used: AtomicUsize::new(0),
            }),
        }
    }

    /// Capacity of each buffer in this pool.
    pub fn buffer_capacity(&self) -> usize {
        self.shared.buffer_capacity
    }

    /// Lease a buffer able to hold `size_hint` bytes.
    ///
    /// Returns `None` (a recorded miss) when the hint exceeds the buffer
    /// capacity or no buffer is free. Never blocks.
    pub fn lease(&self, size_hint: usize) -> Option<PooledBuffer> {
        if size_hint > self.shared.buffer_capacity {
            self.shared.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let data = self.shared.free.lock().pop();
        match data {
            Some(data) => {
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                let used = self.shared.current_used.fetch_add(1, Ordering::SeqCst) + 1;
                self.shared.peak_used.fetch_max(used, Ordering::SeqCst);
                Some(PooledBuffer {
                    data: Some(data),
                    shared: Arc::clone(&self.shared),
                })
            }
            None => {
                self.shared.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Snapshot the pool counters.
    pub fn stats(&self) -> PoolStats {
        let current_used = self.shared.current_used.load(Ordering::SeqCst);
        PoolStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            current_used,
            peak_used: self.shared.peak_used.load(Ordering::SeqCst),
            utilization_percent: (current_used * 100 / self.shared.pool_size.max(1)) as u32,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased pool buffer. Returns to the pool on drop.
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    shared: Arc<PoolShared>,
}

impl PooledBuffer {
    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes to the buffer.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if let Some(data) = self.data.as_mut() {
            data.extend_from_slice(bytes);
        }
    }

    /// Borrow the written bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Detach the storage from the pool.
    ///
    /// The pool replenishes the slot with a fresh buffer, so the capacity
    /// invariant holds even after the escape hatch is used.
    pub fn into_owned(mut self) -> Vec<u8> {
        let data = self.data.take().unwrap_or_default();
        self.shared.replenish();
        data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.shared.release(data);
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}
