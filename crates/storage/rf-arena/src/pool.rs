//! Buffer pooling shared across chunk stores.

use crate::arena::CellEntry;
use crate::config::{ArenaConfig, DEFAULT_MAX_RETAINED_BYTES};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Rent/return capability for reusable buffers.
///
/// Implementations must be safe to call from many download pipelines at once.
pub trait BufferPool<T>: Send + Sync {
    /// Rents a buffer of exactly `len` elements. Contents are unspecified.
    fn rent(&self, len: usize) -> Vec<T>;

    /// Returns a buffer previously handed out by [`BufferPool::rent`].
    fn give_back(&self, buffer: Vec<T>);
}

/// Counters describing pool traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Rent requests served at or above the pooling threshold
    pub rented: u64,

    /// Buffers handed back at or above the pooling threshold
    pub returned: u64,

    /// Requests below the threshold, served by plain allocation
    pub bypassed: u64,

    /// Returned buffers freed because a bucket or the byte budget was full
    pub discarded: u64,

    /// Buffers currently held in free lists
    pub retained: usize,

    /// Bytes currently held in free lists
    pub retained_bytes: usize,
}

/// Free lists keyed by exact buffer length.
struct FreeLists<T> {
    buckets: HashMap<usize, Vec<Vec<T>>>,
    retained: usize,
    retained_bytes: usize,
}

/// Thread-safe pool with free lists bucketed by exact buffer length.
///
/// Arenas ask for a handful of distinct lengths: the block size, the index
/// block size and power-of-two scratch sizes for split reads. Retention is
/// capped per bucket and by a total byte budget, so the pool stays bounded
/// however many lengths it has seen.
pub struct SharedPool<T> {
    threshold: usize,
    max_retained: usize,
    max_retained_bytes: usize,
    free: Mutex<FreeLists<T>>,
    rented: AtomicU64,
    returned: AtomicU64,
    bypassed: AtomicU64,
    discarded: AtomicU64,
}

impl<T> SharedPool<T> {
    /// Create a pool that bypasses requests shorter than `threshold` and keeps
    /// at most `max_retained` free buffers per length, within
    /// [`DEFAULT_MAX_RETAINED_BYTES`] overall.
    pub fn new(threshold: usize, max_retained: usize) -> Self {
        Self {
            threshold,
            max_retained,
            max_retained_bytes: DEFAULT_MAX_RETAINED_BYTES,
            free: Mutex::new(FreeLists {
                buckets: HashMap::new(),
                retained: 0,
                retained_bytes: 0,
            }),
            rented: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Set the byte budget shared by all free lists.
    pub fn with_max_retained_bytes(mut self, bytes: usize) -> Self {
        self.max_retained_bytes = bytes;
        self
    }

    /// Create a pool from arena configuration.
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self::new(config.pooling_threshold, config.max_retained_per_size)
            .with_max_retained_bytes(config.max_retained_bytes)
    }

    /// Snapshot of pool counters.
    pub fn stats(&self) -> PoolStats {
        let (retained, retained_bytes) = {
            let free = self.free.lock();
            (free.retained, free.retained_bytes)
        };
        PoolStats {
            rented: self.rented.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            retained,
            retained_bytes,
        }
    }

    /// Drop every retained buffer.
    pub fn clear(&self) {
        let mut free = self.free.lock();
        free.buckets.clear();
        free.retained = 0;
        free.retained_bytes = 0;
    }

    fn byte_len(len: usize) -> usize {
        len.saturating_mul(std::mem::size_of::<T>())
    }
}

impl<T> BufferPool<T> for SharedPool<T>
where
    T: Clone + Default + Send,
{
    fn rent(&self, len: usize) -> Vec<T> {
        if len < self.threshold {
            self.bypassed.fetch_add(1, Ordering::Relaxed);
            return vec![T::default(); len];
        }

        self.rented.fetch_add(1, Ordering::Relaxed);
        let reused = {
            let mut free = self.free.lock();
            let reused = match free.buckets.get_mut(&len) {
                Some(bucket) => {
                    let buffer = bucket.pop();
                    if bucket.is_empty() {
                        free.buckets.remove(&len);
                    }
                    buffer
                }
                None => None,
            };
            if reused.is_some() {
                free.retained -= 1;
                free.retained_bytes -= Self::byte_len(len);
            }
            reused
        };
        reused.unwrap_or_else(|| vec![T::default(); len])
    }

    fn give_back(&self, buffer: Vec<T>) {
        let len = buffer.len();
        if len < self.threshold {
            return;
        }

        self.returned.fetch_add(1, Ordering::Relaxed);
        let bytes = Self::byte_len(len);
        let mut free = self.free.lock();
        if self.max_retained == 0
            || free.retained_bytes.saturating_add(bytes) > self.max_retained_bytes
        {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let bucket = free.buckets.entry(len).or_default();
        if bucket.len() >= self.max_retained {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        bucket.push(buffer);
        free.retained += 1;
        free.retained_bytes += bytes;
    }
}

/// The pair of pools an arena rents from: one for payload bytes, one for
/// index entries.
#[derive(Clone)]
pub struct ArenaPools {
    /// Pool for data blocks and split-read scratch buffers
    pub bytes: Arc<dyn BufferPool<u8>>,

    /// Pool for index blocks
    pub index: Arc<dyn BufferPool<CellEntry>>,
}

impl ArenaPools {
    /// Bundle two pools.
    pub fn new(bytes: Arc<dyn BufferPool<u8>>, index: Arc<dyn BufferPool<CellEntry>>) -> Self {
        Self { bytes, index }
    }

    /// Create a fresh pair of [`SharedPool`]s from configuration.
    pub fn shared(config: &ArenaConfig) -> Self {
        Self {
            bytes: Arc::new(SharedPool::<u8>::from_config(config)),
            index: Arc::new(SharedPool::<CellEntry>::from_config(config)),
        }
    }
}

impl std::fmt::Debug for ArenaPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaPools").finish_non_exhaustive()
    }
}
