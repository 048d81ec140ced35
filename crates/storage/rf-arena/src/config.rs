//! Arena configuration.

use serde::{Deserialize, Serialize};

/// Capacity of one data block in bytes (1 MiB).
pub const BLOCK_SIZE: usize = 1 << 20;

/// Number of `(offset, length)` entries per index block.
pub const INDEX_BLOCK_LEN: usize = 1 << 15;

/// Length value marking a null cell.
pub const NULL_SENTINEL: i32 = -100;

/// Buffers shorter than this many elements bypass the pool.
///
/// Below roughly a thousand elements the bookkeeping of renting costs more
/// than a fresh allocation.
pub const DEFAULT_POOLING_THRESHOLD: usize = 1000;

/// Free buffers kept per size bucket before extra returns are dropped.
pub const DEFAULT_MAX_RETAINED_PER_SIZE: usize = 64;

/// Upper bound on the bytes a pool keeps in its free lists (256 MiB).
pub const DEFAULT_MAX_RETAINED_BYTES: usize = 256 << 20;

/// What to do when a chunk's payload outgrows its size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the write with `ArenaError::Overflow`.
    #[default]
    Fail,

    /// Rent additional blocks on demand.
    Grow,
}

/// Configuration for block arenas and their pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Behavior when the payload exceeds the preallocated blocks (default: fail).
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,

    /// Minimum buffer length served from the pool (default: 1000).
    #[serde(default = "default_pooling_threshold")]
    pub pooling_threshold: usize,

    /// Maximum free buffers retained per size (default: 64).
    #[serde(default = "default_max_retained_per_size")]
    pub max_retained_per_size: usize,

    /// Maximum bytes held across all free lists of one pool (default: 256 MiB).
    #[serde(default = "default_max_retained_bytes")]
    pub max_retained_bytes: usize,

    /// Data block capacity in bytes; must be a power of two (default: 1 MiB).
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Index block capacity in entries; must be a power of two (default: 32768).
    #[serde(default = "default_index_block_len")]
    pub index_block_len: usize,
}

fn default_pooling_threshold() -> usize {
    DEFAULT_POOLING_THRESHOLD
}

fn default_max_retained_per_size() -> usize {
    DEFAULT_MAX_RETAINED_PER_SIZE
}

fn default_max_retained_bytes() -> usize {
    DEFAULT_MAX_RETAINED_BYTES
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

fn default_index_block_len() -> usize {
    INDEX_BLOCK_LEN
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            overflow_policy: OverflowPolicy::default(),
            pooling_threshold: default_pooling_threshold(),
            max_retained_per_size: default_max_retained_per_size(),
            max_retained_bytes: default_max_retained_bytes(),
            block_size: default_block_size(),
            index_block_len: default_index_block_len(),
        }
    }
}

impl ArenaConfig {
    /// Create a new arena configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overflow policy.
    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the pooling threshold.
    pub fn with_pooling_threshold(mut self, threshold: usize) -> Self {
        self.pooling_threshold = threshold;
        self
    }

    /// Set how many free buffers are retained per size.
    pub fn with_max_retained_per_size(mut self, max: usize) -> Self {
        self.max_retained_per_size = max;
        self
    }

    /// Set the byte budget of each pool's free lists.
    pub fn with_max_retained_bytes(mut self, bytes: usize) -> Self {
        self.max_retained_bytes = bytes;
        self
    }

    /// Set block and index block sizes.
    pub fn with_block_layout(mut self, block_size: usize, index_block_len: usize) -> Self {
        self.block_size = block_size;
        self.index_block_len = index_block_len;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.block_size.is_power_of_two() {
            return Err(format!(
                "block_size must be a power of two, got {}",
                self.block_size
            ));
        }
        if !self.index_block_len.is_power_of_two() {
            return Err(format!(
                "index_block_len must be a power of two, got {}",
                self.index_block_len
            ));
        }
        if self.block_size as u64 > u64::from(u32::MAX) + 1 {
            return Err("block_size must fit 32-bit offsets".to_string());
        }
        Ok(())
    }
}
