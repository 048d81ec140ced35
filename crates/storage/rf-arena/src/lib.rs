//! Pooled block arena and chunk store for resultflow.
//!
//! A result chunk holds up to millions of small text cells. Rather than
//! allocating a `String` per cell, every cell payload of a chunk is copied
//! into large fixed-size byte blocks, and a side index of `(offset, length)`
//! entries maps each linear cell index back to its bytes.
//!
//! # Components
//!
//! - [`BufferPool`] / [`SharedPool`]: rent/return pool shared by all chunks
//! - [`BlockArena`]: append-only cell storage over pooled blocks
//! - [`ChunkStore`]: a block arena bound to chunk identity and row/column addressing
//!
//! # Memory lifecycle
//!
//! Blocks are rented when a chunk store is created and go back to the pool
//! exactly once: on [`ChunkStore::release`], or when the store is dropped
//! without an explicit release. Release is guarded by a compare-and-swap, so
//! concurrent or repeated calls are harmless.
//!
//! # Usage
//!
//! ```ignore
//! use rf_arena::{ArenaConfig, ArenaPools, ChunkStore};
//!
//! let config = ArenaConfig::default();
//! let pools = ArenaPools::shared(&config);
//! let mut store = ChunkStore::new(descriptor, pools, &config)?;
//!
//! store.set_cell(0, 0, Some(b"hello"))?;
//! store.set_cell(0, 1, None)?;
//!
//! assert_eq!(store.get_cell(0, 0)?.as_deref(), Some("hello"));
//! store.release();
//! ```

mod arena;
mod config;
mod pool;
mod store;

#[cfg(test)]
mod test_util;

pub use arena::{BlockArena, CellEntry};
pub use config::{
    ArenaConfig, BLOCK_SIZE, DEFAULT_MAX_RETAINED_BYTES, DEFAULT_MAX_RETAINED_PER_SIZE,
    DEFAULT_POOLING_THRESHOLD, INDEX_BLOCK_LEN, NULL_SENTINEL, OverflowPolicy,
};
pub use pool::{ArenaPools, BufferPool, PoolStats, SharedPool};
pub use store::ChunkStore;
