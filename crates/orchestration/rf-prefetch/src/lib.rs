//! Bounded-concurrency, order-preserving chunk prefetch.
//!
//! [`PrefetchScheduler`] downloads and materializes result chunks ahead of
//! the consumer, keeping at most `prefetch_width` downloads in flight and
//! handing back [`rf_arena::ChunkStore`]s strictly in chunk-index order.
//!
//! ```ignore
//! let pipeline = ChunkPipeline::new(fetcher, parser, ArenaPools::shared(&config.arena))
//!     .with_headers(manifest.headers.clone());
//! let mut scheduler = PrefetchScheduler::new(manifest.chunks, &config, pipeline)?;
//!
//! while let Some(chunk) = scheduler.next_chunk().await? {
//!     // read rows ...
//!     chunk.release();
//! }
//! ```

mod config;
mod pipeline;
mod scheduler;
mod stats;

pub use config::{DEFAULT_PREFETCH_WIDTH, PrefetchConfig};
pub use pipeline::ChunkPipeline;
pub use scheduler::PrefetchScheduler;
pub use stats::{PrefetchStats, PrefetchStatsSnapshot};
