//! Sliding-window prefetch scheduler.
//!
//! The scheduler keeps at most `W = min(prefetch_width, chunk_count)` chunk
//! downloads in flight. Position `i` always lives in slot `i % W`; when the
//! consumer takes position `i`, position `i + W` is launched into the same
//! slot. Chunks are therefore delivered strictly in index order no matter
//! which download finishes first.

use crate::config::PrefetchConfig;
use crate::pipeline::{ChunkPipeline, PipelineContext, download_chunk};
use crate::stats::{PrefetchStats, PrefetchStatsSnapshot};
use futures::Stream;
use rf_arena::ChunkStore;
use rf_error::{Result, RfError};
use rf_traits::CancellationToken;
use rf_types::ChunkDescriptor;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, trace};

/// Ordered, bounded-concurrency producer of materialized chunks.
///
/// Dropping the scheduler cancels and aborts every outstanding download;
/// their partially built stores release their buffers as they drop.
pub struct PrefetchScheduler {
    descriptors: Vec<ChunkDescriptor>,
    window: usize,
    slots: Vec<Option<JoinHandle<Result<ChunkStore>>>>,
    cursor: usize,
    runtime: Handle,
    ctx: PipelineContext,
}

impl PrefetchScheduler {
    /// Create a scheduler and launch the initial window of downloads.
    ///
    /// Must be called from within a Tokio runtime; downloads are spawned on
    /// the current runtime.
    pub fn new(
        descriptors: Vec<ChunkDescriptor>,
        config: &PrefetchConfig,
        pipeline: ChunkPipeline,
    ) -> Result<Self> {
        config.validate().map_err(RfError::Config)?;
        let runtime = Handle::try_current()
            .map_err(|e| {
                RfError::Config(format!("prefetch scheduler needs a Tokio runtime: {}", e))
            })?;

        let window = config.window_for(descriptors.len());
        let mut scheduler = Self {
            window,
            slots: (0..window).map(|_| None).collect(),
            cursor: 0,
            runtime,
            ctx: PipelineContext {
                pipeline,
                arena: config.arena.clone(),
                cancel: CancellationToken::new(),
                stats: Arc::new(PrefetchStats::new()),
            },
            descriptors,
        };

        for position in 0..window {
            let handle = scheduler.launch(position);
            scheduler.slots[position] = Some(handle);
        }

        info!(
            chunks = scheduler.descriptors.len(),
            window,
            prefetch_width = config.prefetch_width,
            "Prefetch scheduler started"
        );

        Ok(scheduler)
    }

    /// Wait for the next chunk in index order.
    ///
    /// Returns `Ok(None)` once every position has been returned. A failed
    /// position surfaces its error here; later positions are unaffected and
    /// the next call moves on to them. Call [`cancel`](Self::cancel) or drop
    /// the scheduler to stop early.
    pub async fn next_chunk(&mut self) -> Result<Option<ChunkStore>> {
        let position = self.cursor;
        if position >= self.descriptors.len() {
            return Ok(None);
        }

        let slot = position % self.window;
        let handle = self.slots[slot].as_mut().ok_or_else(|| {
            RfError::Other(anyhow::anyhow!(
                "no download in slot {} for chunk {}",
                slot,
                position
            ))
        })?;

        // Awaited in place: if this future is dropped, the handle stays in
        // its slot and the next call resumes waiting on it.
        trace!(chunk = position, slot, "Waiting for chunk");
        let result = handle
            .await
            .unwrap_or_else(|e| Err(join_failure(position, e)));
        self.slots[slot] = None;

        let next = position + self.window;
        if next < self.descriptors.len() {
            let handle = self.launch(next);
            self.slots[slot] = Some(handle);
        }
        self.cursor += 1;

        match result {
            Ok(store) => {
                self.ctx.stats.record_delivered();
                trace!(chunk = position, "Chunk delivered");
                Ok(Some(store))
            }
            Err(e) => {
                self.ctx.stats.record_failed();
                debug!(chunk = position, error = %e, "Chunk failed");
                Err(e)
            }
        }
    }

    /// Signal every outstanding and future download to stop.
    ///
    /// Positions not yet returned resolve to [`RfError::Cancelled`].
    pub fn cancel(&self) {
        if !self.ctx.cancel.is_cancelled() {
            info!(position = self.cursor, "Prefetch scheduler cancelled");
            self.ctx.cancel.cancel();
        }
    }

    /// Token that cancels this scheduler's downloads.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Effective window, `min(prefetch_width, chunk_count)`.
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn chunk_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Index of the next chunk [`next_chunk`](Self::next_chunk) returns.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Positions not yet returned.
    pub fn remaining(&self) -> usize {
        self.descriptors.len() - self.cursor
    }

    pub fn stats(&self) -> PrefetchStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Adapt the scheduler into a stream of chunks in index order.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChunkStore>> + Send {
        futures::stream::unfold(self, |mut scheduler| async move {
            match scheduler.next_chunk().await {
                Ok(Some(store)) => Some((Ok(store), scheduler)),
                Ok(None) => None,
                Err(e) => Some((Err(e), scheduler)),
            }
        })
    }

    fn launch(&self, position: usize) -> JoinHandle<Result<ChunkStore>> {
        let descriptor = self.descriptors[position].clone();
        self.ctx.stats.record_launch();
        debug!(
            chunk = position,
            slot = position % self.window,
            rows = descriptor.row_count,
            cols = descriptor.col_count,
            "Launching chunk download"
        );
        self.runtime.spawn(download_chunk(self.ctx.clone(), descriptor))
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.ctx.cancel.cancel();
        for handle in self.slots.iter_mut().filter_map(Option::take) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("chunks", &self.descriptors.len())
            .field("window", &self.window)
            .field("cursor", &self.cursor)
            .field("cancelled", &self.ctx.cancel.is_cancelled())
            .finish()
    }
}

fn join_failure(position: usize, e: JoinError) -> RfError {
    if e.is_cancelled() {
        RfError::Cancelled
    } else {
        RfError::Other(anyhow::anyhow!("download task for chunk {} failed: {}", position, e))
    }
}
