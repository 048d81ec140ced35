//! Per-chunk download pipeline: fetch, parse, materialize.

use crate::stats::PrefetchStats;
use rf_arena::{ArenaConfig, ArenaPools, ChunkStore};
use rf_error::{ParseError, Result, RfError};
use rf_traits::{CancellationToken, ChunkFetcher, ChunkParser};
use rf_types::{ChunkDescriptor, ChunkHeaders};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// The collaborators every chunk download needs.
///
/// Cloning is cheap; every launched pipeline owns a clone.
#[derive(Clone)]
pub struct ChunkPipeline {
    fetcher: Arc<dyn ChunkFetcher>,
    parser: Arc<dyn ChunkParser>,
    pools: ArenaPools,
    headers: Arc<ChunkHeaders>,
}

impl ChunkPipeline {
    /// Bundle a fetcher, a parser and the pools stores rent from.
    pub fn new(
        fetcher: Arc<dyn ChunkFetcher>,
        parser: Arc<dyn ChunkParser>,
        pools: ArenaPools,
    ) -> Self {
        Self {
            fetcher,
            parser,
            pools,
            headers: Arc::new(ChunkHeaders::new()),
        }
    }

    /// Headers sent with every chunk request.
    pub fn with_headers(mut self, headers: ChunkHeaders) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    pub fn headers(&self) -> &ChunkHeaders {
        &self.headers
    }

    pub fn pools(&self) -> &ArenaPools {
        &self.pools
    }
}

impl std::fmt::Debug for ChunkPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPipeline")
            .field("headers", &self.headers.len())
            .field("pools", &self.pools)
            .finish_non_exhaustive()
    }
}

/// Everything one spawned download owns.
#[derive(Clone)]
pub(crate) struct PipelineContext {
    pub pipeline: ChunkPipeline,
    pub arena: ArenaConfig,
    pub cancel: CancellationToken,
    pub stats: Arc<PrefetchStats>,
}

/// Download one chunk into a sealed store.
///
/// A store is only returned once every cell is written; on any failure the
/// partially filled store is dropped here and its buffers go back to the
/// pools.
pub(crate) async fn download_chunk(
    ctx: PipelineContext,
    descriptor: ChunkDescriptor,
) -> Result<ChunkStore> {
    let _flight = ctx.stats.enter_flight();
    let chunk = descriptor.index;

    if ctx.cancel.is_cancelled() {
        debug!(chunk, "Skipping chunk download, scheduler cancelled");
        return Err(RfError::Cancelled);
    }

    let started = Instant::now();
    let result = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(RfError::Cancelled),
        result = fetch_and_parse(&ctx, &descriptor) => result,
    };

    match &result {
        Ok(store) => {
            ctx.stats
                .record_materialized(store.bytes_written(), store.cells_written() as u64);
            debug!(
                chunk,
                rows = store.row_count(),
                cols = store.col_count(),
                bytes = store.bytes_written(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Chunk materialized"
            );
        }
        Err(RfError::Cancelled) => {
            debug!(chunk, "Chunk download cancelled");
        }
        Err(e) => {
            error!(chunk, error = %e, "Chunk download failed");
        }
    }

    result
}

async fn fetch_and_parse(
    ctx: &PipelineContext,
    descriptor: &ChunkDescriptor,
) -> Result<ChunkStore> {
    let pipeline = &ctx.pipeline;
    let stream = pipeline
        .fetcher
        .fetch(&descriptor.locator, &pipeline.headers, &ctx.cancel)
        .await?;

    let mut store = ChunkStore::new(descriptor.clone(), pipeline.pools.clone(), &ctx.arena)?;
    pipeline.parser.parse(descriptor, stream, &mut store).await?;

    if !store.is_sealed() {
        return Err(ParseError::Truncated {
            written: store.cells_written(),
            expected: descriptor.cell_count().unwrap_or(usize::MAX),
        }
        .into());
    }

    Ok(store)
}
