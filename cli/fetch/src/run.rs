//! Main execution logic for rf-fetch.

use anyhow::{Context, Result};
use rf_arena::{ArenaConfig, ArenaPools, ChunkStore};
use rf_fetch_http::{HttpChunkFetcher, HttpFetcherConfig};
use rf_prefetch::{ChunkPipeline, PrefetchConfig, PrefetchScheduler, PrefetchStatsSnapshot};
use rf_reader_rowset::RowsetParser;
use rf_types::ChunkManifest;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::args::Cli;

/// Outcome of a fetch run.
#[derive(Debug)]
pub struct FetchSummary {
    pub chunks_total: usize,
    pub chunks_delivered: usize,
    pub rows_written: u64,
    pub duration: Duration,
    pub failure: Option<String>,
    pub stats: PrefetchStatsSnapshot,
}

/// Read and validate a chunk manifest.
pub fn load_manifest(path: &Path) -> Result<ChunkManifest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: ChunkManifest = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    manifest
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid manifest {}: {}", path.display(), e))?;
    Ok(manifest)
}

/// Download the result set described by the CLI arguments.
pub async fn execute(args: Cli) -> Result<FetchSummary> {
    let mut manifest = load_manifest(&args.manifest)?;
    for (name, value) in &args.headers {
        manifest.headers.insert(name.clone(), value.clone());
    }

    let config = PrefetchConfig::new()
        .with_prefetch_width(args.prefetch_width)
        .with_arena(ArenaConfig::new().with_overflow_policy(args.overflow.into()));
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;

    let fetcher = HttpChunkFetcher::new(
        &HttpFetcherConfig::new().with_connect_timeout(args.connect_timeout),
    )?;
    let pools = ArenaPools::shared(&config.arena);
    let pipeline = ChunkPipeline::new(Arc::new(fetcher), Arc::new(RowsetParser::new()), pools)
        .with_headers(manifest.headers.clone());

    let chunks_total = manifest.chunks.len();
    info!(
        manifest = %args.manifest.display(),
        chunks = chunks_total,
        rows = manifest.total_rows(),
        "Starting result download"
    );

    let started = Instant::now();
    let mut scheduler = PrefetchScheduler::new(manifest.chunks, &config, pipeline)?;

    let token = scheduler.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding downloads");
            token.cancel();
        }
    });

    let mut out = BufWriter::new(std::io::stdout());
    let mut chunks_delivered = 0;
    let mut rows_written = 0;
    let mut failure = None;

    loop {
        let position = scheduler.position();
        match scheduler.next_chunk().await {
            Ok(Some(chunk)) => {
                let written = if args.quiet {
                    Ok(chunk.row_count() as u64)
                } else {
                    write_chunk(&mut out, &chunk)
                };
                chunk.release();
                rows_written += written?;
                chunks_delivered += 1;
            }
            Ok(None) => break,
            Err(e) => {
                error!(chunk = position, error = %e, "Stopping after failed chunk");
                failure = Some(format!("chunk {}: {}", position, e));
                scheduler.cancel();
                break;
            }
        }
    }

    out.flush().context("failed to flush output")?;
    interrupt.abort();

    Ok(FetchSummary {
        chunks_total,
        chunks_delivered,
        rows_written,
        duration: started.elapsed(),
        failure,
        stats: scheduler.stats(),
    })
}

/// Write every row of `chunk` as tab-separated values, `\N` for null.
pub fn write_chunk<W: Write>(out: &mut W, chunk: &ChunkStore) -> Result<u64> {
    for row in 0..chunk.row_count() {
        for col in 0..chunk.col_count() {
            if col > 0 {
                out.write_all(b"\t")?;
            }
            chunk.with_cell(row, col, |value| match value {
                Some(text) => write_escaped(out, text),
                None => out.write_all(b"\\N"),
            })??;
        }
        out.write_all(b"\n")?;
    }
    Ok(chunk.row_count() as u64)
}

fn write_escaped<W: Write>(out: &mut W, text: &str) -> std::io::Result<()> {
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        let escaped: &[u8] = match b {
            b'\t' => b"\\t",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            b'\\' => b"\\\\",
            _ => continue,
        };
        out.write_all(&text.as_bytes()[start..i])?;
        out.write_all(escaped)?;
        start = i + 1;
    }
    out.write_all(&text.as_bytes()[start..])
}
