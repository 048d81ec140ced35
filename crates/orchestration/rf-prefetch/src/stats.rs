//! Scheduler statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters shared between the scheduler and its pipelines.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    launched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    bytes_materialized: AtomicU64,
    cells_materialized: AtomicU64,
}

impl PrefetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_launch(&self) {
        self.launched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_materialized(&self, bytes: u64, cells: u64) {
        self.bytes_materialized.fetch_add(bytes, Ordering::Relaxed);
        self.cells_materialized.fetch_add(cells, Ordering::Relaxed);
    }

    /// Marks a pipeline as running until the returned guard drops.
    pub(crate) fn enter_flight(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> PrefetchStatsSnapshot {
        PrefetchStatsSnapshot {
            launched: self.launched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            bytes_materialized: self.bytes_materialized.load(Ordering::Relaxed),
            cells_materialized: self.cells_materialized.load(Ordering::Relaxed),
        }
    }
}

/// Decrements the in-flight count on drop, including when a pipeline is
/// aborted mid-await.
pub(crate) struct InFlightGuard<'a> {
    stats: &'a PrefetchStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serializable snapshot of [`PrefetchStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchStatsSnapshot {
    /// Downloads started
    pub launched: u64,

    /// Chunks handed to the consumer
    pub delivered: u64,

    /// Positions that surfaced an error
    pub failed: u64,

    /// Pipelines running right now
    pub in_flight: usize,

    /// Most pipelines ever running at once
    pub peak_in_flight: usize,

    /// Cell payload bytes written into arenas by successful pipelines
    pub bytes_materialized: u64,

    /// Cells written by successful pipelines
    pub cells_materialized: u64,
}
