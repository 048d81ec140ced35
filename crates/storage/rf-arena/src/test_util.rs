//! Pool mock that records every rent and fails on double returns.

use crate::arena::CellEntry;
use crate::pool::{ArenaPools, BufferPool};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub(crate) struct TrackingPool {
    outstanding: Mutex<HashSet<usize>>,
    rents: AtomicUsize,
    returns: AtomicUsize,
    double_returns: AtomicUsize,
}

impl TrackingPool {
    pub(crate) fn rents(&self) -> usize {
        self.rents.load(Ordering::SeqCst)
    }

    pub(crate) fn returns(&self) -> usize {
        self.returns.load(Ordering::SeqCst)
    }

    pub(crate) fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }

    pub(crate) fn assert_balanced(&self) {
        assert_eq!(self.double_returns.load(Ordering::SeqCst), 0, "buffer returned twice");
        assert_eq!(self.outstanding(), 0, "buffer never returned");
        assert_eq!(self.rents(), self.returns());
    }
}

impl<T: Clone + Default + Send> BufferPool<T> for TrackingPool {
    fn rent(&self, len: usize) -> Vec<T> {
        assert!(len > 0, "zero-length buffers cannot be tracked");
        let buffer = vec![T::default(); len];
        self.outstanding.lock().insert(buffer.as_ptr() as usize);
        self.rents.fetch_add(1, Ordering::SeqCst);
        buffer
    }

    fn give_back(&self, buffer: Vec<T>) {
        self.returns.fetch_add(1, Ordering::SeqCst);
        if !self.outstanding.lock().remove(&(buffer.as_ptr() as usize)) {
            self.double_returns.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Returns the byte pool, the index pool, and both bundled for an arena.
pub(crate) fn tracking_pools() -> (Arc<TrackingPool>, Arc<TrackingPool>, ArenaPools) {
    let bytes = Arc::new(TrackingPool::default());
    let index = Arc::new(TrackingPool::default());
    let pools = ArenaPools::new(
        bytes.clone() as Arc<dyn BufferPool<u8>>,
        index.clone() as Arc<dyn BufferPool<CellEntry>>,
    );
    (bytes, index, pools)
}
