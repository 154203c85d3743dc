//! Lightweight operation and peak-memory tracking.
//!
//! Shared by the plan walker and the schedule executors so that what actually
//! ran can be compared with the estimators.

use std::sync::atomic::{AtomicUsize, Ordering};

use marginal_core::cost::{cells_to_bytes, MemoryUsage};

#[derive(Debug, Default)]
pub struct ExecutionTracker {
    nb_operations: AtomicUsize,
    live_cells: AtomicUsize,
    peak_cells: AtomicUsize,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_operations(&self, n: usize) {
        self.nb_operations.fetch_add(n, Ordering::AcqRel);
    }

    /// A table of `cells` cells came to life; updates the peak if higher.
    pub fn record_created(&self, cells: usize) {
        let live = self.live_cells.fetch_add(cells, Ordering::AcqRel) + cells;
        let mut cur = self.peak_cells.load(Ordering::Relaxed);
        while live > cur {
            match self.peak_cells.compare_exchange(
                cur,
                live,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(live_cells = live, peak_cells = self.peak_cells(), "table created");
    }

    pub fn record_released(&self, cells: usize) {
        let _ = self
            .live_cells
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                Some(live.saturating_sub(cells))
            });
    }

    pub fn nb_operations(&self) -> usize {
        self.nb_operations.load(Ordering::Acquire)
    }

    pub fn live_cells(&self) -> usize {
        self.live_cells.load(Ordering::Acquire)
    }

    pub fn peak_cells(&self) -> usize {
        self.peak_cells.load(Ordering::Acquire)
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        MemoryUsage {
            peak_bytes: cells_to_bytes(self.peak_cells()),
            final_bytes: cells_to_bytes(self.live_cells()),
        }
    }
}
