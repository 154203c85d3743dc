//! Byte budget for materialized tables.
//!
//! The executor reserves a result's bytes before running the operation that
//! produces it and keeps the guard until a delete operation releases the
//! table, so `used_bytes` follows the live cells of the schedule.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use marginal_core::budget::{BudgetGuard, MemoryBudget};

#[derive(Debug)]
struct Reserved {
    capacity: usize,
    used: AtomicUsize,
    high_water: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct TableBudget {
    shared: Arc<Reserved>,
}

impl TableBudget {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Reserved {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
                high_water: AtomicUsize::new(0),
            }),
        }
    }

    /// Largest number of bytes reserved at once so far.
    pub fn high_water_bytes(&self) -> usize {
        self.shared.high_water.load(Ordering::Acquire)
    }
}

/// Reservation for one table.
#[derive(Debug)]
pub struct TableGuard {
    shared: Arc<Reserved>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for TableGuard {
    fn drop(&mut self) {
        let bytes = std::mem::take(&mut self.bytes);
        self.shared.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

impl BudgetGuard for TableGuard {
    fn bytes(&self) -> usize {
        self.bytes
    }

    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl MemoryBudget for TableBudget {
    type Guard = TableGuard;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<TableGuard> {
        let capacity = self.shared.capacity;
        let previous = self
            .shared
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|next| *next <= capacity)
            })
            .ok()?;
        self.shared
            .high_water
            .fetch_max(previous + bytes, Ordering::AcqRel);
        Some(TableGuard {
            shared: Arc::clone(&self.shared),
            bytes,
            tag,
        })
    }

    fn capacity_bytes(&self) -> usize {
        self.shared.capacity
    }

    fn used_bytes(&self) -> usize {
        self.shared.used.load(Ordering::Acquire)
    }
}
