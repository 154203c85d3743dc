//! Cost vocabulary shared by planners (estimates) and executors (actuals).

use serde::{Deserialize, Serialize};

use crate::id::OpId;

/// Size of one table cell.
pub const CELL_BYTES: usize = std::mem::size_of::<f64>();

pub const fn cells_to_bytes(cells: usize) -> usize {
    cells.saturating_mul(CELL_BYTES)
}

/// Memory profile of a plan: the largest amount of memory held at once by
/// the tables it creates, and what is still held once it has run.
/// Input tables are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub peak_bytes: usize,
    pub final_bytes: usize,
}

impl MemoryUsage {
    pub const fn from_cells(peak: usize, final_: usize) -> Self {
        Self {
            peak_bytes: cells_to_bytes(peak),
            final_bytes: cells_to_bytes(final_),
        }
    }

    /// `(peak, final)` in bytes.
    pub const fn as_pair(self) -> (usize, usize) {
        (self.peak_bytes, self.final_bytes)
    }
}

/// What an executor actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Operations executed.
    pub executed: usize,
    /// Scalar combine/reduce steps performed, counted like the estimators count them.
    pub nb_operations: usize,
    pub memory: MemoryUsage,
    /// Executed operations, in completion order.
    pub order: Vec<OpId>,
    /// Textual form of each executed operation, when tracing is enabled.
    pub trace: Vec<String>,
}
