//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::cost::{cells_to_bytes, ExecutionStats, MemoryUsage, CELL_BYTES};
pub use crate::error::{Error, Result};
pub use crate::id::{HandleId, OpId, VarId};
pub use crate::variable::{Variable, VariableArena, VariableSet};
