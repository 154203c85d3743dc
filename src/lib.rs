#![forbid(unsafe_code)]
//! marginal: table algebra, greedy combination planning, and deferred
//! schedules for exact inference over discrete variables.
//!
//! The work lives in the member crates; this crate re-exports them under one
//! roof for applications and for the integration tests.

pub use marginal_core;
pub use marginal_planner;
pub use marginal_schedule;
pub use marginal_table;

pub mod prelude {
    pub use marginal_core::prelude::*;
    pub use marginal_planner::{CombineAndProject, Combinator, Plan, Projector};
    pub use marginal_schedule::{reset_id_generator, Executor, Schedule, ScheduleOperation, TableHandle};
    pub use marginal_table::{CombineFn, Instantiation, ProjectFn, Reduction, Table};
}
