#![forbid(unsafe_code)]
//! marginal-schedule: deferred execution of table operations.
//!
//! A `Schedule` is a DAG of `ScheduleOperation`s (combine, project, delete)
//! over `TableHandle`s. Handles start abstract (only their scope is known) and
//! are materialized once, by the operation producing them. The synchronous
//! `Executor` drains a schedule in dependency order; with the
//! `async-scheduler` feature, `scheduler::run_parallel` dispatches
//! independent operations to blocking worker tasks.

pub mod budget;
pub mod executor;
pub mod handle;
pub mod metrics;
pub mod operation;
pub mod schedule;
#[cfg(feature = "async-scheduler")]
pub mod scheduler;
pub mod tracking;
pub mod verify;

pub use executor::Executor;
pub use handle::{reset_id_generator, TableHandle};
pub use operation::{OperationKind, ScheduleOperation};
pub use schedule::Schedule;
pub use tracking::ExecutionTracker;
