#![forbid(unsafe_code)]
//! marginal-planner: deciding in which order tables are combined and
//! variables eliminated.
//!
//! Every planner first builds a `Plan` from scopes alone. The same plan is
//! then either estimated (`nb_operations`, `memory_usage`), executed on
//! tables, or emitted as schedule operations, so estimates always describe
//! exactly what execution does.

pub mod combination;
pub mod combine_project;
pub mod plan;
pub mod projection;

pub use combination::Combinator;
pub use combine_project::CombineAndProject;
pub use plan::{Plan, Slot, Step};
pub use projection::Projector;
