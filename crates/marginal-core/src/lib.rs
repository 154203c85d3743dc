#![forbid(unsafe_code)]
//! marginal-core: shared vocabulary for the marginal inference engine.
//!
//! Responsibilities:
//! - Strongly-typed ids (`VarId`, `OpId`).
//! - Discrete variables, their arena, and scope helpers.
//! - Canonical `Error` / `Result`.
//! - `EngineConfig` (defaults + environment overrides).
//! - Cost vocabulary shared by planners and executors (`MemoryUsage`, `ExecutionStats`).
//! - Memory budget traits and stable hashing for schedule fingerprints.

pub mod budget;
pub mod config;
pub mod cost;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod variable;

pub use error::{Error, Result};
