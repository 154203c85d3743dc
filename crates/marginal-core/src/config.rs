//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Optional cap (in bytes) on the peak memory of a plan or schedule run.
    /// Planners refuse plans whose estimated peak exceeds it.
    pub mem_cap_bytes: Option<usize>,

    /// Absolute tolerance used when comparing tables cell by cell.
    pub tolerance: f64,

    /// Execution parallelism. The async executor never runs more operations at once.
    pub max_parallel_tasks: usize,

    /// Record the textual form of every executed operation.
    pub trace_operations: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: None,
            tolerance: 1e-9,
            max_parallel_tasks: 4,
            trace_operations: false,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `MARGINAL_MEM_CAP_BYTES`: peak memory cap in bytes
    /// - `MARGINAL_TOLERANCE`: comparison tolerance
    /// - `MARGINAL_MAX_PARALLEL_TASKS`: max parallel tasks
    /// - `MARGINAL_TRACE_OPERATIONS`: `1`/`true` to record executed operations
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("MARGINAL_MEM_CAP_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.mem_cap_bytes = Some(v);
            }
        }

        if let Ok(s) = std::env::var("MARGINAL_TOLERANCE") {
            if let Ok(v) = s.parse::<f64>() {
                cfg.tolerance = v;
            }
        }

        if let Ok(s) = std::env::var("MARGINAL_MAX_PARALLEL_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_tasks = v;
            }
        }

        if let Ok(s) = std::env::var("MARGINAL_TRACE_OPERATIONS") {
            cfg.trace_operations = matches!(s.trim(), "1" | "true" | "yes");
        }

        cfg
    }

    pub fn with_mem_cap(mut self, bytes: usize) -> Self {
        self.mem_cap_bytes = Some(bytes);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.max_parallel_tasks == 0 {
            return Err(Error::Config("max_parallel_tasks must be at least 1".into()));
        }
        Ok(())
    }

    /// Fail if a plan peaking at `peak_bytes` does not fit the configured cap.
    pub fn check_budget(&self, peak_bytes: usize) -> Result<()> {
        match self.mem_cap_bytes {
            Some(cap) if peak_bytes > cap => Err(Error::BudgetExceeded {
                requested: peak_bytes,
                capacity: cap,
            }),
            _ => Ok(()),
        }
    }
}
