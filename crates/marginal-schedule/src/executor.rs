//! Reference executor: drains a schedule on the calling thread.
//!
//! Loop: take the available operation with the lowest id, execute it,
//! propagate with `update_after_execution`, queue what became available.
//! Operations are inserted in a topological order, so lowest-id-first replays
//! that order and the measured costs equal `Schedule::memory_usage`.
//!
//! The estimated peak is checked against `EngineConfig::mem_cap_bytes` before
//! anything runs, and every materialized result holds a budget guard until
//! its deletion.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use marginal_core::budget::MemoryBudget;
use marginal_core::config::EngineConfig;
use marginal_core::cost::{cells_to_bytes, ExecutionStats};
use marginal_core::error::{Error, Result};
use marginal_core::id::{HandleId, OpId};

use crate::budget::{TableBudget, TableGuard};
use crate::metrics::emit_span;
use crate::operation::{OperationKind, ScheduleOperation};
use crate::schedule::Schedule;
use crate::tracking::ExecutionTracker;

pub struct Executor {
    cfg: EngineConfig,
    budget: Option<TableBudget>,
    guards: HashMap<HandleId, TableGuard>,
}

impl Executor {
    pub fn new(cfg: EngineConfig) -> Self {
        let budget = cfg.mem_cap_bytes.map(TableBudget::new);
        Self {
            cfg,
            budget,
            guards: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Bytes currently held by materialized results; 0 without a cap.
    pub fn reserved_bytes(&self) -> usize {
        self.budget.as_ref().map_or(0, |b| b.used_bytes())
    }

    /// Execute every operation of `schedule` that can become available.
    pub fn run(&mut self, schedule: &mut Schedule) -> Result<ExecutionStats> {
        self.cfg.validate()?;
        self.cfg.check_budget(schedule.memory_usage().peak_bytes)?;

        let tracker = ExecutionTracker::new();
        let mut stats = ExecutionStats::default();
        let mut queue: BinaryHeap<Reverse<OpId>> = schedule
            .available_operations()
            .into_iter()
            .map(Reverse)
            .collect();
        let mut new_available = Vec::new();

        while let Some(Reverse(id)) = queue.pop() {
            let op = schedule
                .shared_operation(id)
                .ok_or_else(|| Error::Schedule(format!("unknown operation {id}")))?;
            if op.is_executed() {
                continue;
            }
            self.reserve(&op)?;
            if let Err(e) = op.execute() {
                if let Some(result) = op.result() {
                    self.guards.remove(&result.id());
                }
                return Err(e);
            }
            account(&op, &tracker);
            self.settle(&op);

            emit_span(
                "execute",
                &[
                    ("op", id.get().to_string()),
                    ("kind", op.kind().label().to_string()),
                    ("nb_operations", op.nb_operations().to_string()),
                ],
            );
            if self.cfg.trace_operations {
                stats.trace.push(op.to_string());
            }
            stats.executed += 1;
            stats.order.push(id);

            new_available.clear();
            schedule.update_after_execution(id, &mut new_available)?;
            queue.extend(new_available.iter().copied().map(Reverse));
        }

        stats.nb_operations = tracker.nb_operations();
        stats.memory = tracker.memory_usage();
        Ok(stats)
    }

    fn reserve(&mut self, op: &ScheduleOperation) -> Result<()> {
        let (Some(budget), Some(result)) = (&self.budget, op.result()) else {
            return Ok(());
        };
        let bytes = cells_to_bytes(result.domain_size());
        match budget.try_acquire(bytes, "table") {
            Some(guard) => {
                self.guards.insert(result.id(), guard);
                Ok(())
            }
            None => Err(Error::BudgetExceeded {
                requested: budget.used_bytes() + bytes,
                capacity: budget.capacity_bytes(),
            }),
        }
    }

    fn settle(&mut self, op: &ScheduleOperation) {
        if matches!(op.kind(), OperationKind::Delete) {
            self.guards.remove(&op.args()[0].id());
        }
    }
}

/// Count an executed operation from the steps its kernel reported and the
/// tables it touched.
pub(crate) fn account(op: &ScheduleOperation, tracker: &ExecutionTracker) {
    tracker.record_operations(op.measured_operations());
    match op.kind() {
        OperationKind::Combine(_) | OperationKind::Project(_) => {
            let cells = op
                .result()
                .and_then(|r| r.try_table())
                .map_or(0, |t| t.domain_size());
            tracker.record_created(cells);
        }
        OperationKind::Delete => {
            tracker.record_released(op.args()[0].domain_size());
        }
    }
    #[cfg(feature = "tracing")]
    tracing::trace!(op = %op, ops = tracker.nb_operations(), "executed");
}
