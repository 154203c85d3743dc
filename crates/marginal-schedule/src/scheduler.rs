//! Parallel executor for schedules (requires the `async-scheduler` feature).
//!
//! Independent available operations run on tokio's blocking pool, at most
//! `max_parallel_tasks` at a time. Propagation stays on the driving task, so
//! the schedule itself is never shared across threads.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinSet;

use marginal_core::config::EngineConfig;
use marginal_core::cost::ExecutionStats;
use marginal_core::error::{Error, Result};
use marginal_core::id::OpId;

use crate::executor::account;
use crate::schedule::Schedule;
use crate::tracking::ExecutionTracker;

pub async fn run_parallel(schedule: &mut Schedule, cfg: &EngineConfig) -> Result<ExecutionStats> {
    cfg.validate()?;
    cfg.check_budget(schedule.memory_usage().peak_bytes)?;

    let tracker = Arc::new(ExecutionTracker::new());
    let mut stats = ExecutionStats::default();
    let mut ready: VecDeque<OpId> = schedule.available_operations().into();
    let mut in_flight: JoinSet<Result<(OpId, String)>> = JoinSet::new();

    loop {
        while in_flight.len() < cfg.max_parallel_tasks {
            let Some(id) = ready.pop_front() else { break };
            let op = schedule
                .shared_operation(id)
                .ok_or_else(|| Error::Schedule(format!("unknown operation {id}")))?;
            let tracker = Arc::clone(&tracker);
            in_flight.spawn_blocking(move || {
                op.execute()?;
                account(&op, &tracker);
                Ok((id, op.to_string()))
            });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (id, text) =
            joined.map_err(|e| Error::Invariant(format!("worker task failed: {e}")))??;
        if cfg.trace_operations {
            stats.trace.push(text);
        }
        stats.executed += 1;
        stats.order.push(id);

        let mut new_available = Vec::new();
        schedule.update_after_execution(id, &mut new_available)?;
        ready.extend(new_available);
    }

    stats.nb_operations = tracker.nb_operations();
    stats.memory = tracker.memory_usage();
    Ok(stats)
}
