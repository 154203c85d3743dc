//! Debug-time verification helpers for schedules.
//!
//! Intended for tests and debug builds; they panic on the first violation.

use std::collections::HashSet;

use marginal_core::id::OpId;

use crate::schedule::Schedule;

/// Every operation of `order` appears after all of its dependencies.
pub fn assert_topological(schedule: &Schedule, order: &[OpId]) {
    let mut seen = HashSet::<OpId>::new();
    for id in order {
        for d in schedule.dependencies(*id) {
            assert!(
                seen.contains(d),
                "dependency {d} not satisfied before operation {id}"
            );
        }
        assert!(seen.insert(*id), "operation {id} executed twice");
    }
}

/// Every operation has executed and nothing is reported as available.
pub fn assert_drained(schedule: &Schedule) {
    for (id, op) in schedule.operations() {
        assert!(op.is_executed(), "operation {id} (`{op}`) never executed");
    }
    assert!(
        schedule.available_operations().is_empty(),
        "drained schedule still reports available operations"
    );
}
