//! Schedule graph: handles, operations, availability, and executors

use std::collections::HashSet;

use marginal_core::config::EngineConfig;
use marginal_core::cost::CELL_BYTES;
use marginal_core::error::Error;
use marginal_core::variable::{Variable, VariableArena, VariableSet};
use marginal_schedule::verify::{assert_drained, assert_topological};
use marginal_schedule::{Executor, OperationKind, Schedule, ScheduleOperation, TableHandle};
use marginal_table::{CombineFn, ProjectFn, Table};

fn vars(n: usize, domain: usize) -> Vec<Variable> {
    let mut arena = VariableArena::new();
    (0..n)
        .map(|i| arena.add(format!("z{i}"), domain).unwrap())
        .collect()
}

fn ones(scope: &[Variable]) -> Table {
    Table::builder().vars(scope.iter().copied()).fill(1.0).build().unwrap()
}

fn set_of(vars: &[Variable]) -> VariableSet {
    vars.iter().copied().collect()
}

#[test]
fn test_project_operation_shape_and_display() {
    let x = vars(3, 2);
    let arg = TableHandle::from_table(ones(&x));
    let op = ScheduleOperation::project(&arg, set_of(&[x[0], x[2]]), ProjectFn::SUM).unwrap();

    assert_eq!(op.nb_args(), 1);
    assert!(matches!(op.kind(), OperationKind::Project(f) if f == ProjectFn::SUM));
    let result = op.result().unwrap();
    assert_eq!(result.vars(), &[x[1]]);
    assert_eq!(
        op.to_string(),
        format!("{result} = project[sum] ( {arg} , {{{}, {}}} )", x[0], x[2])
    );
    assert_eq!(op.nb_operations(), 8);
}

#[test]
fn test_duplicated_operation_has_its_own_result() {
    let x = vars(2, 3);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let op = ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap();
    let copy = op.duplicate().unwrap();

    assert_eq!(op, copy);
    assert_ne!(op.result(), copy.result());

    op.execute().unwrap();
    assert!(op.result().unwrap().is_materialized());
    assert!(copy.result().unwrap().is_abstract());
    assert!(!copy.is_executed());
}

#[test]
fn test_structural_equality() {
    let x = vars(2, 2);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let ab = ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap();

    assert_eq!(ab, ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap());
    assert_ne!(ab, ScheduleOperation::combine(&a, &b, CombineFn::SUM).unwrap());
    assert_ne!(ab, ScheduleOperation::combine(&b, &a, CombineFn::PRODUCT).unwrap());

    let other = TableHandle::from_table(ones(&[x[0]]));
    assert_ne!(ab, ScheduleOperation::combine(&other, &b, CombineFn::PRODUCT).unwrap());
    assert_eq!(ScheduleOperation::delete(&a), ScheduleOperation::delete(&a));
}

#[test]
fn test_manual_drain_executes_everything_once() {
    let x = vars(4, 2);
    let t1 = TableHandle::from_table(ones(&[x[0], x[1]]));
    let t2 = TableHandle::from_table(ones(&[x[1], x[2]]));
    let t3 = TableHandle::from_table(ones(&[x[2], x[3]]));

    let mut schedule = Schedule::new();
    for h in [&t1, &t2, &t3] {
        schedule.insert_schedule_multidim(h);
    }
    let c12 = schedule
        .insert_operation(ScheduleOperation::combine(&t1, &t2, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let r12 = schedule.result_of(c12).unwrap().clone();
    let p = schedule
        .insert_operation(ScheduleOperation::project(&r12, set_of(&[x[1]]), ProjectFn::SUM).unwrap())
        .unwrap();
    let rp = schedule.result_of(p).unwrap().clone();
    let d = schedule
        .insert_operation(ScheduleOperation::delete(&r12))
        .unwrap();
    let c3 = schedule
        .insert_operation(ScheduleOperation::combine(&rp, &t3, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let result = schedule.result_of(c3).unwrap().clone();

    assert_eq!(schedule.available_operations(), vec![c12]);

    let mut executed = Vec::new();
    let mut seen = HashSet::new();
    let mut available = schedule.available_operations();
    while let Some(id) = available.pop() {
        assert!(seen.insert(id), "operation {id} offered twice");
        schedule.operation(id).unwrap().execute().unwrap();
        executed.push(id);
        let mut newly = Vec::new();
        schedule.update_after_execution(id, &mut newly).unwrap();
        available.extend(newly);
        for (done, _) in schedule.operations().filter(|(_, op)| op.is_executed()) {
            assert!(!schedule.available_operations().contains(&done));
        }
    }

    assert_eq!(executed.len(), 4);
    assert_drained(&schedule);
    assert_topological(&schedule, &executed);
    assert!(executed.iter().position(|i| *i == d) > executed.iter().position(|i| *i == p));

    assert!(r12.is_released());
    assert!(!r12.is_abstract());
    assert!(rp.is_materialized());
    // z0 x z2 x z3, each cell = sum over z1 of 1 * 1
    assert_eq!(result.table().values(), &[2.0; 8]);
}

#[test]
fn test_delete_waits_for_every_reader() {
    let x = vars(2, 2);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));

    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    schedule.insert_schedule_multidim(&b);
    let c = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let r = schedule.result_of(c).unwrap().clone();
    let p1 = schedule
        .insert_operation(ScheduleOperation::project(&r, set_of(&[x[0]]), ProjectFn::SUM).unwrap())
        .unwrap();
    let p2 = schedule
        .insert_operation(ScheduleOperation::project(&r, set_of(&[x[1]]), ProjectFn::MAX).unwrap())
        .unwrap();
    let d = schedule.insert_operation(ScheduleOperation::delete(&r)).unwrap();

    let newly = schedule.execute(c).unwrap();
    assert_eq!(newly, vec![p1, p2]);
    let newly = schedule.execute(p2).unwrap();
    assert!(newly.is_empty());
    let newly = schedule.execute(p1).unwrap();
    assert_eq!(newly, vec![d]);
    schedule.execute(d).unwrap();
    assert_eq!(schedule.remaining(), 0);
}

#[test]
fn test_equal_operations_are_shared() {
    let x = vars(2, 2);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    schedule.insert_schedule_multidim(&b);

    let first = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let again = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(schedule.len(), 1);

    // each insertion owns the shared result; only the last deletion is a node
    let r = schedule.result_of(first).unwrap().clone();
    assert_eq!(schedule.nb_owners(&r), 2);
    let released = schedule.insert_operation(ScheduleOperation::delete(&r)).unwrap();
    assert_eq!(released, first);
    assert_eq!(schedule.len(), 1);
    assert!(!schedule.is_scheduled_for_deletion(&r));
    schedule.insert_operation(ScheduleOperation::delete(&r)).unwrap();
    assert!(schedule.is_scheduled_for_deletion(&r));

    // once its result is scheduled for deletion, an equal operation is new
    let fresh = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();
    assert_ne!(fresh, first);
    assert_eq!(schedule.len(), 3);
}

#[test]
fn test_insertion_validates_arguments() {
    let x = vars(1, 2);
    let known = TableHandle::from_table(ones(&x));
    let stranger = TableHandle::from_table(ones(&x));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&known);

    let err = schedule
        .insert_operation(ScheduleOperation::delete(&stranger))
        .unwrap_err();
    assert!(matches!(err, Error::Schedule(_)));

    schedule.insert_operation(ScheduleOperation::delete(&known)).unwrap();
    let err = schedule
        .insert_operation(ScheduleOperation::project(&known, VariableSet::new(), ProjectFn::SUM).unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::Schedule(_)));
}

#[test]
fn test_update_requires_execution() {
    let x = vars(1, 2);
    let a = TableHandle::from_table(ones(&x));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    let p = schedule
        .insert_operation(ScheduleOperation::project(&a, set_of(&x), ProjectFn::SUM).unwrap())
        .unwrap();
    let mut newly = Vec::new();
    assert!(matches!(
        schedule.update_after_execution(p, &mut newly),
        Err(Error::Schedule(_))
    ));
}

#[test]
#[should_panic(expected = "not materialized")]
fn test_executing_with_abstract_argument_panics() {
    let x = vars(1, 2);
    let pending = TableHandle::abstract_over(&x).unwrap();
    let op = ScheduleOperation::project(&pending, set_of(&x), ProjectFn::SUM).unwrap();
    let _ = op.execute();
}

#[test]
#[should_panic(expected = "before materialization")]
fn test_reading_abstract_handle_panics() {
    let x = vars(1, 2);
    let pending = TableHandle::abstract_over(&x).unwrap();
    let _ = pending.table();
}

#[test]
#[should_panic(expected = "materialized twice")]
fn test_materializing_twice_panics() {
    let x = vars(1, 2);
    let h = TableHandle::abstract_over(&x).unwrap();
    h.materialize(ones(&x));
    h.materialize(ones(&x));
}

#[test]
fn test_operation_runs_at_most_once() {
    let x = vars(2, 3);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let op = ScheduleOperation::combine(&a, &b, CombineFn::SUM).unwrap();

    let outcomes: Vec<bool> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..8).map(|_| s.spawn(|| op.execute().is_ok())).collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(op.execute(), Err(Error::AlreadyExecuted(_))));
    assert_eq!(op.result().unwrap().table().values(), &[2.0; 9]);
}

#[test]
fn test_executor_reports_costs_and_trace() {
    let x = vars(3, 2);
    let a = TableHandle::from_table(ones(&[x[0], x[1]]));
    let b = TableHandle::from_table(ones(&[x[1], x[2]]));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    schedule.insert_schedule_multidim(&b);
    let c = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let r = schedule.result_of(c).unwrap().clone();
    schedule
        .insert_operation(ScheduleOperation::project(&r, set_of(&[x[1]]), ProjectFn::SUM).unwrap())
        .unwrap();
    schedule.insert_operation(ScheduleOperation::delete(&r)).unwrap();

    assert_eq!(schedule.nb_operations(), 8 + 8 + 1);
    let estimate = schedule.memory_usage();
    assert_eq!(estimate.as_pair(), (12 * CELL_BYTES, 4 * CELL_BYTES));

    let cfg = EngineConfig {
        trace_operations: true,
        ..EngineConfig::default()
    };
    let stats = Executor::new(cfg).run(&mut schedule).unwrap();
    assert_eq!(stats.executed, 3);
    assert_eq!(stats.nb_operations, 17);
    assert_eq!(stats.memory, estimate);
    assert_eq!(stats.trace.len(), 3);
    assert!(stats.trace[2].starts_with("delete"));
    assert_eq!(schedule.nb_operations(), 0);
}

#[test]
fn test_executor_refuses_schedules_over_budget() {
    let x = vars(2, 4);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    schedule.insert_schedule_multidim(&b);
    schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
        .unwrap();

    let cfg = EngineConfig::default().with_mem_cap(8 * CELL_BYTES);
    let err = Executor::new(cfg).run(&mut schedule).unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));
    assert_eq!(schedule.remaining(), 1);

    let cfg = EngineConfig::default().with_mem_cap(16 * CELL_BYTES);
    let stats = Executor::new(cfg).run(&mut schedule).unwrap();
    assert_eq!(stats.executed, 1);
}

#[test]
fn test_fingerprint_ignores_handle_numbering() {
    let x = vars(2, 2);
    let build = || {
        let a = TableHandle::from_table(ones(&[x[0]]));
        let b = TableHandle::from_table(ones(&[x[1]]));
        let mut schedule = Schedule::new();
        schedule.insert_schedule_multidim(&a);
        schedule.insert_schedule_multidim(&b);
        schedule
            .insert_operation(ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap())
            .unwrap();
        (schedule, a)
    };
    let (first, _) = build();
    let (mut second, a) = build();
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());

    second
        .insert_operation(ScheduleOperation::project(&a, set_of(&[x[0]]), ProjectFn::SUM).unwrap())
        .unwrap();
    assert_ne!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    assert_eq!(second.to_string().lines().count(), 2);
}

#[cfg(feature = "async-scheduler")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_run_matches_reference_results() {
    use marginal_schedule::scheduler::run_parallel;

    let x = vars(4, 3);
    let handles: Vec<TableHandle> = (0..4)
        .map(|i| TableHandle::from_table(ones(&[x[i], x[(i + 1) % 4]])))
        .collect();
    let mut schedule = Schedule::new();
    for h in &handles {
        schedule.insert_schedule_multidim(h);
    }
    let left = schedule
        .insert_operation(ScheduleOperation::combine(&handles[0], &handles[1], CombineFn::PRODUCT).unwrap())
        .unwrap();
    let right = schedule
        .insert_operation(ScheduleOperation::combine(&handles[2], &handles[3], CombineFn::PRODUCT).unwrap())
        .unwrap();
    let l = schedule.result_of(left).unwrap().clone();
    let r = schedule.result_of(right).unwrap().clone();
    let all = schedule
        .insert_operation(ScheduleOperation::combine(&l, &r, CombineFn::PRODUCT).unwrap())
        .unwrap();
    let result = schedule.result_of(all).unwrap().clone();

    let stats = run_parallel(&mut schedule, &EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(stats.executed, 3);
    assert_drained(&schedule);
    assert_topological(&schedule, &stats.order);
    assert_eq!(result.table().domain_size(), 81);
    assert!(result.table().values().iter().all(|v| *v == 1.0));
}

fn failing_combine(_: &Table, _: &Table, _: &mut usize) -> marginal_core::error::Result<Table> {
    Err(Error::Invariant("kernel failure".into()))
}

#[test]
fn test_failed_kernel_returns_its_reservation() {
    let x = vars(2, 3);
    let a = TableHandle::from_table(ones(&[x[0]]));
    let b = TableHandle::from_table(ones(&[x[1]]));
    let mut schedule = Schedule::new();
    schedule.insert_schedule_multidim(&a);
    schedule.insert_schedule_multidim(&b);
    let failing = CombineFn::new("failing", failing_combine);
    let id = schedule
        .insert_operation(ScheduleOperation::combine(&a, &b, failing).unwrap())
        .unwrap();

    let cfg = EngineConfig {
        mem_cap_bytes: Some(1 << 20),
        ..EngineConfig::default()
    };
    let mut executor = Executor::new(cfg);
    let err = executor.run(&mut schedule).unwrap_err();
    assert!(matches!(err, Error::Invariant(_)));
    assert_eq!(executor.reserved_bytes(), 0);
    assert!(!schedule.operation(id).unwrap().is_executed());
    assert!(schedule.result_of(id).unwrap().is_abstract());
}

#[test]
fn test_executed_operations_report_measured_steps() {
    let x = vars(3, 2);
    let a = TableHandle::from_table(ones(&[x[0], x[1]]));
    let b = TableHandle::from_table(ones(&[x[1], x[2]]));
    let combine = ScheduleOperation::combine(&a, &b, CombineFn::PRODUCT).unwrap();
    assert_eq!(combine.measured_operations(), 0);
    combine.execute().unwrap();
    assert_eq!(combine.measured_operations(), 8);

    let r = combine.result().unwrap();
    let project = ScheduleOperation::project(r, set_of(&[x[0], x[1]]), ProjectFn::SUM).unwrap();
    project.execute().unwrap();
    assert_eq!(project.measured_operations(), 8);
    assert_eq!(project.result().unwrap().table().values(), &[4.0, 4.0]);

    let delete = ScheduleOperation::delete(r);
    delete.execute().unwrap();
    assert_eq!(delete.measured_operations(), 1);
}
