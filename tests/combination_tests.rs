//! Greedy multi-table combination: results, cost estimates, deferred mode

use std::borrow::Cow;

use marginal_core::cost::{MemoryUsage, CELL_BYTES};
use marginal_core::error::Error;
use marginal_core::variable::{Variable, VariableArena};
use marginal_planner::{Combinator, Step};
use marginal_schedule::{Executor, ExecutionTracker, OperationKind, Schedule, TableHandle};
use marginal_table::{CombineFn, Table};
use marginal_core::config::EngineConfig;

fn vars(n: usize, domain: usize) -> Vec<Variable> {
    let mut arena = VariableArena::new();
    (0..n)
        .map(|i| arena.add(format!("x{i}"), domain).unwrap())
        .collect()
}

fn filled(scope: &[Variable], seed: usize) -> Table {
    let cells: usize = scope.iter().map(|v| v.domain_size()).product();
    let values = (0..cells).map(|i| ((i * 7 + seed) % 11 + 1) as f64 / 11.0).collect();
    Table::from_values(scope, values).unwrap()
}

/// t1{x0,x1,x2}, t2{x0,x1,x5}, t3{x6,x4,x3}, all of domain 4.
fn three_tables() -> (Vec<Variable>, Vec<Table>) {
    let x = vars(7, 4);
    let t1 = filled(&[x[0], x[1], x[2]], 1);
    let t2 = filled(&[x[0], x[1], x[5]], 2);
    let t3 = filled(&[x[6], x[4], x[3]], 3);
    (x, vec![t1, t2, t3])
}

#[test]
fn test_three_table_costs() {
    let (_, tables) = three_tables();
    let refs: Vec<&Table> = tables.iter().collect();
    let comb = Combinator::new(CombineFn::PRODUCT);

    // t1*t2 (256 cells), then with t3 (16384 cells), then drop the intermediate
    assert_eq!(comb.nb_operations(&refs).unwrap(), 16641);
    assert_eq!(
        comb.memory_usage(&refs).unwrap(),
        MemoryUsage {
            peak_bytes: 16640 * CELL_BYTES,
            final_bytes: 16384 * CELL_BYTES,
        }
    );

    let result = comb.execute(&refs).unwrap();
    assert_eq!(result.nb_dims(), 7);
    assert_eq!(result.domain_size(), 16384);
}

#[test]
fn test_estimates_match_execution() {
    let (_, tables) = three_tables();
    let refs: Vec<&Table> = tables.iter().collect();
    let comb = Combinator::default();

    let tracker = ExecutionTracker::new();
    comb.execute_tracked(&refs, Some(&tracker)).unwrap();
    assert_eq!(tracker.nb_operations(), comb.nb_operations(&refs).unwrap());
    assert_eq!(tracker.memory_usage(), comb.memory_usage(&refs).unwrap());
}

#[test]
fn test_result_matches_pairwise_products() {
    let (_, tables) = three_tables();
    let refs: Vec<&Table> = tables.iter().collect();
    let greedy = Combinator::default().execute(&refs).unwrap();
    let naive = tables[2]
        .multiply(&tables[0])
        .unwrap()
        .multiply(&tables[1])
        .unwrap();
    assert!(greedy.equivalent(&naive, 1e-12));
}

#[test]
fn test_smallest_union_first_with_first_pair_tie_break() {
    let x = vars(4, 2);
    // {x0,x1} and {x2,x3} give 16 cells with anyone; {x0,x1}+{x1} gives 4
    let scopes = vec![vec![x[0], x[1]], vec![x[2], x[3]], vec![x[1]]];
    let plan = Combinator::default().plan(&scopes).unwrap();
    match &plan.steps()[0] {
        Step::Combine { vars, .. } => assert_eq!(vars, &vec![x[0], x[1]]),
        other => panic!("unexpected first step {other:?}"),
    }

    // all pairs tie: the first pair (0, 1) is combined first
    let scopes = vec![vec![x[0]], vec![x[1]], vec![x[2]]];
    let plan = Combinator::default().plan(&scopes).unwrap();
    match &plan.steps()[0] {
        Step::Combine { vars, .. } => assert_eq!(vars, &vec![x[0], x[1]]),
        other => panic!("unexpected first step {other:?}"),
    }
}

#[test]
fn test_empty_set_is_an_error() {
    let comb = Combinator::default();
    assert!(matches!(comb.execute(&[]), Err(Error::EmptyCombination)));
    assert!(matches!(comb.nb_operations(&[]), Err(Error::EmptyCombination)));
    assert!(matches!(comb.operations(&[]), Err(Error::EmptyCombination)));
}

#[test]
fn test_singleton_is_returned_unchanged() {
    let x = vars(2, 3);
    let t = filled(&x, 5);
    let comb = Combinator::default();

    let out = comb.execute(&[&t]).unwrap();
    match out {
        Cow::Borrowed(b) => assert!(std::ptr::eq(b, &t)),
        Cow::Owned(_) => panic!("a single table must not be copied"),
    }
    assert_eq!(comb.nb_operations(&[&t]).unwrap(), 0);
    assert_eq!(comb.memory_usage(&[&t]).unwrap(), MemoryUsage::default());

    let h = TableHandle::from_ref(&t);
    let (ops, result) = comb.operations(std::slice::from_ref(&h)).unwrap();
    assert!(ops.is_empty());
    assert_eq!(result, h);
}

#[test]
fn test_scalars_join_the_greedy_process() {
    let mut three = Table::new();
    three.fill(3.0);
    let four = Table::scalar(4.0);
    let out = Combinator::default().execute(&[&three, &four]).unwrap();
    assert!(out.is_scalar());
    assert_eq!(out.values(), &[12.0]);

    let x = vars(1, 5);
    let t = filled(&x, 0);
    let comb = Combinator::default();
    // combining with a scalar costs the other operand's size
    assert_eq!(comb.nb_operations(&[&t, &three]).unwrap(), 5);
}

#[test]
fn test_sum_combination() {
    let x = vars(2, 2);
    let a = Table::from_values(&[x[0]], vec![1.0, 2.0]).unwrap();
    let b = Table::from_values(&[x[1]], vec![10.0, 20.0]).unwrap();
    let mut comb = Combinator::default();
    comb.set_combination_function(CombineFn::SUM);
    assert_eq!(comb.combination_function(), CombineFn::SUM);
    let out = comb.execute(&[&a, &b]).unwrap();
    assert_eq!(out.values(), &[11.0, 12.0, 21.0, 22.0]);
}

#[test]
fn test_deferred_operations() {
    let (_, tables) = three_tables();
    let handles: Vec<TableHandle> = tables.iter().map(TableHandle::from_ref).collect();
    let comb = Combinator::default();

    let (ops, result) = comb.operations(&handles).unwrap();
    assert_eq!(ops.len(), 3);
    assert!(result.is_abstract());
    assert_eq!(result.vars().len(), 7);

    let total: usize = ops.iter().map(|op| op.nb_operations()).sum();
    assert_eq!(total, 16641);
}

#[test]
fn test_scheduled_combination_matches_immediate() {
    let (_, tables) = three_tables();
    let refs: Vec<&Table> = tables.iter().collect();
    let handles: Vec<TableHandle> = tables.iter().map(TableHandle::from_ref).collect();
    let comb = Combinator::default();

    let mut schedule = Schedule::new();
    let result = comb.schedule(&mut schedule, &handles).unwrap();
    assert_eq!(schedule.nb_operations(), comb.nb_operations(&refs).unwrap());
    assert_eq!(schedule.memory_usage(), comb.memory_usage(&refs).unwrap());

    let stats = Executor::new(EngineConfig::default())
        .run(&mut schedule)
        .unwrap();
    assert_eq!(stats.executed, 3);
    assert_eq!(stats.nb_operations, 16641);
    assert_eq!(stats.memory, comb.memory_usage(&refs).unwrap());

    let immediate = comb.execute(&refs).unwrap();
    assert!(result.table().equivalent(&immediate, 1e-12));
}

#[test]
fn test_shared_result_survives_a_later_combination() {
    let x = vars(4, 4);
    let ta = filled(&[x[0]], 1);
    let tb = filled(&[x[0]], 2);
    let tc = filled(&[x[1], x[2], x[3]], 3);
    let (a, b, c) = (
        TableHandle::from_ref(&ta),
        TableHandle::from_ref(&tb),
        TableHandle::from_ref(&tc),
    );
    let comb = Combinator::default();

    let mut schedule = Schedule::new();
    let ab = comb.schedule(&mut schedule, &[a.clone(), b.clone()]).unwrap();
    let abc = comb.schedule(&mut schedule, &[a, b, c]).unwrap();

    // the second combination reuses a*b and drops its own claim on it
    assert_eq!(schedule.nb_owners(&ab), 1);
    assert!(!schedule.is_scheduled_for_deletion(&ab));
    let deletes_ab = schedule.operations().any(|(_, op)| {
        matches!(op.kind(), OperationKind::Delete) && op.args()[0] == ab
    });
    assert!(!deletes_ab);

    Executor::new(EngineConfig::default())
        .run(&mut schedule)
        .unwrap();
    assert!(ab.is_materialized());
    assert!(!ab.is_released());
    let expected_ab = comb.execute(&[&ta, &tb]).unwrap();
    assert!(ab.table().equivalent(&expected_ab, 1e-12));
    let expected_abc = comb.execute(&[&ta, &tb, &tc]).unwrap();
    assert!(abc.table().equivalent(&expected_abc, 1e-12));
}

#[test]
fn test_kernels_report_the_cells_they_write() {
    let (_, tables) = three_tables();
    let (t, steps) = CombineFn::PRODUCT.apply_counted(&tables[0], &tables[1]).unwrap();
    assert_eq!(steps, t.domain_size());
    assert_eq!(steps, 256);

    // a scalar broadcast writes one cell per cell of the other operand
    let (_, steps) = CombineFn::SUM
        .apply_counted(&Table::scalar(2.0), &tables[2])
        .unwrap();
    assert_eq!(steps, 64);

    let mut steps = 0;
    tables[0].combine_counted(&tables[2], f64::max, &mut steps).unwrap();
    tables[1].combine_counted(&tables[2], f64::max, &mut steps).unwrap();
    assert_eq!(steps, 2 * 4096);
}
