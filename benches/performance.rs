use criterion::{criterion_group, criterion_main, Criterion};
use marginal_core::config::EngineConfig;
use marginal_core::variable::{Variable, VariableArena, VariableSet};
use marginal_planner::{CombineAndProject, Combinator};
use marginal_schedule::{Executor, Schedule, TableHandle};
use marginal_table::Table;

/// A chain x0 - x1 - ... - x{n-1} of pairwise tables.
fn make_chain(n: usize, domain: usize) -> (Vec<Variable>, Vec<Table>) {
    let mut arena = VariableArena::new();
    let vars: Vec<Variable> = (0..n)
        .map(|i| arena.add(format!("x{i}"), domain).unwrap())
        .collect();
    let tables = vars
        .windows(2)
        .enumerate()
        .map(|(k, pair)| {
            let values = (0..domain * domain)
                .map(|i| ((i * 13 + k) % 17 + 1) as f64 / 17.0)
                .collect();
            Table::from_values(pair, values).unwrap()
        })
        .collect();
    (vars, tables)
}

fn bench_combination(c: &mut Criterion) {
    let (_, tables) = make_chain(6, 6);
    let refs: Vec<&Table> = tables.iter().collect();
    let comb = Combinator::default();
    c.bench_function("combine_chain", |b| {
        b.iter(|| {
            let _ = comb.execute(&refs).unwrap();
        })
    });
}

fn bench_elimination(c: &mut Criterion) {
    let (vars, tables) = make_chain(24, 8);
    let refs: Vec<&Table> = tables.iter().collect();
    let del: VariableSet = vars[1..vars.len() - 1].iter().copied().collect();
    let ve = CombineAndProject::default();
    c.bench_function("eliminate_chain", |b| {
        b.iter(|| {
            let _ = ve.execute(&refs, &del).unwrap();
        })
    });
    c.bench_function("plan_chain", |b| {
        b.iter(|| {
            let _ = ve.nb_operations(&refs, &del).unwrap();
        })
    });
}

fn bench_schedule(c: &mut Criterion) {
    let (vars, tables) = make_chain(24, 8);
    let del: VariableSet = vars[1..vars.len() - 1].iter().copied().collect();
    let ve = CombineAndProject::default();
    c.bench_function("execute_schedule", |b| {
        b.iter(|| {
            let handles: Vec<TableHandle> =
                tables.iter().map(TableHandle::from_ref).collect();
            let mut schedule = Schedule::new();
            for h in &handles {
                schedule.insert_schedule_multidim(h);
            }
            ve.schedule(&mut schedule, &handles, &del).unwrap();
            let _ = Executor::new(EngineConfig::default())
                .run(&mut schedule)
                .unwrap();
        })
    });
}

criterion_group!(inference, bench_combination, bench_elimination, bench_schedule);
criterion_main!(inference);
