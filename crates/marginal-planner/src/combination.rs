//! Combination of several tables with a single function.

use std::borrow::Cow;

use marginal_core::cost::MemoryUsage;
use marginal_core::error::{Error, Result};
use marginal_core::variable::Variable;
use marginal_schedule::{ExecutionTracker, Schedule, ScheduleOperation, TableHandle};
use marginal_table::{CombineFn, ProjectFn, Table};

use crate::plan::{Plan, PlanBuilder};

/// Combines a set of tables by greedy pairwise merging: at each step the two
/// tables whose union scope has the fewest cells are combined first.
///
/// The combination function must be commutative and associative, otherwise
/// the result depends on the order the planner picks.
#[derive(Debug, Clone, Copy)]
pub struct Combinator {
    combine: CombineFn,
}

impl Combinator {
    pub fn new(combine: CombineFn) -> Self {
        Self { combine }
    }

    pub fn combination_function(&self) -> CombineFn {
        self.combine
    }

    pub fn set_combination_function(&mut self, combine: CombineFn) {
        self.combine = combine;
    }

    /// Plan the combination of tables over `scopes`.
    pub fn plan(&self, scopes: &[Vec<Variable>]) -> Result<Plan> {
        if scopes.is_empty() {
            return Err(Error::EmptyCombination);
        }
        let mut builder = PlanBuilder::new(scopes.to_vec(), self.combine, ProjectFn::SUM)?;
        let operands = builder.input_operands();
        let result = builder.combine_greedy(operands)?;
        Ok(builder.finish(vec![result.slot]))
    }

    /// Combine `tables`; a single table is returned as is.
    pub fn execute<'a>(&self, tables: &[&'a Table]) -> Result<Cow<'a, Table>> {
        self.execute_tracked(tables, None)
    }

    pub fn execute_tracked<'a>(
        &self,
        tables: &[&'a Table],
        tracker: Option<&ExecutionTracker>,
    ) -> Result<Cow<'a, Table>> {
        let plan = self.plan(&scopes_of(tables))?;
        plan.execute(tables, tracker)?
            .pop()
            .ok_or_else(|| Error::Invariant("combination returned no table".into()))
    }

    pub fn nb_operations(&self, tables: &[&Table]) -> Result<usize> {
        Ok(self.plan(&scopes_of(tables))?.nb_operations())
    }

    pub fn nb_operations_of(&self, scopes: &[Vec<Variable>]) -> Result<usize> {
        Ok(self.plan(scopes)?.nb_operations())
    }

    pub fn memory_usage(&self, tables: &[&Table]) -> Result<MemoryUsage> {
        Ok(self.plan(&scopes_of(tables))?.memory_usage())
    }

    pub fn memory_usage_of(&self, scopes: &[Vec<Variable>]) -> Result<MemoryUsage> {
        Ok(self.plan(scopes)?.memory_usage())
    }

    /// The operations combining `handles`, and the handle of the result.
    /// A single handle needs no operation and is its own result.
    pub fn operations(
        &self,
        handles: &[TableHandle],
    ) -> Result<(Vec<ScheduleOperation>, TableHandle)> {
        let plan = self.plan(&handle_scopes(handles))?;
        let (ops, mut results) = plan.operations(handles)?;
        let result = results
            .pop()
            .ok_or_else(|| Error::Invariant("combination returned no handle".into()))?;
        Ok((ops, result))
    }

    /// Insert the combination of `handles` into `schedule`.
    pub fn schedule(&self, schedule: &mut Schedule, handles: &[TableHandle]) -> Result<TableHandle> {
        let plan = self.plan(&handle_scopes(handles))?;
        plan.schedule_into(schedule, handles)?
            .pop()
            .ok_or_else(|| Error::Invariant("combination returned no handle".into()))
    }
}

impl Default for Combinator {
    fn default() -> Self {
        Self::new(CombineFn::PRODUCT)
    }
}

pub(crate) fn scopes_of(tables: &[&Table]) -> Vec<Vec<Variable>> {
    tables.iter().map(|t| t.vars().to_vec()).collect()
}

pub(crate) fn handle_scopes(handles: &[TableHandle]) -> Vec<Vec<Variable>> {
    handles.iter().map(|h| h.vars().to_vec()).collect()
}
