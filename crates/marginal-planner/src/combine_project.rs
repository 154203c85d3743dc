//! Interleaved combination and elimination (variable elimination).
//!
//! Instead of combining every table and projecting once, each variable to
//! eliminate is removed as soon as all the tables mentioning it have been
//! combined. The variable handled next is the one whose tables span the
//! fewest cells, unless an elimination order is supplied.

use std::borrow::Cow;

use marginal_core::config::EngineConfig;
use marginal_core::cost::MemoryUsage;
use marginal_core::error::{Error, Result};
use marginal_core::variable::{domain_product, union_scope, Variable, VariableSet};
use marginal_schedule::{ExecutionTracker, Schedule, ScheduleOperation, TableHandle};
use marginal_table::{CombineFn, ProjectFn, Table};

use crate::combination::{handle_scopes, scopes_of};
use crate::plan::{Operand, Plan, PlanBuilder, Slot};

#[derive(Debug, Clone)]
pub struct CombineAndProject {
    combine: CombineFn,
    project: ProjectFn,
    order: Vec<Variable>,
    cfg: EngineConfig,
}

impl CombineAndProject {
    pub fn new(combine: CombineFn, project: ProjectFn) -> Self {
        Self {
            combine,
            project,
            order: Vec::new(),
            cfg: EngineConfig::default(),
        }
    }

    /// Eliminate variables in this order first; the ones it does not mention
    /// are then eliminated greedily. Variables not asked for are ignored.
    pub fn with_elimination_order(mut self, order: Vec<Variable>) -> Self {
        self.order = order;
        self
    }

    /// Executing or scheduling a plan whose estimated peak exceeds
    /// `cfg.mem_cap_bytes` is refused.
    pub fn with_config(mut self, cfg: EngineConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn combination_function(&self) -> CombineFn {
        self.combine
    }

    pub fn set_combination_function(&mut self, combine: CombineFn) {
        self.combine = combine;
    }

    pub fn projection_function(&self) -> ProjectFn {
        self.project
    }

    pub fn set_projection_function(&mut self, project: ProjectFn) {
        self.project = project;
    }

    /// Plan the elimination of `del` from tables over `scopes`.
    ///
    /// The plan's outputs are the tables left once no variable of `del`
    /// remains: untouched inputs first, in input order, then the tables built
    /// by eliminations, oldest first.
    pub fn plan(&self, scopes: &[Vec<Variable>], del: &VariableSet) -> Result<Plan> {
        let mut builder = PlanBuilder::new(scopes.to_vec(), self.combine, self.project)?;
        let mut live = builder.input_operands();

        for op in &live {
            for v in &op.vars {
                if let Some(d) = del.get(v) {
                    if d.domain_size() != v.domain_size() {
                        return Err(Error::DimensionMismatch {
                            variable: v.to_string(),
                            left: v.domain_size(),
                            right: d.domain_size(),
                        });
                    }
                }
            }
        }

        let mut pending: Vec<Variable> = del
            .iter()
            .filter(|v| live.iter().any(|op| op.vars.contains(*v)))
            .copied()
            .collect();

        while !pending.is_empty() {
            let var = self.next_variable(&pending, &live)?;
            let (gathered, rest): (Vec<Operand>, Vec<Operand>) =
                live.into_iter().partition(|op| op.vars.contains(&var));
            live = rest;

            // Everything whose tables are all gathered goes in the same projection.
            let eliminated: VariableSet = pending
                .iter()
                .filter(|v| !live.iter().any(|op| op.vars.contains(*v)))
                .copied()
                .collect();

            #[cfg(feature = "tracing")]
            tracing::debug!(
                var = %var,
                tables = gathered.len(),
                eliminated = eliminated.len(),
                "eliminating"
            );

            let joint = if gathered.len() > 1 {
                Some(builder.combine_greedy(gathered.clone())?)
            } else {
                None
            };
            let source = joint.as_ref().unwrap_or(&gathered[0]);
            let projected = builder.project(source, eliminated.clone());
            if let Some(joint) = &joint {
                builder.delete(joint);
            }
            for op in gathered.iter().filter(|op| op.temporary) {
                builder.delete(op);
            }

            pending.retain(|v| !eliminated.contains(v));
            live.push(projected);
        }

        let mut outputs: Vec<_> = live.iter().map(|op| op.slot).collect();
        outputs.sort_by_key(|slot| match slot {
            Slot::Input(i) => (0, *i),
            Slot::Step(k) => (1, *k),
        });
        Ok(builder.finish(outputs))
    }

    /// `plan`, refused when its peak does not fit the configured cap.
    fn checked_plan(&self, scopes: &[Vec<Variable>], del: &VariableSet) -> Result<Plan> {
        let plan = self.plan(scopes, del)?;
        self.cfg.check_budget(plan.memory_usage().peak_bytes)?;
        Ok(plan)
    }

    fn next_variable(&self, pending: &[Variable], live: &[Operand]) -> Result<Variable> {
        if let Some(v) = self.order.iter().find(|v| pending.contains(*v)) {
            return Ok(*v);
        }
        let mut best: Option<(Variable, usize)> = None;
        for var in pending {
            let mut scope: Vec<Variable> = Vec::new();
            for op in live.iter().filter(|op| op.vars.contains(var)) {
                scope = union_scope(&scope, &op.vars)?;
            }
            let weight = domain_product(&scope)?;
            if best.map_or(true, |(_, w)| weight < w) {
                best = Some((*var, weight));
            }
        }
        best.map(|(v, _)| v)
            .ok_or_else(|| Error::Invariant("no variable left to eliminate".into()))
    }

    pub fn execute<'a>(&self, tables: &[&'a Table], del: &VariableSet) -> Result<Vec<Cow<'a, Table>>> {
        self.execute_tracked(tables, del, None)
    }

    pub fn execute_tracked<'a>(
        &self,
        tables: &[&'a Table],
        del: &VariableSet,
        tracker: Option<&ExecutionTracker>,
    ) -> Result<Vec<Cow<'a, Table>>> {
        self.checked_plan(&scopes_of(tables), del)?.execute(tables, tracker)
    }

    pub fn nb_operations(&self, tables: &[&Table], del: &VariableSet) -> Result<usize> {
        Ok(self.plan(&scopes_of(tables), del)?.nb_operations())
    }

    pub fn nb_operations_of(&self, scopes: &[Vec<Variable>], del: &VariableSet) -> Result<usize> {
        Ok(self.plan(scopes, del)?.nb_operations())
    }

    pub fn memory_usage(&self, tables: &[&Table], del: &VariableSet) -> Result<MemoryUsage> {
        Ok(self.plan(&scopes_of(tables), del)?.memory_usage())
    }

    pub fn memory_usage_of(
        &self,
        scopes: &[Vec<Variable>],
        del: &VariableSet,
    ) -> Result<MemoryUsage> {
        Ok(self.plan(scopes, del)?.memory_usage())
    }

    /// The operations eliminating `del` from `handles`, and the result handles.
    pub fn operations(
        &self,
        handles: &[TableHandle],
        del: &VariableSet,
    ) -> Result<(Vec<ScheduleOperation>, Vec<TableHandle>)> {
        self.checked_plan(&handle_scopes(handles), del)?.operations(handles)
    }

    pub fn schedule(
        &self,
        schedule: &mut Schedule,
        handles: &[TableHandle],
        del: &VariableSet,
    ) -> Result<Vec<TableHandle>> {
        self.checked_plan(&handle_scopes(handles), del)?
            .schedule_into(schedule, handles)
    }
}

impl Default for CombineAndProject {
    fn default() -> Self {
        Self::new(CombineFn::PRODUCT, ProjectFn::SUM)
    }
}
