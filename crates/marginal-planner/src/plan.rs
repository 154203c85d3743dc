//! Step plans shared by all planners.
//!
//! A plan refers to its inputs and intermediate results through `Slot`s.
//! Walking the steps in order gives the cost model:
//! - combine: one step per result cell, result allocated;
//! - project: one step per input cell, result allocated;
//! - delete: one step, the deleted table released.
//! Input tables are never allocated nor released by a plan.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use marginal_core::cost::{cells_to_bytes, MemoryUsage};
use marginal_core::error::{Error, Result};
use marginal_core::hash::{hash_serde, Hash256};
use marginal_core::variable::{difference, domain_product, union_scope, Variable, VariableSet};
use marginal_schedule::{ExecutionTracker, Schedule, ScheduleOperation, TableHandle};
use marginal_table::{CombineFn, ProjectFn, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// The i-th input table.
    Input(usize),
    /// The result of the i-th step.
    Step(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Combine {
        left: Slot,
        right: Slot,
        vars: Vec<Variable>,
    },
    Project {
        arg: Slot,
        del: VariableSet,
        vars: Vec<Variable>,
    },
    Delete {
        target: Slot,
    },
}

#[derive(Debug, Clone)]
pub struct Plan {
    inputs: Vec<Vec<Variable>>,
    steps: Vec<Step>,
    outputs: Vec<Slot>,
    combine: CombineFn,
    project: ProjectFn,
}

impl Plan {
    pub fn inputs(&self) -> &[Vec<Variable>] {
        &self.inputs
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn outputs(&self) -> &[Slot] {
        &self.outputs
    }

    /// Scope of the table living in `slot`.
    pub fn scope(&self, slot: Slot) -> &[Variable] {
        match slot {
            Slot::Input(i) => &self.inputs[i],
            Slot::Step(k) => match &self.steps[k] {
                Step::Combine { vars, .. } | Step::Project { vars, .. } => vars.as_slice(),
                Step::Delete { .. } => &[],
            },
        }
    }

    fn cells(&self, slot: Slot) -> usize {
        self.scope(slot).iter().map(|v| v.domain_size()).product()
    }

    pub fn nb_operations(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Combine { vars, .. } => cells_of(vars),
                Step::Project { arg, .. } => self.cells(*arg),
                Step::Delete { .. } => 1,
            })
            .sum()
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        let mut current = 0usize;
        let mut peak = 0usize;
        for step in &self.steps {
            match step {
                Step::Combine { vars, .. } | Step::Project { vars, .. } => {
                    current += cells_of(vars);
                    peak = peak.max(current);
                }
                Step::Delete { target } => current -= self.cells(*target),
            }
        }
        MemoryUsage {
            peak_bytes: cells_to_bytes(peak),
            final_bytes: cells_to_bytes(current),
        }
    }

    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(&(&self.inputs, &self.steps, &self.outputs))
    }

    /// Run the plan on `inputs`; outputs that are inputs come back borrowed.
    pub fn execute<'a>(
        &self,
        inputs: &[&'a Table],
        tracker: Option<&ExecutionTracker>,
    ) -> Result<Vec<Cow<'a, Table>>> {
        if inputs.len() != self.inputs.len() {
            return Err(Error::Invariant(format!(
                "plan expects {} tables, got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        let mut slots: Vec<Option<Table>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let produced = match step {
                Step::Combine { left, right, .. } => {
                    let (t, steps) = self.combine.apply_counted(
                        resolve(inputs, &slots, *left)?,
                        resolve(inputs, &slots, *right)?,
                    )?;
                    if let Some(tr) = tracker {
                        tr.record_operations(steps);
                        tr.record_created(t.domain_size());
                    }
                    Some(t)
                }
                Step::Project { arg, del, .. } => {
                    let src = resolve(inputs, &slots, *arg)?;
                    let (t, steps) = self.project.apply_counted(src, del)?;
                    if let Some(tr) = tracker {
                        tr.record_operations(steps);
                        tr.record_created(t.domain_size());
                    }
                    Some(t)
                }
                Step::Delete { target } => {
                    let Slot::Step(k) = *target else {
                        return Err(Error::Invariant("plans never delete their inputs".into()));
                    };
                    let freed = slots[k].take().ok_or_else(|| {
                        Error::Invariant(format!("step {k} deleted twice"))
                    })?;
                    if let Some(tr) = tracker {
                        tr.record_operations(1);
                        tr.record_released(freed.domain_size());
                    }
                    None
                }
            };
            slots.push(produced);
        }

        let mut out = Vec::with_capacity(self.outputs.len());
        for slot in &self.outputs {
            match *slot {
                Slot::Input(i) => out.push(Cow::Borrowed(inputs[i])),
                Slot::Step(k) => {
                    let t = slots[k].take().ok_or_else(|| {
                        Error::Invariant(format!("output step {k} was deleted"))
                    })?;
                    out.push(Cow::Owned(t));
                }
            }
        }
        Ok(out)
    }

    /// The plan as schedule operations over `inputs`, plus the handles of its
    /// outputs. Outputs that are inputs are returned as given.
    pub fn operations(
        &self,
        inputs: &[TableHandle],
    ) -> Result<(Vec<ScheduleOperation>, Vec<TableHandle>)> {
        let mut ops = Vec::with_capacity(self.steps.len());
        let handles = self.emit(inputs, |op| {
            let result = op.result().cloned();
            ops.push(op);
            Ok(result)
        })?;
        Ok((ops, handles))
    }

    /// Insert the plan into `schedule`. Inputs are registered as roots; when
    /// the schedule already computes an equal operation, its result is reused.
    pub fn schedule_into(
        &self,
        schedule: &mut Schedule,
        inputs: &[TableHandle],
    ) -> Result<Vec<TableHandle>> {
        for h in inputs {
            schedule.insert_schedule_multidim(h);
        }
        self.emit(inputs, |op| {
            let id = schedule.insert_operation(op)?;
            Ok(schedule.result_of(id).cloned())
        })
    }

    fn emit<F>(&self, inputs: &[TableHandle], mut sink: F) -> Result<Vec<TableHandle>>
    where
        F: FnMut(ScheduleOperation) -> Result<Option<TableHandle>>,
    {
        if inputs.len() != self.inputs.len() {
            return Err(Error::Invariant(format!(
                "plan expects {} handles, got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        let mut results: Vec<Option<TableHandle>> = Vec::with_capacity(self.steps.len());
        let handle = |results: &[Option<TableHandle>], slot: Slot| -> Result<TableHandle> {
            match slot {
                Slot::Input(i) => Ok(inputs[i].clone()),
                Slot::Step(k) => results[k]
                    .clone()
                    .ok_or_else(|| Error::Invariant(format!("step {k} has no result"))),
            }
        };
        for step in &self.steps {
            let op = match step {
                Step::Combine { left, right, .. } => ScheduleOperation::combine(
                    &handle(&results, *left)?,
                    &handle(&results, *right)?,
                    self.combine,
                )?,
                Step::Project { arg, del, .. } => {
                    ScheduleOperation::project(&handle(&results, *arg)?, del.clone(), self.project)?
                }
                Step::Delete { target } => ScheduleOperation::delete(&handle(&results, *target)?),
            };
            results.push(sink(op)?);
        }
        self.outputs
            .iter()
            .map(|slot| handle(&results, *slot))
            .collect()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: &Slot| match s {
            Slot::Input(i) => format!("in{i}"),
            Slot::Step(k) => format!("s{k}"),
        };
        for (k, step) in self.steps.iter().enumerate() {
            match step {
                Step::Combine { left, right, .. } => {
                    writeln!(f, "s{k} = {}({}, {})", self.combine.name(), name(left), name(right))?
                }
                Step::Project { arg, del, .. } => {
                    let del: Vec<String> = del.iter().map(|v| v.to_string()).collect();
                    writeln!(f, "s{k} = {}({}, [{}])", self.project.name(), name(arg), del.join(", "))?
                }
                Step::Delete { target } => writeln!(f, "delete {}", name(target))?,
            }
        }
        Ok(())
    }
}

fn cells_of(vars: &[Variable]) -> usize {
    vars.iter().map(|v| v.domain_size()).product()
}

fn resolve<'t>(inputs: &[&'t Table], slots: &'t [Option<Table>], slot: Slot) -> Result<&'t Table> {
    match slot {
        Slot::Input(i) => inputs
            .get(i)
            .copied()
            .ok_or_else(|| Error::Invariant(format!("no input {i}"))),
        Slot::Step(k) => slots
            .get(k)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Invariant(format!("step {k} used after deletion"))),
    }
}

/// A working table while planning: where it lives, its scope, and whether the
/// plan created it.
#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub(crate) slot: Slot,
    pub(crate) vars: Vec<Variable>,
    pub(crate) temporary: bool,
}

/// Incremental construction of a `Plan`.
pub(crate) struct PlanBuilder {
    inputs: Vec<Vec<Variable>>,
    steps: Vec<Step>,
    combine: CombineFn,
    project: ProjectFn,
}

impl PlanBuilder {
    pub(crate) fn new(inputs: Vec<Vec<Variable>>, combine: CombineFn, project: ProjectFn) -> Result<Self> {
        for scope in &inputs {
            domain_product(scope)?;
        }
        Ok(Self {
            inputs,
            steps: Vec::new(),
            combine,
            project,
        })
    }

    pub(crate) fn input_operands(&self) -> Vec<Operand> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, vars)| Operand {
                slot: Slot::Input(i),
                vars: vars.clone(),
                temporary: false,
            })
            .collect()
    }

    fn push(&mut self, step: Step) -> Slot {
        self.steps.push(step);
        Slot::Step(self.steps.len() - 1)
    }

    pub(crate) fn delete(&mut self, target: &Operand) {
        debug_assert!(target.temporary);
        self.push(Step::Delete {
            target: target.slot,
        });
    }

    pub(crate) fn project(&mut self, arg: &Operand, del: VariableSet) -> Operand {
        let vars = difference(&arg.vars, &del);
        let slot = self.push(Step::Project {
            arg: arg.slot,
            del,
            vars: vars.clone(),
        });
        Operand {
            slot,
            vars,
            temporary: true,
        }
    }

    /// Combine `operands` pairwise, always picking the pair whose union has
    /// the fewest cells. Ties go to the first pair `(i, j)`, `i < j`, in list
    /// order; the result takes position `i` and `j` is removed. Intermediate
    /// results are deleted as soon as they are consumed; the operands given
    /// by the caller are left alone.
    pub(crate) fn combine_greedy(&mut self, mut operands: Vec<Operand>) -> Result<Operand> {
        if operands.is_empty() {
            return Err(Error::EmptyCombination);
        }
        let mut own = vec![false; operands.len()];
        while operands.len() > 1 {
            let mut best: Option<(usize, usize, usize, Vec<Variable>)> = None;
            for i in 0..operands.len() {
                for j in (i + 1)..operands.len() {
                    let vars = union_scope(&operands[i].vars, &operands[j].vars)?;
                    let cells = domain_product(&vars)?;
                    if best.as_ref().map_or(true, |(_, _, c, _)| cells < *c) {
                        best = Some((i, j, cells, vars));
                    }
                }
            }
            let Some((i, j, _, vars)) = best else {
                return Err(Error::Invariant("no pair to combine".into()));
            };
            let slot = self.push(Step::Combine {
                left: operands[i].slot,
                right: operands[j].slot,
                vars: vars.clone(),
            });
            let right = operands.remove(j);
            let right_own = own.remove(j);
            let left = std::mem::replace(
                &mut operands[i],
                Operand {
                    slot,
                    vars,
                    temporary: true,
                },
            );
            let left_own = std::mem::replace(&mut own[i], true);
            if left_own {
                self.delete(&left);
            }
            if right_own {
                self.delete(&right);
            }
        }
        operands
            .pop()
            .ok_or_else(|| Error::Invariant("combination produced nothing".into()))
    }

    pub(crate) fn finish(self, outputs: Vec<Slot>) -> Plan {
        Plan {
            inputs: self.inputs,
            steps: self.steps,
            outputs,
            combine: self.combine,
            project: self.project,
        }
    }
}
