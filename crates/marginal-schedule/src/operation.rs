//! Schedule operations: combine two tables, project one, or delete one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use marginal_core::error::{Error, Result};
use marginal_core::variable::{difference, union_scope, VariableSet};
use marginal_table::{CombineFn, ProjectFn};

use crate::handle::TableHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Combine(CombineFn),
    Project(ProjectFn),
    Delete,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Combine(_) => "combine",
            OperationKind::Project(_) => "project",
            OperationKind::Delete => "delete",
        }
    }
}

/// One node of a schedule.
///
/// Combine and project operations own an abstract result handle that their
/// execution materializes. A delete operation has no result; it releases its
/// argument. Each operation runs at most once.
#[derive(Debug)]
pub struct ScheduleOperation {
    kind: OperationKind,
    args: Vec<TableHandle>,
    del_vars: VariableSet,
    result: Option<TableHandle>,
    executed: AtomicBool,
    steps: AtomicUsize,
}

impl ScheduleOperation {
    pub fn combine(a: &TableHandle, b: &TableHandle, f: CombineFn) -> Result<Self> {
        let vars = union_scope(a.vars(), b.vars())?;
        Ok(Self {
            kind: OperationKind::Combine(f),
            args: vec![a.clone(), b.clone()],
            del_vars: VariableSet::new(),
            result: Some(TableHandle::abstract_over(&vars)?),
            executed: AtomicBool::new(false),
            steps: AtomicUsize::new(0),
        })
    }

    pub fn project(arg: &TableHandle, del_vars: VariableSet, f: ProjectFn) -> Result<Self> {
        for v in arg.vars() {
            if let Some(d) = del_vars.get(v) {
                if d.domain_size() != v.domain_size() {
                    return Err(Error::DimensionMismatch {
                        variable: v.to_string(),
                        left: v.domain_size(),
                        right: d.domain_size(),
                    });
                }
            }
        }
        let vars = difference(arg.vars(), &del_vars);
        Ok(Self {
            kind: OperationKind::Project(f),
            args: vec![arg.clone()],
            del_vars,
            result: Some(TableHandle::abstract_over(&vars)?),
            executed: AtomicBool::new(false),
            steps: AtomicUsize::new(0),
        })
    }

    pub fn delete(arg: &TableHandle) -> Self {
        Self {
            kind: OperationKind::Delete,
            args: vec![arg.clone()],
            del_vars: VariableSet::new(),
            result: None,
            executed: AtomicBool::new(false),
            steps: AtomicUsize::new(0),
        }
    }

    /// Same kind and arguments, with a fresh abstract result.
    pub fn duplicate(&self) -> Result<Self> {
        let result = match &self.result {
            Some(r) => Some(TableHandle::abstract_over(r.vars())?),
            None => None,
        };
        Ok(Self {
            kind: self.kind,
            args: self.args.clone(),
            del_vars: self.del_vars.clone(),
            result,
            executed: AtomicBool::new(false),
            steps: AtomicUsize::new(0),
        })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn args(&self) -> &[TableHandle] {
        &self.args
    }

    pub fn nb_args(&self) -> usize {
        self.args.len()
    }

    /// Variables eliminated by a projection; empty for other kinds.
    pub fn del_vars(&self) -> &VariableSet {
        &self.del_vars
    }

    pub fn result(&self) -> Option<&TableHandle> {
        self.result.as_ref()
    }

    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    /// Not yet executed and every argument materialized.
    pub fn is_executable(&self) -> bool {
        !self.is_executed() && self.args.iter().all(TableHandle::is_materialized)
    }

    /// Run the operation and materialize its result.
    ///
    /// Fails with `AlreadyExecuted` when another caller claimed the operation
    /// first; a failing kernel leaves the operation pending.
    ///
    /// # Panics
    /// If an argument is not materialized.
    pub fn execute(&self) -> Result<()> {
        if self
            .executed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyExecuted(self.to_string()));
        }
        for arg in &self.args {
            assert!(
                arg.is_materialized(),
                "operation `{self}` executed while argument {arg} is not materialized"
            );
        }
        let outcome = self.run_kernel();
        if outcome.is_err() {
            self.executed.store(false, Ordering::Release);
        }
        outcome
    }

    fn run_kernel(&self) -> Result<()> {
        let steps = match self.kind {
            OperationKind::Combine(f) => {
                let (table, steps) =
                    f.apply_counted(&self.args[0].table(), &self.args[1].table())?;
                self.materialize_result(table)?;
                steps
            }
            OperationKind::Project(f) => {
                let (table, steps) = f.apply_counted(&self.args[0].table(), &self.del_vars)?;
                self.materialize_result(table)?;
                steps
            }
            OperationKind::Delete => {
                self.args[0].release();
                1
            }
        };
        self.steps.store(steps, Ordering::Release);
        Ok(())
    }

    /// Steps the kernel reported on its last execution; 0 before it ran.
    pub fn measured_operations(&self) -> usize {
        self.steps.load(Ordering::Acquire)
    }

    fn materialize_result(&self, table: marginal_table::Table) -> Result<()> {
        let result = self
            .result
            .as_ref()
            .ok_or_else(|| Error::Invariant(format!("`{self}` has no result handle")))?;
        result.materialize(table);
        Ok(())
    }

    /// Scalar steps the operation performs: result cells for a combination,
    /// input cells for a projection, 1 for a deletion.
    pub fn nb_operations(&self) -> usize {
        match self.kind {
            OperationKind::Combine(_) => self.result.as_ref().map_or(0, TableHandle::domain_size),
            OperationKind::Project(_) => self.args[0].domain_size(),
            OperationKind::Delete => 1,
        }
    }

    /// Change in live cells caused by the operation.
    pub fn cell_delta(&self) -> isize {
        match self.kind {
            OperationKind::Combine(_) | OperationKind::Project(_) => {
                self.result.as_ref().map_or(0, TableHandle::domain_size) as isize
            }
            OperationKind::Delete => -(self.args[0].domain_size() as isize),
        }
    }
}

impl PartialEq for ScheduleOperation {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.args == other.args
            && self.del_vars.len() == other.del_vars.len()
            && self.del_vars.iter().all(|v| other.del_vars.contains(v))
    }
}

impl fmt::Display for ScheduleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            OperationKind::Combine(func) => write!(
                f,
                "{} = combine[{}] ( {} , {} )",
                DisplayResult(&self.result),
                func.name(),
                self.args[0],
                self.args[1]
            ),
            OperationKind::Project(func) => {
                write!(
                    f,
                    "{} = project[{}] ( {} , {{",
                    DisplayResult(&self.result),
                    func.name(),
                    self.args[0]
                )?;
                for (i, v) in self.del_vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "}} )")
            }
            OperationKind::Delete => write!(f, "delete ( {} )", self.args[0]),
        }
    }
}

struct DisplayResult<'a>(&'a Option<TableHandle>);

impl fmt::Display for DisplayResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(h) => write!(f, "{h}"),
            None => write!(f, "_"),
        }
    }
}
