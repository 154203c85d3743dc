//! Combination and projection functions as first-class values.
//!
//! The planners are generic over these. A `CombineFn` must be commutative and
//! associative, and a `ProjectFn` must reduce with an associative, commutative
//! operator; neither property can be checked here, so callers own them.
//! Two functions are the same function when their names match.
//!
//! Kernels add the loop iterations they ran to the counter they are given.

use std::fmt;

use marginal_core::error::Result;
use marginal_core::variable::VariableSet;

use crate::reduce::Reduction;
use crate::table::Table;

pub type CombineKernel = fn(&Table, &Table, &mut usize) -> Result<Table>;
pub type ProjectKernel = fn(&Table, &VariableSet, &mut usize) -> Result<Table>;

fn multiply(a: &Table, b: &Table, steps: &mut usize) -> Result<Table> {
    a.combine_counted(b, |x, y| x * y, steps)
}

fn add(a: &Table, b: &Table, steps: &mut usize) -> Result<Table> {
    a.combine_counted(b, |x, y| x + y, steps)
}

fn max(a: &Table, b: &Table, steps: &mut usize) -> Result<Table> {
    a.combine_counted(b, f64::max, steps)
}

fn min(a: &Table, b: &Table, steps: &mut usize) -> Result<Table> {
    a.combine_counted(b, f64::min, steps)
}

fn sum_out(t: &Table, del: &VariableSet, steps: &mut usize) -> Result<Table> {
    t.project_with_counted(del, Reduction::Sum, steps)
}

fn prod_out(t: &Table, del: &VariableSet, steps: &mut usize) -> Result<Table> {
    t.project_with_counted(del, Reduction::Product, steps)
}

fn max_out(t: &Table, del: &VariableSet, steps: &mut usize) -> Result<Table> {
    t.project_with_counted(del, Reduction::Max, steps)
}

fn min_out(t: &Table, del: &VariableSet, steps: &mut usize) -> Result<Table> {
    t.project_with_counted(del, Reduction::Min, steps)
}

#[derive(Clone, Copy)]
pub struct CombineFn {
    name: &'static str,
    kernel: CombineKernel,
}

impl CombineFn {
    pub const PRODUCT: CombineFn = CombineFn::new("multiply", multiply);
    pub const SUM: CombineFn = CombineFn::new("add", add);
    pub const MAX: CombineFn = CombineFn::new("max", max);
    pub const MIN: CombineFn = CombineFn::new("min", min);

    pub const fn new(name: &'static str, kernel: CombineKernel) -> Self {
        Self { name, kernel }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, a: &Table, b: &Table) -> Result<Table> {
        (self.kernel)(a, b, &mut 0)
    }

    /// Apply, also returning the number of cells the kernel wrote.
    pub fn apply_counted(&self, a: &Table, b: &Table) -> Result<(Table, usize)> {
        let mut steps = 0;
        let t = (self.kernel)(a, b, &mut steps)?;
        Ok((t, steps))
    }
}

impl PartialEq for CombineFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CombineFn {}

impl fmt::Debug for CombineFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CombineFn({})", self.name)
    }
}

#[derive(Clone, Copy)]
pub struct ProjectFn {
    name: &'static str,
    kernel: ProjectKernel,
}

impl ProjectFn {
    pub const SUM: ProjectFn = ProjectFn::new("sum", sum_out);
    pub const PRODUCT: ProjectFn = ProjectFn::new("product", prod_out);
    pub const MAX: ProjectFn = ProjectFn::new("max", max_out);
    pub const MIN: ProjectFn = ProjectFn::new("min", min_out);

    pub const fn new(name: &'static str, kernel: ProjectKernel) -> Self {
        Self { name, kernel }
    }

    pub const fn of(reduction: Reduction) -> Self {
        match reduction {
            Reduction::Sum => Self::SUM,
            Reduction::Product => Self::PRODUCT,
            Reduction::Max => Self::MAX,
            Reduction::Min => Self::MIN,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, table: &Table, del: &VariableSet) -> Result<Table> {
        (self.kernel)(table, del, &mut 0)
    }

    /// Apply, also returning the number of input cells the kernel folded.
    pub fn apply_counted(&self, table: &Table, del: &VariableSet) -> Result<(Table, usize)> {
        let mut steps = 0;
        let t = (self.kernel)(table, del, &mut steps)?;
        Ok((t, steps))
    }
}

impl PartialEq for ProjectFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ProjectFn {}

impl fmt::Debug for ProjectFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProjectFn({})", self.name)
    }
}
