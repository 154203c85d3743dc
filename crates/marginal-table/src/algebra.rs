//! Combination and projection kernels.
//!
//! Counting convention (shared with the planners' estimators): a combination
//! performs one step per result cell, a projection one step per input cell.
//! The `*_counted` kernels add the iterations their loops actually ran to a
//! caller-owned counter.

use marginal_core::error::{Error, Result};
use marginal_core::variable::{difference, domain_product, union_scope, VariableSet};

use crate::reduce::Reduction;
use crate::table::{strides_of, Table, Walk};

impl Table {
    /// Cell-wise `f(self, other)` over the union of both scopes.
    ///
    /// The result scope is `self`'s scope followed by the variables of `other`
    /// that `self` lacks. A scalar operand is broadcast.
    pub fn combine_with<F>(&self, other: &Table, f: F) -> Result<Table>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.combine_counted(other, f, &mut 0)
    }

    /// `combine_with`, adding one to `steps` per cell written.
    pub fn combine_counted<F>(&self, other: &Table, f: F, steps: &mut usize) -> Result<Table>
    where
        F: Fn(f64, f64) -> f64,
    {
        let vars = union_scope(self.vars(), other.vars())?;
        let cells = domain_product(&vars)?;
        let sizes = vars.iter().map(|v| v.domain_size()).collect();
        let mut walk = Walk::new(sizes, [self.strides_on(&vars), other.strides_on(&vars)]);
        let (a, b) = (self.values(), other.values());
        let mut values = Vec::with_capacity(cells);
        for _ in 0..cells {
            let [i, j] = walk.offsets();
            values.push(f(a[i], b[j]));
            walk.advance();
            *steps += 1;
        }
        Ok(Table::from_parts(vars, values))
    }

    /// Eliminate the variables of `del` by folding their values with `f`,
    /// starting every retained cell from `init`.
    ///
    /// Variables of `del` outside the scope are ignored; eliminating the whole
    /// scope leaves a scalar.
    pub fn project_fold<F>(&self, del: &VariableSet, init: f64, f: F) -> Result<Table>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.project_fold_counted(del, init, f, &mut 0)
    }

    /// `project_fold`, adding one to `steps` per input cell folded.
    pub fn project_fold_counted<F>(
        &self,
        del: &VariableSet,
        init: f64,
        f: F,
        steps: &mut usize,
    ) -> Result<Table>
    where
        F: Fn(f64, f64) -> f64,
    {
        for v in self.vars() {
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
        let kept = difference(self.vars(), del);
        let mut acc = vec![init; domain_product(&kept)?];
        let sizes = self.vars().iter().map(|v| v.domain_size()).collect();
        let mut walk = Walk::new(sizes, [strides_of(&kept, self.vars())]);
        for &x in self.values() {
            let [o] = walk.offsets();
            acc[o] = f(acc[o], x);
            walk.advance();
            *steps += 1;
        }
        Ok(Table::from_parts(kept, acc))
    }

    pub fn project_with(&self, del: &VariableSet, reduction: Reduction) -> Result<Table> {
        self.project_with_counted(del, reduction, &mut 0)
    }

    pub fn project_with_counted(
        &self,
        del: &VariableSet,
        reduction: Reduction,
        steps: &mut usize,
    ) -> Result<Table> {
        self.project_fold_counted(del, reduction.neutral(), |acc, x| reduction.apply(acc, x), steps)
    }

    pub fn marg_sum_out(&self, del: &VariableSet) -> Result<Table> {
        self.project_with(del, Reduction::Sum)
    }

    pub fn marg_prod_out(&self, del: &VariableSet) -> Result<Table> {
        self.project_with(del, Reduction::Product)
    }

    pub fn marg_max_out(&self, del: &VariableSet) -> Result<Table> {
        self.project_with(del, Reduction::Max)
    }

    pub fn marg_min_out(&self, del: &VariableSet) -> Result<Table> {
        self.project_with(del, Reduction::Min)
    }

    pub fn marg_sum_in(&self, kept: &VariableSet) -> Result<Table> {
        self.project_with(&self.complement(kept), Reduction::Sum)
    }

    pub fn marg_prod_in(&self, kept: &VariableSet) -> Result<Table> {
        self.project_with(&self.complement(kept), Reduction::Product)
    }

    pub fn marg_max_in(&self, kept: &VariableSet) -> Result<Table> {
        self.project_with(&self.complement(kept), Reduction::Max)
    }

    pub fn marg_min_in(&self, kept: &VariableSet) -> Result<Table> {
        self.project_with(&self.complement(kept), Reduction::Min)
    }

    pub fn multiply(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, |a, b| a * b)
    }

    pub fn plus(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, |a, b| a + b)
    }

    pub fn minus(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, |a, b| a - b)
    }

    pub fn divide(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, |a, b| a / b)
    }

    pub fn maximum(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, f64::max)
    }

    pub fn minimum(&self, other: &Table) -> Result<Table> {
        self.combine_with(other, f64::min)
    }

    fn complement(&self, kept: &VariableSet) -> VariableSet {
        self.vars()
            .iter()
            .filter(|v| !kept.contains(*v))
            .copied()
            .collect()
    }
}
