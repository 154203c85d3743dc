//! Whole-table queries and in-place mutators.

use marginal_core::error::{Error, Result};
use marginal_core::variable::{Variable, VariableSet};

use crate::instantiation::Instantiation;
use crate::table::{strides_of, Table, Walk};

impl Table {
    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }

    pub fn product(&self) -> f64 {
        self.values().iter().product()
    }

    pub fn max(&self) -> f64 {
        self.values().iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.values().iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Largest value different from 1, or 1 if there is none.
    pub fn max_non_one(&self) -> f64 {
        self.values()
            .iter()
            .copied()
            .filter(|x| *x != 1.0)
            .reduce(f64::max)
            .unwrap_or(1.0)
    }

    /// Smallest value different from 0, or 0 if there is none.
    pub fn min_non_zero(&self) -> f64 {
        self.values()
            .iter()
            .copied()
            .filter(|x| *x != 0.0)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Every instantiation whose cell holds exactly `value`.
    pub fn find_all(&self, value: f64) -> Vec<Instantiation> {
        let mut found = Vec::new();
        let mut inst = self.instantiation();
        for &x in self.values() {
            if x == value {
                found.push(inst.clone());
            }
            inst.inc();
        }
        found
    }

    pub fn argmax(&self) -> (Vec<Instantiation>, f64) {
        let best = self.max();
        (self.find_all(best), best)
    }

    pub fn argmin(&self) -> (Vec<Instantiation>, f64) {
        let best = self.min();
        (self.find_all(best), best)
    }

    /// Expectation of `f` under this table, read as a joint distribution.
    pub fn expected_value<F>(&self, f: F) -> f64
    where
        F: Fn(&Instantiation) -> f64,
    {
        let mut inst = self.instantiation();
        let mut acc = 0.0;
        for &p in self.values() {
            acc += p * f(&inst);
            inst.inc();
        }
        acc
    }

    /// Shannon entropy in bits.
    pub fn entropy(&self) -> f64 {
        -self
            .values()
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| p * p.log2())
            .sum::<f64>()
    }

    /// KL divergence `D(self || other)` in bits.
    ///
    /// Both tables must have the same variables. A cell that is zero in one
    /// table and not in the other is an error.
    pub fn kl(&self, other: &Table) -> Result<f64> {
        let aligned = self.aligned(other)?;
        let mut acc = 0.0;
        for (&p, &q) in self.values().iter().zip(aligned.values()) {
            if (p == 0.0) != (q == 0.0) {
                return Err(Error::ZeroPatternMismatch);
            }
            if p != 0.0 {
                acc += p * (p / q).log2();
            }
        }
        Ok(acc)
    }

    pub fn fill(&mut self, value: f64) {
        self.values_mut().iter_mut().for_each(|x| *x = value);
    }

    pub fn fill_with(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.domain_size() {
            return Err(Error::InvalidScope(format!(
                "{} values given for a table of {} cells",
                values.len(),
                self.domain_size()
            )));
        }
        self.values_mut().copy_from_slice(values);
        Ok(())
    }

    /// Copy `src`, which must have the same variables in any order.
    pub fn fill_from(&mut self, src: &Table) -> Result<()> {
        let aligned = self.aligned(src)?;
        self.values_mut().copy_from_slice(aligned.values());
        Ok(())
    }

    /// Divide every cell by the total; left untouched when the total is 0.
    pub fn normalize(&mut self) {
        let total = self.sum();
        if total != 0.0 {
            self.values_mut().iter_mut().for_each(|x| *x /= total);
        }
    }

    /// Make every conditional distribution of `var` sum to 1.
    ///
    /// A scalar only needs to be non-zero and becomes 1.
    pub fn normalize_as_cpt(&mut self, var: Variable) -> Result<()> {
        if self.is_scalar() {
            if self.values()[0] == 0.0 {
                return Err(Error::DegenerateDistribution(
                    "scalar table holds 0".into(),
                ));
            }
            self.fill(1.0);
            return Ok(());
        }
        if !self.contains(var) {
            return Err(Error::UnknownVariable(var.to_string()));
        }
        let mut del = VariableSet::new();
        del.insert(var);
        let totals = self.marg_sum_out(&del)?;
        if let Some(pos) = totals.values().iter().position(|t| *t == 0.0) {
            return Err(Error::DegenerateDistribution(format!(
                "distribution of {var} number {pos} sums to 0"
            )));
        }
        let sizes = self.vars().iter().map(|v| v.domain_size()).collect();
        let mut walk = Walk::new(sizes, [strides_of(totals.vars(), self.vars())]);
        for x in self.values_mut() {
            *x /= totals.values()[walk.offsets()[0]];
            walk.advance();
        }
        Ok(())
    }

    pub fn scale(&mut self, factor: f64) {
        self.map_in_place(|x| x * factor);
    }

    pub fn translate(&mut self, offset: f64) {
        self.map_in_place(|x| x + offset);
    }

    pub fn inverse(&mut self) {
        self.map_in_place(|x| 1.0 / x);
    }

    pub fn abs(&mut self) {
        self.map_in_place(f64::abs);
    }

    pub fn sq(&mut self) {
        self.map_in_place(|x| x * x);
    }

    pub fn log2(&mut self) {
        self.map_in_place(f64::log2);
    }

    /// -1, 0 or 1 according to the sign of each cell.
    pub fn sgn(&mut self) {
        self.map_in_place(|x| {
            if x > 0.0 {
                1.0
            } else if x < 0.0 {
                -1.0
            } else {
                0.0
            }
        });
    }

    pub fn map_in_place<F: Fn(f64) -> f64>(&mut self, f: F) {
        self.values_mut().iter_mut().for_each(|x| *x = f(*x));
    }

    /// `other` stored in this table's order; both must share the same variables.
    fn aligned(&self, other: &Table) -> Result<Table> {
        if other.nb_dims() != self.nb_dims() {
            return Err(Error::InvalidScope(format!(
                "tables have {} and {} variables",
                self.nb_dims(),
                other.nb_dims()
            )));
        }
        for v in self.vars() {
            match other.vars().iter().find(|w| *w == v) {
                None => return Err(Error::UnknownVariable(v.to_string())),
                Some(w) if w.domain_size() != v.domain_size() => {
                    return Err(Error::DimensionMismatch {
                        variable: v.to_string(),
                        left: v.domain_size(),
                        right: w.domain_size(),
                    })
                }
                Some(_) => {}
            }
        }
        other.reorganize(self.vars())
    }
}
