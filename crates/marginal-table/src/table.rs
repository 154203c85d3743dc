//! Dense table storage, construction, cell access, and reshaping.

use std::fmt;

use serde::{Deserialize, Serialize};

use marginal_core::error::{Error, Result};
use marginal_core::variable::{check_unique, domain_product, Variable};

use crate::instantiation::Instantiation;

/// A dense table over an ordered scope; the first variable varies fastest.
///
/// The empty scope denotes a scalar (one cell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    vars: Vec<Variable>,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawTable {
    vars: Vec<Variable>,
    values: Vec<f64>,
}

impl TryFrom<RawTable> for Table {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        Self::from_values(&raw.vars, raw.values)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    /// Scalar table holding 0.
    pub fn new() -> Self {
        Self::scalar(0.0)
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            vars: Vec::new(),
            values: vec![value],
        }
    }

    /// Zero-filled table over `vars`, allocated once.
    pub fn with_vars(vars: &[Variable]) -> Result<Self> {
        check_unique(vars)?;
        let cells = domain_product(vars)?;
        Ok(Self {
            vars: vars.to_vec(),
            values: vec![0.0; cells],
        })
    }

    pub fn from_values(vars: &[Variable], values: Vec<f64>) -> Result<Self> {
        check_unique(vars)?;
        let cells = domain_product(vars)?;
        if values.len() != cells {
            return Err(Error::InvalidScope(format!(
                "{} values given for a table of {cells} cells",
                values.len()
            )));
        }
        Ok(Self {
            vars: vars.to_vec(),
            values,
        })
    }

    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    /// Append `var` as the slowest-varying dimension.
    ///
    /// Storage is reallocated on every call and existing values are replicated
    /// along the new dimension; prefer `builder()` when adding many variables.
    pub fn add_var(&mut self, var: Variable) -> Result<()> {
        if self.contains(var) {
            return Err(Error::InvalidScope(format!("{var} occurs twice")));
        }
        let cells = self
            .values
            .len()
            .checked_mul(var.domain_size())
            .ok_or(Error::DomainOverflow)?;
        let mut values = Vec::new();
        values
            .try_reserve_exact(cells)
            .map_err(|_| Error::DomainOverflow)?;
        for _ in 0..var.domain_size() {
            values.extend_from_slice(&self.values);
        }
        self.values = values;
        self.vars.push(var);
        Ok(())
    }

    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }

    pub fn nb_dims(&self) -> usize {
        self.vars.len()
    }

    pub fn contains(&self, var: Variable) -> bool {
        self.vars.contains(&var)
    }

    /// Number of cells.
    pub fn domain_size(&self) -> usize {
        self.values.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Odometer over this table's scope, positioned on the first cell.
    pub fn instantiation(&self) -> Instantiation {
        Instantiation::over(&self.vars)
    }

    pub fn strides(&self) -> Vec<usize> {
        strides_of(&self.vars, &self.vars)
    }

    /// Stride of each variable of `scope` inside this table (0 when absent).
    pub(crate) fn strides_on(&self, scope: &[Variable]) -> Vec<usize> {
        strides_of(&self.vars, scope)
    }

    /// Offset of the cell selected by `inst`, which may mention extra variables.
    pub fn offset(&self, inst: &Instantiation) -> Result<usize> {
        let mut offset = 0;
        let mut stride = 1;
        for v in &self.vars {
            let value = inst
                .value(*v)
                .ok_or_else(|| Error::IncompleteInstantiation(format!("{v} is not set")))?;
            if value >= v.domain_size() {
                return Err(Error::ValueOutOfRange {
                    variable: v.to_string(),
                    value,
                    domain_size: v.domain_size(),
                });
            }
            offset += value * stride;
            stride *= v.domain_size();
        }
        Ok(offset)
    }

    pub fn get(&self, inst: &Instantiation) -> Result<f64> {
        Ok(self.values[self.offset(inst)?])
    }

    pub fn set(&mut self, inst: &Instantiation, value: f64) -> Result<()> {
        let offset = self.offset(inst)?;
        self.values[offset] = value;
        Ok(())
    }

    /// Same content, stored in the order given by `order`, which must list
    /// exactly the variables of this table.
    pub fn reorganize(&self, order: &[Variable]) -> Result<Table> {
        check_unique(order)?;
        for v in order {
            if !self.contains(*v) {
                return Err(Error::UnknownVariable(v.to_string()));
            }
        }
        if order.len() != self.vars.len() {
            return Err(Error::InvalidScope(format!(
                "reorganize needs all {} variables of the table, got {}",
                self.vars.len(),
                order.len()
            )));
        }
        let src = self.strides_on(order);
        let sizes: Vec<usize> = order.iter().map(|v| v.domain_size()).collect();
        let mut walk = Walk::new(sizes, [src]);
        let mut values = Vec::with_capacity(self.values.len());
        for _ in 0..self.values.len() {
            values.push(self.values[walk.offsets()[0]]);
            walk.advance();
        }
        Ok(Table {
            vars: order.to_vec(),
            values,
        })
    }

    pub fn put_first(&self, var: Variable) -> Result<Table> {
        if !self.contains(var) {
            return Err(Error::UnknownVariable(var.to_string()));
        }
        let mut order = Vec::with_capacity(self.vars.len());
        order.push(var);
        order.extend(self.vars.iter().filter(|v| **v != var));
        self.reorganize(&order)
    }

    /// Sub-table obtained by fixing the variables that `inst` assigns.
    /// Variables of `inst` outside the scope are ignored.
    pub fn extract(&self, inst: &Instantiation) -> Result<Table> {
        let strides = self.strides();
        let mut base = 0;
        let mut kept = Vec::new();
        let mut kept_strides = Vec::new();
        for (v, stride) in self.vars.iter().zip(&strides) {
            match inst.value(*v) {
                Some(value) if value >= v.domain_size() => {
                    return Err(Error::ValueOutOfRange {
                        variable: v.to_string(),
                        value,
                        domain_size: v.domain_size(),
                    })
                }
                Some(value) => base += value * stride,
                None => {
                    kept.push(*v);
                    kept_strides.push(*stride);
                }
            }
        }
        let cells = domain_product(&kept)?;
        let sizes = kept.iter().map(|v| v.domain_size()).collect();
        let mut walk = Walk::new(sizes, [kept_strides]);
        let mut values = Vec::with_capacity(cells);
        for _ in 0..cells {
            values.push(self.values[base + walk.offsets()[0]]);
            walk.advance();
        }
        Ok(Table { vars: kept, values })
    }

    /// Same variables (in any order) and cell-wise equal within `tolerance`.
    pub fn equivalent(&self, other: &Table, tolerance: f64) -> bool {
        if self.vars.len() != other.vars.len()
            || self.vars.iter().any(|v| {
                other
                    .vars
                    .iter()
                    .find(|w| *w == v)
                    .map_or(true, |w| w.domain_size() != v.domain_size())
            })
        {
            return false;
        }
        match other.reorganize(&self.vars) {
            Ok(aligned) => self
                .values
                .iter()
                .zip(&aligned.values)
                .all(|(a, b)| a == b || (a - b).abs() <= tolerance),
            Err(_) => false,
        }
    }

    pub(crate) fn from_parts(vars: Vec<Variable>, values: Vec<f64>) -> Table {
        debug_assert_eq!(
            values.len(),
            vars.iter().map(|v| v.domain_size()).product::<usize>()
        );
        Table { vars, values }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut inst = self.instantiation();
        let mut i = 0;
        while !inst.is_end() {
            writeln!(f, "{inst} :: {}", self.values[i])?;
            inst.inc();
            i += 1;
        }
        Ok(())
    }
}

/// Bulk construction: the scope is fixed before storage is allocated.
#[derive(Debug, Default, Clone)]
pub struct TableBuilder {
    vars: Vec<Variable>,
    values: Option<Vec<f64>>,
    fill: f64,
}

impl TableBuilder {
    pub fn var(mut self, var: Variable) -> Self {
        self.vars.push(var);
        self
    }

    pub fn vars<I: IntoIterator<Item = Variable>>(mut self, vars: I) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn fill(mut self, value: f64) -> Self {
        self.fill = value;
        self
    }

    pub fn values(mut self, values: Vec<f64>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn build(self) -> Result<Table> {
        match self.values {
            Some(values) => Table::from_values(&self.vars, values),
            None => {
                check_unique(&self.vars)?;
                let cells = domain_product(&self.vars)?;
                Ok(Table {
                    vars: self.vars,
                    values: vec![self.fill; cells],
                })
            }
        }
    }
}

/// Strides of a table stored over `layout`, read along `scope`
/// (0 for variables of `scope` absent from `layout`).
pub(crate) fn strides_of(layout: &[Variable], scope: &[Variable]) -> Vec<usize> {
    let mut own = Vec::with_capacity(layout.len());
    let mut acc = 1;
    for v in layout {
        own.push(acc);
        acc *= v.domain_size();
    }
    scope
        .iter()
        .map(|v| layout.iter().position(|w| w == v).map_or(0, |i| own[i]))
        .collect()
}

/// Walks a mixed-radix counter over `sizes` (first digit fastest) and keeps
/// `N` linear offsets in sync, each with its own per-digit strides.
pub(crate) struct Walk<const N: usize> {
    sizes: Vec<usize>,
    strides: [Vec<usize>; N],
    counters: Vec<usize>,
    offsets: [usize; N],
}

impl<const N: usize> Walk<N> {
    pub(crate) fn new(sizes: Vec<usize>, strides: [Vec<usize>; N]) -> Self {
        let counters = vec![0; sizes.len()];
        Self {
            sizes,
            strides,
            counters,
            offsets: [0; N],
        }
    }

    #[inline]
    pub(crate) fn offsets(&self) -> [usize; N] {
        self.offsets
    }

    pub(crate) fn advance(&mut self) {
        for k in 0..self.sizes.len() {
            self.counters[k] += 1;
            for n in 0..N {
                self.offsets[n] += self.strides[n][k];
            }
            if self.counters[k] < self.sizes[k] {
                return;
            }
            for n in 0..N {
                self.offsets[n] -= self.strides[n][k] * self.sizes[k];
            }
            self.counters[k] = 0;
        }
    }
}
