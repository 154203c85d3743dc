//! Assignments of values to variables, doubling as an odometer over a scope.

use std::fmt;

use marginal_core::error::{Error, Result};
use marginal_core::variable::Variable;

/// An assignment `variable -> value index`.
///
/// Iterating with `first`/`inc`/`is_end` walks every joint value of the
/// variables in the order they were added, the first one varying fastest,
/// which is the storage order of a `Table` over the same scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instantiation {
    vars: Vec<Variable>,
    values: Vec<usize>,
    end: bool,
}

impl Instantiation {
    pub fn new() -> Self {
        Self::default()
    }

    /// All variables of `scope` set to 0.
    pub fn over(scope: &[Variable]) -> Self {
        Self {
            vars: scope.to_vec(),
            values: vec![0; scope.len()],
            end: false,
        }
    }

    /// Add `var` or change its value.
    pub fn set(&mut self, var: Variable, value: usize) -> Result<()> {
        if value >= var.domain_size() {
            return Err(Error::ValueOutOfRange {
                variable: var.to_string(),
                value,
                domain_size: var.domain_size(),
            });
        }
        match self.position(var) {
            Some(i) => self.values[i] = value,
            None => {
                self.vars.push(var);
                self.values.push(value);
            }
        }
        Ok(())
    }

    /// Builder-style `set`.
    pub fn with(mut self, var: Variable, value: usize) -> Result<Self> {
        self.set(var, value)?;
        Ok(self)
    }

    pub fn value(&self, var: Variable) -> Option<usize> {
        self.position(var).map(|i| self.values[i])
    }

    pub fn contains(&self, var: Variable) -> bool {
        self.position(var).is_some()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn first(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0);
        self.end = false;
    }

    /// Advance to the next joint value; past the last one `is_end` turns true.
    pub fn inc(&mut self) {
        for (value, var) in self.values.iter_mut().zip(&self.vars) {
            *value += 1;
            if *value < var.domain_size() {
                return;
            }
            *value = 0;
        }
        self.end = true;
    }

    pub fn is_end(&self) -> bool {
        self.end
    }

    fn position(&self, var: Variable) -> Option<usize> {
        self.vars.iter().position(|v| *v == var)
    }
}

impl fmt::Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<")?;
        for (i, (var, value)) in self.vars.iter().zip(&self.values).enumerate() {
            if i > 0 {
                write!(f, "|")?;
            }
            write!(f, "{var}:{value}")?;
        }
        write!(f, ">")
    }
}
