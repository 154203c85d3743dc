//! Discrete variables and scope helpers.
//!
//! A `Variable` is a small `Copy` token: a process-unique `VarId` plus the
//! variable's domain size. Equality and hashing look at the id only, so two
//! tokens carrying the same id but different domain sizes compare equal and
//! the mismatch is caught where scopes meet (`union_scope`).
//!
//! Names and labels are not part of the token; they live in a
//! `VariableArena` so tables stay cheap to copy around.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::VarId;

/// Insertion-ordered set of variables (elimination sets, scopes under construction).
pub type VariableSet = IndexSet<Variable>;

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawVariable")]
pub struct Variable {
    id: VarId,
    domain_size: usize,
}

/// Wire form of a `Variable`, checked before it becomes one.
#[derive(Deserialize)]
struct RawVariable {
    id: VarId,
    domain_size: usize,
}

impl TryFrom<RawVariable> for Variable {
    type Error = Error;

    /// Loading a variable moves the fresh-id counter past its id, so later
    /// `Variable::fresh` calls never alias it.
    fn try_from(raw: RawVariable) -> Result<Self> {
        if raw.domain_size == 0 {
            return Err(Error::InvalidScope(format!(
                "variable v{} has an empty domain",
                raw.id.get()
            )));
        }
        NEXT_VAR_ID.fetch_max(raw.id.get().saturating_add(1), Ordering::Relaxed);
        Ok(Self::with_id(raw.id, raw.domain_size))
    }
}

impl Variable {
    /// Allocate a fresh variable, distinct from every other variable in the process.
    pub fn fresh(domain_size: usize) -> Result<Self> {
        if domain_size == 0 {
            return Err(Error::InvalidScope(
                "a variable needs a domain size of at least 1".into(),
            ));
        }
        let id = VarId::new(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed));
        Ok(Self { id, domain_size })
    }

    /// Build a token for an explicitly identified variable.
    ///
    /// Two tokens built from the same id denote the same variable; it is up to
    /// the caller to keep their domain sizes consistent.
    pub const fn with_id(id: VarId, domain_size: usize) -> Self {
        Self { id, domain_size }
    }

    pub const fn id(self) -> VarId {
        self.id
    }

    pub const fn domain_size(self) -> usize {
        self.domain_size
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Variable {}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id.get())
    }
}

/// Named registry of variables and their labels.
#[derive(Debug, Default, Clone)]
pub struct VariableArena {
    entries: IndexMap<VarId, VariableEntry>,
}

#[derive(Debug, Clone)]
struct VariableEntry {
    variable: Variable,
    name: String,
    labels: Vec<String>,
}

impl VariableArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable whose labels are `0..domain_size`.
    pub fn add(&mut self, name: impl Into<String>, domain_size: usize) -> Result<Variable> {
        let labels = (0..domain_size).map(|i| i.to_string()).collect();
        self.labelized(name, labels)
    }

    /// Register a variable with explicit labels; the domain size is the label count.
    pub fn labelized(&mut self, name: impl Into<String>, labels: Vec<String>) -> Result<Variable> {
        let name = name.into();
        let mut seen = std::collections::HashSet::new();
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(Error::InvalidScope(format!(
                    "duplicate label '{label}' for variable '{name}'"
                )));
            }
        }
        let variable = Variable::fresh(labels.len())?;
        self.entries.insert(
            variable.id(),
            VariableEntry {
                variable,
                name,
                labels,
            },
        );
        Ok(variable)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn name(&self, var: Variable) -> Option<&str> {
        self.entries.get(&var.id()).map(|e| e.name.as_str())
    }

    /// First variable registered under `name`.
    pub fn by_name(&self, name: &str) -> Result<Variable> {
        self.entries
            .values()
            .find(|e| e.name == name)
            .map(|e| e.variable)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    pub fn label(&self, var: Variable, value: usize) -> Option<&str> {
        self.entries
            .get(&var.id())
            .and_then(|e| e.labels.get(value))
            .map(String::as_str)
    }

    pub fn index_of(&self, var: Variable, label: &str) -> Result<usize> {
        let entry = self
            .entries
            .get(&var.id())
            .ok_or_else(|| Error::UnknownVariable(var.to_string()))?;
        entry
            .labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| Error::UnknownVariable(format!("{}={label}", entry.name)))
    }

    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.entries.values().map(|e| e.variable)
    }
}

/// Number of cells of a dense table over `vars`.
pub fn domain_product<'a, I>(vars: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a Variable>,
{
    vars.into_iter().try_fold(1usize, |acc, v| {
        acc.checked_mul(v.domain_size()).ok_or(Error::DomainOverflow)
    })
}

/// `a` followed by the variables of `b` not already present.
///
/// Shared variables must agree on their domain size.
pub fn union_scope(a: &[Variable], b: &[Variable]) -> Result<Vec<Variable>> {
    let mut out: Vec<Variable> = a.to_vec();
    for v in b {
        match a.iter().find(|w| *w == v) {
            Some(w) if w.domain_size() != v.domain_size() => {
                return Err(Error::DimensionMismatch {
                    variable: v.to_string(),
                    left: w.domain_size(),
                    right: v.domain_size(),
                })
            }
            Some(_) => {}
            None => out.push(*v),
        }
    }
    Ok(out)
}

/// Variables of `scope` that are not in `del`, in scope order.
pub fn difference(scope: &[Variable], del: &VariableSet) -> Vec<Variable> {
    scope.iter().filter(|v| !del.contains(*v)).copied().collect()
}

/// Reject scopes in which a variable occurs twice.
pub fn check_unique(scope: &[Variable]) -> Result<()> {
    let mut seen = VariableSet::with_capacity(scope.len());
    for v in scope {
        if !seen.insert(*v) {
            return Err(Error::InvalidScope(format!("{v} occurs twice")));
        }
    }
    Ok(())
}
