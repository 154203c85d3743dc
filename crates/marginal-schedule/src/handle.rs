//! Table handles: abstract until the operation producing them runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use marginal_core::error::Result;
use marginal_core::id::HandleId;
use marginal_core::variable::{domain_product, Variable};
use marginal_table::Table;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(0);

/// Restart handle numbering from 0.
///
/// Meant for tests that compare traces; code building schedules should only
/// rely on the relative order of ids.
pub fn reset_id_generator() {
    NEXT_HANDLE_ID.store(0, Ordering::SeqCst);
}

fn next_handle_id() -> HandleId {
    HandleId::new(NEXT_HANDLE_ID.fetch_add(1, Ordering::SeqCst))
}

#[derive(Debug)]
enum HandleState {
    Abstract,
    Materialized(Arc<Table>),
    /// Freed by a delete operation.
    Released,
}

#[derive(Debug)]
struct HandleInner {
    id: HandleId,
    vars: Vec<Variable>,
    domain_size: usize,
    state: Mutex<HandleState>,
}

/// Shared reference to a (possibly not yet computed) table.
///
/// Cloning a handle clones the reference, not the table. States only move
/// forward: abstract, then materialized, then released.
#[derive(Debug, Clone)]
pub struct TableHandle {
    inner: Arc<HandleInner>,
}

impl TableHandle {
    /// Abstract handle for a table that will be produced over `vars`.
    pub fn abstract_over(vars: &[Variable]) -> Result<Self> {
        let domain_size = domain_product(vars)?;
        Ok(Self::build(vars.to_vec(), domain_size, HandleState::Abstract))
    }

    /// Materialized handle taking ownership of `table`.
    pub fn from_table(table: Table) -> Self {
        Self::from_shared(Arc::new(table))
    }

    /// Materialized handle over a copy of `table`.
    pub fn from_ref(table: &Table) -> Self {
        Self::from_table(table.clone())
    }

    /// Materialized handle sharing `table` with the caller, without copying.
    pub fn from_shared(table: Arc<Table>) -> Self {
        let vars = table.vars().to_vec();
        let domain_size = table.domain_size();
        Self::build(vars, domain_size, HandleState::Materialized(table))
    }

    fn build(vars: Vec<Variable>, domain_size: usize, state: HandleState) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: next_handle_id(),
                vars,
                domain_size,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn vars(&self) -> &[Variable] {
        &self.inner.vars
    }

    /// Number of cells of the table behind this handle.
    pub fn domain_size(&self) -> usize {
        self.inner.domain_size
    }

    pub fn is_abstract(&self) -> bool {
        matches!(*self.state(), HandleState::Abstract)
    }

    pub fn is_materialized(&self) -> bool {
        matches!(*self.state(), HandleState::Materialized(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.state(), HandleState::Released)
    }

    /// The materialized table.
    ///
    /// # Panics
    /// If the handle is still abstract or has been released.
    pub fn table(&self) -> Arc<Table> {
        match &*self.state() {
            HandleState::Materialized(t) => Arc::clone(t),
            HandleState::Abstract => panic!("table of abstract handle {self} read before materialization"),
            HandleState::Released => panic!("table of handle {self} read after release"),
        }
    }

    pub fn try_table(&self) -> Option<Arc<Table>> {
        match &*self.state() {
            HandleState::Materialized(t) => Some(Arc::clone(t)),
            _ => None,
        }
    }

    /// Give the handle its table.
    ///
    /// # Panics
    /// If the handle is not abstract or `table` has another scope.
    pub fn materialize(&self, table: Table) {
        assert!(
            table.nb_dims() == self.inner.vars.len()
                && self.inner.vars.iter().all(|v| table.contains(*v)),
            "handle {self} materialized with a table over another scope"
        );
        let mut state = self.state();
        assert!(
            matches!(*state, HandleState::Abstract),
            "handle {self} materialized twice"
        );
        *state = HandleState::Materialized(Arc::new(table));
    }

    /// Drop the handle's table; readers holding an `Arc` keep their copy alive.
    pub(crate) fn release(&self) -> Option<Arc<Table>> {
        let mut state = self.state();
        match std::mem::replace(&mut *state, HandleState::Released) {
            HandleState::Materialized(t) => Some(t),
            HandleState::Abstract => {
                *state = HandleState::Abstract;
                None
            }
            HandleState::Released => None,
        }
    }

    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for TableHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for TableHandle {}

impl std::hash::Hash for TableHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.inner.id.get())
    }
}
