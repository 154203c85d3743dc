//! Memory cap interfaces.
//!
//! Executors reserve the bytes of every table they materialize and give them
//! back when the table is deleted. The reservation is an RAII guard; the
//! concrete budget lives in `marginal-schedule`.

/// Bytes held on behalf of one materialized table. Dropping it releases them.
pub trait BudgetGuard: Send {
    fn bytes(&self) -> usize;

    /// What the bytes were reserved for, for diagnostics.
    fn tag(&self) -> &'static str {
        "table"
    }
}

/// A shared cap on the bytes held by live tables.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Reserve `bytes`, or `None` when they would exceed the cap.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    fn capacity_bytes(&self) -> usize;

    /// Bytes currently reserved. Advisory under concurrent use.
    fn used_bytes(&self) -> usize;
}
