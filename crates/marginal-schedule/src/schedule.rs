//! The schedule DAG.
//!
//! Nodes are operations; an operation depends on the producers of its
//! arguments, and a deletion additionally depends on every operation that
//! reads the deleted handle. Arguments must already be known when an
//! operation is inserted and results are always fresh handles, so the graph
//! is acyclic by construction.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use marginal_core::cost::{cells_to_bytes, MemoryUsage};
use marginal_core::error::{Error, Result};
use marginal_core::hash::{hash_serde, Hash256};
use marginal_core::id::{HandleId, OpId};

use crate::handle::TableHandle;
use crate::operation::{OperationKind, ScheduleOperation};

#[derive(Debug, Default)]
pub struct Schedule {
    handles: IndexMap<HandleId, TableHandle>,
    ops: IndexMap<OpId, Arc<ScheduleOperation>>,
    next_op: u64,
    producer: HashMap<HandleId, OpId>,
    readers: HashMap<HandleId, Vec<OpId>>,
    deleter: HashMap<HandleId, OpId>,
    owners: HashMap<HandleId, usize>,
    parents: HashMap<OpId, Vec<OpId>>,
    children: HashMap<OpId, Vec<OpId>>,
    pending_parents: HashMap<OpId, usize>,
    propagated: HashSet<OpId>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root handle (materialized, or abstract and filled by the caller).
    /// Registering a handle twice is a no-op.
    pub fn insert_schedule_multidim(&mut self, handle: &TableHandle) {
        self.handles
            .entry(handle.id())
            .or_insert_with(|| handle.clone());
    }

    pub fn contains_handle(&self, handle: &TableHandle) -> bool {
        self.handles.contains_key(&handle.id())
    }

    pub fn handle(&self, id: HandleId) -> Option<&TableHandle> {
        self.handles.get(&id)
    }

    /// Whether a deletion of `handle` has been inserted.
    pub fn is_scheduled_for_deletion(&self, handle: &TableHandle) -> bool {
        self.deleter.contains_key(&handle.id())
    }

    /// Insertions sharing the result of `handle`'s producer and not yet
    /// released by a deletion; 0 for root handles.
    pub fn nb_owners(&self, handle: &TableHandle) -> usize {
        self.owners.get(&handle.id()).copied().unwrap_or(0)
    }

    /// Insert `op` and return the id of the node computing it.
    ///
    /// A combination or projection structurally equal to one already in the
    /// schedule is not inserted again: the existing node's id is returned,
    /// unless that node's result is scheduled for deletion. Every such
    /// insertion makes its caller an owner of the shared result.
    ///
    /// Deleting a result that still has other owners only drops the caller's
    /// ownership: no node is added and the producer's id is returned. The
    /// last owner's deletion is inserted as a regular node.
    pub fn insert_operation(&mut self, op: ScheduleOperation) -> Result<OpId> {
        for arg in op.args() {
            if !self.contains_handle(arg) {
                return Err(Error::Schedule(format!(
                    "argument {arg} of `{op}` is not part of the schedule"
                )));
            }
            if self.is_scheduled_for_deletion(arg) {
                return Err(Error::Schedule(format!(
                    "argument {arg} of `{op}` is used after its deletion"
                )));
            }
        }

        if matches!(op.kind(), OperationKind::Delete) {
            let target = op.args()[0].id();
            if let Some(owners) = self.owners.get_mut(&target) {
                if *owners > 1 {
                    *owners -= 1;
                    if let Some(producer) = self.producer.get(&target) {
                        return Ok(*producer);
                    }
                }
            }
        } else if let Some(existing) = self.find_equal(&op) {
            if let Some(result) = self.result_of(existing).map(TableHandle::id) {
                *self.owners.entry(result).or_insert(1) += 1;
            }
            return Ok(existing);
        }

        let id = OpId::new(self.next_op);
        self.next_op += 1;

        let mut parents: Vec<OpId> = Vec::new();
        for arg in op.args() {
            if let Some(p) = self.producer.get(&arg.id()) {
                parents.push(*p);
            }
        }
        if matches!(op.kind(), OperationKind::Delete) {
            let target = op.args()[0].id();
            if let Some(readers) = self.readers.get(&target) {
                parents.extend(readers.iter().copied());
            }
            self.deleter.insert(target, id);
        } else {
            for arg in op.args() {
                self.readers.entry(arg.id()).or_default().push(id);
            }
        }
        parents.sort();
        parents.dedup();

        if let Some(result) = op.result() {
            self.handles.insert(result.id(), result.clone());
            self.producer.insert(result.id(), id);
            self.owners.insert(result.id(), 1);
        }

        let pending = parents
            .iter()
            .filter(|p| !self.propagated.contains(*p))
            .count();
        for p in &parents {
            self.children.entry(*p).or_default().push(id);
        }
        self.pending_parents.insert(id, pending);
        self.parents.insert(id, parents);
        self.ops.insert(id, Arc::new(op));
        Ok(id)
    }

    fn find_equal(&self, op: &ScheduleOperation) -> Option<OpId> {
        self.ops.iter().find_map(|(id, existing)| {
            let reusable = existing
                .result()
                .map_or(false, |r| !self.is_scheduled_for_deletion(r));
            (reusable && **existing == *op).then_some(*id)
        })
    }

    pub fn operation(&self, id: OpId) -> Option<&ScheduleOperation> {
        self.ops.get(&id).map(|op| op.as_ref())
    }

    pub(crate) fn shared_operation(&self, id: OpId) -> Option<Arc<ScheduleOperation>> {
        self.ops.get(&id).cloned()
    }

    /// Operations in insertion order, which is a topological order.
    pub fn operations(&self) -> impl Iterator<Item = (OpId, &ScheduleOperation)> + '_ {
        self.ops.iter().map(|(id, op)| (*id, op.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Operations that must run before `id`.
    pub fn dependencies(&self, id: OpId) -> &[OpId] {
        self.parents.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Result handle of operation `id`, if it has one.
    pub fn result_of(&self, id: OpId) -> Option<&TableHandle> {
        self.ops.get(&id).and_then(|op| op.result())
    }

    /// Pending operations whose dependencies have run and whose arguments are
    /// materialized, by increasing id.
    pub fn available_operations(&self) -> Vec<OpId> {
        self.ops
            .keys()
            .copied()
            .filter(|id| self.is_available(*id))
            .collect()
    }

    fn is_available(&self, id: OpId) -> bool {
        match self.ops.get(&id) {
            Some(op) => {
                self.pending_parents.get(&id).copied().unwrap_or(0) == 0 && op.is_executable()
            }
            None => false,
        }
    }

    /// Record that `id` has executed and append the operations that became
    /// available because of it to `new_available`.
    pub fn update_after_execution(&mut self, id: OpId, new_available: &mut Vec<OpId>) -> Result<()> {
        let op = self
            .ops
            .get(&id)
            .ok_or_else(|| Error::Schedule(format!("unknown operation {id}")))?;
        if !op.is_executed() {
            return Err(Error::Schedule(format!(
                "operation {id} (`{op}`) has not been executed"
            )));
        }
        if !self.propagated.insert(id) {
            return Ok(());
        }
        let children = self.children.get(&id).cloned().unwrap_or_default();
        for child in children {
            if let Some(pending) = self.pending_parents.get_mut(&child) {
                *pending = pending.saturating_sub(1);
            }
            if self.is_available(child) {
                new_available.push(child);
            }
        }
        Ok(())
    }

    /// Execute `id` and propagate; returns the newly available operations.
    pub fn execute(&mut self, id: OpId) -> Result<Vec<OpId>> {
        let op = self
            .ops
            .get(&id)
            .ok_or_else(|| Error::Schedule(format!("unknown operation {id}")))?;
        op.execute()?;
        let mut new_available = Vec::new();
        self.update_after_execution(id, &mut new_available)?;
        Ok(new_available)
    }

    /// Operations not executed yet.
    pub fn remaining(&self) -> usize {
        self.ops.values().filter(|op| !op.is_executed()).count()
    }

    /// Scalar steps of all pending operations.
    pub fn nb_operations(&self) -> usize {
        self.ops
            .values()
            .filter(|op| !op.is_executed())
            .map(|op| op.nb_operations())
            .sum()
    }

    /// Memory profile of the pending operations run in insertion order.
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut current: isize = 0;
        let mut peak: isize = 0;
        for op in self.ops.values().filter(|op| !op.is_executed()) {
            current += op.cell_delta();
            peak = peak.max(current);
        }
        MemoryUsage {
            peak_bytes: cells_to_bytes(peak.max(0) as usize),
            final_bytes: cells_to_bytes(current.max(0) as usize),
        }
    }

    /// Stable digest of the schedule's structure, independent of absolute
    /// handle ids.
    pub fn fingerprint(&self) -> Result<Hash256> {
        let mut rename: HashMap<HandleId, usize> = HashMap::new();
        let mut lines = Vec::with_capacity(self.ops.len());
        for op in self.ops.values() {
            let mut name = |h: &TableHandle| {
                let next = rename.len();
                format!("t{}", *rename.entry(h.id()).or_insert(next))
            };
            let args: Vec<String> = op.args().iter().map(&mut name).collect();
            let result = op.result().map(&mut name);
            let del: Vec<u64> = op.del_vars().iter().map(|v| v.id().get()).collect();
            let func = match op.kind() {
                OperationKind::Combine(f) => f.name(),
                OperationKind::Project(f) => f.name(),
                OperationKind::Delete => "",
            };
            lines.push((op.kind().label(), func, args, del, result));
        }
        hash_serde(&lines)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, op) in &self.ops {
            writeln!(f, "{}: {op}", id.get())?;
        }
        Ok(())
    }
}
