//! Projection of one table.

use marginal_core::cost::MemoryUsage;
use marginal_core::error::{Error, Result};
use marginal_core::variable::{difference, domain_product, Variable, VariableSet};
use marginal_schedule::{Schedule, ScheduleOperation, TableHandle};
use marginal_table::{ProjectFn, Table};

#[derive(Debug, Clone, Copy)]
pub struct Projector {
    project: ProjectFn,
}

impl Projector {
    pub fn new(project: ProjectFn) -> Self {
        Self { project }
    }

    pub fn projection_function(&self) -> ProjectFn {
        self.project
    }

    pub fn set_projection_function(&mut self, project: ProjectFn) {
        self.project = project;
    }

    pub fn execute(&self, table: &Table, del: &VariableSet) -> Result<Table> {
        self.project.apply(table, del)
    }

    /// One step per input cell.
    pub fn nb_operations(&self, scope: &[Variable]) -> Result<usize> {
        domain_product(scope)
    }

    /// Input cells as peak, output cells as final.
    pub fn memory_usage(&self, scope: &[Variable], del: &VariableSet) -> Result<MemoryUsage> {
        let input = domain_product(scope)?;
        let output = domain_product(&difference(scope, del))?;
        Ok(MemoryUsage::from_cells(input, output))
    }

    /// The projection as a schedule operation; its result is abstract.
    pub fn operations(&self, handle: &TableHandle, del: &VariableSet) -> Result<ScheduleOperation> {
        ScheduleOperation::project(handle, del.clone(), self.project)
    }

    pub fn schedule(
        &self,
        schedule: &mut Schedule,
        handle: &TableHandle,
        del: &VariableSet,
    ) -> Result<TableHandle> {
        schedule.insert_schedule_multidim(handle);
        let id = schedule.insert_operation(self.operations(handle, del)?)?;
        schedule
            .result_of(id)
            .cloned()
            .ok_or_else(|| Error::Invariant("projection without result".into()))
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(ProjectFn::SUM)
    }
}
