use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;

use super::executor::ComputationExecutor;
use super::store::ComputationStore;
use super::types::Computation;
use super::types::ComputationSpec;
use crate::domain::errors::ManagerError;
use crate::infrastructure::hypervisor::HypervisorClient;
use crate::infrastructure::id_provider::IdProvider;

/// Accepts computations, names them and hands them to the executor
pub struct LifecycleManager<H: HypervisorClient> {
    ids: Arc<dyn IdProvider>,
    store: Arc<ComputationStore>,
    executor: Option<ComputationExecutor<H>>,
}

impl<H: HypervisorClient> LifecycleManager<H> {
    /// Without an executor, computations stay `Created` until something else
    /// picks them up.
    pub fn new(ids: Arc<dyn IdProvider>, store: Arc<ComputationStore>) -> Self {
        Self {
            ids,
            store,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: ComputationExecutor<H>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Registers a computation and returns its identifier without waiting for
    /// it to start.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::MalformedEntity`] if the spec is invalid; no identifier
    ///   is consumed
    /// - [`ManagerError::IdentityAssignmentFailed`] if no fresh identifier could
    ///   be obtained; nothing is registered
    pub fn run(&self, spec: ComputationSpec) -> Result<String, Report<ManagerError>> {
        spec.validate()?;

        let id = self
            .ids
            .id()
            .change_context(ManagerError::IdentityAssignmentFailed)?;
        if id.is_empty() {
            return Err(Report::new(ManagerError::IdentityAssignmentFailed)
                .attach_printable("identifier provider returned an empty token"));
        }

        self.store
            .insert(Computation::new(id.clone(), spec))
            .map_err(Report::new)
            .change_context(ManagerError::IdentityAssignmentFailed)?;

        match &self.executor {
            Some(executor) => {
                executor.submit(&id);
            }
            None => info!(computation_id = %id, "No executor attached, computation left in created state"),
        }

        Ok(id)
    }

    /// # Errors
    ///
    /// - [`ManagerError::NotFound`] for an unknown id
    pub fn get(&self, id: &str) -> Result<Computation, Report<ManagerError>> {
        self.store.get(id).ok_or_else(|| {
            Report::new(ManagerError::NotFound)
                .attach_printable(format!("computation id: {id}"))
        })
    }

    pub fn list(&self) -> Vec<Computation> {
        self.store.list()
    }
}
