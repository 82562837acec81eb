//! Service boundary consumed by the HTTP handlers and the command line

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use tracing::error;
use tracing::info;

use super::computation::Computation;
use super::computation::ComputationSpec;
use super::computation::LifecycleManager;
use super::errors::ManagerError;
use super::provisioner::DomainProvisioner;
use super::provisioner::DomainTemplates;
use crate::infrastructure::hypervisor::HypervisorClient;

/// Operations offered by the computation manager
#[async_trait]
pub trait ManagerService: Send + Sync {
    /// Provisions a pool, a volume and a domain and returns the domain's name.
    async fn create_domain(&self, templates: DomainTemplates)
        -> Result<String, Report<ManagerError>>;

    /// Registers a computation and returns its identifier.
    fn run(&self, spec: ComputationSpec) -> Result<String, Report<ManagerError>>;

    fn computation(&self, id: &str) -> Result<Computation, Report<ManagerError>>;

    fn computations(&self) -> Vec<Computation>;
}

pub struct Manager<H: HypervisorClient> {
    provisioner: Arc<DomainProvisioner<H>>,
    lifecycle: LifecycleManager<H>,
    provision_timeout: Duration,
}

impl<H: HypervisorClient> Manager<H> {
    pub fn new(
        provisioner: Arc<DomainProvisioner<H>>,
        lifecycle: LifecycleManager<H>,
        provision_timeout: Duration,
    ) -> Self {
        Self {
            provisioner,
            lifecycle,
            provision_timeout,
        }
    }
}

#[async_trait]
impl<H: HypervisorClient> ManagerService for Manager<H> {
    async fn create_domain(
        &self,
        templates: DomainTemplates,
    ) -> Result<String, Report<ManagerError>> {
        let result = match tokio::time::timeout(
            self.provision_timeout,
            self.provisioner.create_domain(&templates),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Report::new(ManagerError::DeadlineExceeded).attach_printable(
                format!("provisioning took longer than {:?}", self.provision_timeout),
            )),
        };

        match &result {
            Ok(name) => info!(domain = %name, "Domain created"),
            Err(report) => error!(error = ?report, "Failed to create domain"),
        }
        result
    }

    fn run(&self, spec: ComputationSpec) -> Result<String, Report<ManagerError>> {
        let name = spec.name.clone();
        self.lifecycle.run(spec).inspect_err(|report| {
            error!(computation = %name, error = ?report, "Failed to run computation");
        })
    }

    fn computation(&self, id: &str) -> Result<Computation, Report<ManagerError>> {
        self.lifecycle.get(id)
    }

    fn computations(&self) -> Vec<Computation> {
        self.lifecycle.list()
    }
}
