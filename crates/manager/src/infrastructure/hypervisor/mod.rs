//! Hypervisor control surface
//!
//! The provisioner and the computation executor only talk to the hypervisor
//! through [`HypervisorClient`]. Production uses [`virsh::VirshClient`], tests use
//! [`mock::MockHypervisor`].

use core::error::Error;

use async_trait::async_trait;
use error_stack::Report;

pub mod mock;
pub mod virsh;

pub use mock::HypervisorCall;
pub use mock::MockHypervisor;
pub use virsh::VirshClient;

/// Storage pool created by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePoolHandle {
    pub name: String,
}

/// Volume allocated inside a storage pool
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    pub pool: String,
    pub name: String,
}

/// Domain defined and started by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainHandle {
    pub name: String,
}

/// Coarse domain state, as reported by `virsh domstate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DomainState {
    #[display("running")]
    Running,
    #[display("paused")]
    Paused,
    #[display("shut off")]
    ShutOff,
    #[display("crashed")]
    Crashed,
    #[display("other")]
    Other,
}

impl DomainState {
    pub fn parse(state: &str) -> Self {
        match state.trim() {
            "running" | "idle" | "in shutdown" => Self::Running,
            "paused" | "pmsuspended" => Self::Paused,
            "shut off" => Self::ShutOff,
            "crashed" => Self::Crashed,
            _ => Self::Other,
        }
    }
}

/// Errors raised by a hypervisor backend.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum HypervisorError {
    #[display("hypervisor rejected {operation}: {message}")]
    CommandFailed { operation: String, message: String },
    #[display("hypervisor is unreachable: {message}")]
    Unavailable { message: String },
    #[display("unexpected hypervisor reply to {operation}: {output}")]
    UnexpectedOutput { operation: String, output: String },
}

impl Error for HypervisorError {}

/// Operations consumed from the virtualization control connection.
///
/// Implementations must tolerate concurrent calls from several provisioning
/// tasks.
#[async_trait]
pub trait HypervisorClient: Send + Sync + 'static {
    /// Create (and start) a storage pool from its XML definition
    async fn create_storage_pool(
        &self,
        pool_xml: &str,
    ) -> Result<StoragePoolHandle, Report<HypervisorError>>;

    /// Create a volume inside `pool` from its XML definition
    async fn create_volume(
        &self,
        pool: &StoragePoolHandle,
        volume_xml: &str,
    ) -> Result<VolumeHandle, Report<HypervisorError>>;

    /// Define a persistent domain and boot it
    async fn define_and_start_domain(
        &self,
        domain_xml: &str,
    ) -> Result<DomainHandle, Report<HypervisorError>>;

    async fn domain_state(&self, domain: &DomainHandle)
        -> Result<DomainState, Report<HypervisorError>>;

    /// Stop the domain if it still runs and remove its definition
    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<(), Report<HypervisorError>>;

    async fn delete_volume(&self, volume: &VolumeHandle) -> Result<(), Report<HypervisorError>>;

    async fn destroy_storage_pool(
        &self,
        pool: &StoragePoolHandle,
    ) -> Result<(), Report<HypervisorError>>;
}
