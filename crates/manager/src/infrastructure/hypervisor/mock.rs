//! In-memory hypervisor for tests
//!
//! Records every call in order, can be told to fail a given operation, and lets
//! tests script the state a domain reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;

use super::DomainHandle;
use super::DomainState;
use super::HypervisorClient;
use super::HypervisorError;
use super::StoragePoolHandle;
use super::VolumeHandle;

/// A call observed by [`MockHypervisor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HypervisorCall {
    CreateStoragePool { definition: String },
    CreateVolume { pool: String, definition: String },
    DefineAndStartDomain { definition: String },
    DomainState { domain: String },
    DestroyDomain { domain: String },
    DeleteVolume { pool: String, volume: String },
    DestroyStoragePool { pool: String },
}

impl HypervisorCall {
    /// Short operation name, handy for order assertions
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateStoragePool { .. } => "create_storage_pool",
            Self::CreateVolume { .. } => "create_volume",
            Self::DefineAndStartDomain { .. } => "define_and_start_domain",
            Self::DomainState { .. } => "domain_state",
            Self::DestroyDomain { .. } => "destroy_domain",
            Self::DeleteVolume { .. } => "delete_volume",
            Self::DestroyStoragePool { .. } => "destroy_storage_pool",
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<HypervisorCall>,
    failing: Vec<&'static str>,
    scripted_states: HashMap<String, Vec<DomainState>>,
    delays: HashMap<&'static str, Duration>,
    created: usize,
}

/// Recording test double for [`HypervisorClient`]
///
/// Created objects are named `pool-N`, `volume-N` and `domain-N`, where `N`
/// counts every successful creation across all kinds. Clones share state.
#[derive(Clone, Default)]
pub struct MockHypervisor {
    state: Arc<Mutex<MockState>>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call of `operation` (see [`HypervisorCall::operation`]) fail
    pub fn fail_on(&self, operation: &'static str) {
        self.state().failing.push(operation);
    }

    /// Make every call of `operation` take `delay` before answering
    pub fn delay_on(&self, operation: &'static str, delay: Duration) {
        self.state().delays.insert(operation, delay);
    }

    /// States reported by successive `domain_state` calls for `domain`
    ///
    /// The last state repeats once the script is exhausted. Unscripted domains
    /// report [`DomainState::Running`].
    pub fn script_domain_states(&self, domain: &str, states: Vec<DomainState>) {
        self.state()
            .scripted_states
            .insert(domain.to_string(), states);
    }

    pub fn calls(&self) -> Vec<HypervisorCall> {
        self.state().calls.clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(HypervisorCall::operation).collect()
    }

    async fn delay(&self, operation: &'static str) {
        let delay = self.state().delays.get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, call: HypervisorCall) -> Result<(), Report<HypervisorError>> {
        let mut state = self.state();
        let operation = call.operation();
        state.calls.push(call);

        if state.failing.contains(&operation) {
            return Err(Report::new(HypervisorError::CommandFailed {
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            }));
        }

        Ok(())
    }

    /// Records a creation call and returns the index used to name the object
    fn record_creation(&self, call: HypervisorCall) -> Result<usize, Report<HypervisorError>> {
        self.record(call)?;
        let mut state = self.state();
        state.created += 1;
        Ok(state.created)
    }
}

#[async_trait]
impl HypervisorClient for MockHypervisor {
    async fn create_storage_pool(
        &self,
        pool_xml: &str,
    ) -> Result<StoragePoolHandle, Report<HypervisorError>> {
        self.delay("create_storage_pool").await;
        let n = self.record_creation(HypervisorCall::CreateStoragePool {
            definition: pool_xml.to_string(),
        })?;
        Ok(StoragePoolHandle {
            name: format!("pool-{n}"),
        })
    }

    async fn create_volume(
        &self,
        pool: &StoragePoolHandle,
        volume_xml: &str,
    ) -> Result<VolumeHandle, Report<HypervisorError>> {
        self.delay("create_volume").await;
        let n = self.record_creation(HypervisorCall::CreateVolume {
            pool: pool.name.clone(),
            definition: volume_xml.to_string(),
        })?;
        Ok(VolumeHandle {
            pool: pool.name.clone(),
            name: format!("volume-{n}"),
        })
    }

    async fn define_and_start_domain(
        &self,
        domain_xml: &str,
    ) -> Result<DomainHandle, Report<HypervisorError>> {
        self.delay("define_and_start_domain").await;
        let n = self.record_creation(HypervisorCall::DefineAndStartDomain {
            definition: domain_xml.to_string(),
        })?;
        Ok(DomainHandle {
            name: format!("domain-{n}"),
        })
    }

    async fn domain_state(
        &self,
        domain: &DomainHandle,
    ) -> Result<DomainState, Report<HypervisorError>> {
        self.delay("domain_state").await;
        self.record(HypervisorCall::DomainState {
            domain: domain.name.clone(),
        })?;

        let mut state = self.state();
        let Some(script) = state.scripted_states.get_mut(&domain.name) else {
            return Ok(DomainState::Running);
        };
        let next = match script.len() {
            0 => DomainState::Running,
            1 => script[0],
            _ => script.remove(0),
        };
        Ok(next)
    }

    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<(), Report<HypervisorError>> {
        self.delay("destroy_domain").await;
        self.record(HypervisorCall::DestroyDomain {
            domain: domain.name.clone(),
        })?;
        Ok(())
    }

    async fn delete_volume(&self, volume: &VolumeHandle) -> Result<(), Report<HypervisorError>> {
        self.delay("delete_volume").await;
        self.record(HypervisorCall::DeleteVolume {
            pool: volume.pool.clone(),
            volume: volume.name.clone(),
        })?;
        Ok(())
    }

    async fn destroy_storage_pool(
        &self,
        pool: &StoragePoolHandle,
    ) -> Result<(), Report<HypervisorError>> {
        self.delay("destroy_storage_pool").await;
        self.record(HypervisorCall::DestroyStoragePool {
            pool: pool.name.clone(),
        })?;
        Ok(())
    }
}
