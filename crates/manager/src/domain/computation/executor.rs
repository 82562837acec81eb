//! Drives each submitted computation through provisioning, execution and
//! teardown on its own task
//!
//! One task per computation. The task owns a per-id lock for its whole
//! lifetime, races the work against the computation's TTL and the service
//! cancellation token, and tears down whatever it provisioned once the
//! computation reached a terminal state.

use std::sync::Arc;
use std::time::Duration;

use api_types::ComputationStatus;
use chrono::Utc;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use utils::keyed_lock::KeyedAsyncLock;

use super::store::ComputationStore;
use crate::domain::provisioner::DomainProvisioner;
use crate::domain::provisioner::DomainTemplates;
use crate::domain::provisioner::ProvisionProgress;
use crate::infrastructure::hypervisor::DomainState;
use crate::infrastructure::hypervisor::HypervisorClient;

/// Placeholder replaced by the computation id in every template
pub const COMPUTATION_ID_PLACEHOLDER: &str = "{{COMPUTATION_ID}}";

/// Deadline offset used when a TTL does not fit into an [`Instant`]
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Templates used for every computation
    pub templates: DomainTemplates,
    /// Interval between two domain state queries
    pub poll_interval: Duration,
    /// Upper bound for one provisioning call
    pub provision_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            templates: DomainTemplates::default(),
            poll_interval: Duration::from_secs(1),
            provision_timeout: Duration::from_secs(120),
        }
    }
}

pub struct ComputationExecutor<H: HypervisorClient> {
    provisioner: Arc<DomainProvisioner<H>>,
    store: Arc<ComputationStore>,
    locks: Arc<KeyedAsyncLock<String>>,
    config: Arc<ExecutorConfig>,
    cancellation: CancellationToken,
    tracker: TaskTracker,
}

impl<H: HypervisorClient> Clone for ComputationExecutor<H> {
    fn clone(&self) -> Self {
        Self {
            provisioner: Arc::clone(&self.provisioner),
            store: Arc::clone(&self.store),
            locks: Arc::clone(&self.locks),
            config: Arc::clone(&self.config),
            cancellation: self.cancellation.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

impl<H: HypervisorClient> ComputationExecutor<H> {
    pub fn new(
        provisioner: Arc<DomainProvisioner<H>>,
        store: Arc<ComputationStore>,
        config: ExecutorConfig,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            provisioner,
            store,
            locks: Arc::new(KeyedAsyncLock::new()),
            config: Arc::new(config),
            cancellation,
            tracker: TaskTracker::new(),
        }
    }

    /// Starts a task for the computation unless one already ran or runs.
    ///
    /// Returns whether a task was started.
    pub fn submit(&self, id: &str) -> bool {
        let Some(guard) = self.locks.try_lock(&id.to_string()) else {
            debug!(computation_id = %id, "Computation already being executed");
            return false;
        };

        match self.store.get(id) {
            Some(c) if c.status == ComputationStatus::Created => {}
            Some(c) => {
                debug!(computation_id = %id, status = %c.status, "Computation already started");
                return false;
            }
            None => {
                warn!(computation_id = %id, "Submitted computation is not registered");
                return false;
            }
        }

        let executor = self.clone();
        let id = id.to_string();
        self.tracker.spawn(async move {
            let _guard = guard;
            executor.execute(&id).await;
        });
        true
    }

    /// Number of computation tasks still alive
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every computation task submitted so far has finished.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancels every in-flight computation and waits for their teardown.
    pub async fn shutdown(&self) {
        self.cancellation.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Computation executor stopped");
    }

    async fn execute(&self, id: &str) {
        let computation = match self
            .store
            .transition(id, ComputationStatus::Provisioning, Utc::now())
        {
            Ok(c) => c,
            Err(e) => {
                warn!(computation_id = %id, error = %e, "Computation cannot be started");
                return;
            }
        };
        let now = Instant::now();
        let deadline = now
            .checked_add(computation.spec.ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);

        // outlives `drive`, which the TTL or the shutdown may drop mid-provisioning
        let progress = ProvisionProgress::new();
        let outcome = tokio::select! {
            _ = self.cancellation.cancelled() => {
                info!(computation_id = %id, "Computation cancelled by shutdown");
                ComputationStatus::Failed
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(
                    computation_id = %id,
                    ttl_secs = computation.spec.ttl.as_secs(),
                    "Computation exceeded its TTL"
                );
                ComputationStatus::TimedOut
            }
            status = self.drive(id, &progress) => status,
        };

        match self.store.transition(id, outcome, Utc::now()) {
            Ok(c) => info!(
                computation_id = %id,
                status = %c.status,
                domain = c.domain.as_deref().unwrap_or_default(),
                "Computation finished"
            ),
            Err(e) => error!(computation_id = %id, error = %e, "Failed to record final status"),
        }

        let created = progress.take();
        if !created.is_empty() && !self.provisioner.teardown(&created).await {
            warn!(computation_id = %id, "Computation teardown was incomplete");
        }
    }

    /// Provisions the domain and follows it until it stops. Returns the
    /// terminal status to record.
    async fn drive(&self, id: &str, progress: &ProvisionProgress) -> ComputationStatus {
        let templates = self
            .config
            .templates
            .clone()
            .with_substitution(COMPUTATION_ID_PLACEHOLDER, id);

        let domain = match tokio::time::timeout(
            self.config.provision_timeout,
            self.provisioner.provision_tracked(&templates, progress),
        )
        .await
        {
            Ok(Ok(provisioned)) => provisioned.domain,
            Ok(Err(report)) => {
                error!(computation_id = %id, error = ?report, "Provisioning failed");
                return ComputationStatus::Failed;
            }
            Err(_) => {
                error!(
                    computation_id = %id,
                    timeout_secs = self.config.provision_timeout.as_secs(),
                    "Provisioning did not finish in time"
                );
                return ComputationStatus::Failed;
            }
        };

        if let Err(e) = self.store.set_domain(id, &domain.name) {
            warn!(computation_id = %id, error = %e, "Failed to record domain");
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running = false;

        loop {
            interval.tick().await;

            let state = match self.provisioner.hypervisor().domain_state(&domain).await {
                Ok(state) => state,
                Err(report) => {
                    warn!(computation_id = %id, domain = %domain.name, error = ?report, "Failed to query domain state");
                    continue;
                }
            };

            match state {
                DomainState::Running | DomainState::ShutOff if !running => {
                    // a domain that already shut off ran between two polls
                    if let Err(e) = self.store.transition(id, ComputationStatus::Running, Utc::now()) {
                        warn!(computation_id = %id, error = %e, "Failed to mark computation running");
                    }
                    running = true;
                    if state == DomainState::ShutOff {
                        return ComputationStatus::Completed;
                    }
                }
                DomainState::ShutOff => return ComputationStatus::Completed,
                DomainState::Crashed => {
                    warn!(computation_id = %id, domain = %domain.name, "Domain crashed");
                    return ComputationStatus::Failed;
                }
                DomainState::Running | DomainState::Paused | DomainState::Other => {}
            }
        }
    }
}
