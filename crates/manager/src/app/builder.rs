use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::ServeArgs;
use crate::domain::computation::ComputationExecutor;
use crate::domain::computation::ComputationStore;
use crate::domain::computation::ExecutorConfig;
use crate::domain::computation::LifecycleManager;
use crate::domain::provisioner::DomainProvisioner;
use crate::domain::template::TemplateResolver;
use crate::domain::Manager;
use crate::infrastructure::id_provider::UuidProvider;

/// Application builder
pub struct ApplicationBuilder {
    serve_args: ServeArgs,
}

impl ApplicationBuilder {
    pub fn new(serve_args: ServeArgs) -> Self {
        Self { serve_args }
    }

    /// Build complete application
    pub fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");

        let args = &self.serve_args;
        let base_dir = args.hypervisor.resolve_base_dir()?;
        tracing::info!(
            base_dir = %base_dir.display(),
            libvirt_uri = %args.hypervisor.libvirt_uri,
            "Resolved hypervisor settings"
        );

        let hypervisor = Arc::new(args.hypervisor.client());
        let provisioner = Arc::new(
            DomainProvisioner::new(TemplateResolver::new(base_dir), hypervisor)
                .with_rollback(args.rollback_on_failure),
        );
        let store = Arc::new(ComputationStore::new());
        let cancellation = CancellationToken::new();

        let mut lifecycle = LifecycleManager::new(Arc::new(UuidProvider), Arc::clone(&store));
        let executor = args.run_computations.then(|| {
            ComputationExecutor::new(
                Arc::clone(&provisioner),
                Arc::clone(&store),
                ExecutorConfig::from(args),
                cancellation.clone(),
            )
        });
        match &executor {
            Some(executor) => lifecycle = lifecycle.with_executor(executor.clone()),
            None => tracing::warn!("Computation execution disabled, computations stay created"),
        }

        let manager = Manager::new(
            provisioner,
            lifecycle,
            Duration::from_secs(args.provision_timeout_secs),
        );

        Ok(Application::new(
            ApplicationServices {
                manager: Arc::new(manager),
                executor,
            },
            self.serve_args,
            cancellation,
        ))
    }
}
