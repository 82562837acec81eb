use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::CreateDomainArgs;
use crate::domain::computation::ComputationStore;
use crate::domain::computation::LifecycleManager;
use crate::domain::provisioner::DomainProvisioner;
use crate::domain::provisioner::DomainTemplates;
use crate::domain::template::TemplateResolver;
use crate::domain::Manager;
use crate::domain::ManagerService;
use crate::infrastructure::id_provider::UuidProvider;

/// Provisions one domain from the command line and prints its name
pub async fn run_create_domain(args: CreateDomainArgs) -> Result<()> {
    utils::logging::init();

    let base_dir = args.hypervisor.resolve_base_dir()?;
    tracing::info!(base_dir = %base_dir.display(), "Creating domain");

    let provisioner = Arc::new(
        DomainProvisioner::new(
            TemplateResolver::new(base_dir),
            Arc::new(args.hypervisor.client()),
        )
        .with_rollback(args.rollback_on_failure),
    );
    let lifecycle = LifecycleManager::new(Arc::new(UuidProvider), Arc::new(ComputationStore::new()));
    let manager = Manager::new(provisioner, lifecycle, Duration::from_secs(args.timeout_secs));

    let templates = DomainTemplates::from_sources(args.pool, args.volume, args.domain);
    let name = manager
        .create_domain(templates)
        .await
        .map_err(|report| anyhow::anyhow!("{report:?}"))?;

    println!("{name}");
    Ok(())
}
