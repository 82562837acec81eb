//! Brings up a storage pool, a volume inside it and a domain booting from it
//!
//! Templates are all rendered before the first hypervisor call, then the
//! hypervisor is driven strictly in pool → volume → domain order. Every
//! hypervisor failure reaches the caller as [`ManagerError::MalformedEntity`];
//! the underlying cause stays in the report for logging.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;
use tracing::warn;

use super::errors::ManagerError;
use super::template::TemplateKind;
use super::template::TemplateResolver;
use super::template::TemplateSpec;
use crate::infrastructure::hypervisor::DomainHandle;
use crate::infrastructure::hypervisor::HypervisorClient;
use crate::infrastructure::hypervisor::StoragePoolHandle;
use crate::infrastructure::hypervisor::VolumeHandle;

/// Pool, volume and domain templates for one provisioning call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainTemplates {
    pub pool: TemplateSpec,
    pub volume: TemplateSpec,
    pub domain: TemplateSpec,
}

impl DomainTemplates {
    pub fn from_sources(
        pool: impl Into<String>,
        volume: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            pool: TemplateSpec::new(pool),
            volume: TemplateSpec::new(volume),
            domain: TemplateSpec::new(domain),
        }
    }

    /// Adds the same substitution to all three templates
    pub fn with_substitution(self, from: &str, to: &str) -> Self {
        Self {
            pool: self.pool.with_substitution(from, to),
            volume: self.volume.with_substitution(from, to),
            domain: self.domain.with_substitution(from, to),
        }
    }
}

/// Everything one successful provisioning call created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedDomain {
    pub pool: StoragePoolHandle,
    pub volume: VolumeHandle,
    pub domain: DomainHandle,
}

/// Objects a provisioning call has created so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialProvision {
    pub pool: Option<StoragePoolHandle>,
    pub volume: Option<VolumeHandle>,
    pub domain: Option<DomainHandle>,
}

impl PartialProvision {
    pub fn is_empty(&self) -> bool {
        self.pool.is_none() && self.volume.is_none() && self.domain.is_none()
    }
}

impl From<ProvisionedDomain> for PartialProvision {
    fn from(provisioned: ProvisionedDomain) -> Self {
        Self {
            pool: Some(provisioned.pool),
            volume: Some(provisioned.volume),
            domain: Some(provisioned.domain),
        }
    }
}

/// Record of what an in-flight provisioning call created, kept by the caller
///
/// Every object is recorded as soon as the hypervisor returns it, so the
/// record survives a provisioning future dropped by a timeout or a
/// cancellation. Compensation clears what it handled.
#[derive(Debug, Default)]
pub struct ProvisionProgress {
    created: Mutex<PartialProvision>,
}

impl ProvisionProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> PartialProvision {
        self.lock().clone()
    }

    /// Takes everything recorded so far and leaves the record empty
    pub fn take(&self) -> PartialProvision {
        std::mem::take(&mut *self.lock())
    }

    fn record(&self, update: impl FnOnce(&mut PartialProvision)) {
        update(&mut self.lock());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PartialProvision> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct DomainProvisioner<H: HypervisorClient> {
    resolver: TemplateResolver,
    hypervisor: Arc<H>,
    rollback_on_failure: bool,
}

impl<H: HypervisorClient> DomainProvisioner<H> {
    pub fn new(resolver: TemplateResolver, hypervisor: Arc<H>) -> Self {
        Self {
            resolver,
            hypervisor,
            rollback_on_failure: true,
        }
    }

    /// Whether resources created earlier in a failed call are torn down
    pub fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_on_failure = enabled;
        self
    }

    pub fn hypervisor(&self) -> &Arc<H> {
        &self.hypervisor
    }

    /// Provisions a domain and returns its name.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::MalformedEntity`] if a template cannot be rendered or
    ///   the hypervisor fails any of the three steps
    pub async fn create_domain(
        &self,
        templates: &DomainTemplates,
    ) -> Result<String, Report<ManagerError>> {
        self.provision(templates)
            .await
            .map(|provisioned| provisioned.domain.name)
    }

    /// Same as [`Self::create_domain`] but hands back every created object.
    pub async fn provision(
        &self,
        templates: &DomainTemplates,
    ) -> Result<ProvisionedDomain, Report<ManagerError>> {
        self.provision_tracked(templates, &ProvisionProgress::new())
            .await
    }

    /// Provisions like [`Self::provision`] and records each object in
    /// `progress` the moment it exists.
    ///
    /// When a step fails, the earlier objects are compensated and `progress`
    /// is cleared. When the returned future is dropped instead, `progress`
    /// still lists what was created and the caller owns its teardown.
    pub async fn provision_tracked(
        &self,
        templates: &DomainTemplates,
        progress: &ProvisionProgress,
    ) -> Result<ProvisionedDomain, Report<ManagerError>> {
        let pool_xml = self.render(&templates.pool, TemplateKind::Pool).await?;
        let volume_xml = self.render(&templates.volume, TemplateKind::Volume).await?;
        let domain_xml = self.render(&templates.domain, TemplateKind::Domain).await?;

        let pool = self
            .hypervisor
            .create_storage_pool(&pool_xml)
            .await
            .change_context(ManagerError::MalformedEntity)
            .attach_printable("failed to create storage pool")?;
        progress.record(|created| created.pool = Some(pool.clone()));

        let volume = match self.hypervisor.create_volume(&pool, &volume_xml).await {
            Ok(volume) => volume,
            Err(report) => {
                self.compensate(progress).await;
                return Err(report
                    .change_context(ManagerError::MalformedEntity)
                    .attach_printable(format!("failed to create volume in pool {}", pool.name)));
            }
        };
        progress.record(|created| created.volume = Some(volume.clone()));

        let domain = match self.hypervisor.define_and_start_domain(&domain_xml).await {
            Ok(domain) => domain,
            Err(report) => {
                self.compensate(progress).await;
                return Err(report
                    .change_context(ManagerError::MalformedEntity)
                    .attach_printable("failed to define and start domain"));
            }
        };
        progress.record(|created| created.domain = Some(domain.clone()));

        info!(
            pool = %pool.name,
            volume = %volume.name,
            domain = %domain.name,
            "Domain provisioned"
        );

        Ok(ProvisionedDomain {
            pool,
            volume,
            domain,
        })
    }

    /// Removes whichever of domain, volume and pool exist, in that order.
    /// Failures are logged and do not stop the remaining steps.
    ///
    /// Returns whether every step succeeded.
    pub async fn teardown(&self, created: &PartialProvision) -> bool {
        let mut clean = true;

        if let Some(domain) = &created.domain {
            if let Err(e) = self.hypervisor.destroy_domain(domain).await {
                warn!(domain = %domain.name, error = ?e, "Failed to destroy domain");
                clean = false;
            }
        }
        if let Some(volume) = &created.volume {
            if let Err(e) = self.hypervisor.delete_volume(volume).await {
                warn!(pool = %volume.pool, volume = %volume.name, error = ?e, "Failed to delete volume");
                clean = false;
            }
        }
        if let Some(pool) = &created.pool {
            if let Err(e) = self.hypervisor.destroy_storage_pool(pool).await {
                warn!(pool = %pool.name, error = ?e, "Failed to destroy storage pool");
                clean = false;
            }
        }

        if clean {
            info!(
                pool = created.pool.as_ref().map(|p| p.name.as_str()),
                domain = created.domain.as_ref().map(|d| d.name.as_str()),
                "Provisioned objects torn down"
            );
        }
        clean
    }

    async fn render(
        &self,
        spec: &TemplateSpec,
        kind: TemplateKind,
    ) -> Result<String, Report<ManagerError>> {
        self.resolver
            .render(spec, kind)
            .await
            .change_context(ManagerError::MalformedEntity)
            .attach_printable_lazy(|| format!("failed to render {kind} template"))
    }

    /// Best-effort undo of the objects created before a failed step
    async fn compensate(&self, progress: &ProvisionProgress) {
        if !self.rollback_on_failure {
            let created = progress.take();
            warn!(
                pool = created.pool.as_ref().map(|p| p.name.as_str()),
                volume = created.volume.as_ref().map(|v| v.name.as_str()),
                "Provisioning failed, leaving created storage for external cleanup"
            );
            return;
        }
        // cleared only once done, a dropped compensation stays visible
        self.teardown(&progress.snapshot()).await;
        progress.take();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use similar_asserts::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::template::TemplateError;
    use crate::infrastructure::hypervisor::HypervisorCall;
    use crate::infrastructure::hypervisor::HypervisorError;
    use crate::infrastructure::hypervisor::MockHypervisor;

    const POOL_XML: &str = "<pool type='dir'>\n  <name>cocos</name>\n  <target><path>./img</path></target>\n</pool>\n";
    const VOL_XML: &str = "<volume>\n  <name>boot.img</name>\n</volume>\n";
    const DOM_XML: &str = "<domain type='kvm'>\n  <name>cocos-vm</name>\n  <source file='./img/boot.img'/>\n</domain>\n";

    fn template_dir() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        let xml = dir.path().join("xml");
        std::fs::create_dir_all(&xml).expect("create xml dir");
        std::fs::write(xml.join("pool.xml"), POOL_XML).expect("write pool");
        std::fs::write(xml.join("vol.xml"), VOL_XML).expect("write vol");
        std::fs::write(xml.join("dom.xml"), DOM_XML).expect("write dom");
        dir
    }

    fn provisioner(dir: &TempDir, hypervisor: &MockHypervisor) -> DomainProvisioner<MockHypervisor> {
        DomainProvisioner::new(
            TemplateResolver::new(dir.path()),
            Arc::new(hypervisor.clone()),
        )
    }

    #[tokio::test]
    async fn default_templates_provision_in_order() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();

        let name = provisioner(&dir, &hypervisor)
            .create_domain(&DomainTemplates::default())
            .await
            .expect("provisioning should succeed");

        assert_eq!(name, "domain-3");
        assert_eq!(
            hypervisor.operations(),
            vec!["create_storage_pool", "create_volume", "define_and_start_domain"]
        );

        let base = dir.path().display().to_string();
        let calls = hypervisor.calls();
        assert_eq!(
            calls[0],
            HypervisorCall::CreateStoragePool {
                definition: POOL_XML.replace("./img", &format!("{base}/img")),
            }
        );
        assert_eq!(
            calls[1],
            HypervisorCall::CreateVolume {
                pool: "pool-1".to_string(),
                definition: VOL_XML.to_string(),
            }
        );
        assert_eq!(
            calls[2],
            HypervisorCall::DefineAndStartDomain {
                definition: DOM_XML.replace("./img", &format!("{base}/img")),
            }
        );
    }

    #[tokio::test]
    async fn missing_pool_template_makes_no_hypervisor_call() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        let templates = DomainTemplates::from_sources("xml/absent.xml", "", "");

        let err = provisioner(&dir, &hypervisor)
            .create_domain(&templates)
            .await
            .expect_err("missing template should fail");

        assert_eq!(err.current_context(), &ManagerError::MalformedEntity);
        assert!(
            matches!(
                err.downcast_ref::<TemplateError>(),
                Some(TemplateError::NotFound { .. })
            ),
            "not found cause should be kept in the report"
        );
        assert!(hypervisor.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_later_template_still_makes_no_hypervisor_call() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        let templates = DomainTemplates::from_sources("", "", "xml/absent.xml");

        let err = provisioner(&dir, &hypervisor)
            .create_domain(&templates)
            .await
            .expect_err("missing domain template should fail");

        assert_eq!(err.current_context(), &ManagerError::MalformedEntity);
        assert!(hypervisor.calls().is_empty());
    }

    #[tokio::test]
    async fn volume_failure_skips_domain_and_releases_pool() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.fail_on("create_volume");

        let err = provisioner(&dir, &hypervisor)
            .create_domain(&DomainTemplates::default())
            .await
            .expect_err("volume failure should fail provisioning");

        assert_eq!(err.current_context(), &ManagerError::MalformedEntity);
        assert_eq!(
            hypervisor.operations(),
            vec!["create_storage_pool", "create_volume", "destroy_storage_pool"]
        );
    }

    #[tokio::test]
    async fn domain_failure_releases_volume_then_pool() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.fail_on("define_and_start_domain");

        let err = provisioner(&dir, &hypervisor)
            .create_domain(&DomainTemplates::default())
            .await
            .expect_err("domain failure should fail provisioning");

        assert_eq!(err.current_context(), &ManagerError::MalformedEntity);
        assert_eq!(
            hypervisor.operations(),
            vec![
                "create_storage_pool",
                "create_volume",
                "define_and_start_domain",
                "delete_volume",
                "destroy_storage_pool"
            ]
        );
    }

    #[tokio::test]
    async fn disabled_rollback_leaves_storage_behind() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.fail_on("define_and_start_domain");

        provisioner(&dir, &hypervisor)
            .with_rollback(false)
            .create_domain(&DomainTemplates::default())
            .await
            .expect_err("domain failure should fail provisioning");

        assert_eq!(
            hypervisor.operations(),
            vec!["create_storage_pool", "create_volume", "define_and_start_domain"]
        );
    }

    #[tokio::test]
    async fn failed_rollback_keeps_the_original_cause() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.fail_on("create_volume");
        hypervisor.fail_on("destroy_storage_pool");

        let err = provisioner(&dir, &hypervisor)
            .create_domain(&DomainTemplates::default())
            .await
            .expect_err("volume failure should fail provisioning");

        assert_eq!(err.current_context(), &ManagerError::MalformedEntity);
        assert_eq!(
            err.downcast_ref::<HypervisorError>(),
            Some(&HypervisorError::CommandFailed {
                operation: "create_volume".to_string(),
                message: "injected failure".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn teardown_removes_domain_volume_and_pool() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        let provisioner = provisioner(&dir, &hypervisor);

        let provisioned = provisioner
            .provision(&DomainTemplates::default())
            .await
            .expect("provisioning should succeed");
        assert!(provisioner.teardown(&provisioned.into()).await);

        assert_eq!(
            &hypervisor.operations()[3..],
            &["destroy_domain", "delete_volume", "destroy_storage_pool"][..]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_lists_objects_of_an_abandoned_call() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.delay_on("define_and_start_domain", Duration::from_secs(60));
        let provisioner = provisioner(&dir, &hypervisor);
        let progress = ProvisionProgress::new();

        let abandoned = tokio::time::timeout(
            Duration::from_secs(10),
            provisioner.provision_tracked(&DomainTemplates::default(), &progress),
        )
        .await;
        assert!(abandoned.is_err(), "provisioning should still be in flight");

        let created = progress.take();
        assert_eq!(
            created,
            PartialProvision {
                pool: Some(StoragePoolHandle {
                    name: "pool-1".to_string()
                }),
                volume: Some(VolumeHandle {
                    pool: "pool-1".to_string(),
                    name: "volume-2".to_string()
                }),
                domain: None,
            }
        );

        assert!(provisioner.teardown(&created).await);
        assert_eq!(
            &hypervisor.operations()[2..],
            &["delete_volume", "destroy_storage_pool"][..]
        );
    }

    #[tokio::test]
    async fn compensated_failure_clears_progress() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        hypervisor.fail_on("define_and_start_domain");
        let progress = ProvisionProgress::new();

        provisioner(&dir, &hypervisor)
            .provision_tracked(&DomainTemplates::default(), &progress)
            .await
            .expect_err("domain failure should fail provisioning");

        assert!(progress.snapshot().is_empty());
    }

    #[tokio::test]
    async fn successful_call_records_every_object() {
        let dir = template_dir();
        let hypervisor = MockHypervisor::new();
        let progress = ProvisionProgress::new();

        let provisioned = provisioner(&dir, &hypervisor)
            .provision_tracked(&DomainTemplates::default(), &progress)
            .await
            .expect("provisioning should succeed");

        assert_eq!(progress.snapshot(), PartialProvision::from(provisioned));
    }
}
