pub mod cli;
pub mod create_domain;
pub mod hypervisor;
pub mod serve;

use std::time::Duration;

use crate::domain::computation::ExecutorConfig;
use crate::domain::provisioner::DomainTemplates;

impl From<&serve::ServeArgs> for ExecutorConfig {
    fn from(args: &serve::ServeArgs) -> Self {
        Self {
            templates: DomainTemplates::from_sources(
                args.pool_template.clone(),
                args.volume_template.clone(),
                args.domain_template.clone(),
            ),
            poll_interval: Duration::from_millis(args.domain_poll_interval_ms.max(1)),
            provision_timeout: Duration::from_secs(args.provision_timeout_secs),
        }
    }
}

pub use cli::*;
pub use create_domain::*;
pub use hypervisor::*;
pub use serve::*;
