use std::path::PathBuf;

use clap::Parser;

use super::hypervisor::HypervisorArgs;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        long,
        env = "MANAGER_LISTEN_ADDR",
        default_value = "0.0.0.0:9021",
        help = "HTTP API server listen address"
    )]
    pub listen_addr: String,

    #[command(flatten)]
    pub hypervisor: HypervisorArgs,

    #[arg(
        long,
        env = "MANAGER_POOL_TEMPLATE",
        default_value = "",
        help = "Storage pool template for computations (empty for ./xml/pool.xml)"
    )]
    pub pool_template: String,

    #[arg(
        long,
        env = "MANAGER_VOLUME_TEMPLATE",
        default_value = "",
        help = "Volume template for computations (empty for ./xml/vol.xml)"
    )]
    pub volume_template: String,

    #[arg(
        long,
        env = "MANAGER_DOMAIN_TEMPLATE",
        default_value = "",
        help = "Domain template for computations (empty for ./xml/dom.xml)"
    )]
    pub domain_template: String,

    #[arg(
        long,
        env = "MANAGER_PROVISION_TIMEOUT_SECS",
        default_value = "120",
        help = "Deadline for provisioning one domain, in seconds"
    )]
    pub provision_timeout_secs: u64,

    #[arg(
        long,
        env = "MANAGER_DOMAIN_POLL_INTERVAL_MS",
        default_value = "1000",
        help = "Interval between two domain state queries while a computation runs"
    )]
    pub domain_poll_interval_ms: u64,

    #[arg(
        long,
        env = "MANAGER_ROLLBACK_ON_FAILURE",
        help = "Tear down the pool and volume created before a failed provisioning step",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub rollback_on_failure: bool,

    #[arg(
        long,
        env = "MANAGER_RUN_COMPUTATIONS",
        help = "Provision and run submitted computations (false keeps them in the created state)",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub run_computations: bool,

    #[arg(
        long,
        env = "MANAGER_SECRET",
        hide_env_values = true,
        help = "Bearer secret required on every API request"
    )]
    pub secret: Option<String>,

    #[arg(
        long,
        env = "MANAGER_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        help = "Also write logs to this daily rolling file"
    )]
    pub log_file: Option<PathBuf>,
}
