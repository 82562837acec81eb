use clap::Parser;

use super::hypervisor::HypervisorArgs;

#[derive(Parser, Debug, Clone)]
pub struct CreateDomainArgs {
    #[command(flatten)]
    pub hypervisor: HypervisorArgs,

    #[arg(long, default_value = "", help = "Storage pool template (empty for ./xml/pool.xml)")]
    pub pool: String,

    #[arg(long, default_value = "", help = "Volume template (empty for ./xml/vol.xml)")]
    pub volume: String,

    #[arg(long, default_value = "", help = "Domain template (empty for ./xml/dom.xml)")]
    pub domain: String,

    #[arg(
        long,
        default_value = "120",
        help = "Deadline for provisioning the domain, in seconds"
    )]
    pub timeout_secs: u64,

    #[arg(
        long,
        help = "Tear down the pool and volume created before a failed step",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub rollback_on_failure: bool,
}
