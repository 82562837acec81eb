use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use crate::infrastructure::hypervisor::VirshClient;

/// Hypervisor connection and template location, shared by every command
#[derive(Args, Debug, Clone)]
pub struct HypervisorArgs {
    #[arg(
        long,
        env = "MANAGER_BASE_DIR",
        value_hint = clap::ValueHint::DirPath,
        help = "Directory templates and relative template paths are resolved against (defaults to the working directory)"
    )]
    pub base_dir: Option<PathBuf>,

    #[arg(
        long,
        env = "MANAGER_LIBVIRT_URI",
        default_value = "qemu:///system",
        help = "libvirt connection URI"
    )]
    pub libvirt_uri: String,

    #[arg(
        long,
        env = "MANAGER_VIRSH_PATH",
        value_hint = clap::ValueHint::CommandName,
        default_value = "virsh",
        help = "virsh executable used to drive libvirt"
    )]
    pub virsh_path: PathBuf,
}

impl HypervisorArgs {
    /// Absolute base directory, resolved once against the working directory
    pub fn resolve_base_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.base_dir {
            Some(dir) if dir.is_absolute() => Ok(dir.clone()),
            other => {
                let cwd = std::env::current_dir().context("failed to read working directory")?;
                Ok(other.as_ref().map_or(cwd.clone(), |dir| cwd.join(dir)))
            }
        }
    }

    pub fn client(&self) -> VirshClient {
        VirshClient::new(&self.virsh_path, &self.libvirt_uri)
    }
}
