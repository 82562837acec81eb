//! libvirt backend driven through the `virsh` command line client
//!
//! Every call spawns its own `virsh` process with its own connection, so the
//! client is safe to share between concurrent provisioning tasks. Child
//! processes are killed when the calling future is dropped, which lets a
//! caller-side timeout abort a hung hypervisor call.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use super::DomainHandle;
use super::DomainState;
use super::HypervisorClient;
use super::HypervisorError;
use super::StoragePoolHandle;
use super::VolumeHandle;

pub struct VirshClient {
    virsh_path: PathBuf,
    connect_uri: String,
}

impl VirshClient {
    pub fn new(virsh_path: impl Into<PathBuf>, connect_uri: impl Into<String>) -> Self {
        Self {
            virsh_path: virsh_path.into(),
            connect_uri: connect_uri.into(),
        }
    }

    async fn run<I, S>(&self, operation: &str, args: I) -> Result<String, Report<HypervisorError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(&self.virsh_path)
            .arg("--connect")
            .arg(&self.connect_uri)
            .arg(operation)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .change_context(HypervisorError::Unavailable {
                message: format!("failed to execute {}", self.virsh_path.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Report::new(HypervisorError::CommandFailed {
                operation: operation.to_string(),
                message: stderr,
            })
            .attach_printable(format!("exit status: {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(operation = operation, output = %stdout.trim(), "virsh command succeeded");
        Ok(stdout)
    }

    /// Runs a command that takes an XML definition file as its last argument.
    async fn run_with_definition(
        &self,
        operation: &str,
        args: &[&str],
        definition: &str,
    ) -> Result<String, Report<HypervisorError>> {
        let mut file = tempfile::Builder::new()
            .prefix("manager-")
            .suffix(".xml")
            .tempfile()
            .change_context(HypervisorError::Unavailable {
                message: "failed to create definition file".to_string(),
            })?;
        file.write_all(definition.as_bytes())
            .and_then(|()| file.flush())
            .change_context(HypervisorError::Unavailable {
                message: "failed to write definition file".to_string(),
            })?;

        let mut full_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        full_args.push(file.path().as_os_str());

        // `file` lives until the command returned
        self.run(operation, full_args).await
    }
}

/// Extracts `NAME` from lines like `Pool NAME created from ...` or
/// `Domain 'NAME' defined from ...`.
fn parse_object_name(output: &str, kind: &str, verb: &str) -> Option<String> {
    let suffix = format!(" {verb}");
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(kind)?.strip_prefix(' ')?;
        let end = rest.find(&suffix)?;
        let name = rest[..end].trim().trim_matches(|c| c == '\'' || c == '"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

fn unexpected(operation: &str, output: &str) -> Report<HypervisorError> {
    Report::new(HypervisorError::UnexpectedOutput {
        operation: operation.to_string(),
        output: output.trim().to_string(),
    })
}

#[async_trait]
impl HypervisorClient for VirshClient {
    async fn create_storage_pool(
        &self,
        pool_xml: &str,
    ) -> Result<StoragePoolHandle, Report<HypervisorError>> {
        // --build creates the pool's target directory when it does not exist yet
        let output = self
            .run_with_definition("pool-create", &["--build"], pool_xml)
            .await?;
        let name = parse_object_name(&output, "Pool", "created")
            .ok_or_else(|| unexpected("pool-create", &output))?;
        Ok(StoragePoolHandle { name })
    }

    async fn create_volume(
        &self,
        pool: &StoragePoolHandle,
        volume_xml: &str,
    ) -> Result<VolumeHandle, Report<HypervisorError>> {
        let output = self
            .run_with_definition("vol-create", &["--pool", pool.name.as_str()], volume_xml)
            .await?;
        let name = parse_object_name(&output, "Vol", "created")
            .ok_or_else(|| unexpected("vol-create", &output))?;
        Ok(VolumeHandle {
            pool: pool.name.clone(),
            name,
        })
    }

    async fn define_and_start_domain(
        &self,
        domain_xml: &str,
    ) -> Result<DomainHandle, Report<HypervisorError>> {
        let output = self.run_with_definition("define", &[], domain_xml).await?;
        let name = parse_object_name(&output, "Domain", "defined")
            .ok_or_else(|| unexpected("define", &output))?;

        if let Err(start_err) = self.run("start", [&name]).await {
            // never leave a defined but stopped domain behind
            if let Err(undefine_err) = self.run("undefine", [&name]).await {
                warn!(domain = %name, error = ?undefine_err, "failed to undefine domain after start failure");
            }
            return Err(start_err);
        }

        Ok(DomainHandle { name })
    }

    async fn domain_state(
        &self,
        domain: &DomainHandle,
    ) -> Result<DomainState, Report<HypervisorError>> {
        let output = self.run("domstate", [&domain.name]).await?;
        let state = output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| unexpected("domstate", &output))?;
        Ok(DomainState::parse(state))
    }

    async fn destroy_domain(&self, domain: &DomainHandle) -> Result<(), Report<HypervisorError>> {
        if self.domain_state(domain).await? != DomainState::ShutOff {
            self.run("destroy", [&domain.name]).await?;
        }
        self.run("undefine", [&domain.name]).await?;
        Ok(())
    }

    async fn delete_volume(&self, volume: &VolumeHandle) -> Result<(), Report<HypervisorError>> {
        self.run(
            "vol-delete",
            ["--pool", volume.pool.as_str(), volume.name.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn destroy_storage_pool(
        &self,
        pool: &StoragePoolHandle,
    ) -> Result<(), Report<HypervisorError>> {
        self.run("pool-destroy", [&pool.name]).await?;
        Ok(())
    }
}
