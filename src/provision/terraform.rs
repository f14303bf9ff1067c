// ABOUTME: Terraform-backed provisioner: init, apply, then read the JSON outputs
// ABOUTME: Any non-zero terraform exit is reported as a provisioning failure

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::config::TerraformConfig;
use crate::error::{MigrationError, Result};
use crate::state::InfrastructureOutputs;

/// Declarative infrastructure provisioning returning the flat output set.
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self) -> Result<InfrastructureOutputs>;
}

pub struct TerraformProvisioner {
    binary: PathBuf,
    dir: PathBuf,
}

impl TerraformProvisioner {
    pub fn from_config(config: &TerraformConfig) -> Result<Self> {
        let binary = which::which(&config.binary).map_err(|e| {
            MigrationError::ProvisioningFailure(format!(
                "terraform binary '{}' not found: {}",
                config.binary, e
            ))
        })?;
        Ok(Self::new(binary, config.dir.clone()))
    }

    pub fn new(binary: PathBuf, dir: PathBuf) -> Self {
        Self { binary, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn terraform(&self, args: &[&str]) -> Result<String> {
        tracing::info!("-> Running 'terraform {}'", args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .output()
            .await
            .map_err(|e| {
                MigrationError::ProvisioningFailure(format!(
                    "failed to start terraform {}: {}",
                    args.join(" "),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MigrationError::ProvisioningFailure(format!(
                "terraform {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            return Err(MigrationError::ProvisioningFailure(format!(
                "terraform directory {} does not exist",
                self.dir.display()
            )));
        }
        Ok(())
    }

    /// Read the outputs of an already-applied configuration.
    pub async fn read_outputs(&self) -> Result<InfrastructureOutputs> {
        self.ensure_dir()?;
        let raw = self.terraform(&["output", "-json"]).await?;
        let json: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            MigrationError::ProvisioningFailure(format!("unparseable terraform outputs: {}", e))
        })?;
        let outputs = InfrastructureOutputs::from_terraform_json(&json)?;
        tracing::info!("Terraform outputs captured ({} values)", outputs.len());
        Ok(outputs)
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn provision(&self) -> Result<InfrastructureOutputs> {
        self.ensure_dir()?;
        self.terraform(&["init", "-upgrade"]).await?;
        self.terraform(&["apply", "-auto-approve"]).await?;
        self.read_outputs().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Fake terraform: `output -json` prints the given JSON, `apply` honours FAIL_APPLY.
    fn fake_terraform(dir: &Path, outputs: &str, fail_apply: bool) -> PathBuf {
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  apply) {} ;;\n  output) echo '{}' ;;\n  *) exit 0 ;;\nesac\n",
            if fail_apply {
                "echo 'Error: quota exceeded' >&2; exit 1"
            } else {
                "exit 0"
            },
            outputs
        );
        let path = dir.join("terraform");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_provision_reads_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_terraform(
            dir.path(),
            r#"{"mcp_instance_public_ip":{"value":"34.9.9.9"}}"#,
            false,
        );
        let provisioner = TerraformProvisioner::new(binary, dir.path().to_path_buf());
        let outputs = provisioner.provision().await.unwrap();
        assert_eq!(outputs.get("mcp_instance_public_ip"), Some("34.9.9.9"));
    }

    #[tokio::test]
    async fn test_apply_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_terraform(dir.path(), "{}", true);
        let provisioner = TerraformProvisioner::new(binary, dir.path().to_path_buf());
        let err = provisioner.provision().await.unwrap_err();
        assert!(matches!(err, MigrationError::ProvisioningFailure(ref m) if m.contains("quota exceeded")));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let provisioner = TerraformProvisioner::new(
            PathBuf::from("terraform"),
            PathBuf::from("/nonexistent/terraform-dir"),
        );
        let err = provisioner.provision().await.unwrap_err();
        assert!(matches!(err, MigrationError::ProvisioningFailure(_)));
    }

    #[test]
    fn test_from_config_unknown_binary() {
        let config = TerraformConfig {
            binary: "terraform-binary-that-does-not-exist".to_string(),
            ..TerraformConfig::default()
        };
        assert!(TerraformProvisioner::from_config(&config).is_err());
    }
}
