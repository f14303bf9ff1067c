// ABOUTME: TOML configuration for the migrator plus Terraform variables lookup
// ABOUTME: Every field has a default so a missing config file is valid

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MigrationError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "migrator.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub server: ServerConfig,
    pub readiness: ReadinessConfig,
    pub terraform: TerraformConfig,
    pub secrets: SecretsConfig,
    pub workflows: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub port: u16,
    pub timeout_secs: u64,
    pub interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            timeout_secs: 180,
            interval_secs: 15,
            request_timeout_secs: 10,
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    pub dir: PathBuf,
    pub binary: String,
    pub vars_file: PathBuf,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("terraform"),
            binary: "terraform".to_string(),
            vars_file: PathBuf::from("terraform/terraform.tfvars"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretBackend {
    Gcp,
    Env,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    pub user_secret: String,
    pub password_secret: String,
    pub host_secret: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Gcp,
            user_secret: "source-db-user".to_string(),
            password_secret: "source-db-password".to_string(),
            host_secret: "source-db-host-internal".to_string(),
        }
    }
}

/// How the large-transfer workflow authenticates against the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DmsCredentialPolicy {
    /// The replication service uses connection profiles registered ahead of time.
    ConnectionProfile,
    /// User and password secrets are resolved and injected into the child environment.
    SecretInjection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub interpreter: String,
    pub gcs_script: PathBuf,
    pub dms_script: PathBuf,
    pub region: String,
    pub dms_credentials: DmsCredentialPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            interpreter: "bash".to_string(),
            gcs_script: PathBuf::from("scripts/gcs_import_workflow.sh"),
            dms_script: PathBuf::from("scripts/dms_workflow.sh"),
            region: "us-central1".to_string(),
            dms_credentials: DmsCredentialPolicy::ConnectionProfile,
        }
    }
}

impl MigratorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| MigrationError::Config(e.to_string()))
    }

    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| MigrationError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Parse the string assignments (`key = "value"`) of a Terraform variables file.
///
/// Only single-line quoted scalar assignments are picked up; lists, maps and heredocs
/// are skipped. Backslash escapes inside the quotes are honoured.
pub fn parse_tfvars(raw: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if let Some(inner) = value.trim().strip_prefix('"').and_then(unquote) {
            vars.insert(key.trim().to_string(), inner);
        }
    }
    vars
}

/// Read a quoted string body up to its closing quote. `None` if the quote is never closed.
fn unquote(body: &str) -> Option<String> {
    let mut value = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                other => value.push(other),
            },
            other => value.push(other),
        }
    }
    None
}

/// Read `gcp_project_id` from the Terraform variables file.
pub fn project_id_from_tfvars(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        MigrationError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_tfvars(&raw)
        .remove("gcp_project_id")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            MigrationError::Config(format!("gcp_project_id not found in {}", path.display()))
        })
}
