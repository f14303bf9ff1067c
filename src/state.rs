// ABOUTME: Provisioning outputs and the per-run record of discovered infrastructure
// ABOUTME: Coordinates are written once after provisioning and only read afterwards

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{MigrationError, Result};

pub const MCP_INSTANCE_PUBLIC_IP: &str = "mcp_instance_public_ip";
pub const SOURCE_DB_PRIVATE_IP: &str = "source_db_private_ip";
pub const CLOUD_SQL_INSTANCE_NAME: &str = "cloud_sql_instance_name";
pub const MIGRATION_GCS_BUCKET: &str = "migration_gcs_bucket";

/// Flat output-name to value mapping produced by one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfrastructureOutputs {
    values: BTreeMap<String, String>,
}

impl InfrastructureOutputs {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Flatten `terraform output -json` (`{"name": {"value": ...}}`).
    ///
    /// String values are kept verbatim; any other JSON value is rendered as JSON text.
    pub fn from_terraform_json(raw: &Value) -> Result<Self> {
        let object = raw.as_object().ok_or_else(|| {
            MigrationError::ProvisioningFailure("terraform outputs are not a JSON object".into())
        })?;

        let values = object
            .iter()
            .filter_map(|(name, entry)| {
                let value = entry.get("value")?;
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some((name.clone(), rendered))
            })
            .collect();

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Fetch a key that downstream steps depend on. Absent or empty is an error.
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(MigrationError::MissingOutput(key.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The four coordinates every workflow call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraCoordinates {
    pub mcp_instance_ip: String,
    pub source_db_ip: String,
    pub cloud_sql_instance_name: String,
    pub gcs_bucket_name: String,
}

impl InfraCoordinates {
    pub fn from_outputs(outputs: &InfrastructureOutputs) -> Result<Self> {
        Ok(Self {
            mcp_instance_ip: outputs.require(MCP_INSTANCE_PUBLIC_IP)?.to_string(),
            source_db_ip: outputs.require(SOURCE_DB_PRIVATE_IP)?.to_string(),
            cloud_sql_instance_name: outputs.require(CLOUD_SQL_INSTANCE_NAME)?.to_string(),
            gcs_bucket_name: outputs.require(MIGRATION_GCS_BUCKET)?.to_string(),
        })
    }
}

/// Runtime state for one migration run. Created per run and passed by reference;
/// the dispatch server never sees it.
#[derive(Debug, Clone)]
pub struct MigrationRuntimeState {
    project_id: String,
    infra: Option<InfraCoordinates>,
}

impl MigrationRuntimeState {
    pub fn new(project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        tracing::debug!("Migration state initialized for project {}", project_id);
        Self {
            project_id,
            infra: None,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Record the coordinates from a provisioning run. Only the first write is accepted.
    pub fn update_infra_details(&mut self, outputs: &InfrastructureOutputs) -> Result<()> {
        if self.infra.is_some() {
            return Err(MigrationError::StateAlreadyRecorded(self.project_id.clone()));
        }
        let coordinates = InfraCoordinates::from_outputs(outputs)?;
        tracing::info!(
            "State updated: MCP server at {}, target instance {}",
            coordinates.mcp_instance_ip,
            coordinates.cloud_sql_instance_name
        );
        self.infra = Some(coordinates);
        Ok(())
    }

    pub fn infra(&self) -> Option<&InfraCoordinates> {
        self.infra.as_ref()
    }

    pub fn mcp_instance_ip(&self) -> Option<&str> {
        self.infra.as_ref().map(|c| c.mcp_instance_ip.as_str())
    }
}
