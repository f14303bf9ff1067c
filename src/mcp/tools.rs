// ABOUTME: Closed registry of the three dispatchable tools and their handlers
// ABOUTME: Unknown tool names are rejected before any capability runs

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MigrationError, Result};
use crate::metadata::{DatabaseSizeClassification, MetadataResolver};
use crate::workflow::{LargeTransferParams, SmallTransferParams, WorkflowExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetDbMetadata,
    RunGcsImportWorkflow,
    RunDmsWorkflow,
}

impl ToolName {
    pub const ALL: [ToolName; 3] = [
        ToolName::GetDbMetadata,
        ToolName::RunGcsImportWorkflow,
        ToolName::RunDmsWorkflow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetDbMetadata => "get_db_metadata",
            ToolName::RunGcsImportWorkflow => "run_gcs_import_workflow",
            ToolName::RunDmsWorkflow => "run_dms_workflow",
        }
    }
}

impl FromStr for ToolName {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| MigrationError::ToolNotFound(s.to_string()))
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataParams {
    pub db_name: String,
    pub project_id: String,
}

#[async_trait]
pub trait MetadataCapability: Send + Sync {
    async fn get_database_size(
        &self,
        database: &str,
        project_id: &str,
    ) -> Result<DatabaseSizeClassification>;
}

#[async_trait]
impl MetadataCapability for MetadataResolver {
    async fn get_database_size(
        &self,
        database: &str,
        project_id: &str,
    ) -> Result<DatabaseSizeClassification> {
        MetadataResolver::get_database_size(self, database, project_id).await
    }
}

#[async_trait]
pub trait TransferCapability: Send + Sync {
    async fn run_small_transfer(&self, params: SmallTransferParams) -> Result<String>;
    async fn run_large_transfer(&self, params: LargeTransferParams) -> Result<String>;
}

#[async_trait]
impl TransferCapability for WorkflowExecutor {
    async fn run_small_transfer(&self, params: SmallTransferParams) -> Result<String> {
        WorkflowExecutor::run_small_transfer(self, params).await
    }

    async fn run_large_transfer(&self, params: LargeTransferParams) -> Result<String> {
        WorkflowExecutor::run_large_transfer(self, params).await
    }
}

/// Stateless router from tool name to capability. Holds no infrastructure coordinates.
#[derive(Clone)]
pub struct ToolRegistry {
    metadata: Arc<dyn MetadataCapability>,
    transfers: Arc<dyn TransferCapability>,
}

impl ToolRegistry {
    pub fn new(
        metadata: Arc<dyn MetadataCapability>,
        transfers: Arc<dyn TransferCapability>,
    ) -> Self {
        Self {
            metadata,
            transfers,
        }
    }

    /// Run `tool_name` with `params`.
    ///
    /// Metadata failures come back as `Ok({"error": ...})` so callers can keep going;
    /// workflow failures and bad parameters are `Err`.
    pub async fn call(&self, tool_name: &str, params: Map<String, Value>) -> Result<Value> {
        let tool = ToolName::from_str(tool_name)?;
        check_primitive(tool, &params)?;

        match tool {
            ToolName::GetDbMetadata => {
                let params: MetadataParams = parse_params(tool, params)?;
                match self
                    .metadata
                    .get_database_size(&params.db_name, &params.project_id)
                    .await
                {
                    Ok(size) => Ok(json!({
                        "database": size.database,
                        "size_gb": size.size_gb,
                    })),
                    Err(e) => {
                        tracing::warn!("Metadata lookup for '{}' failed: {}", params.db_name, e);
                        Ok(json!({ "error": e.to_string() }))
                    }
                }
            }
            ToolName::RunGcsImportWorkflow => {
                let params: SmallTransferParams = parse_params(tool, params)?;
                self.transfers
                    .run_small_transfer(params)
                    .await
                    .map(Value::String)
            }
            ToolName::RunDmsWorkflow => {
                let params: LargeTransferParams = parse_params(tool, params)?;
                self.transfers
                    .run_large_transfer(params)
                    .await
                    .map(Value::String)
            }
        }
    }
}

fn check_primitive(tool: ToolName, params: &Map<String, Value>) -> Result<()> {
    match params
        .iter()
        .find(|(_, value)| value.is_object() || value.is_array())
    {
        Some((key, _)) => Err(MigrationError::InvalidParams {
            tool: tool.to_string(),
            detail: format!("parameter '{}' must be a primitive value", key),
        }),
        None => Ok(()),
    }
}

fn parse_params<T: DeserializeOwned>(tool: ToolName, params: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(params)).map_err(|e| MigrationError::InvalidParams {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Capability double that records what it was asked to do.
    #[derive(Default)]
    pub(crate) struct RecordingCapabilities {
        pub(crate) size_gb: Option<f64>,
        pub(crate) transfer_error: Option<String>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataCapability for RecordingCapabilities {
        async fn get_database_size(
            &self,
            database: &str,
            project_id: &str,
        ) -> Result<DatabaseSizeClassification> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("metadata {} {}", database, project_id));
            match self.size_gb {
                Some(size_gb) => Ok(DatabaseSizeClassification {
                    database: database.to_string(),
                    size_gb,
                }),
                None => Err(MigrationError::IncompleteCredentials {
                    project_id: project_id.to_string(),
                    detail: "source-db-password not found".to_string(),
                }),
            }
        }
    }

    #[async_trait]
    impl TransferCapability for RecordingCapabilities {
        async fn run_small_transfer(&self, params: SmallTransferParams) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("small {}", params.db_name));
            Ok(format!("SUCCESS: GCS import workflow script output:\nLoaded {}", params.db_name))
        }

        async fn run_large_transfer(&self, params: LargeTransferParams) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("large {}", params.db_name));
            match &self.transfer_error {
                Some(detail) => Err(MigrationError::WorkflowExecutionFailure {
                    workflow: "DMS".to_string(),
                    database: params.db_name,
                    detail: detail.clone(),
                }),
                None => Ok("SUCCESS: DMS workflow script output:\n".to_string()),
            }
        }
    }

    fn registry(caps: Arc<RecordingCapabilities>) -> ToolRegistry {
        ToolRegistry::new(caps.clone(), caps)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_name_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!(matches!(
            "drop_database".parse::<ToolName>(),
            Err(MigrationError::ToolNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_invokes_nothing() {
        let caps = Arc::new(RecordingCapabilities::default());
        let err = registry(caps.clone())
            .call("nonexistentTool", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ToolNotFound(ref t) if t == "nonexistentTool"));
        assert!(caps.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_success() {
        let caps = Arc::new(RecordingCapabilities {
            size_gb: Some(42.5),
            ..Default::default()
        });
        let result = registry(caps)
            .call(
                "get_db_metadata",
                params(json!({"db_name": "orders", "project_id": "proj"})),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"database": "orders", "size_gb": 42.5}));
    }

    #[tokio::test]
    async fn test_metadata_failure_is_structured_result() {
        let caps = Arc::new(RecordingCapabilities::default());
        let result = registry(caps)
            .call(
                "get_db_metadata",
                params(json!({"db_name": "orders", "project_id": "proj"})),
            )
            .await
            .unwrap();
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("source-db-password"));
    }

    #[tokio::test]
    async fn test_missing_param_is_validation_error() {
        let caps = Arc::new(RecordingCapabilities::default());
        let err = registry(caps.clone())
            .call("run_gcs_import_workflow", params(json!({"db_name": "orders"})))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidParams { .. }));
        assert!(err.to_string().contains("gcs_bucket"));
        assert!(caps.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_param_rejected() {
        let caps = Arc::new(RecordingCapabilities::default());
        let err = registry(caps)
            .call(
                "get_db_metadata",
                params(json!({"db_name": {"name": "orders"}, "project_id": "proj"})),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("db_name"));
    }

    #[tokio::test]
    async fn test_workflow_failure_is_error() {
        let caps = Arc::new(RecordingCapabilities {
            transfer_error: Some("exit code 1: connection refused".to_string()),
            ..Default::default()
        });
        let err = registry(caps)
            .call(
                "run_dms_workflow",
                params(json!({
                    "db_name": "analytics",
                    "project_id": "proj",
                    "region": "us-central1",
                    "source_db_ip": "10.0.0.5",
                    "cloud_sql_instance_id": "target-sql"
                })),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
