// ABOUTME: HTTP client for calling tools on the running MCP server
// ABOUTME: Fills tool parameters from the run's infrastructure state

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::models::{ToolCallRequest, ToolCallResult};
use super::tools::ToolName;
use crate::metadata::DatabaseSizeClassification;
use crate::state::MigrationRuntimeState;

pub const DEFAULT_MCP_PORT: u16 = 8000;

pub struct McpClient {
    client: Client,
    port: u16,
}

impl McpClient {
    /// Workflow calls run as long as the transfer does, so only connecting is bounded.
    pub fn new(port: u16) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, port })
    }

    fn server_url(&self, address: &str) -> String {
        format!("http://{}:{}", address, self.port)
    }

    /// Call `tool` on the server at `address`. Never fails; every problem becomes a `Failure`.
    pub async fn call_tool(
        &self,
        address: Option<&str>,
        tool: ToolName,
        params: Map<String, Value>,
    ) -> ToolCallResult {
        let Some(address) = address.filter(|a| !a.is_empty()) else {
            return ToolCallResult::Failure(
                "MCP Server IP is not set. Cannot make a real tool call. Environment setup might have failed."
                    .to_string(),
            );
        };
        let base = self.server_url(address);
        let url = format!("{}/call/{}", base, tool);

        let response = match self
            .client
            .post(&url)
            .json(&ToolCallRequest { params })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return ToolCallResult::Failure(format!(
                    "Could not connect to MCP Server at {}. Details: {}",
                    base, e
                ))
            }
        };

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ToolCallResult::Failure(format!(
                    "Tool '{}' returned status {} with an unreadable body: {}",
                    tool, status, e
                ))
            }
        };

        if status.is_success() {
            match body.get("result") {
                Some(result) => ToolCallResult::Success(result.clone()),
                None => ToolCallResult::Success(Value::String("No result returned.".to_string())),
            }
        } else {
            let detail = body
                .get("error")
                .or_else(|| body.get("detail"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            ToolCallResult::Failure(format!("{} (status {})", detail, status.as_u16()))
        }
    }

    pub async fn get_db_metadata(
        &self,
        state: &MigrationRuntimeState,
        db_name: &str,
    ) -> ToolCallResult {
        let params = object(json!({
            "db_name": db_name,
            "project_id": state.project_id(),
        }));
        self.call_tool(state.mcp_instance_ip(), ToolName::GetDbMetadata, params)
            .await
    }

    pub async fn run_gcs_import_workflow(
        &self,
        state: &MigrationRuntimeState,
        db_name: &str,
    ) -> ToolCallResult {
        let Some(infra) = state.infra() else {
            return not_provisioned();
        };
        let params = object(json!({
            "db_name": db_name,
            "gcs_bucket": infra.gcs_bucket_name,
            "instance_name": infra.cloud_sql_instance_name,
            "project_id": state.project_id(),
        }));
        self.call_tool(
            Some(&infra.mcp_instance_ip),
            ToolName::RunGcsImportWorkflow,
            params,
        )
        .await
    }

    pub async fn run_dms_workflow(
        &self,
        state: &MigrationRuntimeState,
        db_name: &str,
        region: &str,
    ) -> ToolCallResult {
        let Some(infra) = state.infra() else {
            return not_provisioned();
        };
        let params = object(json!({
            "db_name": db_name,
            "project_id": state.project_id(),
            "region": region,
            "source_db_ip": infra.source_db_ip,
            "cloud_sql_instance_id": infra.cloud_sql_instance_name,
        }));
        self.call_tool(Some(&infra.mcp_instance_ip), ToolName::RunDmsWorkflow, params)
            .await
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn not_provisioned() -> ToolCallResult {
    ToolCallResult::Failure(
        "Infrastructure details are not set. Environment setup might have failed.".to_string(),
    )
}

/// Interpret a `get_db_metadata` result: either a size or the structured error it carries.
pub fn parse_metadata(result: &ToolCallResult) -> std::result::Result<DatabaseSizeClassification, String> {
    match result {
        ToolCallResult::Success(value) => {
            if let Some(error) = value.get("error").and_then(Value::as_str) {
                return Err(error.to_string());
            }
            serde_json::from_value(value.clone())
                .map_err(|e| format!("unexpected metadata result {}: {}", value, e))
        }
        ToolCallResult::Failure(msg) => Err(msg.clone()),
    }
}
