// ABOUTME: Named parameters accepted by the two transfer workflows
// ABOUTME: Unknown fields are rejected so caller/registry mismatches surface early

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmallTransferParams {
    pub db_name: String,
    pub gcs_bucket: String,
    pub instance_name: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LargeTransferParams {
    pub db_name: String,
    pub project_id: String,
    pub region: String,
    pub source_db_ip: String,
    pub cloud_sql_instance_id: String,
    /// Secret name overrides, only read under the secret-injection policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_secret: Option<String>,
}
