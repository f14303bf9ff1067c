// ABOUTME: Error taxonomy for provisioning, metadata resolution and workflow dispatch
// ABOUTME: Every variant renders as a message naming the failing stage and identifier

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Provisioning failed: {0}")]
    ProvisioningFailure(String),

    #[error("Required provisioning output '{0}' is missing or empty")]
    MissingOutput(String),

    #[error("Infrastructure details for project '{0}' were already recorded for this run")]
    StateAlreadyRecorded(String),

    #[error("Instance at {address} did not become ready within {timeout_secs}s (infrastructure was provisioned and may be retried)")]
    ReadinessTimeout { address: String, timeout_secs: u64 },

    #[error("Could not resolve all database credentials for project '{project_id}': {detail}")]
    IncompleteCredentials { project_id: String, detail: String },

    #[error("Workflow '{workflow}' failed for database '{database}': {detail}")]
    WorkflowExecutionFailure {
        workflow: String,
        database: String,
        detail: String,
    },

    #[error("Tool '{0}' not found.")]
    ToolNotFound(String),

    #[error("Invalid parameters for tool '{tool}': {detail}")]
    InvalidParams { tool: String, detail: String },

    #[error("Metadata query failed for database '{database}': {detail}")]
    Metadata { database: String, detail: String },

    #[error("Secret '{name}' unavailable in project '{project_id}': {detail}")]
    Secret {
        project_id: String,
        name: String,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// True for failures scoped to one database; the batch keeps going after these.
    pub fn is_per_database(&self) -> bool {
        matches!(
            self,
            MigrationError::IncompleteCredentials { .. }
                | MigrationError::WorkflowExecutionFailure { .. }
                | MigrationError::Metadata { .. }
                | MigrationError::Secret { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_stage_and_identifier() {
        let err = MigrationError::WorkflowExecutionFailure {
            workflow: "dms".to_string(),
            database: "analytics".to_string(),
            detail: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dms"));
        assert!(msg.contains("analytics"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_provisioning_errors_are_not_per_database() {
        assert!(!MigrationError::MissingOutput("x".into()).is_per_database());
        assert!(!MigrationError::ProvisioningFailure("x".into()).is_per_database());
        assert!(!MigrationError::StateAlreadyRecorded("p".into()).is_per_database());
        assert!(MigrationError::IncompleteCredentials {
            project_id: "p".into(),
            detail: "d".into()
        }
        .is_per_database());
    }
}
