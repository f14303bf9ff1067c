// ABOUTME: Library root for the MySQL to Cloud SQL migration control service
// ABOUTME: Exposes provisioning, sizing, workflow execution and the MCP dispatch layer

pub mod config;
pub mod credentials;
pub mod error;
pub mod mcp;
pub mod metadata;
pub mod migration;
pub mod provision;
pub mod secrets;
pub mod state;
pub mod workflow;

pub use error::{MigrationError, Result};
pub use metadata::{DatabaseSizeClassification, TransferClass, TRANSFER_THRESHOLD_GB};
pub use state::{InfrastructureOutputs, MigrationRuntimeState};
