// ABOUTME: Per-database migration pipeline driven through the MCP server
// ABOUTME: metadata -> classify -> transfer, one report per database, failures never stop the batch

use futures::stream::{self, StreamExt};
use std::fmt;

use crate::mcp::{parse_metadata, McpClient, ToolCallResult};
use crate::metadata::{DatabaseSizeClassification, TransferClass};
use crate::state::MigrationRuntimeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Transfer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Metadata => write!(f, "metadata"),
            Stage::Transfer => write!(f, "transfer"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseOutcome {
    Migrated { output: String },
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseReport {
    pub database: String,
    pub size: Option<DatabaseSizeClassification>,
    pub outcome: DatabaseOutcome,
}

impl DatabaseReport {
    pub fn class(&self) -> Option<TransferClass> {
        self.size.as_ref().map(DatabaseSizeClassification::class)
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, DatabaseOutcome::Migrated { .. })
    }
}

impl fmt::Display for DatabaseReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sizing = match &self.size {
            Some(size) => format!("{:.2} GB, {}", size.size_gb, size.class()),
            None => "size unknown".to_string(),
        };
        match &self.outcome {
            DatabaseOutcome::Migrated { .. } => {
                write!(f, "✓ {} ({}): migrated", self.database, sizing)
            }
            DatabaseOutcome::Failed { stage, error } => write!(
                f,
                "✗ {} ({}): {} stage failed: {}",
                self.database, sizing, stage, error
            ),
        }
    }
}

/// Migrate one database. Metadata always completes before a transfer is chosen.
pub async fn migrate_database(
    client: &McpClient,
    state: &MigrationRuntimeState,
    region: &str,
    database: &str,
) -> DatabaseReport {
    let metadata = client.get_db_metadata(state, database).await;
    let size = match parse_metadata(&metadata) {
        Ok(size) => size,
        Err(error) => {
            tracing::warn!("Could not size '{}': {}", database, error);
            return DatabaseReport {
                database: database.to_string(),
                size: None,
                outcome: DatabaseOutcome::Failed {
                    stage: Stage::Metadata,
                    error,
                },
            };
        }
    };

    let class = size.class();
    tracing::info!(
        "'{}' is {:.2} GB, using {}",
        database,
        size.size_gb,
        class
    );

    let result = match class {
        TransferClass::SmallTransfer => client.run_gcs_import_workflow(state, database).await,
        TransferClass::LargeTransfer => client.run_dms_workflow(state, database, region).await,
    };

    let outcome = match result {
        ToolCallResult::Success(value) => DatabaseOutcome::Migrated {
            output: ToolCallResult::Success(value).to_string(),
        },
        ToolCallResult::Failure(error) => DatabaseOutcome::Failed {
            stage: Stage::Transfer,
            error,
        },
    };

    DatabaseReport {
        database: database.to_string(),
        size: Some(size),
        outcome,
    }
}

/// Migrate every database with at most `parallel` in flight. Reports keep input order.
///
/// `state` must already hold the provisioned coordinates; it is only read here.
pub async fn migrate_databases<F>(
    client: &McpClient,
    state: &MigrationRuntimeState,
    region: &str,
    databases: &[String],
    parallel: usize,
    on_report: F,
) -> MigrationReport
where
    F: Fn(&DatabaseReport),
{
    let reports = stream::iter(databases)
        .map(|database| migrate_database(client, state, region, database))
        .buffered(parallel.max(1))
        .inspect(|report| on_report(report))
        .collect::<Vec<_>>()
        .await;

    MigrationReport { databases: reports }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub databases: Vec<DatabaseReport>,
}

impl MigrationReport {
    pub fn succeeded(&self) -> usize {
        self.databases.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.databases.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Migration report")?;
        writeln!(f, "================")?;
        for report in &self.databases {
            writeln!(f, "{}", report)?;
        }
        writeln!(
            f,
            "\n{} migrated, {} failed",
            self.succeeded(),
            self.failed()
        )?;

        if self.succeeded() > 0 {
            writeln!(f, "\nRecommended follow-up:")?;
            writeln!(f, "  - compare row counts of critical tables between source and target")?;
            let has_large = self
                .databases
                .iter()
                .any(|r| r.succeeded() && r.class() == Some(TransferClass::LargeTransfer));
            if has_large {
                writeln!(f, "  - confirm DMS jobs reached CDC and promote once replication lag is zero")?;
            }
            writeln!(f, "  - review target instance sizing and consider read replicas for read-heavy databases")?;
        }
        Ok(())
    }
}
