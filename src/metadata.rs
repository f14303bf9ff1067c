// ABOUTME: Source database sizing and the size-based transfer classification
// ABOUTME: Sums data and index length per schema from information_schema on MySQL

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use std::sync::Arc;

use crate::credentials::{CredentialNames, ScopedCredentials};
use crate::error::{MigrationError, Result};
use crate::secrets::SecretProvider;

/// Databases at or above this size go through the replication service.
pub const TRANSFER_THRESHOLD_GB: f64 = 100.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

const SCHEMA_SIZE_QUERY: &str = "SELECT CAST(SUM(data_length + index_length) AS UNSIGNED) \
     FROM information_schema.TABLES WHERE table_schema = ? GROUP BY table_schema";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferClass {
    /// Dump through the object-store bucket and import.
    SmallTransfer,
    /// Managed replication service import.
    LargeTransfer,
}

impl TransferClass {
    pub fn for_size(size_gb: f64) -> Self {
        Self::for_size_with_threshold(size_gb, TRANSFER_THRESHOLD_GB)
    }

    pub fn for_size_with_threshold(size_gb: f64, threshold_gb: f64) -> Self {
        if size_gb < threshold_gb {
            TransferClass::SmallTransfer
        } else {
            TransferClass::LargeTransfer
        }
    }
}

impl std::fmt::Display for TransferClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransferClass::SmallTransfer => write!(f, "small transfer (GCS import)"),
            TransferClass::LargeTransfer => write!(f, "large transfer (DMS)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSizeClassification {
    pub database: String,
    pub size_gb: f64,
}

impl DatabaseSizeClassification {
    pub fn class(&self) -> TransferClass {
        TransferClass::for_size(self.size_gb)
    }
}

/// Reads the on-disk size of a schema, `None` when it has no tables.
#[async_trait]
pub trait SchemaSizeSource: Send + Sync {
    async fn schema_size_bytes(
        &self,
        credentials: &ScopedCredentials,
        database: &str,
    ) -> Result<Option<u64>>;
}

pub struct MySqlSizeSource;

#[async_trait]
impl SchemaSizeSource for MySqlSizeSource {
    async fn schema_size_bytes(
        &self,
        credentials: &ScopedCredentials,
        database: &str,
    ) -> Result<Option<u64>> {
        let metadata_err = |detail: String| MigrationError::Metadata {
            database: database.to_string(),
            detail,
        };

        let (host, port) = credentials
            .host_and_port()
            .ok_or_else(|| metadata_err("no source host in credentials".to_string()))?;
        let mut options = MySqlConnectOptions::new()
            .host(host)
            .username(credentials.user())
            .password(credentials.password())
            .disable_statement_logging();
        if let Some(port) = port {
            options = options.port(port);
        }

        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|e| metadata_err(format!("connection failed: {}", e)))?;

        let size: Option<Option<u64>> = sqlx::query_scalar(SCHEMA_SIZE_QUERY)
            .bind(database)
            .fetch_optional(&mut conn)
            .await
            .map_err(|e| metadata_err(format!("size query failed: {}", e)))?;

        if let Err(e) = conn.close().await {
            tracing::debug!("Closing metadata connection failed: {}", e);
        }

        Ok(size.flatten())
    }
}

pub struct MetadataResolver {
    secrets: Arc<dyn SecretProvider>,
    source: Arc<dyn SchemaSizeSource>,
    names: CredentialNames,
}

impl MetadataResolver {
    pub fn new(
        secrets: Arc<dyn SecretProvider>,
        source: Arc<dyn SchemaSizeSource>,
        names: CredentialNames,
    ) -> Self {
        Self {
            secrets,
            source,
            names,
        }
    }

    /// Size of `database` in GB. A schema with no tables is size 0.
    pub async fn get_database_size(
        &self,
        database: &str,
        project_id: &str,
    ) -> Result<DatabaseSizeClassification> {
        let credentials =
            ScopedCredentials::resolve(self.secrets.as_ref(), project_id, &self.names).await?;

        let bytes = self
            .source
            .schema_size_bytes(&credentials, database)
            .await?;
        drop(credentials);

        let size_gb = bytes.map(|b| b as f64 / BYTES_PER_GB).unwrap_or(0.0);
        tracing::info!("Database '{}' is {:.2} GB", database, size_gb);

        Ok(DatabaseSizeClassification {
            database: database.to_string(),
            size_gb,
        })
    }
}
