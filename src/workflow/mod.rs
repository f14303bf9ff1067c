// ABOUTME: Bulk-transfer workflow executor wrapping the two external transfer scripts
// ABOUTME: Small transfers get credentials via the child environment; large ones use connection profiles

pub mod params;

pub use params::{LargeTransferParams, SmallTransferParams};

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::config::{DmsCredentialPolicy, WorkflowConfig};
use crate::credentials::{
    CredentialNames, ScopedCredentials, ENV_DB_HOST, ENV_DB_PASS, ENV_DB_USER,
};
use crate::error::{MigrationError, Result};
use crate::secrets::{SecretProvider, ACCESS_TOKEN_ENV, ENV_SECRET_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    GcsImport,
    Dms,
}

impl WorkflowKind {
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowKind::GcsImport => "GCS import",
            WorkflowKind::Dms => "DMS",
        }
    }
}

pub struct WorkflowExecutor {
    interpreter: String,
    gcs_script: PathBuf,
    dms_script: PathBuf,
    dms_credentials: DmsCredentialPolicy,
    secrets: Arc<dyn SecretProvider>,
    names: CredentialNames,
}

impl WorkflowExecutor {
    pub fn new(
        config: &WorkflowConfig,
        secrets: Arc<dyn SecretProvider>,
        names: CredentialNames,
    ) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            gcs_script: config.gcs_script.clone(),
            dms_script: config.dms_script.clone(),
            dms_credentials: config.dms_credentials,
            secrets,
            names,
        }
    }

    /// Dump through the bucket and import into the target instance.
    pub async fn run_small_transfer(&self, params: SmallTransferParams) -> Result<String> {
        let credentials =
            ScopedCredentials::resolve(self.secrets.as_ref(), &params.project_id, &self.names)
                .await?;

        let args = vec![
            params.db_name.clone(),
            params.gcs_bucket,
            params.instance_name,
            params.project_id,
        ];
        self.invoke(
            WorkflowKind::GcsImport,
            &params.db_name,
            &self.gcs_script,
            args,
            Some(credentials),
        )
        .await
    }

    /// Hand the database to the managed replication service.
    pub async fn run_large_transfer(&self, params: LargeTransferParams) -> Result<String> {
        let credentials = match self.dms_credentials {
            DmsCredentialPolicy::ConnectionProfile => None,
            // The job reaches the source through `source_db_ip`; only a login is injected.
            DmsCredentialPolicy::SecretInjection => Some(
                ScopedCredentials::resolve_login(
                    self.secrets.as_ref(),
                    &params.project_id,
                    params.user_secret.as_deref().unwrap_or(&self.names.user),
                    params.pass_secret.as_deref().unwrap_or(&self.names.password),
                )
                .await?,
            ),
        };

        let args = vec![
            params.db_name.clone(),
            params.project_id,
            params.region,
            params.source_db_ip,
            params.cloud_sql_instance_id,
        ];
        self.invoke(
            WorkflowKind::Dms,
            &params.db_name,
            &self.dms_script,
            args,
            credentials,
        )
        .await
    }

    async fn invoke(
        &self,
        kind: WorkflowKind,
        database: &str,
        script: &Path,
        args: Vec<String>,
        credentials: Option<ScopedCredentials>,
    ) -> Result<String> {
        let failure = |detail: String| MigrationError::WorkflowExecutionFailure {
            workflow: kind.label().to_string(),
            database: database.to_string(),
            detail,
        };

        tracing::info!(
            "Running {} workflow for '{}': {} {} {}",
            kind.label(),
            database,
            self.interpreter,
            script.display(),
            args.join(" ")
        );

        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, _) in std::env::vars_os() {
            if key.to_str().is_some_and(is_inherited_secret) {
                command.env_remove(&key);
            }
        }
        if let Some(credentials) = &credentials {
            for (key, value) in credentials.env_vars() {
                command.env(key, value);
            }
        }

        let output = command.output().await;
        drop(command);
        drop(credentials);

        let output = output.map_err(|e| {
            failure(format!(
                "failed to start {} {}: {}",
                self.interpreter,
                script.display(),
                e
            ))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => output.status.to_string(),
            };
            let diagnostics = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            tracing::error!(
                "{} workflow for '{}' failed ({})",
                kind.label(),
                database,
                status
            );
            return Err(failure(format!("{}: {}", status, diagnostics)));
        }

        if !stderr.trim().is_empty() {
            tracing::debug!("{} workflow stderr: {}", kind.label(), stderr.trim());
        }
        tracing::info!("{} workflow for '{}' completed", kind.label(), database);
        Ok(format!(
            "SUCCESS: {} workflow script output:\n{}",
            kind.label(),
            stdout
        ))
    }
}

/// Variables a workflow child must never inherit from the server process. Direct
/// credentials reach a child only through explicit injection.
fn is_inherited_secret(key: &str) -> bool {
    key.starts_with(ENV_SECRET_PREFIX)
        || key == ACCESS_TOKEN_ENV
        || [ENV_DB_USER, ENV_DB_PASS, ENV_DB_HOST].contains(&key)
}
