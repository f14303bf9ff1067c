// ABOUTME: Secret providers for source database credentials
// ABOUTME: Google Secret Manager over REST, plus environment and in-memory providers

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{SecretBackend, SecretsConfig};
use crate::error::{MigrationError, Result};

const SECRET_MANAGER_BASE: &str = "https://secretmanager.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
pub const ENV_SECRET_PREFIX: &str = "MIGRATOR_SECRET_";

/// Resolves the current value of a named secret in a project.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, project_id: &str, name: &str) -> Result<String>;
}

pub fn provider_from_config(config: &SecretsConfig) -> anyhow::Result<Arc<dyn SecretProvider>> {
    Ok(match config.backend {
        SecretBackend::Gcp => Arc::new(GcpSecretManager::new()?),
        SecretBackend::Env => Arc::new(EnvSecretProvider),
    })
}

#[derive(Deserialize)]
struct AccessResponse {
    payload: Payload,
}

#[derive(Deserialize)]
struct Payload {
    data: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GcpSecretManager {
    client: Client,
    base_url: String,
}

impl GcpSecretManager {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create Secret Manager HTTP client")?;

        Ok(Self {
            client,
            base_url: SECRET_MANAGER_BASE.to_string(),
        })
    }

    /// Point at a different Secret Manager endpoint (emulators, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> std::result::Result<String, String> {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| format!("metadata server unreachable: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("metadata server returned {}", response.status()));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid token response: {}", e))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretProvider for GcpSecretManager {
    async fn get_secret(&self, project_id: &str, name: &str) -> Result<String> {
        let secret_err = |detail: String| MigrationError::Secret {
            project_id: project_id.to_string(),
            name: name.to_string(),
            detail,
        };

        let token = self.access_token().await.map_err(secret_err)?;
        let url = format!(
            "{}/projects/{}/secrets/{}/versions/latest:access",
            self.base_url, project_id, name
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| secret_err(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(secret_err(format!("{}: {}", status, body)));
        }

        let access: AccessResponse = response
            .json()
            .await
            .map_err(|e| secret_err(format!("invalid response: {}", e)))?;
        let bytes = STANDARD
            .decode(access.payload.data)
            .map_err(|e| secret_err(format!("payload is not base64: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| secret_err(format!("payload is not UTF-8: {}", e)))
    }
}

/// Reads `MIGRATOR_SECRET_<NAME>` where NAME is the secret name upper-cased with
/// dashes replaced by underscores. The project id is ignored.
pub struct EnvSecretProvider;

pub fn env_var_for_secret(name: &str) -> String {
    format!(
        "{}{}",
        ENV_SECRET_PREFIX,
        name.to_ascii_uppercase().replace(['-', '.'], "_")
    )
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, project_id: &str, name: &str) -> Result<String> {
        let var = env_var_for_secret(name);
        std::env::var(&var).map_err(|_| MigrationError::Secret {
            project_id: project_id.to_string(),
            name: name.to_string(),
            detail: format!("environment variable {} not set", var),
        })
    }
}

/// Fixed secret values keyed by name; handy for local runs and tests.
#[derive(Default, Clone)]
pub struct MemorySecretProvider {
    values: HashMap<String, String>,
}

impl MemorySecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SecretProvider for MemorySecretProvider {
    async fn get_secret(&self, project_id: &str, name: &str) -> Result<String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| MigrationError::Secret {
                project_id: project_id.to_string(),
                name: name.to_string(),
                detail: "not found".to_string(),
            })
    }
}
