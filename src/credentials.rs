// ABOUTME: Source database credentials resolved from the secret provider
// ABOUTME: Values are redacted from Debug output and never placed on a command line

use std::fmt;

use crate::config::SecretsConfig;
use crate::error::{MigrationError, Result};
use crate::secrets::SecretProvider;

pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASS: &str = "DB_PASS";
pub const ENV_DB_HOST: &str = "DB_HOST";

/// Secret names for the three source credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialNames {
    pub user: String,
    pub password: String,
    pub host: String,
}

impl From<&SecretsConfig> for CredentialNames {
    fn from(config: &SecretsConfig) -> Self {
        Self {
            user: config.user_secret.clone(),
            password: config.password_secret.clone(),
            host: config.host_secret.clone(),
        }
    }
}

impl Default for CredentialNames {
    fn default() -> Self {
        CredentialNames::from(&SecretsConfig::default())
    }
}

/// Direct credentials for the source database, built right before use.
///
/// Consumers take it by value so it is dropped as soon as the call returns.
pub struct ScopedCredentials {
    user: String,
    password: String,
    host: Option<String>,
}

impl ScopedCredentials {
    /// Resolve all three secrets. Any failure (including an empty value) means no credentials.
    pub async fn resolve(
        secrets: &dyn SecretProvider,
        project_id: &str,
        names: &CredentialNames,
    ) -> Result<Self> {
        let mut values =
            fetch_all(secrets, project_id, &[&names.user, &names.password, &names.host]).await?;
        let host = values.pop();
        let password = values.pop().unwrap_or_default();
        let user = values.pop().unwrap_or_default();
        Ok(Self {
            user,
            password,
            host,
        })
    }

    /// Resolve only a login (user and password). The host comes from somewhere else,
    /// such as the replication job's own connection settings.
    pub async fn resolve_login(
        secrets: &dyn SecretProvider,
        project_id: &str,
        user_secret: &str,
        password_secret: &str,
    ) -> Result<Self> {
        let mut values = fetch_all(secrets, project_id, &[user_secret, password_secret]).await?;
        let password = values.pop().unwrap_or_default();
        let user = values.pop().unwrap_or_default();
        Ok(Self {
            user,
            password,
            host: None,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Host and optional port, accepting `host` or `host:port`. `None` for a login-only set.
    pub fn host_and_port(&self) -> Option<(&str, Option<u16>)> {
        let host = self.host.as_deref()?;
        Some(match host.rsplit_once(':') {
            Some((name, port)) => match port.parse() {
                Ok(port) => (name, Some(port)),
                Err(_) => (host, None),
            },
            None => (host, None),
        })
    }

    /// Environment for a child process that streams from the source database.
    pub fn env_vars(&self) -> Vec<(&'static str, &str)> {
        let mut vars = vec![
            (ENV_DB_USER, self.user.as_str()),
            (ENV_DB_PASS, self.password.as_str()),
        ];
        if let Some(host) = &self.host {
            vars.push((ENV_DB_HOST, host.as_str()));
        }
        vars
    }
}

/// Fetch every named secret, in order. All must resolve to a non-empty value.
async fn fetch_all(
    secrets: &dyn SecretProvider,
    project_id: &str,
    names: &[&str],
) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match secrets.get_secret(project_id, name).await {
            Ok(value) if !value.is_empty() => values.push(value),
            Ok(_) => missing.push(format!("{} (empty)", name)),
            Err(e) => missing.push(e.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(values)
    } else {
        Err(MigrationError::IncompleteCredentials {
            project_id: project_id.to_string(),
            detail: missing.join("; "),
        })
    }
}

impl fmt::Debug for ScopedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredentials")
            .field("user", &"<redacted>")
            .field("password", &"<redacted>")
            .field("host", &"<redacted>")
            .finish()
    }
}
