// ABOUTME: CLI entry point for the migration control service
// ABOUTME: serve the MCP tools, run a migration, or poke at individual pieces

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mysql_cloudsql_migrator::config::{project_id_from_tfvars, MigratorConfig, DEFAULT_CONFIG_PATH};
use mysql_cloudsql_migrator::credentials::CredentialNames;
use mysql_cloudsql_migrator::mcp::{self, McpClient, ToolName, ToolRegistry};
use mysql_cloudsql_migrator::metadata::{MetadataResolver, MySqlSizeSource, TransferClass};
use mysql_cloudsql_migrator::migration;
use mysql_cloudsql_migrator::provision::{
    HttpHealthCheck, ProvisioningGate, ReadinessProber, TerraformProvisioner, TokioClock,
};
use mysql_cloudsql_migrator::secrets;
use mysql_cloudsql_migrator::state::MigrationRuntimeState;
use mysql_cloudsql_migrator::workflow::WorkflowExecutor;

#[derive(Parser)]
#[command(name = "mysql-cloudsql-migrator")]
#[command(about = "Provision, size and migrate MySQL databases to Cloud SQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP tool dispatch server
    Serve {
        /// Address to bind, overrides [server].bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Provision infrastructure and migrate the given databases
    Migrate {
        #[arg(required = true)]
        databases: Vec<String>,
        /// GCP project id (defaults to gcp_project_id in the Terraform variables file)
        #[arg(long)]
        project_id: Option<String>,
        /// Use the outputs of an existing apply instead of running terraform apply
        #[arg(long)]
        skip_provision: bool,
        /// Number of databases migrated concurrently
        #[arg(long, default_value_t = 1)]
        parallel: usize,
        /// Do not ask for confirmation before applying
        #[arg(short, long)]
        yes: bool,
    },
    /// Wait for an endpoint to answer its health check
    Probe {
        address: String,
        #[arg(long)]
        port: Option<u16>,
        /// Total timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Seconds between probes
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Call a single tool on a running MCP server
    Call {
        tool: String,
        /// Server address (IP or hostname)
        #[arg(long)]
        server: String,
        #[arg(long)]
        port: Option<u16>,
        /// Tool parameter as key=value, repeatable
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Show which transfer strategy a database size maps to
    Classify { size_gb: f64 },
}

fn parse_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let value = match serde_json::from_str::<Value>(value) {
        Ok(parsed @ (Value::Bool(_) | Value::Number(_))) => parsed,
        _ => Value::String(value.to_string()),
    };
    Ok((key.to_string(), value))
}

fn readiness_prober(config: &MigratorConfig) -> Result<ReadinessProber> {
    let health = HttpHealthCheck::new(Duration::from_secs(config.readiness.request_timeout_secs))?;
    Ok(
        ReadinessProber::new(Arc::new(health), Arc::new(TokioClock::new()))
            .with_timing(config.readiness.timeout(), config.readiness.interval()),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = MigratorConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Migrate {
            databases,
            project_id,
            skip_provision,
            parallel,
            yes,
        } => migrate(config, databases, project_id, skip_provision, parallel, yes).await,
        Commands::Probe {
            address,
            port,
            timeout,
            interval,
        } => {
            let mut config = config;
            if let Some(timeout) = timeout {
                config.readiness.timeout_secs = timeout;
            }
            if let Some(interval) = interval {
                config.readiness.interval_secs = interval;
            }
            let prober = readiness_prober(&config)?;
            let outcome = prober
                .wait_until_ready(&address, port.unwrap_or(config.readiness.port))
                .await;
            if !outcome.ready {
                bail!(
                    "{} not ready after {} probes ({}s)",
                    address,
                    outcome.attempts,
                    outcome.elapsed.as_secs()
                );
            }
            println!("✓ {} is ready ({} probes)", address, outcome.attempts);
            Ok(())
        }
        Commands::Call {
            tool,
            server,
            port,
            params,
        } => {
            let tool: ToolName = tool.parse()?;
            let client = McpClient::new(port.unwrap_or(config.readiness.port))?;
            let params: Map<String, Value> = params.into_iter().collect();
            let result = client.call_tool(Some(&server), tool, params).await;
            println!("{}", result);
            if !result.is_success() {
                bail!("Tool call '{}' failed", tool);
            }
            Ok(())
        }
        Commands::Classify { size_gb } => {
            if size_gb.is_nan() || size_gb < 0.0 {
                bail!("Size must be a non-negative number of GB");
            }
            let class = TransferClass::for_size(size_gb);
            println!("{:.2} GB -> {}", size_gb, class);
            Ok(())
        }
    }
}

async fn serve(config: MigratorConfig, bind: Option<String>) -> Result<()> {
    let secrets = secrets::provider_from_config(&config.secrets)?;
    let names = CredentialNames::from(&config.secrets);

    let resolver = MetadataResolver::new(secrets.clone(), Arc::new(MySqlSizeSource), names.clone());
    let executor = WorkflowExecutor::new(&config.workflows, secrets, names);
    let registry = Arc::new(ToolRegistry::new(Arc::new(resolver), Arc::new(executor)));

    let bind = bind.unwrap_or(config.server.bind);
    mcp::serve(&bind, registry).await
}

async fn migrate(
    config: MigratorConfig,
    databases: Vec<String>,
    project_id: Option<String>,
    skip_provision: bool,
    parallel: usize,
    yes: bool,
) -> Result<()> {
    let project_id = match project_id {
        Some(id) => id,
        None => project_id_from_tfvars(&config.terraform.vars_file)?,
    };
    tracing::info!("Starting migration for project {}", project_id);
    let mut state = MigrationRuntimeState::new(project_id);

    let provisioner = Arc::new(TerraformProvisioner::from_config(&config.terraform)?);
    let gate = ProvisioningGate::new(
        provisioner.clone(),
        readiness_prober(&config)?,
        config.readiness.port,
    );

    let outputs = if skip_provision {
        let outputs = provisioner.read_outputs().await?;
        gate.wait_ready(outputs).await?
    } else {
        if !yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "Run terraform apply in {}?",
                    provisioner.dir().display()
                ))
                .default(false)
                .interact()
                .context("Failed to read confirmation")?;
            if !confirmed {
                bail!("Provisioning cancelled");
            }
        }
        gate.provision_and_wait_ready().await?
    };
    state.update_infra_details(&outputs)?;
    println!("✓ Infrastructure provisioned and MCP server is healthy");

    let client = McpClient::new(config.readiness.port)?;
    let progress = ProgressBar::new(databases.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .context("Invalid progress template")?,
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    progress.set_message("migrating databases");

    let report = migration::migrate_databases(
        &client,
        &state,
        &config.workflows.region,
        &databases,
        parallel,
        |r| {
            progress.println(r.to_string());
            progress.inc(1);
        },
    )
    .await;
    progress.finish_and_clear();

    println!("{}", report);
    if !report.all_succeeded() {
        bail!("{} of {} databases failed", report.failed(), databases.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("db_name=orders").unwrap(),
            ("db_name".to_string(), Value::String("orders".into()))
        );
        assert_eq!(
            parse_param("port=3306").unwrap(),
            ("port".to_string(), Value::from(3306))
        );
        assert_eq!(
            parse_param("ip=10.0.0.5").unwrap().1,
            Value::String("10.0.0.5".into())
        );
        assert!(parse_param("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_migrate() {
        let cli = Cli::try_parse_from([
            "mysql-cloudsql-migrator",
            "migrate",
            "orders",
            "analytics",
            "--parallel",
            "2",
            "--yes",
        ])
        .unwrap();
        match cli.command {
            Commands::Migrate {
                databases,
                parallel,
                yes,
                ..
            } => {
                assert_eq!(databases, ["orders", "analytics"]);
                assert_eq!(parallel, 2);
                assert!(yes);
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_cli_requires_databases() {
        assert!(Cli::try_parse_from(["mysql-cloudsql-migrator", "migrate"]).is_err());
    }
}
