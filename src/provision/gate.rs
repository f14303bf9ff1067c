// ABOUTME: Provisioning gate: provision, then refuse to hand out outputs until reachable
// ABOUTME: A provisioned-but-unreachable environment is reported as a readiness timeout

use std::sync::Arc;

use super::readiness::ReadinessProber;
use super::terraform::Provisioner;
use crate::error::{MigrationError, Result};
use crate::state::{InfrastructureOutputs, MCP_INSTANCE_PUBLIC_IP};

pub struct ProvisioningGate {
    provisioner: Arc<dyn Provisioner>,
    prober: ReadinessProber,
    port: u16,
}

impl ProvisioningGate {
    pub fn new(provisioner: Arc<dyn Provisioner>, prober: ReadinessProber, port: u16) -> Self {
        Self {
            provisioner,
            prober,
            port,
        }
    }

    pub async fn provision_and_wait_ready(&self) -> Result<InfrastructureOutputs> {
        let outputs = self.provisioner.provision().await?;
        self.wait_ready(outputs).await
    }

    /// Gate outputs that were obtained some other way (e.g. an earlier apply).
    pub async fn wait_ready(&self, outputs: InfrastructureOutputs) -> Result<InfrastructureOutputs> {
        let address = outputs.require(MCP_INSTANCE_PUBLIC_IP)?;

        let outcome = self.prober.wait_until_ready(address, self.port).await;
        if !outcome.ready {
            return Err(MigrationError::ReadinessTimeout {
                address: format!("{}:{}", address, self.port),
                timeout_secs: self.prober.total_timeout().as_secs(),
            });
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::readiness::tests::ScriptedHealth;
    use crate::provision::readiness::{ManualClock, ProbeResult};
    use crate::state::{CLOUD_SQL_INSTANCE_NAME, MIGRATION_GCS_BUCKET, SOURCE_DB_PRIVATE_IP};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FixedProvisioner(Result<InfrastructureOutputs>);

    #[async_trait]
    impl Provisioner for FixedProvisioner {
        async fn provision(&self) -> Result<InfrastructureOutputs> {
            match &self.0 {
                Ok(outputs) => Ok(outputs.clone()),
                Err(e) => Err(MigrationError::ProvisioningFailure(e.to_string())),
            }
        }
    }

    fn outputs(keys: &[&str]) -> InfrastructureOutputs {
        let values: BTreeMap<String, String> = keys
            .iter()
            .map(|k| (k.to_string(), format!("{}-value", k)))
            .collect();
        InfrastructureOutputs::new(values)
    }

    fn gate(
        provisioned: Result<InfrastructureOutputs>,
        health: Arc<ScriptedHealth>,
    ) -> ProvisioningGate {
        let prober = ReadinessProber::new(health, Arc::new(ManualClock::new()));
        ProvisioningGate::new(Arc::new(FixedProvisioner(provisioned)), prober, 8000)
    }

    #[tokio::test]
    async fn test_all_outputs_and_ready() {
        let all = outputs(&[
            MCP_INSTANCE_PUBLIC_IP,
            SOURCE_DB_PRIVATE_IP,
            CLOUD_SQL_INSTANCE_NAME,
            MIGRATION_GCS_BUCKET,
        ]);
        let health = Arc::new(ScriptedHealth::new(vec![ProbeResult::Healthy]));
        let result = gate(Ok(all.clone()), health.clone())
            .provision_and_wait_ready()
            .await
            .unwrap();
        assert_eq!(result, all);
        assert_eq!(health.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_address_skips_probe() {
        let partial = outputs(&[SOURCE_DB_PRIVATE_IP, CLOUD_SQL_INSTANCE_NAME]);
        let health = Arc::new(ScriptedHealth::new(vec![ProbeResult::Healthy]));
        let err = gate(Ok(partial), health.clone())
            .provision_and_wait_ready()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::MissingOutput(ref k) if k == MCP_INSTANCE_PUBLIC_IP));
        assert_eq!(health.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_is_timeout() {
        let health = Arc::new(ScriptedHealth::new(vec![ProbeResult::NotReady(
            "connection refused".into(),
        )]));
        let err = gate(Ok(outputs(&[MCP_INSTANCE_PUBLIC_IP])), health)
            .provision_and_wait_ready()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::ReadinessTimeout { timeout_secs: 180, .. }));
    }

    #[tokio::test]
    async fn test_provisioning_failure_propagates() {
        let health = Arc::new(ScriptedHealth::new(vec![ProbeResult::Healthy]));
        let err = gate(
            Err(MigrationError::ProvisioningFailure("apply failed".into())),
            health.clone(),
        )
        .provision_and_wait_ready()
        .await
        .unwrap_err();
        assert!(matches!(err, MigrationError::ProvisioningFailure(_)));
        assert_eq!(health.call_count(), 0);
    }
}
