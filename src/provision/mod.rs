// ABOUTME: Provisioning module
// ABOUTME: Terraform apply, readiness probing and the gate that composes them

pub mod gate;
pub mod readiness;
pub mod terraform;

pub use gate::ProvisioningGate;
pub use readiness::{
    Clock, HealthCheck, HttpHealthCheck, ManualClock, ProbeResult, ProbeState,
    ReadinessProbeOutcome, ReadinessProber, TokioClock,
};
pub use terraform::{Provisioner, TerraformProvisioner};
