//! Application liveness probe.

use super::{Probe, ProbeContext, ProbeResult};
use crate::lifetime::Shutdown;
use crate::model::HealthStatus;

use async_trait::async_trait;

/// Healthy until the process begins shutting down, unhealthy from then on.
pub struct ApplicationStatusProbe {
    shutdown: Shutdown,
}

impl ApplicationStatusProbe {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl Probe for ApplicationStatusProbe {
    async fn check(&self, _ctx: &ProbeContext) -> ProbeResult {
        if self.shutdown.is_stopping() {
            ProbeResult::new(HealthStatus::Unhealthy, "application is shutting down")
        } else {
            ProbeResult::healthy()
        }
    }
}
