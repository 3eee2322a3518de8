use crate::model::HealthStatus;
use crate::probe::ProbeResult;

use std::collections::BTreeMap;
use std::time::Duration;

/// Results of one collection tick, keyed by check name.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub entries: BTreeMap<String, ProbeResult>,
    pub total_duration: Duration,
}

impl HealthReport {
    /// Worst status among the entries. An empty report is healthy.
    pub fn status(&self) -> HealthStatus {
        self.entries
            .values()
            .map(|result| result.status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
