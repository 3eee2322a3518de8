//! Process memory probe.

use super::{Probe, ProbeContext, ProbeResult};
use crate::model::HealthStatus;

use async_trait::async_trait;
use serde::Deserialize;
use std::io;

fn default_maximum_memory() -> u64 {
    32 * 1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocatedMemoryOptions {
    /// Megabytes.
    #[serde(default = "default_maximum_memory")]
    pub maximum_memory: u64,
}

impl Default for AllocatedMemoryOptions {
    fn default() -> Self {
        Self {
            maximum_memory: default_maximum_memory(),
        }
    }
}

/// Resident set size of this process in bytes.
pub fn resident_memory_bytes() -> io::Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    parse_vm_rss(&status).ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "VmRSS not reported"))
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kilobytes: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kilobytes * 1024)
}

/// Unhealthy once memory use reaches the configured maximum.
pub struct AllocatedMemoryProbe {
    maximum_mb: u64,
    sample: fn() -> io::Result<u64>,
}

impl AllocatedMemoryProbe {
    pub fn new(maximum_mb: u64) -> Self {
        Self {
            maximum_mb,
            sample: resident_memory_bytes,
        }
    }
}

#[async_trait]
impl Probe for AllocatedMemoryProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        let used_mb = match (self.sample)() {
            Ok(bytes) => bytes / 1024 / 1024,
            Err(e) => return ProbeResult::from_error(ctx.failure_status, e.into()),
        };

        if used_mb >= self.maximum_mb {
            ProbeResult::new(
                HealthStatus::Unhealthy,
                format!(
                    "allocated memory is about {} mbytes, expected maximum is {} mbytes",
                    used_mb, self.maximum_mb
                ),
            )
        } else {
            ProbeResult::healthy()
        }
    }
}
