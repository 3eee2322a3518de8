//! Probe module for health checks.
//!
//! A probe answers "is this dependency healthy?" for one resource. Probes
//! never fail: every internal error is folded into the returned
//! [`ProbeResult`].

mod application;
mod disk;
mod dns;
mod ftp;
mod memory;
mod registry;
mod rest;
mod signalr;
mod smtp;

pub use application::*;
pub use disk::*;
pub use dns::*;
pub use ftp::*;
pub use memory::*;
pub use registry::*;
pub use rest::*;
pub use signalr::*;
pub use smtp::*;

use crate::lifetime::Shutdown;
use crate::model::HealthStatus;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("probe cancelled by shutdown")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid address: {0}")]
    Address(String),
}

/// Result of one probe execution.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub description: Option<String>,
    pub error: Option<Arc<ProbeError>>,
    pub duration: Duration,
}

impl ProbeResult {
    pub fn new(status: HealthStatus, description: impl Into<String>) -> Self {
        Self {
            status,
            description: Some(description.into()),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn from_error(status: HealthStatus, error: ProbeError) -> Self {
        Self {
            status,
            description: None,
            error: Some(Arc::new(error)),
            duration: Duration::ZERO,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Text reported upstream: the description, or the error when there is none.
    pub fn summary(&self) -> Option<String> {
        self.description
            .clone()
            .or_else(|| self.error.as_ref().map(|e| e.to_string()))
    }
}

/// Per-call settings handed to a probe.
#[derive(Debug, Clone, Copy)]
pub struct ProbeContext {
    /// Status to report when the checked resource is failing.
    pub failure_status: HealthStatus,
    pub timeout: Duration,
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self {
            failure_status: HealthStatus::Unhealthy,
            timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult;
}

/// Run a probe bounded by its timeout and by shutdown.
///
/// The returned result carries the elapsed time.
pub async fn run_probe(probe: &dyn Probe, ctx: &ProbeContext, shutdown: &Shutdown) -> ProbeResult {
    let mut shutdown = shutdown.clone();
    let start = Instant::now();

    let result = tokio::select! {
        outcome = tokio::time::timeout(ctx.timeout, probe.check(ctx)) => match outcome {
            Ok(result) => result,
            Err(_) => ProbeResult::from_error(ctx.failure_status, ProbeError::Timeout(ctx.timeout)),
        },
        _ = shutdown.stopped() => ProbeResult::from_error(ctx.failure_status, ProbeError::Cancelled),
    };

    result.with_duration(start.elapsed())
}
