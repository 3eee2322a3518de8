//! Collector loop: runs every registered probe on a fixed interval and
//! forwards the results to the storage API.

mod endpoint;
mod report;
mod reporter;

pub use endpoint::*;
pub use report::*;
pub use reporter::*;

use crate::config::{ConfigError, MonitorSettings};
use crate::lifetime::{Lifetime, Shutdown};
use crate::model::{HealthCheck, HealthCheckEntry, HealthStatus};
use crate::probe::{run_probe, Probe, ProbeContext, ProbeEnvironment, ProbeError, ProbeRegistry};

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A probe together with its definition and per-check settings.
pub struct RegisteredProbe {
    pub definition: HealthCheck,
    pub failure_status: HealthStatus,
    pub timeout: Duration,
    pub probe: Box<dyn Probe>,
}

impl RegisteredProbe {
    fn context(&self) -> ProbeContext {
        ProbeContext {
            failure_status: self.failure_status,
            timeout: self.timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    NotStarted,
    Registering,
    Running,
    /// Final collection after shutdown began.
    Draining,
    Stopped,
}

pub struct Collector {
    application_id: Uuid,
    server_name: String,
    interval: Duration,
    probes: Vec<RegisteredProbe>,
    reporter: Arc<dyn Reporter>,
    lifetime: Lifetime,
    state: watch::Sender<CollectorState>,
    reports: watch::Sender<Option<HealthReport>>,
}

impl Collector {
    pub fn new(
        application_id: Uuid,
        server_name: impl Into<String>,
        interval: Duration,
        reporter: Arc<dyn Reporter>,
        lifetime: Lifetime,
    ) -> Self {
        let (state, _) = watch::channel(CollectorState::NotStarted);
        let (reports, _) = watch::channel(None);
        Self {
            application_id,
            server_name: server_name.into(),
            interval,
            probes: Vec::new(),
            reporter,
            lifetime,
            state,
            reports,
        }
    }

    /// Build a collector with one probe per configured check.
    pub fn from_settings(
        settings: &MonitorSettings,
        registry: &ProbeRegistry,
        reporter: Arc<dyn Reporter>,
        lifetime: Lifetime,
    ) -> Result<Self, ConfigError> {
        let env = ProbeEnvironment {
            shutdown: lifetime.subscribe(),
        };
        let mut collector = Self::new(
            settings.application_id,
            settings.server_name.clone(),
            settings.check_interval(),
            reporter,
            lifetime,
        );

        for check in &settings.health_checks {
            let probe = registry.build(check, &env)?;
            collector.add_probe(RegisteredProbe {
                definition: HealthCheck {
                    id: Uuid::nil(),
                    name: check.name.clone(),
                    description: check.description.clone(),
                    tags: check.tags.clone(),
                },
                failure_status: check.failure_status,
                timeout: check.timeout(),
                probe,
            });
        }

        Ok(collector)
    }

    pub fn add_probe(&mut self, probe: RegisteredProbe) {
        self.probes.push(probe);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.len()
    }

    pub fn state(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    /// Latest report of the running loop; `None` until the first tick ends.
    pub fn reports(&self) -> watch::Receiver<Option<HealthReport>> {
        self.reports.subscribe()
    }

    /// Register every definition with the storage API. Failures are logged
    /// and do not prevent collection.
    pub async fn register(&mut self) {
        for registered in &mut self.probes {
            match self.reporter.register(&registered.definition).await {
                Ok(stored) => {
                    tracing::debug!("Registered health check {} as {}", stored.name, stored.id);
                    registered.definition.id = stored.id;
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to register health check {}: {}",
                        registered.definition.name,
                        e
                    );
                }
            }
        }
    }

    /// Run every probe once, submitting each result as it completes.
    pub async fn run_tick(&self) -> HealthReport {
        self.collect(&self.lifetime.subscribe()).await
    }

    /// Run one last tick after shutdown began.
    ///
    /// Probes observe the stopped lifetime and report accordingly, but the
    /// tick itself runs on a fresh cancellation source, bounded only by each
    /// probe's timeout and the owner's shutdown timeout.
    pub async fn drain(&self) -> HealthReport {
        let drain = Lifetime::new();
        self.collect(&drain.subscribe()).await
    }

    async fn collect(&self, cancel: &Shutdown) -> HealthReport {
        let start = Instant::now();
        let mut report = HealthReport::default();

        for registered in &self.probes {
            if cancel.is_stopping() {
                break;
            }

            let result = run_probe(registered.probe.as_ref(), &registered.context(), cancel).await;
            if matches!(result.error.as_deref(), Some(ProbeError::Cancelled)) {
                break;
            }

            let entry = HealthCheckEntry {
                id: Uuid::nil(),
                application_id: self.application_id,
                server_name: self.server_name.clone(),
                name: registered.definition.name.clone(),
                description: result.summary(),
                status: result.status,
                last_execution: Utc::now(),
                last_duration: result.duration,
                health_check: None,
                history_entries: None,
            };

            if let Err(e) = self.reporter.submit(&entry).await {
                tracing::error!("Failed to report health check {}: {}", entry.name, e);
            }

            report.entries.insert(entry.name, result);
        }

        report.total_duration = start.elapsed();
        tracing::debug!(
            "Collected {} health checks in {:?}, status {}",
            report.len(),
            report.total_duration,
            report.status()
        );
        report
    }

    /// Register, then collect on the interval until the lifetime stops, then
    /// drain once.
    pub fn start(mut self) -> CollectorHandle {
        let lifetime = self.lifetime.clone();
        let state = self.state.subscribe();
        let reports = self.reports.subscribe();

        let task = tokio::spawn(async move {
            let mut shutdown = self.lifetime.subscribe();

            self.state.send_replace(CollectorState::Registering);
            let registered = tokio::select! {
                _ = self.register() => true,
                _ = shutdown.stopped() => false,
            };
            if !registered {
                self.state.send_replace(CollectorState::Stopped);
                return;
            }

            self.state.send_replace(CollectorState::Running);
            tracing::info!(
                "Collector running {} health checks every {:?}",
                self.probes.len(),
                self.interval
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.stopped() => break,
                    _ = interval.tick() => {
                        let report = self.run_tick().await;
                        if !shutdown.is_stopping() {
                            self.reports.send_replace(Some(report));
                        }
                    }
                }
            }

            self.state.send_replace(CollectorState::Draining);
            let report = self.drain().await;
            tracing::info!("Final collection reported {}", report.status());
            self.reports.send_replace(Some(report));

            self.state.send_replace(CollectorState::Stopped);
            tracing::info!("Collector stopped");
        });

        CollectorHandle {
            lifetime,
            state,
            reports,
            task,
        }
    }
}

/// Owner-side handle of a started collector.
pub struct CollectorHandle {
    lifetime: Lifetime,
    state: watch::Receiver<CollectorState>,
    reports: watch::Receiver<Option<HealthReport>>,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    pub fn state(&self) -> CollectorState {
        *self.state.borrow()
    }

    pub fn latest_report(&self) -> Option<HealthReport> {
        self.reports.borrow().clone()
    }

    pub fn reports(&self) -> watch::Receiver<Option<HealthReport>> {
        self.reports.clone()
    }

    /// Stop the loop and wait up to `timeout` for it to finish.
    ///
    /// Returns false if the loop did not finish in time; it is aborted then.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        self.lifetime.stop();
        let abort = self.task.abort_handle();

        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("Collector task failed: {}", e);
                true
            }
            Err(_) => {
                tracing::warn!("Collector did not stop within {:?}", timeout);
                abort.abort();
                false
            }
        }
    }
}
