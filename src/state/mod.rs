//! Server-side state: ingest of reported entries and the views built from
//! them.

mod aggregator;
mod views;

pub use aggregator::*;
pub use views::*;

use crate::db::{DbError, Store};
use crate::model::{HealthCheck, HealthCheckEntry, HealthCheckStateView};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Source of "now" for server-side timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Applies reports to the store and reads views back.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a definition, returning the stored one if the name exists.
    pub fn register(&self, check: &HealthCheck) -> Result<HealthCheck, DbError> {
        self.store.register_health_check(check)
    }

    pub fn ingest(&self, incoming: &HealthCheckEntry) -> Result<IngestOutcome, DbError> {
        let outcome = self.store.ingest(incoming, self.clock.as_ref())?;
        if outcome.history_appended {
            tracing::info!(
                "Health check {} on {} is now {}",
                incoming.name,
                incoming.server_name,
                incoming.status
            );
        }
        Ok(outcome)
    }

    pub fn application_status(&self, application_id: Uuid) -> Result<Vec<HealthCheckStateView>, DbError> {
        let entries = self.store.get_application_entries(application_id)?;
        Ok(build_views(entries))
    }

    /// View of one check across servers, with history. `None` when the
    /// application never reported it.
    pub fn health_check(
        &self,
        application_id: Uuid,
        check_name: &str,
    ) -> Result<Option<HealthCheckStateView>, DbError> {
        let entries = self.store.get_check_entries(application_id, check_name)?;
        Ok(build_views(entries).into_iter().next())
    }
}
