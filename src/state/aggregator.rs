//! Ingest decisions, independent of storage.
//!
//! An entry is created on the first report for its
//! (application, server, name) key, together with its first history row.
//! Later reports update the entry in place and add a history row only when
//! the status differs from the latest history row.

use crate::model::{HealthCheck, HealthCheckEntry, HealthCheckHistoryEntry};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What one ingest did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub entry_id: Uuid,
    pub created: bool,
    pub history_appended: bool,
}

fn history_row(entry: &HealthCheckEntry, now: DateTime<Utc>) -> HealthCheckHistoryEntry {
    HealthCheckHistoryEntry {
        id: Uuid::new_v4(),
        entry_id: entry.id,
        status: entry.status,
        status_from: now,
        last_execution: now,
        last_duration: entry.last_duration,
    }
}

/// New entry for a first report, with its initial history row.
pub fn create_entry(
    incoming: &HealthCheckEntry,
    definition: &HealthCheck,
    now: DateTime<Utc>,
) -> (HealthCheckEntry, HealthCheckHistoryEntry) {
    let entry = HealthCheckEntry {
        id: Uuid::new_v4(),
        application_id: incoming.application_id,
        server_name: incoming.server_name.clone(),
        name: incoming.name.clone(),
        description: incoming.description.clone(),
        status: incoming.status,
        last_execution: now,
        last_duration: incoming.last_duration,
        health_check: Some(definition.clone()),
        history_entries: None,
    };
    let history = history_row(&entry, now);
    (entry, history)
}

/// History row to append for `incoming`, if its status differs from the
/// latest recorded one. An entry without history always gets a row.
pub fn status_transition(
    entry_id: Uuid,
    latest: Option<&HealthCheckHistoryEntry>,
    incoming: &HealthCheckEntry,
    now: DateTime<Utc>,
) -> Option<HealthCheckHistoryEntry> {
    if latest.is_some_and(|h| h.status == incoming.status) {
        return None;
    }
    Some(HealthCheckHistoryEntry {
        id: Uuid::new_v4(),
        entry_id,
        status: incoming.status,
        status_from: now,
        last_execution: now,
        last_duration: incoming.last_duration,
    })
}

/// Overwrite the mutable fields of an existing entry.
pub fn apply_update(entry: &mut HealthCheckEntry, incoming: &HealthCheckEntry, now: DateTime<Utc>) {
    entry.description = incoming.description.clone();
    entry.status = incoming.status;
    entry.last_execution = now;
    entry.last_duration = incoming.last_duration;
}
