//! Grouping of current entries into views.

use crate::model::{HealthCheckEntry, HealthCheckStateView, HealthStatus};

/// Healthy only if every entry is healthy, else degraded if any entry is
/// degraded, else unhealthy. No entries counts as unhealthy.
pub fn aggregate_status(entries: &[HealthCheckEntry]) -> HealthStatus {
    if !entries.is_empty() && entries.iter().all(|e| e.status == HealthStatus::Healthy) {
        HealthStatus::Healthy
    } else if entries.iter().any(|e| e.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

/// Group entries by (first tag, last tag, check name), keeping the order in
/// which groups are first seen.
pub fn build_views(entries: Vec<HealthCheckEntry>) -> Vec<HealthCheckStateView> {
    let mut views: Vec<HealthCheckStateView> = Vec::new();

    for entry in entries {
        let tags = entry.tags();
        let first_level = tags.first().cloned().unwrap_or_default();
        let second_level = tags.last().cloned().unwrap_or_default();

        let existing = views.iter_mut().find(|v| {
            v.first_level == first_level && v.second_level == second_level && v.check_name == entry.name
        });
        match existing {
            Some(view) => view.checks.push(entry),
            None => views.push(HealthCheckStateView {
                first_level,
                second_level,
                check_name: entry.name.clone(),
                checks: vec![entry],
                status: HealthStatus::Unhealthy,
            }),
        }
    }

    for view in &mut views {
        view.status = aggregate_status(&view.checks);
    }
    views
}
