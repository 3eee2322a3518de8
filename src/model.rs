//! Health-check types shared by the collector and the storage API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of a health check.
///
/// The discriminants match the integers written to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Unhealthy = 0,
    Degraded = 1,
    Healthy = 2,
}

impl HealthStatus {
    /// Rank used for "worse than" comparisons: higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            HealthStatus::Healthy => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    pub fn to_db(self) -> i64 {
        self as i64
    }

    pub fn from_db(value: i64) -> Option<Self> {
        match value {
            0 => Some(HealthStatus::Unhealthy),
            1 => Some(HealthStatus::Degraded),
            2 => Some(HealthStatus::Healthy),
            _ => None,
        }
    }
}

impl PartialOrd for HealthStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by severity, so `max` picks the worst status.
impl Ord for HealthStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Unhealthy => "Unhealthy",
        };
        f.write_str(name)
    }
}

/// A registered health-check definition. `name` is the unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Latest known state of one check on one server of one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckEntry {
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub application_id: Uuid,
    pub server_name: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: HealthStatus,
    /// Overwritten with the server's clock on ingest.
    #[serde(default = "Utc::now")]
    pub last_execution: DateTime<Utc>,
    #[serde(with = "timespan", default)]
    pub last_duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_entries: Option<Vec<HealthCheckHistoryEntry>>,
}

impl HealthCheckEntry {
    /// Tags of the linked definition, empty when the entry has none.
    pub fn tags(&self) -> &[String] {
        self.health_check
            .as_ref()
            .map(|check| check.tags.as_slice())
            .unwrap_or_default()
    }
}

/// One status transition of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckHistoryEntry {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub status: HealthStatus,
    pub status_from: DateTime<Utc>,
    pub last_execution: DateTime<Utc>,
    #[serde(with = "timespan")]
    pub last_duration: Duration,
}

/// Entries of one check grouped under their first and last tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckStateView {
    pub first_level: String,
    pub second_level: String,
    pub check_name: String,
    pub checks: Vec<HealthCheckEntry>,
    pub status: HealthStatus,
}

/// Format a duration as `TimeSpan` text: `[d.]hh:mm:ss[.fffffff]`.
pub fn format_timespan(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    let ticks = duration.subsec_nanos() / 100;

    let mut out = if days > 0 {
        format!("{}.", days)
    } else {
        String::new()
    };
    out.push_str(&format!("{:02}:{:02}:{:02}", hours, minutes, seconds));
    if ticks > 0 {
        out.push_str(&format!(".{:07}", ticks));
    }
    out
}

/// Parse the `TimeSpan` text form produced by [`format_timespan`].
pub fn parse_timespan(s: &str) -> Option<Duration> {
    let mut parts = s.trim().splitn(3, ':');
    let head = parts.next()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;

    let (days, hours) = match head.split_once('.') {
        Some((d, h)) => (d.parse::<u64>().ok()?, h.parse::<u64>().ok()?),
        None => (0, head.parse::<u64>().ok()?),
    };
    let (seconds, fraction) = rest.split_once('.').unwrap_or((rest, ""));
    let seconds: u64 = seconds.parse().ok()?;

    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }
    if fraction.len() > 7 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let ticks: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{:0<7}", fraction).parse().ok()?
    };

    let secs = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    Some(Duration::new(secs, ticks * 100))
}

/// Serde adapter for `TimeSpan`-formatted durations.
pub mod timespan {
    use super::{format_timespan, parse_timespan};
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timespan(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timespan(&raw).ok_or_else(|| de::Error::custom(format!("invalid duration: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_by_severity() {
        assert!(HealthStatus::Unhealthy > HealthStatus::Degraded);
        assert!(HealthStatus::Degraded > HealthStatus::Healthy);
        let worst = [HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Degraded]
            .into_iter()
            .max();
        assert_eq!(worst, Some(HealthStatus::Unhealthy));
    }

    #[test]
    fn test_status_db_values() {
        assert_eq!(HealthStatus::Unhealthy.to_db(), 0);
        assert_eq!(HealthStatus::Healthy.to_db(), 2);
        assert_eq!(HealthStatus::from_db(1), Some(HealthStatus::Degraded));
        assert_eq!(HealthStatus::from_db(7), None);
    }

    #[test]
    fn test_format_timespan() {
        assert_eq!(format_timespan(Duration::from_secs(5)), "00:00:05");
        assert_eq!(format_timespan(Duration::from_millis(1_500)), "00:00:01.5000000");
        assert_eq!(format_timespan(Duration::from_secs(90_061)), "1.01:01:01");
    }

    #[test]
    fn test_parse_timespan() {
        assert_eq!(parse_timespan("00:00:01.5"), Some(Duration::from_millis(1_500)));
        assert_eq!(parse_timespan("2.00:00:00"), Some(Duration::from_secs(172_800)));
        assert_eq!(
            parse_timespan("00:00:00.0123456"),
            Some(Duration::from_nanos(12_345_600))
        );
        assert_eq!(parse_timespan("00:61:00"), None);
        assert_eq!(parse_timespan("garbage"), None);
    }

    #[test]
    fn test_parse_timespan_rejects_overflowing_days() {
        assert_eq!(parse_timespan("300000000000000.00:00:00"), None);
        assert_eq!(parse_timespan("18446744073709551615.23:59:59"), None);

        let body = r#"{
            "applicationId": "00000000-0000-0000-0000-000000000000",
            "serverName": "web-01",
            "name": "disk-check",
            "status": "Healthy",
            "lastDuration": "300000000000000.00:00:00"
        }"#;
        assert!(serde_json::from_str::<HealthCheckEntry>(body).is_err());
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = HealthCheckEntry {
            id: Uuid::nil(),
            application_id: Uuid::nil(),
            server_name: "web-01".to_string(),
            name: "disk-check".to_string(),
            description: None,
            status: HealthStatus::Degraded,
            last_execution: Utc::now(),
            last_duration: Duration::from_millis(250),
            health_check: None,
            history_entries: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "Degraded");
        assert_eq!(json["serverName"], "web-01");
        assert_eq!(json["lastDuration"], "00:00:00.2500000");
        assert!(json.get("historyEntries").is_none());

        let back: HealthCheckEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.last_duration, Duration::from_millis(250));
    }

    #[test]
    fn test_definition_defaults() {
        let check: HealthCheck = serde_json::from_str(r#"{"name":"dns"}"#).unwrap();
        assert!(check.id.is_nil());
        assert!(check.tags.is_empty());
        assert_eq!(check.description, "");
    }
}
