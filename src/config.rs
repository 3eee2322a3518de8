//! Configuration for the storage server and the collector.
//!
//! The server is configured from environment variables. The collector reads
//! a JSON settings file with a top-level `Health` section, then applies
//! environment overrides.

use crate::model::HealthStatus;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("health check {name:?}: unknown type {kind:?}")]
    UnknownProbeType { name: String, kind: String },
    #[error("health check {name:?}: {reason}")]
    InvalidCheck { name: String, reason: String },
}

/// Storage server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "monitoring.db")
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "monitoring.db".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HEALTHMON_HTTP_PORT`: HTTP port (default: 8080)
    /// - `HEALTHMON_DB_PATH`: Database file path (default: "monitoring.db")
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("HEALTHMON_HTTP_PORT") {
            match port_str.parse() {
                Ok(port) => cfg.http_port = port,
                Err(_) => tracing::warn!("Ignoring invalid HEALTHMON_HTTP_PORT {:?}", port_str),
            }
        }

        if let Ok(db_path) = env::var("HEALTHMON_DB_PATH") {
            cfg.db_path = db_path;
        }

        cfg
    }
}

fn default_check_interval() -> u64 {
    10
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_check_timeout() -> u64 {
    30
}

fn default_failure_status() -> HealthStatus {
    HealthStatus::Unhealthy
}

/// One entry of `Health.HealthChecks`.
///
/// Keys other than the common ones are kept in `options` and decoded by the
/// probe factory for the check's type.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckSettings {
    #[serde(rename = "Type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Seconds before a running probe is abandoned.
    #[serde(default = "default_check_timeout")]
    pub timeout: u64,
    #[serde(default = "default_failure_status")]
    pub failure_status: HealthStatus,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl CheckSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Decode the type-specific keys of this check.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(serde_json::Value::Object(self.options.clone())).map_err(|e| {
            ConfigError::InvalidCheck {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Collector settings, the `Health` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitorSettings {
    #[serde(default = "Uuid::nil")]
    pub application_id: Uuid,
    #[serde(default)]
    pub server_name: String,
    /// Seconds between collection ticks.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Base URL of the storage API.
    #[serde(default)]
    pub storage_api: String,
    /// Seconds to wait for the loop to drain on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Seconds before a call to the storage API is abandoned. Defaults to
    /// the shutdown timeout so a final submission cannot outlive the drain.
    #[serde(default)]
    pub report_timeout: Option<u64>,
    /// Port of the local `/health` endpoint; not served when unset.
    #[serde(default)]
    pub health_port: Option<u16>,
    #[serde(default)]
    pub health_checks: Vec<CheckSettings>,
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(rename = "Health")]
    health: MonitorSettings,
}

impl MonitorSettings {
    /// Load settings from the file named by `HEALTHMON_CONFIG`
    /// (default: "appsettings.json").
    ///
    /// Environment overrides:
    /// - `HEALTHMON_APPLICATION_ID`
    /// - `HEALTHMON_SERVER_NAME`
    /// - `HEALTHMON_STORAGE_API`
    /// - `HEALTHMON_CHECK_INTERVAL`
    /// - `HEALTHMON_HEALTH_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("HEALTHMON_CONFIG").unwrap_or_else(|_| "appsettings.json".to_string());
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut settings = Self::parse(&raw)?;

        if let Ok(id) = env::var("HEALTHMON_APPLICATION_ID") {
            settings.application_id = Uuid::parse_str(&id).map_err(|_| ConfigError::Invalid {
                key: "HEALTHMON_APPLICATION_ID",
                value: id,
            })?;
        }
        if let Ok(name) = env::var("HEALTHMON_SERVER_NAME") {
            settings.server_name = name;
        }
        if let Ok(api) = env::var("HEALTHMON_STORAGE_API") {
            settings.storage_api = api;
        }
        if let Ok(interval) = env::var("HEALTHMON_CHECK_INTERVAL") {
            settings.check_interval = interval.parse().map_err(|_| ConfigError::Invalid {
                key: "HEALTHMON_CHECK_INTERVAL",
                value: interval,
            })?;
        }
        if let Ok(port) = env::var("HEALTHMON_HEALTH_PORT") {
            settings.health_port = Some(port.parse().map_err(|_| ConfigError::Invalid {
                key: "HEALTHMON_HEALTH_PORT",
                value: port,
            })?);
        }

        settings.finish()
    }

    /// Parse settings from the JSON text of a settings file, without
    /// environment overrides.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw)?.finish()
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = serde_json::from_str(raw)?;
        Ok(file.health)
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        if self.server_name.trim().is_empty() {
            self.server_name = host_name().unwrap_or_else(|| "localhost".to_string());
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_api.trim().is_empty() {
            return Err(ConfigError::Missing("Health.StorageApi"));
        }
        if self.check_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "Health.CheckInterval",
                value: "0".to_string(),
            });
        }
        if self.report_timeout == Some(0) {
            return Err(ConfigError::Invalid {
                key: "Health.ReportTimeout",
                value: "0".to_string(),
            });
        }

        let mut names = HashSet::new();
        for check in &self.health_checks {
            if check.name.trim().is_empty() {
                return Err(ConfigError::InvalidCheck {
                    name: check.name.clone(),
                    reason: "name must not be empty".to_string(),
                });
            }
            if !names.insert(check.name.as_str()) {
                return Err(ConfigError::InvalidCheck {
                    name: check.name.clone(),
                    reason: "name is configured more than once".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout.unwrap_or(self.shutdown_timeout))
    }
}

/// Host name of this machine, used when no server name is configured.
fn host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is writable for buf.len() bytes for the duration of the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec())
        .ok()
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Logging": { "LogLevel": { "Default": "Information" } },
        "Health": {
            "ApplicationId": "6f1c7c2e-8a36-4d51-9d0e-2b7f0e6c1a11",
            "ServerName": "web-01",
            "StorageApi": "http://localhost:8080",
            "HealthChecks": [
                {
                    "Type": "Disk Storage",
                    "Name": "disk-check",
                    "Description": "free space on data volumes",
                    "Tags": ["infra", "storage"],
                    "Drives": [ { "DriveName": "/", "MinimumFreeSpace": 1024 } ]
                },
                {
                    "Type": "DNS",
                    "Name": "dns-check",
                    "FailureStatus": "Degraded",
                    "Timeout": 3,
                    "Hosts": ["example.com"]
                }
            ]
        }
    }"#;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "monitoring.db");
    }

    #[test]
    fn test_parse_settings_file() {
        let settings = MonitorSettings::from_json(SAMPLE).unwrap();
        assert_eq!(settings.server_name, "web-01");
        assert_eq!(settings.check_interval(), Duration::from_secs(10));
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(settings.health_port, None);
        assert_eq!(settings.health_checks.len(), 2);

        let disk = &settings.health_checks[0];
        assert_eq!(disk.kind, "Disk Storage");
        assert_eq!(disk.tags, vec!["infra", "storage"]);
        assert_eq!(disk.failure_status, HealthStatus::Unhealthy);
        assert_eq!(disk.timeout(), Duration::from_secs(30));
        assert!(disk.options.contains_key("Drives"));

        let dns = &settings.health_checks[1];
        assert_eq!(dns.failure_status, HealthStatus::Degraded);
        assert_eq!(dns.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_server_name_defaults_to_host() {
        let raw = r#"{ "Health": { "StorageApi": "http://localhost:8080" } }"#;
        let settings = MonitorSettings::from_json(raw).unwrap();
        assert!(!settings.server_name.is_empty());
        assert!(settings.application_id.is_nil());
    }

    #[test]
    fn test_missing_storage_api() {
        let raw = r#"{ "Health": { "ServerName": "web-01" } }"#;
        let err = MonitorSettings::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("Health.StorageApi")));
    }

    #[test]
    fn test_duplicate_check_names() {
        let raw = r#"{ "Health": {
            "StorageApi": "http://localhost:8080",
            "HealthChecks": [
                { "Type": "DNS", "Name": "dns" },
                { "Type": "SMTP", "Name": "dns" }
            ]
        } }"#;
        let err = MonitorSettings::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCheck { .. }));
    }

    #[test]
    fn test_report_timeout_within_shutdown_timeout() {
        let raw = r#"{ "Health": { "StorageApi": "http://localhost:8080", "ShutdownTimeout": 3 } }"#;
        let settings = MonitorSettings::from_json(raw).unwrap();
        assert_eq!(settings.report_timeout(), Duration::from_secs(3));
        assert!(settings.report_timeout() <= settings.shutdown_timeout());

        let raw = r#"{ "Health": {
            "StorageApi": "http://localhost:8080",
            "ReportTimeout": 2,
            "HealthPort": 9090
        } }"#;
        let settings = MonitorSettings::from_json(raw).unwrap();
        assert_eq!(settings.report_timeout(), Duration::from_secs(2));
        assert_eq!(settings.health_port, Some(9090));

        let raw = r#"{ "Health": { "StorageApi": "http://localhost:8080", "ReportTimeout": 0 } }"#;
        let err = MonitorSettings::from_json(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "Health.ReportTimeout", .. }));
    }
}
