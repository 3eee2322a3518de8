//! Client side of the storage API.

use crate::model::{HealthCheck, HealthCheckEntry};

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage api returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid storage api url: {0}")]
    Url(String),
}

/// Where the collector sends registrations and results.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Register a definition; returns it as stored (with its id).
    async fn register(&self, check: &HealthCheck) -> Result<HealthCheck, ReportError>;

    async fn submit(&self, entry: &HealthCheckEntry) -> Result<(), ReportError>;
}

/// Posts JSON to `{base}/api/HealthMonitor/...`.
pub struct HttpReporter {
    base: String,
    client: reqwest::Client,
}

impl HttpReporter {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ReportError> {
        let base = base.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ReportError::Url(base.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.to_string(),
            client,
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/api/HealthMonitor/{}", self.base, action)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ReportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ReportError::Status { status, body })
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn register(&self, check: &HealthCheck) -> Result<HealthCheck, ReportError> {
        let resp = self
            .client
            .post(self.endpoint("RegisterHealthCheck"))
            .json(check)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn submit(&self, entry: &HealthCheckEntry) -> Result<(), ReportError> {
        let resp = self
            .client
            .post(self.endpoint("AddHealthCheck"))
            .json(entry)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HealthStatus;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    #[test]
    fn test_rejects_non_http_base() {
        assert!(matches!(
            HttpReporter::new("localhost:8080", Duration::from_secs(1)),
            Err(ReportError::Url(_))
        ));
        let reporter = HttpReporter::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            reporter.endpoint("AddHealthCheck"),
            "http://localhost:8080/api/HealthMonitor/AddHealthCheck"
        );
    }

    #[tokio::test]
    async fn test_register_and_submit() {
        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let sink = received.clone();

        let router = Router::new()
            .route(
                "/api/HealthMonitor/RegisterHealthCheck",
                post(|Json(mut check): Json<HealthCheck>| async move {
                    check.id = Uuid::new_v4();
                    Json(check)
                }),
            )
            .route(
                "/api/HealthMonitor/AddHealthCheck",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    if body["name"] == "rejected" {
                        return AxumStatus::BAD_REQUEST;
                    }
                    sink.lock().unwrap().push(body);
                    AxumStatus::OK
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let reporter = HttpReporter::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();

        let registered = reporter
            .register(&HealthCheck {
                id: Uuid::nil(),
                name: "disk-check".into(),
                description: String::new(),
                tags: vec!["infra".into()],
            })
            .await
            .unwrap();
        assert!(!registered.id.is_nil());
        assert_eq!(registered.name, "disk-check");

        let mut entry = HealthCheckEntry {
            id: Uuid::nil(),
            application_id: Uuid::new_v4(),
            server_name: "web-01".into(),
            name: "disk-check".into(),
            description: None,
            status: HealthStatus::Degraded,
            last_execution: Utc::now(),
            last_duration: Duration::from_millis(12),
            health_check: None,
            history_entries: None,
        };
        reporter.submit(&entry).await.unwrap();
        {
            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            assert_eq!(received[0]["status"], "Degraded");
            assert_eq!(received[0]["serverName"], "web-01");
        }

        entry.name = "rejected".into();
        let err = reporter.submit(&entry).await.unwrap_err();
        assert!(matches!(err, ReportError::Status { status, .. } if status == StatusCode::BAD_REQUEST));
    }
}
