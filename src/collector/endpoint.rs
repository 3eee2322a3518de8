//! Local `/health` route serving the collector's latest report.

use super::HealthReport;
use crate::model::{format_timespan, HealthStatus};

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio::sync::watch;

/// Router serving `GET /health` from the latest published report.
pub fn report_routes(reports: watch::Receiver<Option<HealthReport>>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .with_state(reports)
}

async fn handle_health(
    State(reports): State<watch::Receiver<Option<HealthReport>>>,
) -> (StatusCode, Json<Value>) {
    let report = reports.borrow().clone();
    let Some(report) = report else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": HealthStatus::Unhealthy, "entries": {} })),
        );
    };

    let status = report.status();
    let entries: serde_json::Map<String, Value> = report
        .entries
        .iter()
        .map(|(name, result)| {
            let entry = json!({
                "status": result.status,
                "description": result.summary(),
                "duration": format_timespan(result.duration),
            });
            (name.clone(), entry)
        })
        .collect();

    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    (
        code,
        Json(json!({
            "status": status,
            "totalDuration": format_timespan(report.total_duration),
            "entries": entries,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeResult;
    use std::time::Duration;

    async fn spawn(reports: watch::Receiver<Option<HealthReport>>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, report_routes(reports)).await.unwrap();
        });
        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn test_health_follows_latest_report() {
        let (tx, rx) = watch::channel(None);
        let url = spawn(rx).await;

        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let mut report = HealthReport::default();
        report.entries.insert("app".into(), ProbeResult::healthy());
        report
            .entries
            .insert("disk".into(), ProbeResult::new(HealthStatus::Degraded, "low space"));
        report.total_duration = Duration::from_millis(15);
        tx.send_replace(Some(report.clone()));

        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "Degraded");
        assert_eq!(body["totalDuration"], "00:00:00.0150000");
        assert_eq!(body["entries"]["disk"]["description"], "low space");
        assert!(body["entries"]["app"]["description"].is_null());

        report
            .entries
            .insert("app".into(), ProbeResult::new(HealthStatus::Unhealthy, "application is shutting down"));
        tx.send_replace(Some(report));

        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "Unhealthy");
    }
}
