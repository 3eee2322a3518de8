use healthmon::collector::{HttpReporter, Reporter};
use healthmon::config::ServerConfig;
use healthmon::db::Store;
use healthmon::model::{HealthCheck, HealthCheckEntry, HealthCheckStateView, HealthStatus};
use healthmon::state::{Aggregator, SystemClock};
use healthmon::web::Server;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

async fn spawn_server(dir: &TempDir) -> String {
    let store = Arc::new(Store::new(dir.path().join("data").join("monitoring.db")).unwrap());
    let aggregator = Aggregator::new(store, Arc::new(SystemClock));
    let server = Server::new(ServerConfig::default(), aggregator);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server.serve(listener, std::future::pending()).await.unwrap();
    });
    format!("http://{}", addr)
}

fn entry(app: Uuid, status: HealthStatus) -> HealthCheckEntry {
    HealthCheckEntry {
        id: Uuid::nil(),
        application_id: app,
        server_name: "S1".to_string(),
        name: "disk-check".to_string(),
        description: None,
        status,
        last_execution: Utc::now(),
        last_duration: Duration::from_millis(20),
        health_check: None,
        history_entries: None,
    }
}

#[tokio::test]
async fn test_register_ingest_and_view() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let reporter = HttpReporter::new(&base, Duration::from_secs(5)).unwrap();
    let app = Uuid::new_v4();

    let registered = reporter
        .register(&HealthCheck {
            id: Uuid::nil(),
            name: "disk-check".to_string(),
            description: "free space on data volumes".to_string(),
            tags: vec!["infra".to_string(), "storage".to_string()],
        })
        .await
        .unwrap();
    assert!(!registered.id.is_nil());

    reporter.submit(&entry(app, HealthStatus::Healthy)).await.unwrap();
    reporter.submit(&entry(app, HealthStatus::Degraded)).await.unwrap();

    let views: Vec<HealthCheckStateView> = reqwest::get(format!(
        "{}/api/HealthMonitor/GetApplicationStatus?applicationId={}",
        base, app
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.first_level, "infra");
    assert_eq!(view.second_level, "storage");
    assert_eq!(view.check_name, "disk-check");
    assert_eq!(view.status, HealthStatus::Degraded);
    assert_eq!(view.checks.len(), 1);
    assert_eq!(view.checks[0].status, HealthStatus::Degraded);
    assert_eq!(view.checks[0].health_check.as_ref().unwrap().id, registered.id);

    let detail: Option<HealthCheckStateView> = reqwest::get(format!(
        "{}/api/HealthMonitor/GetHealthCheck?applicationId={}&checkName=disk-check",
        base, app
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();

    let detail = detail.unwrap();
    let history = detail.checks[0].history_entries.as_ref().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, HealthStatus::Degraded);
    assert_eq!(history[1].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_unregistered_check_is_rejected() {
    let dir = TempDir::new().unwrap();
    let base = spawn_server(&dir).await;
    let reporter = HttpReporter::new(&base, Duration::from_secs(5)).unwrap();

    let err = reporter
        .submit(&entry(Uuid::new_v4(), HealthStatus::Healthy))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"));
}
