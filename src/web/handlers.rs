//! HTTP request handlers.

use super::AppState;
use crate::db::DbError;
use crate::model::{HealthCheck, HealthCheckEntry, HealthCheckStateView};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced to API clients as problem documents.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, title) = match &self {
            ApiError::BadRequest(_) | ApiError::Db(DbError::UnregisteredCheck(_)) => {
                (StatusCode::BAD_REQUEST, "Invalid request")
            }
            ApiError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure"),
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let problem = Problem {
            title: title.to_string(),
            status: status.as_u16(),
            detail: self.to_string(),
        };
        (
            status,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(problem),
        )
            .into_response()
    }
}

// ============================================================================
// API: Reporting
// ============================================================================

pub async fn handle_register_health_check(
    State(state): State<AppState>,
    body: Result<Json<HealthCheck>, JsonRejection>,
) -> Result<Json<HealthCheck>, ApiError> {
    let Json(check) = body?;
    if check.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    let stored = state.aggregator.register(&check)?;
    Ok(Json(stored))
}

pub async fn handle_add_health_check(
    State(state): State<AppState>,
    body: Result<Json<HealthCheckEntry>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(entry) = body?;
    if entry.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    if entry.server_name.trim().is_empty() {
        return Err(ApiError::BadRequest("serverName must not be empty".to_string()));
    }
    state.aggregator.ingest(&entry)?;
    Ok(StatusCode::OK)
}

// ============================================================================
// API: Views
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationQuery {
    #[serde(alias = "ApplicationId")]
    pub application_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckQuery {
    #[serde(alias = "ApplicationId")]
    pub application_id: Uuid,
    #[serde(alias = "CheckName")]
    pub check_name: String,
}

pub async fn handle_get_application_status(
    State(state): State<AppState>,
    Query(query): Query<ApplicationQuery>,
) -> Result<Json<Vec<HealthCheckStateView>>, ApiError> {
    let views = state.aggregator.application_status(query.application_id)?;
    Ok(Json(views))
}

pub async fn handle_get_health_check(
    State(state): State<AppState>,
    Query(query): Query<HealthCheckQuery>,
) -> Result<Json<Option<HealthCheckStateView>>, ApiError> {
    let view = state
        .aggregator
        .health_check(query.application_id, &query.check_name)?;
    Ok(Json(view))
}
