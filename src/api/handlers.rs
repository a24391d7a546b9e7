use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::app::{AppContext, VisitOutcome};
use crate::models::{BulkAction, Frequency, Settings, TargetConfig, TargetId, TargetKind, VisitContext};
use crate::storage::StorageError;
use crate::visits::TickReport;

pub struct AppState {
    pub app: Arc<AppContext>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub struct TargetStatus {
    pub target: TargetId,
    pub status: String,
    pub config: TargetConfig,
    pub pending_visits: usize,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub action: BulkAction,
    pub targets: Vec<TargetId>,
}

#[derive(Serialize)]
pub struct BulkResponse {
    pub updated: usize,
}

#[derive(Serialize)]
pub struct TickResponse {
    pub frequency: Frequency,
    /// `None` when notifications are switched off site-wide
    pub report: Option<TickReport>,
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn storage_failure(err: StorageError) -> ApiError {
    if let StorageError::IdOutOfRange(target) = err {
        return bad_request(format!("Target id out of range: {}", target.id));
    }

    error!(error = %err, "Storage failure while handling request");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "Storage unavailable".to_string(),
        }),
    )
}

fn parse_target(kind: &str, id: u64) -> Result<TargetId, ApiError> {
    let kind = kind.parse::<TargetKind>().map_err(bad_request)?;
    if id > TargetId::MAX_ID {
        return Err(bad_request(format!("Target id out of range: {id}")));
    }
    Ok(TargetId { kind, id })
}

async fn target_status(app: &AppContext, target: TargetId) -> Result<TargetStatus, ApiError> {
    let config = app
        .settings()
        .target_config(&target)
        .await
        .map_err(storage_failure)?;
    let pending_visits = app
        .batches()
        .snapshot(&target)
        .await
        .map_err(storage_failure)?
        .len();

    Ok(TargetStatus {
        target,
        status: config.status_label(),
        config,
        pending_visits,
    })
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Evaluate one page view reported by the host site
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    Json(ctx): Json<VisitContext>,
) -> Result<Json<VisitOutcome>, ApiError> {
    state
        .app
        .record_visit(&ctx)
        .await
        .map(Json)
        .map_err(storage_failure)
}

pub async fn get_target(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, u64)>,
) -> Result<Json<TargetStatus>, ApiError> {
    let target = parse_target(&kind, id)?;
    target_status(&state.app, target).await.map(Json)
}

pub async fn update_target(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, u64)>,
    Json(config): Json<TargetConfig>,
) -> Result<Json<TargetStatus>, ApiError> {
    let target = parse_target(&kind, id)?;
    state
        .app
        .settings()
        .save_target_config(&target, &config)
        .await
        .map_err(storage_failure)?;
    target_status(&state.app, target).await.map(Json)
}

pub async fn bulk_update(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BulkRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    if payload.targets.is_empty() {
        return Err(bad_request("No targets given"));
    }

    let updated = state
        .app
        .apply_bulk(payload.action, &payload.targets)
        .await
        .map_err(storage_failure)?;
    Ok(Json(BulkResponse { updated }))
}

/// Trigger a scheduler tick from an external cron
pub async fn run_tick(
    State(state): State<Arc<AppState>>,
    Path(frequency): Path<String>,
) -> Result<Json<TickResponse>, ApiError> {
    let frequency = frequency.parse::<Frequency>().map_err(bad_request)?;
    let report = state
        .app
        .run_tick(frequency)
        .await
        .map_err(storage_failure)?;
    Ok(Json(TickResponse { frequency, report }))
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Settings>, ApiError> {
    state
        .app
        .settings()
        .settings()
        .await
        .map(Json)
        .map_err(storage_failure)
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, ApiError> {
    let store = state.app.settings();
    store.save_settings(&settings).await.map_err(storage_failure)?;
    store.settings().await.map(Json).map_err(storage_failure)
}
