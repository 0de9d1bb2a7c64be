//! Operator actions under `/admin`.
//!
//! Actions block on the mitigation gate and the collector, so they run on
//! the blocking pool.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herakles_mem_health::MonitorError;
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{error, info, instrument, warn};

use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct ActionParams {
    pub reason: Option<String>,
}

impl ActionParams {
    fn reason_or(&self, default: &str) -> String {
        self.reason
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error type for admin endpoint failures.
#[derive(Debug)]
pub enum AdminError {
    Monitor(MonitorError),
    Join(task::JoinError),
}

impl From<MonitorError> for AdminError {
    fn from(e: MonitorError) -> Self {
        AdminError::Monitor(e)
    }
}

impl From<task::JoinError> for AdminError {
    fn from(e: task::JoinError) -> Self {
        AdminError::Join(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Monitor(MonitorError::SnapshotDisabled) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            AdminError::Monitor(e) => e.to_string(),
            AdminError::Join(e) => format!("action task failed: {}", e),
        };
        if status == StatusCode::FORBIDDEN {
            warn!("Admin request rejected: {}", message);
        } else {
            error!("Admin request failed: {}", message);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Handler for POST /admin/gc.
#[instrument(skip(state))]
pub async fn gc_handler(
    State(state): State<SharedState>,
    Query(params): Query<ActionParams>,
) -> Result<impl IntoResponse, AdminError> {
    let reason = params.reason_or("operator request");
    info!("Operator requested forced collection: {}", reason);
    let monitor = state.monitor.clone();
    let action = task::spawn_blocking(move || monitor.force_collect(&reason)).await?;
    Ok(Json(action))
}

/// Handler for POST /admin/cleanup.
#[instrument(skip(state))]
pub async fn cleanup_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AdminError> {
    info!("Operator requested emergency cleanup");
    let monitor = state.monitor.clone();
    let actions = task::spawn_blocking(move || monitor.emergency_cleanup()).await?;
    Ok(Json(actions))
}

/// Handler for POST /admin/snapshot. 403 unless snapshots are enabled.
#[instrument(skip(state))]
pub async fn snapshot_handler(
    State(state): State<SharedState>,
    Query(params): Query<ActionParams>,
) -> Result<impl IntoResponse, AdminError> {
    let reason = params.reason_or("operator");
    let monitor = state.monitor.clone();
    let snapshot = task::spawn_blocking(move || monitor.create_heap_snapshot(&reason)).await??;
    info!("Heap snapshot written to {}", snapshot.path.display());
    Ok((StatusCode::CREATED, Json(snapshot)))
}
