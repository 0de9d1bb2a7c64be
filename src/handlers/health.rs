//! `/health` and `/status` endpoint handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use herakles_mem_health::{HealthReport, HealthTier};
use tracing::{debug, instrument};

use crate::handlers::FOOTER_TEXT;
use crate::state::SharedState;

/// 200 while the process can take work, 503 once it should shed load.
pub fn status_code_for(tier: HealthTier) -> StatusCode {
    match tier {
        HealthTier::Healthy | HealthTier::Warning => StatusCode::OK,
        HealthTier::Critical | HealthTier::Emergency => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<HealthReport>) {
    debug!("Processing /health request");
    let report = state.monitor.report();
    let status = status_code_for(report.status);
    debug!("Health check: {} - {}", status, report.status);
    (status, Json(report))
}

/// Handler for the /status endpoint.
#[instrument(skip(state))]
pub async fn status_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /status request");
    let report = state.monitor.report();
    (
        status_code_for(report.status),
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{}\n{FOOTER_TEXT}\n", report.render_text()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_state;

    #[test]
    fn test_status_code_for_tier() {
        assert_eq!(status_code_for(HealthTier::Healthy), StatusCode::OK);
        assert_eq!(status_code_for(HealthTier::Warning), StatusCode::OK);
        assert_eq!(
            status_code_for(HealthTier::Critical),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_code_for(HealthTier::Emergency),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_health_handler_reports_tier() {
        let (status, Json(report)) = health_handler(State(test_state(92.0, None))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthTier::Critical);
        assert!(!report.recommendations.is_empty());

        let (status, Json(report)) = health_handler(State(test_state(81.0, None))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthTier::Warning);
    }

    #[tokio::test]
    async fn test_status_handler_renders_text() {
        let response = status_handler(State(test_state(10.0, None)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
