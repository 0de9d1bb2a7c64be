//! `/config` endpoint handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, error, instrument};

use crate::handlers::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the /config endpoint. Renders the effective configuration as
/// YAML.
#[instrument(skip(state))]
pub async fn config_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /config request");

    match serde_yaml::to_string(state.config.as_ref()) {
        Ok(yaml) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; charset=utf-8")],
            format!("EFFECTIVE CONFIGURATION\n=======================\n\n{yaml}\n{FOOTER_TEXT}\n"),
        ),
        Err(e) => {
            error!("Failed to serialize configuration: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain; charset=utf-8")],
                "Failed to serialize configuration".to_string(),
            )
        }
    }
}
