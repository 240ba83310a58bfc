use axum::{extract::State, response::IntoResponse};

use super::Utf8Json;
use crate::gateway::AppState;

/// `GET /health`
pub(crate) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Utf8Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started.elapsed().as_secs(),
        "sessions": state.service.session_count(),
    }))
}
