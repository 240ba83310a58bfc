//! The analysis routes.
//!
//! Bodies are read as raw bytes and decoded here so malformed, empty or
//! oversized input always maps to the `{error, kind}` shape.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    response::IntoResponse,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, Utf8Json};
use crate::gateway::AppState;
use crate::models::{AssistantRef, ThreadRef};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SessionRequest {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnalyzeRequest {
    #[serde(default, alias = "thread_id")]
    thread_ref: Option<String>,
    #[serde(default, alias = "assistant_id")]
    assistant_ref: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReviewRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Decode a JSON body; an empty body decodes to `T::default()`.
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /get_or_create_assistant`
pub(crate) async fn get_or_create_assistant(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req: SessionRequest = decode(&body?)?;
    let record = state.service.get_or_create(req.user_id.as_deref()).await?;
    Ok(Utf8Json(record))
}

/// `POST /analyze`
pub(crate) async fn analyze(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req: AnalyzeRequest = decode(&body?)?;
    let (Some(thread), Some(assistant), Some(message)) = (
        non_blank(req.thread_ref),
        non_blank(req.assistant_ref),
        non_blank(req.message),
    ) else {
        return Err(ApiError::BadRequest("Invalid request data".into()));
    };

    info!(thread = %thread, assistant = %assistant, "analyzing message");
    let result = state
        .service
        .analyze(&ThreadRef(thread), &AssistantRef(assistant), &message)
        .await?;
    Ok(Utf8Json(result))
}

/// `POST /review`
pub(crate) async fn review(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req: ReviewRequest = decode(&body?)?;
    let Some(text) = non_blank(req.text) else {
        return Err(ApiError::BadRequest("No text provided".into()));
    };

    let result = state.service.review(req.user_id.as_deref(), &text).await?;
    Ok(Utf8Json(result))
}
