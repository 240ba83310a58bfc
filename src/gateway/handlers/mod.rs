pub(crate) mod analysis;
pub(crate) mod health;

use axum::{
    extract::rejection::BytesRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// JSON body sent as `application/json; charset=utf-8`, non-ASCII
/// unescaped.
pub(crate) struct Utf8Json<T>(pub T);

impl<T: Serialize> IntoResponse for Utf8Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json; charset=utf-8"),
                )],
                body,
            )
                .into_response(),
            Err(e) => {
                error!(error = %e, "failed to serialize response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Everything a handler can fail with, rendered as `{error, kind}`.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    /// The body could not be read, e.g. it exceeded the size limit.
    Body { status: StatusCode, message: String },
    Analysis(AnalysisError),
}

impl From<BytesRejection> for ApiError {
    fn from(e: BytesRejection) -> Self {
        ApiError::Body {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        ApiError::Analysis(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Body { status, .. } => *status,
            ApiError::Analysis(AnalysisError::RunTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Analysis(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Body { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            ApiError::Body { .. } => "bad_request",
            ApiError::Analysis(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match &self {
            ApiError::BadRequest(m) | ApiError::Body { message: m, .. } => m.clone(),
            ApiError::Analysis(e) => e.to_string(),
        };
        if let ApiError::Analysis(e) = &self {
            error!(%status, kind, retryable = e.is_retryable(), error = %message, "request failed");
        } else {
            warn!(%status, kind, error = %message, "request rejected");
        }
        (
            status,
            Utf8Json(serde_json::json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}
