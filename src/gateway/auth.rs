use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
};

use super::handlers::Utf8Json;
use super::AppState;

/// Require `Authorization: Bearer <token>` when a token is configured.
pub(crate) async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: middleware::Next,
) -> impl IntoResponse {
    let Some(ref expected) = state.api_token else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let error = match provided {
        Some(token) if token == expected => return next.run(req).await,
        Some(_) => "invalid token",
        None => "missing or invalid Authorization header",
    };
    (
        StatusCode::UNAUTHORIZED,
        Utf8Json(serde_json::json!({"error": error, "kind": "unauthorized"})),
    )
        .into_response()
}
