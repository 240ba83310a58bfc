//! HTTP gateway.
//!
//! Serves:
//! - `POST /get_or_create_assistant` — `{user_id?}` → `{assistant_ref, thread_ref}`
//! - `POST /analyze` — `{thread_ref, assistant_ref, message}` → analysis
//! - `POST /review`  — `{text, user_id?}` → analysis
//! - `GET  /health`  — liveness, never behind auth
//!
//! When `JOURNAL_API_TOKEN` is set, the POST routes require
//! `Authorization: Bearer <token>`.

mod auth;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::service::JournalService;

/// Diary entries are short; anything larger is rejected before parsing.
const MAX_BODY_BYTES: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// Gateway handle
// ---------------------------------------------------------------------------

/// Handle returned by [`start_gateway`].
pub struct Gateway {
    /// Server task handle.
    pub handle: JoinHandle<()>,
    /// The address the server is actually listening on.
    pub addr: SocketAddr,
    /// Cancel to stop accepting connections and drain in-flight requests.
    pub shutdown: CancellationToken,
}

impl Gateway {
    /// Trigger graceful shutdown and wait for the server task.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "gateway task did not exit cleanly");
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state injected into axum handlers
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<JournalService>,
    pub(crate) api_token: Option<String>,
    pub(crate) started: Instant,
}

/// `JOURNAL_API_TOKEN`, when set and non-empty.
pub fn api_token_from_env() -> Option<String> {
    std::env::var("JOURNAL_API_TOKEN")
        .ok()
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Server startup
// ---------------------------------------------------------------------------

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let analysis = Router::new()
        .route(
            "/get_or_create_assistant",
            post(handlers::analysis::get_or_create_assistant),
        )
        .route("/analyze", post(handlers::analysis::analyze))
        .route("/review", post(handlers::analysis::review))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(analysis)
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the gateway on `addr` serving `service`.
///
/// `api_token` enables bearer auth on the analysis routes.
pub async fn start_gateway(
    addr: SocketAddr,
    service: Arc<JournalService>,
    api_token: Option<String>,
) -> std::io::Result<Gateway> {
    if api_token.is_some() {
        info!("API authentication enabled (JOURNAL_API_TOKEN set)");
    } else {
        warn!("API authentication disabled (JOURNAL_API_TOKEN not set)");
    }

    let state = AppState {
        service,
        api_token,
        started: Instant::now(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move {
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = serve.await {
            error!("gateway server error: {e}");
        }
        info!("gateway stopped");
    });

    info!(%bound_addr, "gateway started");

    Ok(Gateway {
        handle,
        addr: bound_addr,
        shutdown,
    })
}
