//! HTTP trigger for the sync pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/sync` | Run one sync, returns the summary |
//!
//! `POST /sync` accepts an optional JSON body:
//!
//! ```json
//! { "feedUrl": "https://example.substack.com/feed", "fullSync": true }
//! ```
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "sync_in_progress", "message": "A sync is already running" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401),
//! `sync_in_progress` (409), `internal` (500), `feed_unavailable` (502).

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::sync::{SyncPipeline, SyncSummary};
use crate::util::validate_fetch_url;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<SyncPipeline>,
    default_feed_url: Option<String>,
    sync_token: Option<Arc<SecretString>>,
    /// Held for the duration of a run; a second request gets 409.
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: SyncPipeline, default_feed_url: Option<String>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            default_feed_url,
            sync_token: None,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Require `Authorization: Bearer <token>` on `POST /sync`.
    pub fn with_sync_token(mut self, token: Option<SecretString>) -> Self {
        self.sync_token = token.map(Arc::new);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/sync", post(handle_sync))
        .with_state(state)
}

/// Binds `bind_addr` and serves until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Sync server listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "Missing or invalid bearer token".to_string(),
        }
    }

    fn sync_in_progress() -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "sync_in_progress",
            message: "A sync is already running".to_string(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }

    fn feed_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            code: "feed_unavailable",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /sync ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SyncRequest {
    feed_url: Option<String>,
    #[serde(default)]
    full_sync: bool,
}

fn authorize(expected: Option<&SecretString>, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if tokens_match(token, expected.expose_secret()) => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

/// Extracts the credential from `Bearer <token>`; the scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn handle_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SyncSummary>, AppError> {
    authorize(state.sync_token.as_deref(), &headers)?;

    // Empty body means defaults
    let request: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("Invalid request body: {}", e)))?
    };

    let feed_url = request
        .feed_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| state.default_feed_url.clone())
        .ok_or_else(|| AppError::bad_request("No feedUrl given and none configured"))?;

    if let Err(e) = validate_fetch_url(&feed_url, true) {
        return Err(AppError::bad_request(format!("Invalid feedUrl: {}", e)));
    }

    let guard = state
        .run_lock
        .clone()
        .try_lock_owned()
        .map_err(|_| AppError::sync_in_progress())?;

    // The run lives in its own task so a dropped connection cannot cut it
    // short; the lock is released only when the run itself ends.
    let pipeline = state.pipeline.clone();
    let run_url = feed_url.clone();
    let run = tokio::spawn(async move {
        let result = pipeline.run(&run_url, request.full_sync, None).await;
        drop(guard);
        result
    });

    match run.await {
        Ok(Ok(summary)) => Ok(Json(summary)),
        Ok(Err(e)) => {
            tracing::warn!(feed = %feed_url, error = %e, "Triggered sync failed");
            Err(AppError::feed_unavailable(e.to_string()))
        }
        Err(e) => {
            tracing::error!(feed = %feed_url, error = %e, "Sync task panicked");
            Err(AppError::internal("Sync task failed"))
        }
    }
}
