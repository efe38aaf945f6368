//! Local HTTP surface.
//!
//! `GET /` and `GET /status` return the latest telemetry sample as JSON
//! (`null` before the first interval completes). `GET /health` touches the
//! metadata store. `PUT` and `GET /ciphertext/:key` go to the local
//! ciphertext cache. Every request is counted into the telemetry
//! accumulator.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use odrive_db::Dao;

use crate::telemetry::{LatestSample, RequestAccumulator, Sample};
use crate::uploads::{CacheError, DiskCache};

/// Everything the handlers share.
#[derive(Clone)]
pub struct StatusState {
    pub latest: LatestSample,
    pub accumulator: Arc<RequestAccumulator>,
    pub dao: Arc<Mutex<Dao>>,
    pub cache: Arc<DiskCache>,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    identifier: String,
    schema_version: String,
}

pub fn router(state: StatusState) -> Router {
    let accumulator = Arc::clone(&state.accumulator);
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/ciphertext/:key", get(get_ciphertext).put(put_ciphertext))
        .with_state(state)
        .layer(middleware::from_fn_with_state(accumulator, record_request))
}

pub struct StatusServer {
    listener: TcpListener,
    router: Router,
}

impl StatusServer {
    pub async fn bind(addr: &str, state: StatusState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router(state),
        })
    }

    pub async fn run(self) -> std::io::Result<()> {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "status endpoint listening");
        }
        axum::serve(self.listener, self.router).await
    }
}

async fn status(State(state): State<StatusState>) -> Json<Option<Sample>> {
    let sample = state
        .latest
        .read()
        .map(|s| s.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    Json(sample)
}

async fn health(State(state): State<StatusState>) -> Response {
    let mut dao = state.dao.lock().await;
    match dao.get_db_state() {
        Ok(db) => Json(Health {
            status: "ok",
            identifier: db.identifier,
            schema_version: db.schema_version,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

async fn put_ciphertext(
    State(state): State<StatusState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    match state.cache.put(&key, &body).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => cache_failure(e),
    }
}

async fn get_ciphertext(State(state): State<StatusState>, Path(key): Path<String>) -> Response {
    match state.cache.get(&key).await {
        Ok(data) => ([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response(),
        Err(e) => cache_failure(e),
    }
}

fn cache_failure(e: CacheError) -> Response {
    let code = match e {
        CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        CacheError::NotFound(_) => StatusCode::NOT_FOUND,
        CacheError::Io(_) => {
            tracing::error!(error = %e, "ciphertext cache failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (code, e.to_string()).into_response()
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

async fn record_request(
    State(accumulator): State<Arc<RequestAccumulator>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let received = content_length(request.headers());
    let response = next.run(request).await;
    let sent = content_length(response.headers());
    accumulator.record(received + sent, started.elapsed());
    response
}
