//! Worker process: serves the operation endpoints, accepts code-package
//! pushes, and heartbeats the coordinator.
//!
//! # Request Flow
//!
//! 1. The dispatcher POSTs to `/rdd/<operation>` with the partition's
//!    key range and table names as query parameters
//! 2. The handler decodes the logic payload and connects to the store
//!    named in the request
//! 3. [`executor`] streams the partition's rows and applies the operator
//! 4. Results are written back to the output table; only fold returns a
//!    response body

pub mod executor;
mod heartbeat;

pub use heartbeat::heartbeat_loop;

use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rand::Rng;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::kvs::StorageFactory;
use crate::logic::LogicRegistry;
use crate::ops::{OperationKind, OperationQuery};

pub struct WorkerState {
    pub config: WorkerConfig,
    pub storage: Arc<dyn StorageFactory>,
    pub registry: Arc<LogicRegistry>,
}

pub fn router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/package", post(package_handler))
        .route("/version", get(version_handler))
        .route("/rdd/:operation", post(operation_handler))
        .with_state(state)
}

/// Run the worker's HTTP service until the shutdown token fires.
pub async fn serve(
    state: Arc<WorkerState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Starting worker");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// The worker's persisted identity: a random 5-letter name written to
/// `<storage_dir>/id` on first start so restarts keep the same id.
pub async fn worker_identity(storage_dir: &Path) -> Result<String> {
    let id_path = storage_dir.join("id");
    if let Ok(id) = tokio::fs::read_to_string(&id_path).await {
        let id = id.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }
    let id = random_worker_id();
    tokio::fs::create_dir_all(storage_dir).await?;
    tokio::fs::write(&id_path, &id).await?;
    Ok(id)
}

fn random_worker_id() -> String {
    let mut rng = rand::thread_rng();
    (0..5)
        .map(|_| char::from(b'a' + rng.gen_range(0..26)))
        .collect()
}

async fn version_handler() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Persist the pushed code package. The worker executes logic from its
/// linked registry; the bytes are kept so the package that produced a
/// run can be identified later.
async fn package_handler(State(state): State<Arc<WorkerState>>, body: Bytes) -> Response {
    let dir = &state.config.storage_dir;
    let path = dir.join("package-current.bin");
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::error!(error = %e, "Failed to create storage directory");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    match tokio::fs::write(&path, &body).await {
        Ok(()) => {
            tracing::info!(bytes = body.len(), path = %path.display(), "Stored code package");
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to store code package");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn operation_handler(
    State(state): State<Arc<WorkerState>>,
    UrlPath(operation): UrlPath<String>,
    Query(query): Query<OperationQuery>,
    body: Bytes,
) -> Response {
    let op = match OperationKind::parse(&operation) {
        Ok(op) => op,
        Err(e) => return (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    };

    tracing::debug!(
        operation = %op,
        input = %query.input_table,
        from = query.from_row_inclusive.as_deref().unwrap_or("-inf"),
        to = query.to_row_exclusive.as_deref().unwrap_or("+inf"),
        "Executing operation"
    );

    match executor::execute(&state, op, &query, &body).await {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!(operation = %op, error = %e, "Operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{op} failed: {e}"),
            )
                .into_response()
        }
    }
}
