//! The coordinator: accepts job submissions, tracks live workers, and
//! runs each job's entry point against the cluster.
//!
//! A submission pushes the code package to every live worker, persists
//! it locally, resolves the entry point, and runs it right here — the
//! entry point drives the cluster through its [`JobContext`], and its
//! accumulated output goes back in the response.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::collection::JobContext;
use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::kvs::KvsClient;
use crate::logic::LogicRegistry;
use crate::registry::WorkerRegistry;

/// One remembered submission, shown on the info page.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub id: u64,
    pub entry_point: String,
    pub submitted_at: DateTime<Utc>,
    pub outcome: String,
}

/// Body of a successful submission response. `upload_failures` names the
/// workers whose code-package push failed; the job still ran on the rest.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub output: String,
    pub upload_failures: Vec<String>,
}

pub struct CoordinatorState {
    pub config: CoordinatorConfig,
    pub registry: RwLock<WorkerRegistry>,
    pub logic: Arc<LogicRegistry>,
    pub kvs: Arc<dyn KvsClient>,
    pub submissions: RwLock<Vec<SubmissionRecord>>,
    next_job_id: AtomicU64,
    http: reqwest::Client,
}

impl CoordinatorState {
    pub fn new(
        config: CoordinatorConfig,
        logic: Arc<LogicRegistry>,
        kvs: Arc<dyn KvsClient>,
    ) -> Arc<Self> {
        let ttl = Duration::from_millis(config.worker_ttl_ms);
        Arc::new(Self {
            config,
            registry: RwLock::new(WorkerRegistry::new(ttl)),
            logic,
            kvs,
            submissions: RwLock::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
            http: reqwest::Client::new(),
        })
    }

    fn next_job_id(&self) -> u64 {
        self.next_job_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub fn router(state: Arc<CoordinatorState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ping", get(ping_handler))
        .route("/workers", get(workers_handler))
        .route("/version", get(version_handler))
        .route("/submit", post(submit_handler))
        .with_state(state)
}

/// Run the coordinator's HTTP service until the shutdown token fires.
pub async fn serve(
    state: Arc<CoordinatorState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(addr = %addr, "Starting coordinator");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

async fn version_handler() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[derive(Deserialize)]
struct PingQuery {
    id: Option<String>,
    port: Option<u16>,
}

async fn ping_handler(
    State(state): State<Arc<CoordinatorState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<PingQuery>,
) -> Response {
    let (Some(id), Some(port)) = (query.id, query.port) else {
        return (StatusCode::BAD_REQUEST, "Missing id or port").into_response();
    };
    let addr = format!("{}:{}", peer.ip(), port);
    state.registry.write().await.ping(&id, addr);
    (StatusCode::OK, "OK").into_response()
}

async fn workers_handler(State(state): State<Arc<CoordinatorState>>) -> String {
    state.registry.write().await.wire_list()
}

async fn index_handler(State(state): State<Arc<CoordinatorState>>) -> Html<String> {
    let workers = state.registry.write().await.snapshot();
    let submissions = state.submissions.read().await;

    let mut html = String::from(
        "<html><head><title>Ember coordinator</title></head><body><h3>Ember Coordinator</h3>\n",
    );
    html.push_str("<table border='1'><tr><th>ID</th><th>Address</th></tr>");
    for worker in &workers {
        html.push_str(&format!(
            "<tr><td>{}</td><td><a href='http://{}/'>{}</a></td></tr>",
            worker.id, worker.addr, worker.addr
        ));
    }
    html.push_str("</table>\n<h3>Submissions</h3><table border='1'>");
    html.push_str("<tr><th>Job</th><th>Entry point</th><th>Submitted</th><th>Outcome</th></tr>");
    for record in submissions.iter().rev() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            record.id, record.entry_point, record.submitted_at, record.outcome
        ));
    }
    html.push_str("</table></body></html>");
    Html(html)
}

async fn submit_handler(
    State(state): State<Arc<CoordinatorState>>,
    Query(params): Query<std::collections::HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let Some(entry_point) = params.get("entry").cloned() else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing entry point (parameter 'entry')",
        )
            .into_response();
    };

    // arg1, arg2, ... in order, stopping at the first gap.
    let mut args = Vec::new();
    for i in 1.. {
        match params.get(&format!("arg{i}")) {
            Some(arg) => args.push(arg.clone()),
            None => break,
        }
    }

    tracing::info!(entry_point = %entry_point, args = args.len(), "New job submitted");

    // Push the package to every live worker, all uploads in flight at
    // once. A failed upload is recorded, not fatal.
    let workers = state.registry.write().await.snapshot();
    let uploads = workers.iter().map(|worker| {
        let http = state.http.clone();
        let addr = worker.addr.clone();
        let package = body.clone();
        async move {
            let url = format!("http://{addr}/package");
            match http.post(&url).body(package.to_vec()).send().await {
                Ok(resp) if resp.status().is_success() => Ok(()),
                Ok(resp) => Err(format!("{addr}: status {}", resp.status())),
                Err(e) => Err(format!("{addr}: {e}")),
            }
        }
    });
    let upload_failures: Vec<String> = futures::future::join_all(uploads)
        .await
        .into_iter()
        .filter_map(|r| r.err())
        .collect();
    for failure in &upload_failures {
        tracing::warn!(failure = %failure, "Code package upload failed");
    }

    // Keep a local copy too; the entry point runs here, not on a worker.
    let job_id = state.next_job_id();
    let package_path = state.config.package_dir.join(format!("job-{job_id}.bin"));
    if let Err(e) = tokio::fs::create_dir_all(&state.config.package_dir).await {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    if let Err(e) = tokio::fs::write(&package_path, &body).await {
        tracing::error!(error = %e, path = %package_path.display(), "Failed to persist code package");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    let entry = match state.logic.entry_point(&entry_point) {
        Ok(entry) => entry,
        Err(_) => {
            record(&state, job_id, &entry_point, "rejected: unknown entry point").await;
            return (
                StatusCode::BAD_REQUEST,
                format!(
                    "No such entry point '{entry_point}'; jobs must register an \
                     entry(context, args) function under that name"
                ),
            )
                .into_response();
        }
    };

    let ctx = JobContext::new(
        state.kvs.clone(),
        state.config.kvs_addr.clone(),
        state.config.advertise_addr.clone(),
        state.logic.clone(),
    );

    match entry(ctx.clone(), args).await {
        Ok(()) => {
            let output = ctx
                .take_output()
                .unwrap_or_else(|| "<no output>".to_string());
            record(&state, job_id, &entry_point, "completed").await;
            (
                StatusCode::OK,
                Json(SubmitResponse {
                    output,
                    upload_failures,
                }),
            )
                .into_response()
        }
        Err(e) => {
            // Output accumulated before the failure is discarded; a job
            // run is all-or-nothing.
            let chain = error_chain(&e);
            tracing::error!(job_id, entry_point = %entry_point, error = %chain, "Job threw an error");
            record(&state, job_id, &entry_point, "failed").await;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Job failed:\n{chain}"),
            )
                .into_response()
        }
    }
}

async fn record(state: &CoordinatorState, id: u64, entry_point: &str, outcome: &str) {
    state.submissions.write().await.push(SubmissionRecord {
        id,
        entry_point: entry_point.to_string(),
        submitted_at: Utc::now(),
        outcome: outcome.to_string(),
    });
}

/// Render an error with its full cause chain, one cause per line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmberError;

    #[test]
    fn error_chain_includes_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = EmberError::Io(io);
        let chain = error_chain(&err);
        assert!(chain.contains("i/o error"));
        assert!(chain.contains("caused by: refused"));
    }

    #[test]
    fn job_ids_are_monotonic() {
        let state = CoordinatorState::new(
            CoordinatorConfig::default(),
            Arc::new(LogicRegistry::new()),
            Arc::new(crate::kvs::MemoryKvs::new()),
        );
        let a = state.next_job_id();
        let b = state.next_job_id();
        let c = state.next_job_id();
        assert!(a < b && b < c);
        assert_eq!(a, 1);
    }
}
