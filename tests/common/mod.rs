//! Test harness: an in-memory store plus a real coordinator and real
//! workers on ephemeral ports.

// Each test binary uses its own slice of the harness.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ember::collection::JobContext;
use ember::config::{CoordinatorConfig, WorkerConfig};
use ember::coordinator::{self, CoordinatorState};
use ember::error::{EmberError, Result};
use ember::jobs;
use ember::kvs::memory::FixedStorage;
use ember::kvs::{MemoryKvs, RingEntry, Row};
use ember::logic::{LogicRegistry, Operator, Pair};
use ember::worker::{self, WorkerState};

/// A running cluster: one coordinator, `n` workers, one shared store.
pub struct TestCluster {
    pub kvs: MemoryKvs,
    pub coordinator_addr: String,
    pub worker_addrs: Vec<String>,
    pub worker_dirs: Vec<PathBuf>,
    pub package_dir: PathBuf,
    logic: Arc<LogicRegistry>,
    shutdown: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
    coordinator_handle: Option<JoinHandle<()>>,
}

impl TestCluster {
    /// Cluster over a single-node storage ring.
    pub async fn start(num_workers: usize) -> Self {
        Self::start_with_ring(num_workers, vec![RingEntry::new("mem-0", "")]).await
    }

    /// Cluster over the given storage ring; more ring entries mean more
    /// partitions per dispatch.
    pub async fn start_with_ring(num_workers: usize, ring: Vec<RingEntry>) -> Self {
        let kvs = MemoryKvs::with_ring(ring);
        let logic = test_logic().into_shared();
        let shutdown = CancellationToken::new();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = listener.local_addr().unwrap();
        let coordinator_addr = listen_addr.to_string();
        let package_dir = temp_dir("pkg");
        let mut config = CoordinatorConfig::new(listen_addr, "mem".to_string())
            .with_package_dir(package_dir.clone());
        config.advertise_addr = coordinator_addr.clone();

        let state = CoordinatorState::new(config, logic.clone(), Arc::new(kvs.clone()));
        let coordinator_handle = {
            let state = state.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                let _ = coordinator::serve(state, listener, token).await;
            })
        };

        let mut cluster = Self {
            kvs,
            coordinator_addr,
            worker_addrs: Vec::new(),
            worker_dirs: Vec::new(),
            package_dir,
            logic,
            shutdown,
            worker_handles: Vec::new(),
            coordinator_handle: Some(coordinator_handle),
        };
        for i in 0..num_workers {
            cluster.spawn_worker(i).await;
        }
        cluster
    }

    async fn spawn_worker(&mut self, index: usize) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage_dir = temp_dir("worker");
        let config = WorkerConfig::new(addr, self.coordinator_addr.clone())
            .with_storage_dir(storage_dir.clone());

        let state = Arc::new(WorkerState {
            config,
            storage: Arc::new(FixedStorage(self.kvs.clone())),
            registry: self.logic.clone(),
        });
        let token = self.shutdown.clone();
        self.worker_handles.push(tokio::spawn(async move {
            let _ = worker::serve(state, listener, token).await;
        }));
        self.worker_addrs.push(addr.to_string());
        self.worker_dirs.push(storage_dir);

        self.ping(&format!("w{index}"), addr.port()).await;
    }

    /// Register a worker id/port with the coordinator directly, the way
    /// one heartbeat would.
    pub async fn ping(&self, id: &str, port: u16) {
        reqwest::Client::new()
            .get(format!("http://{}/ping", self.coordinator_addr))
            .query(&[("id", id.to_string()), ("port", port.to_string())])
            .send()
            .await
            .expect("ping failed");
    }

    /// Kill one worker's HTTP service. The registry still lists it until
    /// the TTL passes, so dispatches keep trying it.
    pub fn kill_worker(&mut self, index: usize) {
        self.worker_handles[index].abort();
    }

    /// A job context bound to this cluster, as a running job would get.
    pub fn context(&self) -> JobContext {
        JobContext::new(
            Arc::new(self.kvs.clone()),
            "mem".to_string(),
            self.coordinator_addr.clone(),
            self.logic.clone(),
        )
    }

    /// Submit a job over HTTP, as a client would.
    pub async fn submit(
        &self,
        entry: &str,
        args: &[&str],
    ) -> (reqwest::StatusCode, String) {
        let mut request = reqwest::Client::new()
            .post(format!("http://{}/submit", self.coordinator_addr))
            .query(&[("entry", entry)]);
        for (i, arg) in args.iter().enumerate() {
            request = request.query(&[(format!("arg{}", i + 1), arg.to_string())]);
        }
        let response = request
            .body(b"test package bytes".to_vec())
            .send()
            .await
            .expect("submit failed");
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        (status, body)
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for handle in &self.worker_handles {
            handle.abort();
        }
        if let Some(handle) = self.coordinator_handle.take() {
            handle.abort();
        }
    }
}

fn temp_dir(prefix: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ember-{prefix}-{}", uuid::Uuid::new_v4()))
}

// ---------------------------------------------------------------------
// Operators and entry points the tests dispatch.
// ---------------------------------------------------------------------

pub fn test_logic() -> LogicRegistry {
    let mut registry = LogicRegistry::new();
    jobs::register(&mut registry);

    registry.register_operator("identity", Operator::ValueToValues(identity));
    registry.register_operator("dup", Operator::ValueToValues(dup));
    registry.register_operator("fail-on", Operator::ValueToValues(fail_on));
    registry.register_operator("kv-split", Operator::ValueToPair(kv_split));
    registry.register_operator("explode", Operator::ValueToPairs(explode));
    registry.register_operator("non-empty", Operator::ValueToBool(non_empty));
    registry.register_operator("min-len", Operator::ValueToBool(min_len));
    registry.register_operator("pair-format", Operator::PairToValues(pair_format));
    registry.register_operator("swap", Operator::PairToPairs(swap));
    registry.register_operator("row-first", Operator::RowToValue(row_first));
    registry.register_operator("count-batch", Operator::Partition(count_batch));

    registry.register_entry("echo", echo);
    registry.register_entry("boom", boom);
    registry
}

fn identity(_args: &[String], value: &str) -> Result<Vec<String>> {
    Ok(vec![value.to_string()])
}

fn dup(_args: &[String], value: &str) -> Result<Vec<String>> {
    Ok(vec![value.to_string(), value.to_string()])
}

/// Errors on the value named by the first captured argument; everything
/// else passes through.
fn fail_on(args: &[String], value: &str) -> Result<Vec<String>> {
    if args.first().map(String::as_str) == Some(value) {
        Err(EmberError::Logic(format!("poisoned value {value:?}")))
    } else {
        Ok(vec![value.to_string()])
    }
}

/// "a=1" -> ("a", "1"); values without '=' emit nothing.
fn kv_split(_args: &[String], value: &str) -> Result<Option<Pair>> {
    Ok(value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string())))
}

/// One pair per character, keyed by the character.
fn explode(_args: &[String], value: &str) -> Result<Vec<Pair>> {
    Ok(value
        .chars()
        .map(|c| (c.to_string(), value.to_string()))
        .collect())
}

fn non_empty(_args: &[String], value: &str) -> Result<bool> {
    Ok(!value.is_empty())
}

/// Keeps values at least as long as the threshold in the first argument.
fn min_len(args: &[String], value: &str) -> Result<bool> {
    let threshold: usize = args
        .first()
        .ok_or_else(|| EmberError::Logic("min-len needs a threshold".to_string()))?
        .parse()
        .map_err(|_| EmberError::Logic("min-len threshold is not a number".to_string()))?;
    Ok(value.len() >= threshold)
}

fn pair_format(_args: &[String], pair: &Pair) -> Result<Vec<String>> {
    Ok(vec![format!("{}:{}", pair.0, pair.1)])
}

fn swap(_args: &[String], pair: &Pair) -> Result<Vec<Pair>> {
    Ok(vec![(pair.1.clone(), pair.0.clone())])
}

fn row_first(_args: &[String], row: &Row) -> Result<Option<String>> {
    Ok(row.first_value())
}

/// Emits one value: how many values this partition held.
fn count_batch(_args: &[String], values: Vec<String>) -> Result<Vec<String>> {
    Ok(vec![values.len().to_string()])
}

/// Entry point that only writes output; it never touches the cluster.
fn echo(ctx: JobContext, args: Vec<String>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        ctx.output(&args.join(" "));
        Ok(())
    })
}

/// Entry point that writes output and then fails; the output must be
/// discarded.
fn boom(ctx: JobContext, _args: Vec<String>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        ctx.output("this must never reach the submitter");
        Err(EmberError::JobFailed("the job blew up".to_string()))
    })
}
