//! Client-side handles over named tables.
//!
//! A collection is a thin handle: the data stays in the store, and every
//! transformation eagerly runs one distributed dispatch that writes a
//! freshly named output table. There is no lazy chaining and no query
//! planner.

mod pair;
mod rdd;

pub use pair::PairRdd;
pub use rdd::Rdd;

use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::kvs::KvsClient;
use crate::logic::{LogicPayload, LogicRegistry};
use crate::ops::OperationKind;

pub(crate) fn fresh_table(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

struct ContextInner {
    kvs: Arc<dyn KvsClient>,
    kvs_addr: String,
    coordinator_addr: String,
    registry: Arc<LogicRegistry>,
    http: reqwest::Client,
    output: Mutex<String>,
}

/// The context handed to a job's entry point: bound to the store and to
/// the coordinator that is running the job, and owning the job's output
/// accumulator.
#[derive(Clone)]
pub struct JobContext {
    inner: Arc<ContextInner>,
}

impl JobContext {
    pub fn new(
        kvs: Arc<dyn KvsClient>,
        kvs_addr: impl Into<String>,
        coordinator_addr: impl Into<String>,
        registry: Arc<LogicRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                kvs,
                kvs_addr: kvs_addr.into(),
                coordinator_addr: coordinator_addr.into(),
                registry,
                http: reqwest::Client::new(),
                output: Mutex::new(String::new()),
            }),
        }
    }

    pub fn kvs(&self) -> Arc<dyn KvsClient> {
        self.inner.kvs.clone()
    }

    pub fn registry(&self) -> &LogicRegistry {
        &self.inner.registry
    }

    /// Append to the job's output. Everything accumulated here is
    /// returned to the submitter when the entry point returns normally.
    pub fn output(&self, s: &str) {
        self.inner
            .output
            .lock()
            .expect("output accumulator poisoned")
            .push_str(s);
    }

    /// The accumulated output, or `None` if the job never wrote any.
    pub fn take_output(&self) -> Option<String> {
        let out = self
            .inner
            .output
            .lock()
            .expect("output accumulator poisoned");
        if out.is_empty() {
            None
        } else {
            Some(out.clone())
        }
    }

    pub(crate) fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.inner.http.clone(),
            self.inner.kvs.clone(),
            self.inner.coordinator_addr.clone(),
            self.inner.kvs_addr.clone(),
        )
    }

    /// Bind a handle to an existing table without touching it.
    pub fn rdd(&self, table: impl Into<String>) -> Rdd {
        Rdd::bind(self.clone(), table.into())
    }

    /// Bind a paired handle to an existing table without touching it.
    pub fn pair_rdd(&self, table: impl Into<String>) -> PairRdd {
        PairRdd::bind(self.clone(), table.into())
    }

    /// Seed a fresh table with the given values, one row per value.
    /// Runs on the coordinator; row keys are random so the data spreads
    /// across the storage ring.
    pub async fn parallelize(&self, data: Vec<String>) -> Result<Rdd> {
        let table = fresh_table("rdd");
        for value in data {
            let key = Uuid::new_v4().simple().to_string();
            self.inner
                .kvs
                .put(&table, &key, "value", value.as_bytes())
                .await?;
        }
        Ok(self.rdd(table))
    }

    /// Build a collection from an existing table by applying a
    /// row-to-value operator on the workers.
    pub async fn from_table(&self, table: &str, payload: LogicPayload) -> Result<Rdd> {
        let output = fresh_table("rdd");
        self.dispatcher()
            .dispatch(OperationKind::FromTable, Some(&payload), table, &output, None)
            .await?;
        Ok(self.rdd(output))
    }
}
