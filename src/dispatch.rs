//! Fans one operation out across every partition of a table.
//!
//! A dispatch recomputes partitions from the current storage ring and
//! live-worker list, issues one concurrent call per partition, and waits
//! for all of them — a hard barrier; nothing streams back early. A failed
//! partition never aborts its siblings and nothing is retried; the
//! outcome reports exactly which partitions failed so the caller can
//! decide what that means. No timeout is applied, so a stuck worker
//! stalls the barrier.

use std::sync::Arc;

use crate::error::{EmberError, Result};
use crate::kvs::http::parse_worker_list;
use crate::kvs::KvsClient;
use crate::logic::LogicPayload;
use crate::ops::{OperationKind, OperationQuery};
use crate::partition::{Partition, Partitioner};

#[derive(Debug)]
pub struct PartitionFailure {
    pub partition: Partition,
    pub error: String,
}

/// What happened to one dispatch, per partition.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub succeeded: usize,
    pub failed: Vec<PartitionFailure>,
    /// Response bodies of successful partitions, for operations that
    /// collect results (fold's partial accumulators).
    pub results: Vec<String>,
}

impl DispatchOutcome {
    pub fn partitions(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    pub fn fully_failed(&self) -> bool {
        self.succeeded == 0
    }
}

pub struct Dispatcher {
    http: reqwest::Client,
    kvs: Arc<dyn KvsClient>,
    coordinator_addr: String,
    kvs_addr: String,
}

impl Dispatcher {
    pub fn new(
        http: reqwest::Client,
        kvs: Arc<dyn KvsClient>,
        coordinator_addr: impl Into<String>,
        kvs_addr: impl Into<String>,
    ) -> Self {
        Self {
            http,
            kvs,
            coordinator_addr: coordinator_addr.into(),
            kvs_addr: kvs_addr.into(),
        }
    }

    /// Snapshot of compute workers currently registered live with the
    /// coordinator.
    pub async fn live_workers(&self) -> Result<Vec<String>> {
        let url = format!("http://{}/workers", self.coordinator_addr);
        let body = self.http.get(&url).send().await?.text().await?;
        let entries = parse_worker_list(&body).ok_or_else(|| {
            EmberError::Internal(format!("malformed worker list from {url}"))
        })?;
        Ok(entries.into_iter().map(|e| e.addr).collect())
    }

    /// Execute `op` over every partition of `input_table`, writing to
    /// `output_table`. `extra` is the fold/foldByKey zero element or the
    /// join's second table, per the operation.
    pub async fn dispatch(
        &self,
        op: OperationKind,
        payload: Option<&LogicPayload>,
        input_table: &str,
        output_table: &str,
        extra: Option<&str>,
    ) -> Result<DispatchOutcome> {
        let ring = self.kvs.ring().await?;
        let workers = self.live_workers().await?;

        let mut partitioner = Partitioner::new();
        for entry in &ring {
            partitioner.add_range_owner(&entry.addr, &entry.start_key);
        }
        for worker in &workers {
            partitioner.add_worker(worker);
        }
        let partitions = partitioner.assign();
        if partitions.is_empty() {
            return Err(EmberError::NoPartitions(format!(
                "{op} over {input_table}: {} storage ranges, {} live workers",
                ring.len(),
                workers.len()
            )));
        }

        let body = match payload {
            Some(payload) => payload.encode()?,
            None => Vec::new(),
        };

        tracing::debug!(
            operation = %op,
            input = input_table,
            output = output_table,
            partitions = partitions.len(),
            "Dispatching operation"
        );

        let calls = partitions.iter().map(|partition| {
            self.call_partition(op, partition, &body, input_table, output_table, extra)
        });
        let responses = futures::future::join_all(calls).await;

        let mut outcome = DispatchOutcome::default();
        for (partition, response) in partitions.into_iter().zip(responses) {
            match response {
                Ok(body) => {
                    outcome.succeeded += 1;
                    if op.collects_results() {
                        outcome.results.push(body);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        operation = %op,
                        partition = %partition,
                        error = %e,
                        "Partition call failed"
                    );
                    outcome.failed.push(PartitionFailure {
                        partition,
                        error: e.to_string(),
                    });
                }
            }
        }

        if outcome.fully_failed() {
            return Err(EmberError::AllPartitionsFailed(outcome.partitions()));
        }
        Ok(outcome)
    }

    async fn call_partition(
        &self,
        op: OperationKind,
        partition: &Partition,
        body: &[u8],
        input_table: &str,
        output_table: &str,
        extra: Option<&str>,
    ) -> Result<String> {
        let mut query = OperationQuery::new(input_table, output_table, &self.kvs_addr);
        query.from_row_inclusive = partition.from_key.clone();
        query.to_row_exclusive = partition.to_key_exclusive.clone();
        match op {
            OperationKind::Fold | OperationKind::FoldByKey => {
                query.zero_element = extra.map(str::to_string);
            }
            OperationKind::Join => {
                query.input_table2 = extra.map(str::to_string);
            }
            _ => {}
        }

        let url = format!("http://{}{}", partition.worker, op.path());
        let response = self
            .http
            .post(&url)
            .query(&query)
            .body(body.to_vec())
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EmberError::Internal(format!(
                "worker {} returned {status} for {op}: {text}",
                partition.worker
            )));
        }
        Ok(text)
    }
}
