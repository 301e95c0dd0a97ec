//! Unpaired collections.

use crate::collection::{fresh_table, JobContext, PairRdd};
use crate::error::{EmberError, Result};
use crate::logic::LogicPayload;
use crate::ops::OperationKind;

/// A handle to a table of plain values, one value per (row, column).
pub struct Rdd {
    ctx: JobContext,
    table: String,
}

impl std::fmt::Debug for Rdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rdd").field("table", &self.table).finish()
    }
}

impl Rdd {
    pub(crate) fn bind(ctx: JobContext, table: String) -> Self {
        Self { ctx, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Materialize every value into memory. Order is undefined.
    pub async fn collect(&self) -> Result<Vec<String>> {
        let rows = self.ctx.kvs().scan(&self.table, None, None).await?;
        let mut values = Vec::new();
        for row in rows {
            for value in row.columns.values() {
                values.push(String::from_utf8_lossy(value).into_owned());
            }
        }
        Ok(values)
    }

    pub async fn count(&self) -> Result<usize> {
        self.ctx.kvs().count(&self.table).await
    }

    /// The first `n` values in storage scan order — not a sample.
    pub async fn take(&self, n: usize) -> Result<Vec<String>> {
        let rows = self.ctx.kvs().scan(&self.table, None, None).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first_value())
            .take(n)
            .collect())
    }

    /// Rename the underlying table and return a handle to the new name.
    pub async fn save_as(self, name: &str) -> Result<Rdd> {
        if !self.ctx.kvs().rename(&self.table, name).await? {
            return Err(EmberError::RenameFailed {
                from: self.table,
                to: name.to_string(),
            });
        }
        Ok(Rdd::bind(self.ctx, name.to_string()))
    }

    /// Drop the underlying table.
    pub async fn destroy(self) -> Result<()> {
        self.ctx.kvs().delete(&self.table).await
    }

    /// Distinct values as a new collection.
    ///
    /// Deliberately not a distributed operation: a single local pass
    /// writes each value under itself as the row key, so duplicates
    /// collapse by key collision. Unlike every other transformation this
    /// runs entirely on the machine calling it.
    pub async fn distinct(&self) -> Result<Rdd> {
        let output = fresh_table("distinct");
        let rows = self.ctx.kvs().scan(&self.table, None, None).await?;
        for row in rows {
            if let Some(value) = row.first_value() {
                self.ctx
                    .kvs()
                    .put(&output, &value, "value", value.as_bytes())
                    .await?;
            }
        }
        Ok(self.ctx.rdd(output))
    }

    /// Emit zero or more values per input value.
    pub async fn flat_map(&self, payload: LogicPayload) -> Result<Rdd> {
        let output = fresh_table("rdd");
        self.dispatch(OperationKind::FlatMap, &payload, &output, None)
            .await?;
        Ok(self.ctx.rdd(output))
    }

    /// Emit at most one (key, value) pair per input value.
    pub async fn map_to_pair(&self, payload: LogicPayload) -> Result<PairRdd> {
        let output = fresh_table("pair");
        self.dispatch(OperationKind::MapToPair, &payload, &output, None)
            .await?;
        Ok(self.ctx.pair_rdd(output))
    }

    /// Emit zero or more pairs per input value.
    pub async fn flat_map_to_pair(&self, payload: LogicPayload) -> Result<PairRdd> {
        let output = fresh_table("pair");
        self.dispatch(OperationKind::FlatMapToPair, &payload, &output, None)
            .await?;
        Ok(self.ctx.pair_rdd(output))
    }

    /// Keep only values the predicate holds for.
    pub async fn filter(&self, payload: LogicPayload) -> Result<Rdd> {
        let output = fresh_table("rdd");
        self.dispatch(OperationKind::Filter, &payload, &output, None)
            .await?;
        Ok(self.ctx.rdd(output))
    }

    /// Apply an operator once per partition instead of once per value.
    /// The only operation that exposes partition-level batching to user
    /// logic.
    pub async fn map_partitions(&self, payload: LogicPayload) -> Result<Rdd> {
        let output = fresh_table("rdd");
        self.dispatch(OperationKind::MapPartitions, &payload, &output, None)
            .await?;
        Ok(self.ctx.rdd(output))
    }

    /// Fold every value into one accumulator. Each partition folds
    /// remotely from the zero element; the partials are then folded
    /// locally in whatever order the partitions responded, so the
    /// reducer must be associative and commutative for a deterministic
    /// result.
    pub async fn fold(&self, zero: &str, payload: LogicPayload) -> Result<String> {
        // Resolve the reducer before any network call; the local merge
        // needs it anyway.
        let reducer = self.ctx.registry().reducer(&payload, "fold")?;
        let outcome = self
            .ctx
            .dispatcher()
            .dispatch(
                OperationKind::Fold,
                Some(&payload),
                &self.table,
                "",
                Some(zero),
            )
            .await?;

        let mut acc = zero.to_string();
        for partial in &outcome.results {
            acc = reducer(&payload.args, &acc, partial)?;
        }
        Ok(acc)
    }

    async fn dispatch(
        &self,
        op: OperationKind,
        payload: &LogicPayload,
        output: &str,
        extra: Option<&str>,
    ) -> Result<()> {
        self.ctx
            .dispatcher()
            .dispatch(op, Some(payload), &self.table, output, extra)
            .await?;
        Ok(())
    }
}
