//! Paired collections: (key, value) elements, keyed by row.

use crate::collection::{fresh_table, JobContext, Rdd};
use crate::error::{EmberError, Result};
use crate::logic::{LogicPayload, Pair};
use crate::ops::OperationKind;

/// A handle to a table of pairs. A row key is the pair key; every column
/// under it is one value for that key.
pub struct PairRdd {
    ctx: JobContext,
    table: String,
}

impl PairRdd {
    pub(crate) fn bind(ctx: JobContext, table: String) -> Self {
        Self { ctx, table }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Materialize every pair into memory. Order is undefined.
    pub async fn collect(&self) -> Result<Vec<Pair>> {
        let rows = self.ctx.kvs().scan(&self.table, None, None).await?;
        let mut pairs = Vec::new();
        for row in rows {
            for value in row.columns.values() {
                pairs.push((
                    row.key.clone(),
                    String::from_utf8_lossy(value).into_owned(),
                ));
            }
        }
        Ok(pairs)
    }

    /// Fold all values under each key, entirely on the workers.
    ///
    /// A pair key is a single storage row and a row belongs to exactly
    /// one partition, so every key is folded by exactly one worker; no
    /// cross-partition merge pass is needed.
    pub async fn fold_by_key(&self, zero: &str, payload: LogicPayload) -> Result<PairRdd> {
        let output = fresh_table("pair");
        self.ctx
            .dispatcher()
            .dispatch(
                OperationKind::FoldByKey,
                Some(&payload),
                &self.table,
                &output,
                Some(zero),
            )
            .await?;
        Ok(self.ctx.pair_rdd(output))
    }

    /// Emit zero or more plain values per pair.
    pub async fn flat_map(&self, payload: LogicPayload) -> Result<Rdd> {
        let output = fresh_table("rdd");
        self.ctx
            .dispatcher()
            .dispatch(
                OperationKind::PairFlatMap,
                Some(&payload),
                &self.table,
                &output,
                None,
            )
            .await?;
        Ok(self.ctx.rdd(output))
    }

    /// Emit zero or more pairs per pair.
    pub async fn flat_map_to_pair(&self, payload: LogicPayload) -> Result<PairRdd> {
        let output = fresh_table("pair");
        self.ctx
            .dispatcher()
            .dispatch(
                OperationKind::PairFlatMapToPair,
                Some(&payload),
                &self.table,
                &output,
                None,
            )
            .await?;
        Ok(self.ctx.pair_rdd(output))
    }

    /// Inner join on key. Each worker hashes its partition's slice of
    /// the other table in memory and emits one `value,value` combination
    /// per match under the shared key.
    pub async fn join(&self, other: &PairRdd) -> Result<PairRdd> {
        let output = fresh_table("join");
        self.ctx
            .dispatcher()
            .dispatch(
                OperationKind::Join,
                None,
                &self.table,
                &output,
                Some(other.table()),
            )
            .await?;
        Ok(self.ctx.pair_rdd(output))
    }

    /// Rename the underlying table and return a handle to the new name.
    pub async fn save_as(self, name: &str) -> Result<PairRdd> {
        if !self.ctx.kvs().rename(&self.table, name).await? {
            return Err(EmberError::RenameFailed {
                from: self.table,
                to: name.to_string(),
            });
        }
        Ok(PairRdd::bind(self.ctx, name.to_string()))
    }

    /// Drop the underlying table.
    pub async fn destroy(self) -> Result<()> {
        self.ctx.kvs().delete(&self.table).await
    }
}
