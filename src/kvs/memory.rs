//! In-process store used by integration tests and single-process runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::kvs::{KvsClient, RingEntry, Row, StorageFactory};

type Table = BTreeMap<String, Row>;

/// An in-memory [`KvsClient`]. Cloning yields a handle to the same data,
/// so a test cluster's workers can all share one store. The ring is fixed
/// at construction; the node addresses in it are never dialed.
#[derive(Clone)]
pub struct MemoryKvs {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    ring: Vec<RingEntry>,
}

impl MemoryKvs {
    /// A store that behaves like a single storage node owning the whole
    /// keyspace from the empty key.
    pub fn new() -> Self {
        Self::with_ring(vec![RingEntry::new("mem-0", "")])
    }

    /// A store with the given ownership boundaries. More than one entry
    /// makes dispatches fan out over multiple partitions.
    pub fn with_ring(ring: Vec<RingEntry>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            ring,
        }
    }

    pub async fn tables(&self) -> Vec<String> {
        self.tables.read().await.keys().cloned().collect()
    }
}

impl Default for MemoryKvs {
    fn default() -> Self {
        Self::new()
    }
}

fn in_range(key: &str, from: Option<&str>, to: Option<&str>) -> bool {
    if let Some(from) = from {
        if key < from {
            return false;
        }
    }
    if let Some(to) = to {
        if key >= to {
            return false;
        }
    }
    true
}

#[async_trait]
impl KvsClient for MemoryKvs {
    async fn scan(
        &self,
        table: &str,
        from_inclusive: Option<&str>,
        to_exclusive: Option<&str>,
    ) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|r| in_range(&r.key, from_inclusive, to_exclusive))
            .cloned()
            .collect())
    }

    async fn put(&self, table: &str, row: &str, column: &str, value: &[u8]) -> Result<()> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();
        rows.entry(row.to_string())
            .or_insert_with(|| Row::new(row))
            .columns
            .insert(column.to_string(), value.to_vec());
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(to) || !tables.contains_key(from) {
            return Ok(false);
        }
        let rows = tables.remove(from).unwrap_or_default();
        tables.insert(to.to_string(), rows);
        Ok(true)
    }

    async fn delete(&self, table: &str) -> Result<()> {
        self.tables.write().await.remove(table);
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0))
    }

    async fn ring(&self) -> Result<Vec<RingEntry>> {
        Ok(self.ring.clone())
    }
}

/// Factory that ignores the requested address and always hands out the
/// same shared store.
pub struct FixedStorage(pub MemoryKvs);

#[async_trait]
impl StorageFactory for FixedStorage {
    async fn connect(&self, _kvs_addr: &str) -> Result<Arc<dyn KvsClient>> {
        Ok(Arc::new(self.0.clone()))
    }
}
