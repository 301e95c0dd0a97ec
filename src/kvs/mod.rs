//! Interface to the partitioned key-value store.
//!
//! The store itself is an external system; the engine only consumes the
//! narrow surface defined by [`KvsClient`]: range scans, single-cell puts,
//! table rename/delete/count, and the enumeration of the storage nodes'
//! key-ownership boundaries used for partitioning.

pub mod http;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpKvs;
pub use memory::MemoryKvs;

/// Tables whose name carries this prefix live in the durable namespace;
/// everything else is ephemeral. Read/write semantics are identical.
pub const DURABLE_PREFIX: &str = "pt-";

pub fn is_durable(table: &str) -> bool {
    table.starts_with(DURABLE_PREFIX)
}

/// One row of a table: a key plus a column-name to binary-value mapping.
/// Column names are not fixed across rows in the same table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub key: String,
    pub columns: BTreeMap<String, Vec<u8>>,
}

impl Row {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&[u8]> {
        self.columns.get(column).map(|v| v.as_slice())
    }

    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// The value of the row's first column (in column-name order), as a
    /// string. Unpaired collections store one value per row, so this is
    /// the element the row represents.
    pub fn first_value(&self) -> Option<String> {
        self.columns
            .values()
            .next()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }
}

/// One storage node and the start of the key range it owns. Entries are
/// reported in key order; node *i* owns `[start_key_i, start_key_i+1)`,
/// and the last node's range wraps past the end of the keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingEntry {
    pub addr: String,
    pub start_key: String,
}

impl RingEntry {
    pub fn new(addr: impl Into<String>, start_key: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            start_key: start_key.into(),
        }
    }
}

/// The consumed surface of the key-value store.
#[async_trait]
pub trait KvsClient: Send + Sync {
    /// Scan rows of `table` with keys in `[from_inclusive, to_exclusive)`.
    /// An absent bound is open-ended. Rows come back in key order.
    async fn scan(
        &self,
        table: &str,
        from_inclusive: Option<&str>,
        to_exclusive: Option<&str>,
    ) -> Result<Vec<Row>>;

    /// Write one cell. The table is created implicitly on first write.
    async fn put(&self, table: &str, row: &str, column: &str, value: &[u8]) -> Result<()>;

    /// Rename a table. Returns false if the store refused the rename
    /// (e.g. the target already exists).
    async fn rename(&self, from: &str, to: &str) -> Result<bool>;

    /// Drop a table and all of its rows.
    async fn delete(&self, table: &str) -> Result<()>;

    /// Number of rows in a table. Zero for a table that does not exist.
    async fn count(&self, table: &str) -> Result<usize>;

    /// The storage nodes' key-ownership boundaries, in key order.
    async fn ring(&self) -> Result<Vec<RingEntry>>;
}

/// Builds a [`KvsClient`] for the store address named in an incoming
/// operation request. Workers hold one of these so tests can hand every
/// worker the same in-process store.
#[async_trait]
pub trait StorageFactory: Send + Sync {
    async fn connect(&self, kvs_addr: &str) -> Result<Arc<dyn KvsClient>>;
}

/// Default factory: a fresh HTTP client per store address.
pub struct HttpStorageFactory {
    http: reqwest::Client,
}

impl HttpStorageFactory {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpStorageFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageFactory for HttpStorageFactory {
    async fn connect(&self, kvs_addr: &str) -> Result<Arc<dyn KvsClient>> {
        Ok(Arc::new(HttpKvs::with_client(
            kvs_addr,
            self.http.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_first_value_is_first_column_in_name_order() {
        let row = Row::new("k")
            .with_column("b", b"second".to_vec())
            .with_column("a", b"first".to_vec());
        assert_eq!(row.first_value(), Some("first".to_string()));
    }

    #[test]
    fn row_get_str() {
        let row = Row::new("k").with_column("value", b"hello".to_vec());
        assert_eq!(row.get_str("value"), Some("hello".to_string()));
        assert_eq!(row.get_str("missing"), None);
    }

    #[test]
    fn empty_row_has_no_first_value() {
        assert_eq!(Row::new("k").first_value(), None);
    }

    #[test]
    fn durable_namespace_is_prefix_based() {
        assert!(is_durable("pt-crawl"));
        assert!(!is_durable("rdd-1234"));
        assert!(!is_durable("apt-get"));
    }
}
