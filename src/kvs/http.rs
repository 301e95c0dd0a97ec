//! HTTP client for a deployed key-value store.
//!
//! Speaks the store's plain request/response protocol: the store
//! coordinator's `/workers` route enumerates storage nodes and the start
//! of the key range each owns; each node serves `/data`, `/rename`,
//! `/delete` and `/count` routes. Scanned rows come back as one JSON row
//! per line.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EmberError, Result};
use crate::kvs::{KvsClient, RingEntry, Row};

pub struct HttpKvs {
    coordinator_addr: String,
    http: reqwest::Client,
    // Ring cache for put routing; scans and metadata calls refetch.
    owners: RwLock<Option<Vec<RingEntry>>>,
}

impl HttpKvs {
    pub fn new(coordinator_addr: impl Into<String>) -> Self {
        Self::with_client(coordinator_addr, reqwest::Client::new())
    }

    pub fn with_client(coordinator_addr: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            coordinator_addr: coordinator_addr.into(),
            http,
            owners: RwLock::new(None),
        }
    }

    async fn fetch_ring(&self) -> Result<Vec<RingEntry>> {
        let url = format!("http://{}/workers", self.coordinator_addr);
        let body = self.http.get(&url).send().await?.text().await?;
        parse_worker_list(&body)
            .ok_or_else(|| EmberError::Storage(format!("malformed worker list from {url}")))
    }

    async fn owners(&self) -> Result<Vec<RingEntry>> {
        if let Some(owners) = self.owners.read().await.as_ref() {
            return Ok(owners.clone());
        }
        let ring = self.fetch_ring().await?;
        *self.owners.write().await = Some(ring.clone());
        Ok(ring)
    }

    /// The node owning `key`: the last entry whose start key is <= `key`,
    /// or the wrapping (last) node when `key` precedes every start key.
    fn owner_of<'a>(owners: &'a [RingEntry], key: &str) -> Option<&'a RingEntry> {
        owners
            .iter()
            .rev()
            .find(|e| e.start_key.as_str() <= key)
            .or_else(|| owners.last())
    }
}

/// Parses the newline worker list: first line is the count, each further
/// line is `id,host:port`. For the storage tier the id doubles as the
/// start of the node's key range.
pub fn parse_worker_list(body: &str) -> Option<Vec<RingEntry>> {
    let mut lines = body.lines();
    let count: usize = lines.next()?.trim().parse().ok()?;
    let mut entries = Vec::with_capacity(count);
    for line in lines.take(count) {
        let (id, addr) = line.split_once(',')?;
        entries.push(RingEntry::new(addr.trim(), id.trim()));
    }
    if entries.len() != count {
        return None;
    }
    entries.sort_by(|a, b| a.start_key.cmp(&b.start_key));
    Some(entries)
}

#[async_trait]
impl KvsClient for HttpKvs {
    async fn scan(
        &self,
        table: &str,
        from_inclusive: Option<&str>,
        to_exclusive: Option<&str>,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        // Every node is asked with the same bounds; each returns only the
        // rows it holds, so the union is the requested range.
        for node in self.owners().await? {
            let url = format!("http://{}/data/{}", node.addr, table);
            let mut req = self.http.get(&url);
            if let Some(from) = from_inclusive {
                req = req.query(&[("startRow", from)]);
            }
            if let Some(to) = to_exclusive {
                req = req.query(&[("endRowExclusive", to)]);
            }
            let resp = req.send().await?;
            if !resp.status().is_success() {
                return Err(EmberError::Storage(format!(
                    "scan of {table} on {} returned {}",
                    node.addr,
                    resp.status()
                )));
            }
            for line in resp.text().await?.lines() {
                if line.is_empty() {
                    continue;
                }
                let row: Row = serde_json::from_str(line)
                    .map_err(|e| EmberError::Storage(format!("bad row from {}: {e}", node.addr)))?;
                rows.push(row);
            }
        }
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    async fn put(&self, table: &str, row: &str, column: &str, value: &[u8]) -> Result<()> {
        let owners = self.owners().await?;
        let node = Self::owner_of(&owners, row)
            .ok_or_else(|| EmberError::Storage("storage ring is empty".to_string()))?;
        let url = format!("http://{}/data/{}/{}/{}", node.addr, table, row, column);
        let resp = self.http.put(&url).body(value.to_vec()).send().await?;
        if !resp.status().is_success() {
            return Err(EmberError::Storage(format!(
                "put to {table}/{row} on {} returned {}",
                node.addr,
                resp.status()
            )));
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let mut ok = true;
        for node in self.owners().await? {
            let url = format!("http://{}/rename/{}", node.addr, from);
            let resp = self
                .http
                .put(&url)
                .body(to.to_string())
                .send()
                .await?;
            ok &= resp.status().is_success();
        }
        Ok(ok)
    }

    async fn delete(&self, table: &str) -> Result<()> {
        for node in self.owners().await? {
            let url = format!("http://{}/delete/{}", node.addr, table);
            let resp = self.http.put(&url).send().await?;
            if !resp.status().is_success() {
                return Err(EmberError::Storage(format!(
                    "delete of {table} on {} returned {}",
                    node.addr,
                    resp.status()
                )));
            }
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<usize> {
        let mut total = 0;
        for node in self.owners().await? {
            let url = format!("http://{}/count/{}", node.addr, table);
            let body = self.http.get(&url).send().await?.text().await?;
            total += body.trim().parse::<usize>().map_err(|e| {
                EmberError::Storage(format!("bad count from {}: {e}", node.addr))
            })?;
        }
        Ok(total)
    }

    async fn ring(&self) -> Result<Vec<RingEntry>> {
        // Fresh every time; partitions are recomputed per dispatch.
        let ring = self.fetch_ring().await?;
        *self.owners.write().await = Some(ring.clone());
        Ok(ring)
    }
}
