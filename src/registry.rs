//! Coordinator-side tracking of live compute workers.
//!
//! Workers announce themselves with periodic pings; anything that goes
//! quiet for longer than the TTL is evicted the next time the registry
//! is read. Reads hand out a snapshot — callers tolerate staleness, and
//! a call to a worker that vanished after the snapshot is just one more
//! failed partition.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One registered worker.
#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub id: String,
    pub addr: String,
    last_seen: Instant,
}

impl WorkerEntry {
    fn new(id: String, addr: String) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn is_alive(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() < ttl
    }
}

#[derive(Debug)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerEntry>,
    ttl: Duration,
}

impl WorkerRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            workers: HashMap::new(),
            ttl,
        }
    }

    /// Record a heartbeat, registering the worker if it is new. A worker
    /// that moved (new address under the same id) is updated in place.
    pub fn ping(&mut self, id: &str, addr: String) {
        match self.workers.get_mut(id) {
            Some(entry) => {
                if entry.addr != addr {
                    tracing::info!(worker_id = id, addr = %addr, "Worker re-registered at new address");
                    entry.addr = addr;
                }
                entry.last_seen = Instant::now();
            }
            None => {
                tracing::info!(worker_id = id, addr = %addr, "Worker registered");
                self.workers
                    .insert(id.to_string(), WorkerEntry::new(id.to_string(), addr));
            }
        }
    }

    /// Evict dead workers, then return the live ones sorted by id.
    pub fn snapshot(&mut self) -> Vec<WorkerEntry> {
        self.evict_dead();
        let mut live: Vec<WorkerEntry> = self.workers.values().cloned().collect();
        live.sort_by(|a, b| a.id.cmp(&b.id));
        live
    }

    /// The newline wire format served on `/workers`: a count line, then
    /// one `id,host:port` line per live worker.
    pub fn wire_list(&mut self) -> String {
        let live = self.snapshot();
        let mut out = format!("{}\n", live.len());
        for entry in live {
            out.push_str(&entry.id);
            out.push(',');
            out.push_str(&entry.addr);
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    fn evict_dead(&mut self) {
        let ttl = self.ttl;
        let before = self.workers.len();
        self.workers.retain(|_, w| w.is_alive(ttl));
        let evicted = before - self.workers.len();
        if evicted > 0 {
            tracing::info!(evicted, "Evicted silent workers");
        }
    }
}
