//! Maps the storage layer's key-ownership boundaries onto live compute
//! workers.
//!
//! Every dispatch recomputes partitions from scratch: the storage ring
//! defines the key ranges, the live-worker list defines who processes
//! them. Storage nodes and compute workers are independent pools and may
//! differ in count.

use crate::kvs::RingEntry;

/// A contiguous key range assigned to one compute worker for one
/// dispatch. `None` bounds are open-ended: no `from_key` means "from the
/// beginning of the keyspace", no `to_key_exclusive` means "to the end".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub worker: String,
    pub from_key: Option<String>,
    pub to_key_exclusive: Option<String>,
}

impl Partition {
    pub fn contains(&self, key: &str) -> bool {
        if let Some(from) = &self.from_key {
            if key < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.to_key_exclusive {
            if key >= to.as_str() {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}) on {}",
            self.from_key.as_deref().unwrap_or("-inf"),
            self.to_key_exclusive.as_deref().unwrap_or("+inf"),
            self.worker
        )
    }
}

/// Collects the storage ring and the live workers, then assigns one
/// partition per storage range round-robin over the workers.
#[derive(Debug, Default)]
pub struct Partitioner {
    owners: Vec<RingEntry>,
    workers: Vec<String>,
}

impl Partitioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one storage node and the start of the key range it owns.
    /// Nodes must be added in key order.
    pub fn add_range_owner(&mut self, addr: impl Into<String>, start_key: impl Into<String>) {
        self.owners.push(RingEntry::new(addr, start_key));
    }

    pub fn add_worker(&mut self, addr: impl Into<String>) {
        self.workers.push(addr.into());
    }

    /// Assign every storage range to a live worker.
    ///
    /// Node *i* owns `[start_i, start_i+1)`. The last node's range wraps
    /// past the maximum key, which the half-open model cannot express as
    /// one range, so it becomes two partitions — `[start_last, +inf)` and
    /// `(-inf, start_first)` — on the same worker.
    ///
    /// With no live workers (or no storage nodes) there is nothing to
    /// assign and the result is empty; callers must treat that as an
    /// error, not an empty success.
    pub fn assign(&self) -> Vec<Partition> {
        if self.workers.is_empty() || self.owners.is_empty() {
            return Vec::new();
        }

        let mut partitions = Vec::with_capacity(self.owners.len() + 1);
        for (i, owner) in self.owners.iter().enumerate() {
            let worker = self.workers[i % self.workers.len()].clone();
            if let Some(next) = self.owners.get(i + 1) {
                partitions.push(Partition {
                    worker,
                    from_key: Some(owner.start_key.clone()),
                    to_key_exclusive: Some(next.start_key.clone()),
                });
            } else {
                partitions.push(Partition {
                    worker: worker.clone(),
                    from_key: Some(owner.start_key.clone()),
                    to_key_exclusive: None,
                });
                partitions.push(Partition {
                    worker,
                    from_key: None,
                    to_key_exclusive: Some(self.owners[0].start_key.clone()),
                });
            }
        }
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitioner(starts: &[&str], workers: &[&str]) -> Partitioner {
        let mut p = Partitioner::new();
        for (i, start) in starts.iter().enumerate() {
            p.add_range_owner(format!("kvs-{i}"), *start);
        }
        for w in workers {
            p.add_worker(*w);
        }
        p
    }

    #[test]
    fn zero_workers_yields_zero_partitions() {
        let p = partitioner(&["a", "m"], &[]);
        assert!(p.assign().is_empty());
    }

    #[test]
    fn zero_storage_nodes_yields_zero_partitions() {
        let p = partitioner(&[], &["w1:1"]);
        assert!(p.assign().is_empty());
    }

    #[test]
    fn single_node_splits_into_two_open_ended_partitions() {
        let parts = partitioner(&["m"], &["w1:1"]).assign();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].from_key.as_deref(), Some("m"));
        assert_eq!(parts[0].to_key_exclusive, None);
        assert_eq!(parts[1].from_key, None);
        assert_eq!(parts[1].to_key_exclusive.as_deref(), Some("m"));
        assert_eq!(parts[0].worker, parts[1].worker);
    }

    #[test]
    fn wraparound_halves_share_the_wrapping_nodes_worker() {
        let parts = partitioner(&["c", "h", "t"], &["w1:1", "w2:2"]).assign();
        assert_eq!(parts.len(), 4);
        let unbounded_above = parts.iter().find(|p| p.to_key_exclusive.is_none()).unwrap();
        let unbounded_below = parts.iter().find(|p| p.from_key.is_none()).unwrap();
        assert_eq!(unbounded_above.worker, unbounded_below.worker);
        assert_eq!(unbounded_above.from_key.as_deref(), Some("t"));
        assert_eq!(unbounded_below.to_key_exclusive.as_deref(), Some("c"));
    }

    #[test]
    fn assignment_is_round_robin_over_workers() {
        let parts = partitioner(&["a", "g", "m", "t"], &["w1:1", "w2:2"]).assign();
        assert_eq!(parts[0].worker, "w1:1");
        assert_eq!(parts[1].worker, "w2:2");
        assert_eq!(parts[2].worker, "w1:1");
        // storage node 3 wraps: both of its partitions on w2
        assert_eq!(parts[3].worker, "w2:2");
        assert_eq!(parts[4].worker, "w2:2");
    }

    #[test]
    fn partitions_cover_the_keyspace_exactly_once() {
        let parts = partitioner(&["d", "k", "r"], &["w1:1", "w2:2"]).assign();
        // Probe keys across the keyspace, including ones below the first
        // boundary and above the last.
        for key in ["", "a", "d", "dzz", "k", "q", "r", "zzz"] {
            let owners: Vec<&Partition> =
                parts.iter().filter(|p| p.contains(key)).collect();
            assert_eq!(owners.len(), 1, "key {key:?} covered by {owners:?}");
        }
    }

    #[test]
    fn more_workers_than_storage_nodes() {
        let parts = partitioner(&["m"], &["w1:1", "w2:2", "w3:3"]).assign();
        // One storage node, so only one worker gets work.
        assert!(parts.iter().all(|p| p.worker == "w1:1"));
    }
}
