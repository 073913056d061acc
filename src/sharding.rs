//! Sharding front: a consistent-hash ring routing document keys to
//! peer nodes, plus a cluster client built over a pluggable
//! [`NodeTransport`] so the routing logic is fully testable without
//! the HTTP server the original system fronts it with.
//!
//! Grounded on `pyhybriddb/distributed/hashing.py` (`ConsistentHashRing`)
//! and `pyhybriddb/distributed/cluster.py` (`DistributedCluster`). The
//! original hashes with SHA-256 truncated to a Python big integer; this
//! crate truncates the same digest to a `u64` ring position, which is
//! sufficient entropy for the ring's uniform-placement property and
//! keeps every key comparable with plain integer ordering.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::value::Record;

#[derive(Debug, Error)]
pub enum ShardingError {
    #[error("no nodes available in the ring")]
    NoNodesAvailable,

    #[error("transport error talking to node '{0}': {1}")]
    Transport(String, String),
}

/// Weighted virtual-node consistent-hash ring. `V` virtual nodes are
/// placed per physical node at construction/`add`; `get` finds the
/// first virtual node at or after a key's hash, wrapping to index 0.
pub struct ConsistentHashRing {
    virtual_nodes: usize,
    ring: BTreeMap<u64, String>,
}

impl ConsistentHashRing {
    pub fn new(virtual_nodes: usize) -> ConsistentHashRing {
        ConsistentHashRing {
            virtual_nodes,
            ring: BTreeMap::new(),
        }
    }

    pub fn with_nodes(nodes: impl IntoIterator<Item = impl Into<String>>, virtual_nodes: usize) -> ConsistentHashRing {
        let mut ring = ConsistentHashRing::new(virtual_nodes);
        for node in nodes {
            ring.add_node(node.into());
        }
        ring
    }

    /// Insert `node`'s virtual positions into the ring. Re-adding an
    /// already-present node is a no-op for positions already taken
    /// (hashes are deterministic) but otherwise harmless.
    pub fn add_node(&mut self, node: String) {
        for i in 0..self.virtual_nodes {
            let key = ring_hash(&format!("{node}:{i}"));
            self.ring.insert(key, node.clone());
        }
    }

    /// Remove every virtual position belonging to `node`.
    pub fn remove_node(&mut self, node: &str) {
        self.ring.retain(|_, owner| owner != node);
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Distinct physical nodes currently on the ring.
    pub fn nodes(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for owner in self.ring.values() {
            if !seen.contains(owner) {
                seen.push(owner.clone());
            }
        }
        seen
    }

    /// The node responsible for `key`: the first virtual node at or
    /// after `hash(key)`, wrapping around the ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = ring_hash(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }

    /// Walk the ring from `key`'s position collecting up to `n`
    /// distinct physical nodes, for replication/scatter-gather reads.
    pub fn get_n(&self, key: &str, n: usize) -> Vec<String> {
        if self.ring.is_empty() || n == 0 {
            return Vec::new();
        }
        let hash = ring_hash(key);
        let positions: Vec<&String> = self.ring.values().collect();
        // Index of the first virtual node at or after `hash`, wrapping
        // to 0 — same rule as `get`, just counted rather than matched.
        let start = self.ring.range(..hash).count() % positions.len();

        let mut out = Vec::new();
        for i in 0..positions.len() {
            let node = positions[(start + i) % positions.len()].clone();
            if !out.contains(&node) {
                out.push(node);
            }
            if out.len() == n {
                break;
            }
        }
        out
    }
}

fn ring_hash(input: &str) -> u64 {
    // SHA-256 truncated to its leading 8 bytes, matching the spec's
    // "any collision-resistant function with uniform output" — the
    // original takes the full digest as a Python big integer, which
    // loses no information a `u64` ring position needs.
    use sha2_compat::Sha256;
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Pluggable transport a [`DistributedCluster`] routes through,
/// standing in for the HTTP layer the original system fronts nodes
/// with — out of scope here, referenced only as this trait boundary.
pub trait NodeTransport {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write(&mut self, node: &str, collection: &str, doc: &Record) -> Result<String, Self::Error>;
    fn read(&mut self, node: &str, collection: &str, query: &Record) -> Result<Option<Record>, Self::Error>;
}

/// Sharding client: routes writes/reads to peer nodes by consistent
/// hashing, over any [`NodeTransport`]. Grounded on
/// `pyhybriddb/distributed/cluster.py::DistributedCluster`.
pub struct DistributedCluster<T: NodeTransport> {
    ring: ConsistentHashRing,
    transport: T,
    next_generated_id: u64,
}

impl<T: NodeTransport> DistributedCluster<T> {
    pub fn new(nodes: impl IntoIterator<Item = impl Into<String>>, virtual_nodes: usize, transport: T) -> DistributedCluster<T> {
        DistributedCluster {
            ring: ConsistentHashRing::with_nodes(nodes, virtual_nodes),
            transport,
            next_generated_id: 0,
        }
    }

    /// Extract (or generate) `doc[key_field]`, route to `ring.get`,
    /// and write through the transport. Fails terminally on transport
    /// error — no retry, no automatic failover, per spec.
    pub fn write(&mut self, collection: &str, mut doc: Record, key_field: &str) -> Result<String, ShardingError> {
        let key = match doc.get(key_field) {
            Some(value) => value.as_str().map(str::to_string).unwrap_or_else(|| format!("{value:?}")),
            None => {
                let generated = format!("gen-{}", self.next_generated_id);
                self.next_generated_id += 1;
                doc.set(key_field, generated.clone().into());
                generated
            }
        };
        let node = self.ring.get(&key).ok_or(ShardingError::NoNodesAvailable)?.to_string();
        self.transport
            .write(&node, collection, &doc)
            .map_err(|e| ShardingError::Transport(node, e.to_string()))
    }

    /// Route directly if `query` contains `key_field`; otherwise
    /// scatter to every distinct node and return the first non-null
    /// response. The scatter-gather ambiguity the design notes flag
    /// ("first non-null response" under duplicated writes) is resolved
    /// here as first-responder-wins, recorded as an Open Question
    /// decision rather than left undefined.
    pub fn read(&mut self, collection: &str, query: &Record, key_field: &str) -> Result<Option<Record>, ShardingError> {
        if let Some(value) = query.get(key_field) {
            let key = value.as_str().map(str::to_string).unwrap_or_else(|| format!("{value:?}"));
            let node = self.ring.get(&key).ok_or(ShardingError::NoNodesAvailable)?.to_string();
            return self
                .transport
                .read(&node, collection, query)
                .map_err(|e| ShardingError::Transport(node, e.to_string()));
        }

        for node in self.ring.nodes() {
            let result = self
                .transport
                .read(&node, collection, query)
                .map_err(|e| ShardingError::Transport(node.clone(), e.to_string()))?;
            if result.is_some() {
                return Ok(result);
            }
        }
        Ok(None)
    }

    pub fn ring(&self) -> &ConsistentHashRing {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut ConsistentHashRing {
        &mut self.ring
    }
}

/// Minimal SHA-256 wrapper so the ring hash does not pull in a whole
/// cryptography crate's API surface just for a digest; `sha2` is the
/// pack's standard choice for this (see `DESIGN.md`).
mod sha2_compat {
    pub use sha2::{Digest, Sha256};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeTransport {
        nodes: HashMap<String, HashMap<(String, String), Record>>,
    }

    impl FakeTransport {
        fn new() -> FakeTransport {
            FakeTransport { nodes: HashMap::new() }
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("fake transport error")]
    struct FakeTransportError;

    impl NodeTransport for FakeTransport {
        type Error = FakeTransportError;

        fn write(&mut self, node: &str, collection: &str, doc: &Record) -> Result<String, FakeTransportError> {
            let id = doc.get("_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            self.nodes
                .entry(node.to_string())
                .or_default()
                .insert((collection.to_string(), id.clone()), doc.clone());
            Ok(id)
        }

        fn read(&mut self, node: &str, collection: &str, query: &Record) -> Result<Option<Record>, FakeTransportError> {
            let id = query.get("_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(self.nodes.get(node).and_then(|docs| docs.get(&(collection.to_string(), id))).cloned())
        }
    }

    #[test]
    fn ring_places_keys_deterministically() {
        let ring = ConsistentHashRing::with_nodes(["n1", "n2", "n3"], 10);
        let first = ring.get("some-key").unwrap().to_string();
        let second = ring.get("some-key").unwrap().to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn adding_a_node_remaps_a_minority_of_keys() {
        let mut ring = ConsistentHashRing::with_nodes(["n1", "n2", "n3"], 10);
        let keys: Vec<String> = (0..100).map(|i| format!("key_{i}")).collect();
        let before: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap().to_string()).collect();

        ring.add_node("n4".to_string());
        let after: Vec<String> = keys.iter().map(|k| ring.get(k).unwrap().to_string()).collect();

        let moved = before.iter().zip(&after).filter(|(a, b)| a != b).count();
        assert!(moved > 0, "adding a node should remap at least one key");
        assert!(moved < 40, "expected fewer than 40 of 100 keys to move, got {moved}");
    }

    #[test]
    fn get_n_returns_distinct_nodes_in_ring_order() {
        let ring = ConsistentHashRing::with_nodes(["n1", "n2", "n3"], 10);
        let nodes = ring.get_n("some-key", 3);
        assert_eq!(nodes.len(), 3);
        let unique: std::collections::HashSet<_> = nodes.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn empty_ring_returns_none() {
        let ring = ConsistentHashRing::new(10);
        assert_eq!(ring.get("x"), None);
        assert!(ring.get_n("x", 2).is_empty());
    }

    #[test]
    fn cluster_write_then_direct_read_round_trips() {
        let mut cluster = DistributedCluster::new(["n1", "n2", "n3"], 10, FakeTransport::new());
        let mut doc = Record::new();
        doc.set("_id", "doc-1".into());
        doc.set("title", "hello".into());
        cluster.write("posts", doc, "_id").unwrap();

        let mut query = Record::new();
        query.set("_id", "doc-1".into());
        let found = cluster.read("posts", &query, "_id").unwrap();
        assert_eq!(found.unwrap().get("title"), Some(&crate::value::Value::Str("hello".into())));
    }

    #[test]
    fn cluster_write_generates_key_when_absent() {
        let mut cluster = DistributedCluster::new(["n1"], 5, FakeTransport::new());
        let doc = Record::new();
        let id = cluster.write("posts", doc, "_id").unwrap();
        assert!(!id.is_empty());
    }

    #[test]
    fn cluster_scatter_read_finds_hit_on_any_node() {
        let mut cluster = DistributedCluster::new(["n1", "n2", "n3"], 10, FakeTransport::new());
        let mut doc = Record::new();
        doc.set("_id", "doc-1".into());
        doc.set("title", "hello".into());
        cluster.write("posts", doc, "_id").unwrap();

        // Query without the key field forces scatter-gather.
        let query = Record::new();
        let found = cluster.read("posts", &query, "_id").unwrap();
        assert!(found.is_some());
    }
}
