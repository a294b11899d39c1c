use crate::error::PartitionerError;
use kv_wire::murmur3_32;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;

/// Virtual nodes per physical node onboarded.
const DEFAULT_VNODE: usize = 3;
/// Replication factor: how many distinct physical nodes `find_replicas`
/// returns.
const DEFAULT_REPLICA: usize = 3;

/// Hash a key or virtual-node id to its 32-bit ring token. Per the resolved
/// ambiguity in the source's diverging revisions, every caller hashes the
/// stringified form of its input — never a mix of `input` and `input_key`.
fn ring_token(input: &str) -> i32 {
    murmur3_32(input.as_bytes(), 0) as i32
}

/// A physical node's onboarded virtual nodes and the version counter that
/// tracks how many have been created for it.
#[derive(Debug, Clone)]
struct PhysicalEntry {
    vnodes: Vec<String>,
    version: u64,
}

/// Consistent-hash ring over virtual nodes, used to find the replica set
/// for a key.
pub struct RingPartitioner {
    vnode_num: usize,
    replica_num: usize,
    /// token -> vnode id, kept sorted so replica lookup is a range query.
    ring: BTreeMap<i32, String>,
    /// vnode id -> token, for O(1) removal.
    node2token: HashMap<String, i32>,
    /// physical node id -> its vnodes and version counter.
    phy2node: HashMap<String, PhysicalEntry>,
}

impl RingPartitioner {
    /// Build a new ring and onboard `local_phy_id` as its first physical
    /// node.
    pub fn new(local_phy_id: &str, vnode_num: usize, replica_num: usize) -> Self {
        let mut partitioner = RingPartitioner {
            vnode_num,
            replica_num,
            ring: BTreeMap::new(),
            node2token: HashMap::new(),
            phy2node: HashMap::new(),
        };
        partitioner
            .new_physical_node(local_phy_id)
            .expect("fresh ring has no registered nodes yet");
        partitioner
    }

    pub fn with_defaults(local_phy_id: &str) -> Self {
        Self::new(local_phy_id, DEFAULT_VNODE, DEFAULT_REPLICA)
    }

    /// Onboard a physical node: create `vnode_num` virtual nodes for it and
    /// insert each into the ring.
    pub fn new_physical_node(&mut self, phy_id: &str) -> Result<(), PartitionerError> {
        if self.phy2node.contains_key(phy_id) {
            return Err(PartitionerError::AlreadyRegistered(phy_id.to_owned()));
        }

        let mut vnodes = Vec::with_capacity(self.vnode_num);
        for i in 0..self.vnode_num {
            let vnode_id = format!("{phy_id}${i}");
            let token = ring_token(&vnode_id);
            self.ring.insert(token, vnode_id.clone());
            self.node2token.insert(vnode_id.clone(), token);
            vnodes.push(vnode_id);
        }

        tracing::info!(phy_id, vnode_num = self.vnode_num, "onboarded physical node");
        self.phy2node.insert(
            phy_id.to_owned(),
            PhysicalEntry {
                vnodes,
                version: self.vnode_num as u64,
            },
        );
        Ok(())
    }

    /// Remove a physical node and all its virtual nodes from the ring.
    /// A no-op if the node was never registered.
    pub fn delete_physical_node(&mut self, phy_id: &str) {
        let Some(entry) = self.phy2node.remove(phy_id) else {
            return;
        };
        for vnode_id in entry.vnodes {
            if let Some(token) = self.node2token.remove(&vnode_id) {
                self.ring.remove(&token);
            }
        }
        tracing::info!(phy_id, "removed physical node");
    }

    /// Is `phy_id` currently a member of the ring?
    pub fn contains_physical_node(&self, phy_id: &str) -> bool {
        self.phy2node.contains_key(phy_id)
    }

    /// Physical nodes responsible for replicating `key`: walk the ring
    /// clockwise from the first token greater than `hash(key)`, collecting
    /// up to `replica_num` distinct physical node ids. Wraps around if the
    /// key's token is past the last one on the ring. Returns fewer than
    /// `replica_num` entries if the ring doesn't have that many distinct
    /// physical nodes.
    pub fn find_replicas(&self, key: &str) -> Vec<String> {
        if self.ring.is_empty() {
            return Vec::new();
        }

        let token = ring_token(key);
        let start_token = self
            .ring
            .range((Bound::Excluded(token), Bound::Unbounded))
            .next()
            .map(|(t, _)| *t)
            .unwrap_or_else(|| *self.ring.keys().next().expect("ring is non-empty"));

        let tokens: Vec<i32> = self.ring.keys().copied().collect();
        let start_idx = tokens
            .iter()
            .position(|t| *t == start_token)
            .expect("start_token comes from this ring's own keys");
        let n = tokens.len();

        let mut replicas = Vec::new();
        let mut seen = HashSet::new();
        for offset in 0..n {
            let idx = (start_idx + offset) % n;
            let vnode_id = &self.ring[&tokens[idx]];
            let phy_id = physical_of(vnode_id);
            if seen.insert(phy_id.clone()) {
                replicas.push(phy_id);
                if replicas.len() == self.replica_num {
                    break;
                }
            }
        }
        replicas
    }
}

/// The physical-node id a vnode id belongs to: the part before `$`.
fn physical_of(vnode_id: &str) -> String {
    vnode_id.split('$').next().unwrap_or(vnode_id).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_node_ring_returns_itself_as_only_replica() {
        let ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        let replicas = ring.find_replicas("some-key");
        assert_eq!(replicas, vec!["10.0.0.1:9042".to_owned()]);
    }

    #[test]
    fn adding_physical_node_is_idempotent_error() {
        let mut ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        assert!(ring.new_physical_node("10.0.0.1:9042").is_err());
    }

    #[test]
    fn find_replicas_returns_distinct_physical_nodes() {
        let mut ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        ring.new_physical_node("10.0.0.2:9042").unwrap();
        ring.new_physical_node("10.0.0.3:9042").unwrap();

        let replicas = ring.find_replicas("alpha");
        let unique: HashSet<_> = replicas.iter().collect();
        assert_eq!(replicas.len(), unique.len());
        assert!(replicas.len() <= 3);
    }

    #[test]
    fn find_replicas_falls_back_to_all_when_fewer_than_replica_count() {
        let ring = RingPartitioner::new("10.0.0.1:9042", 3, 5);
        let replicas = ring.find_replicas("alpha");
        assert_eq!(replicas, vec!["10.0.0.1:9042".to_owned()]);
    }

    #[test]
    fn delete_physical_node_removes_its_vnodes() {
        let mut ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        ring.new_physical_node("10.0.0.2:9042").unwrap();
        ring.delete_physical_node("10.0.0.2:9042");
        assert!(!ring.contains_physical_node("10.0.0.2:9042"));
        let replicas = ring.find_replicas("alpha");
        assert_eq!(replicas, vec!["10.0.0.1:9042".to_owned()]);
    }

    #[test]
    fn delete_unregistered_node_is_a_noop() {
        let mut ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        ring.delete_physical_node("10.0.0.9:9042");
        assert!(ring.contains_physical_node("10.0.0.1:9042"));
    }

    #[test]
    fn empty_ring_returns_no_replicas() {
        let ring = RingPartitioner {
            vnode_num: 3,
            replica_num: 3,
            ring: BTreeMap::new(),
            node2token: HashMap::new(),
            phy2node: HashMap::new(),
        };
        assert!(ring.find_replicas("alpha").is_empty());
    }

    #[test]
    fn same_key_routes_consistently() {
        let mut ring = RingPartitioner::new("10.0.0.1:9042", 3, 3);
        ring.new_physical_node("10.0.0.2:9042").unwrap();
        let a = ring.find_replicas("stable-key");
        let b = ring.find_replicas("stable-key");
        assert_eq!(a, b);
    }
}
