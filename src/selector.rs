use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identifies a peer node in the cluster.
pub type NodeId = String;

/// Abstracts the consistent-hash ring that maps (account, container[, object])
/// tuples to an ordered list of replica nodes. Kept as a trait so the
/// [`Selector`] is testable against a deterministic fake without depending on
/// a real gossiped ring implementation.
pub trait Ring: Send + Sync {
    fn replicas_for_container(&self, account: &str, container: &str) -> Vec<NodeId>;
    fn replicas_for_object(&self, account: &str, container: &str, object: &str) -> Vec<NodeId>;
}

/// A deterministic, non-cryptographic hash ring: replicas are chosen by
/// sorting all configured nodes by `hash(key, node)` and taking the first
/// `replica_count`. Good enough as the default pluggable [`Ring`]; a real
/// deployment is expected to supply its own `Ring` backed by the cluster's
/// actual ring.
pub struct HashRing {
    nodes: Vec<NodeId>,
    replica_count: usize,
}

impl HashRing {
    pub fn new(nodes: Vec<NodeId>, replica_count: usize) -> Self {
        Self { nodes, replica_count }
    }

    fn ranked_nodes(&self, key: &str) -> Vec<NodeId> {
        let mut scored: Vec<(u64, &NodeId)> = self
            .nodes
            .iter()
            .map(|node| {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                node.hash(&mut hasher);
                (hasher.finish(), node)
            })
            .collect();
        scored.sort_by_key(|(score, _)| *score);
        scored
            .into_iter()
            .take(self.replica_count.min(self.nodes.len()))
            .map(|(_, node)| node.clone())
            .collect()
    }
}

impl Ring for HashRing {
    fn replicas_for_container(&self, account: &str, container: &str) -> Vec<NodeId> {
        self.ranked_nodes(&format!("{account}/{container}"))
    }

    fn replicas_for_object(&self, account: &str, container: &str, object: &str) -> Vec<NodeId> {
        self.ranked_nodes(&format!("{account}/{container}/{object}"))
    }
}

/// Decides whether work for a given container or object belongs to this node,
/// and whether this node is the primary (first-ranked) replica for it.
pub struct Selector<R: Ring> {
    ring: R,
    local_node: NodeId,
}

impl<R: Ring> Selector<R> {
    pub fn new(ring: R, local_node: impl Into<NodeId>) -> Self {
        Self {
            ring,
            local_node: local_node.into(),
        }
    }

    /// True iff this node is any replica for the container — such nodes all
    /// participate in the pass (primary work plus verify-phase coverage).
    pub fn is_local_container(&self, account: &str, container: &str) -> bool {
        self.ring
            .replicas_for_container(account, container)
            .iter()
            .any(|n| n == &self.local_node)
    }

    /// True iff this node is the first-ranked replica for the object — such
    /// nodes drain it from the primary queue; others hold it for verify.
    pub fn is_primary(&self, account: &str, container: &str, object: &str) -> bool {
        self.ring
            .replicas_for_object(account, container, object)
            .first()
            .map(|n| n == &self.local_node)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_container_membership_matches_ring_replicas() {
        let ring = HashRing::new(vec!["a".into(), "b".into(), "c".into()], 2);
        let replicas = ring.replicas_for_container("acct", "bucket");
        assert_eq!(replicas.len(), 2);

        let selector_in = Selector::new(
            HashRing::new(vec!["a".into(), "b".into(), "c".into()], 2),
            replicas[0].clone(),
        );
        assert!(selector_in.is_local_container("acct", "bucket"));

        let non_member = ring
            .replicas_for_container("acct", "bucket")
            .into_iter()
            .find(|n| n == "d");
        assert!(non_member.is_none());
    }

    #[test]
    fn only_first_replica_is_primary() {
        let nodes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ring_for_test = HashRing::new(nodes.clone(), 2);
        let replicas = ring_for_test.replicas_for_object("acct", "bucket", "key");
        let primary_node = replicas[0].clone();
        let secondary_node = replicas[1].clone();

        let selector_primary = Selector::new(HashRing::new(nodes.clone(), 2), primary_node);
        assert!(selector_primary.is_primary("acct", "bucket", "key"));

        let selector_secondary = Selector::new(HashRing::new(nodes, 2), secondary_node);
        assert!(!selector_secondary.is_primary("acct", "bucket", "key"));
    }

    #[test]
    fn ring_selection_is_deterministic() {
        let ring1 = HashRing::new(vec!["a".into(), "b".into(), "c".into()], 2);
        let ring2 = HashRing::new(vec!["a".into(), "b".into(), "c".into()], 2);
        assert_eq!(
            ring1.replicas_for_container("acct", "bucket"),
            ring2.replicas_for_container("acct", "bucket")
        );
    }
}
