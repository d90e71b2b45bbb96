//! Neighbor assignment from the cluster controller

use broadcast_core::{Adjacency, NodeId};
use parking_lot::RwLock;
use tracing::info;

/// The local node's gossip neighbors
#[derive(Default)]
pub struct Topology {
    neighbors: RwLock<Vec<NodeId>>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace our neighbors with `adjacency[self_id]`
    ///
    /// A node missing from the map ends up with no neighbors.
    pub fn set_neighbors(&self, self_id: &NodeId, adjacency: &Adjacency) {
        let neighbors = adjacency.get(self_id).cloned().unwrap_or_default();
        info!("Topology for {}: {} neighbors {:?}", self_id, neighbors.len(), neighbors);
        *self.neighbors.write() = neighbors;
    }

    /// Current neighbor list
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.neighbors.read().clone()
    }

    /// Count neighbors
    pub fn len(&self) -> usize {
        self.neighbors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(entries: &[(&str, &[&str])]) -> Adjacency {
        entries
            .iter()
            .map(|(k, vs)| (NodeId::from(*k), vs.iter().map(|v| NodeId::from(*v)).collect()))
            .collect()
    }

    #[test]
    fn test_empty_before_update() {
        let topology = Topology::new();
        assert!(topology.is_empty());
        assert!(topology.neighbors().is_empty());
    }

    #[test]
    fn test_set_neighbors() {
        let topology = Topology::new();
        let n1 = NodeId::from("n1");

        topology.set_neighbors(&n1, &adjacency(&[("n1", &["n2", "n3"]), ("n2", &["n1"])]));
        assert_eq!(topology.neighbors(), vec![NodeId::from("n2"), NodeId::from("n3")]);
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn test_replace_not_merge() {
        let topology = Topology::new();
        let n1 = NodeId::from("n1");

        topology.set_neighbors(&n1, &adjacency(&[("n1", &["n2", "n3"])]));
        topology.set_neighbors(&n1, &adjacency(&[("n1", &["n4"])]));

        assert_eq!(topology.neighbors(), vec![NodeId::from("n4")]);
    }

    #[test]
    fn test_missing_entry_clears_neighbors() {
        let topology = Topology::new();
        let n1 = NodeId::from("n1");

        topology.set_neighbors(&n1, &adjacency(&[("n1", &["n2"])]));
        topology.set_neighbors(&n1, &adjacency(&[("n2", &["n3"])]));

        assert!(topology.is_empty());
    }
}
