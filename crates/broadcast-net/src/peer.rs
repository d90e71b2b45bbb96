//! Cluster membership as delivered by `init`

use broadcast_core::{NodeId, Origin};

/// Identity of the local node and the full member list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Our node ID
    pub id: NodeId,
    /// Every cluster member, including us
    pub node_ids: Vec<NodeId>,
}

impl ClusterInfo {
    /// Create new cluster info
    pub fn new(id: NodeId, node_ids: Vec<NodeId>) -> Self {
        Self { id, node_ids }
    }

    /// Check if a sender is a cluster member
    pub fn is_member(&self, id: &NodeId) -> bool {
        self.node_ids.contains(id)
    }

    /// Classify a sender: members are nodes, everything else is a client
    pub fn origin_of(&self, src: &NodeId) -> Origin {
        if self.is_member(src) {
            Origin::Node(src.clone())
        } else {
            Origin::Client
        }
    }

    /// Other members, excluding ourselves
    pub fn peers(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.node_ids.iter().filter(move |id| **id != self.id)
    }
}
