use super::types::{Node, NodeId};

use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed view of the cluster as seen from one node.
///
/// Members are kept ordered by id; partition ownership is derived from that order,
/// so two nodes with the same member list always compute the same owners.
pub struct ClusterTopology {
    pub local_node: Node,
    members: BTreeMap<NodeId, Node>,
}

impl ClusterTopology {
    /// Builds a topology. The local node is added to `members` if it is missing.
    pub fn new(local_node: Node, members: Vec<Node>) -> Arc<Self> {
        let mut by_id: BTreeMap<NodeId, Node> = members
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();
        by_id
            .entry(local_node.id.clone())
            .or_insert_with(|| local_node.clone());

        tracing::debug!(
            "Topology for {} built with {} member(s)",
            local_node.id,
            by_id.len()
        );

        Arc::new(Self {
            local_node,
            members: by_id,
        })
    }

    /// A cluster made of the local node only.
    pub fn single(local_node: Node) -> Arc<Self> {
        Self::new(local_node, Vec::new())
    }

    /// All members, sorted by id.
    pub fn members(&self) -> Vec<Node> {
        self.members.values().cloned().collect()
    }

    /// Member ids, sorted.
    pub fn member_ids(&self) -> Vec<NodeId> {
        self.members.keys().cloned().collect()
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).cloned()
    }

    pub fn is_local(&self, id: &NodeId) -> bool {
        &self.local_node.id == id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
