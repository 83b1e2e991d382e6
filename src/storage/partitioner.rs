use super::account::{ClientId, PartitionId};
use crate::cluster::{topology::ClusterTopology, types::NodeId};
use crate::compute::types::PartitionOwnership;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const DEFAULT_PARTITIONS: u32 = 256;

/// Maps accounts to partitions and partitions to their primary node.
///
/// Accounts are placed by `client_id`, so every account of a client lands in the same
/// partition. The primary of a partition is `sorted_member_ids[partition % members]`.
pub struct PartitionManager {
    pub(crate) num_partitions: u32,
    topology: Arc<ClusterTopology>,
}

impl PartitionManager {
    pub fn new(topology: Arc<ClusterTopology>) -> Arc<Self> {
        Self::with_partitions(topology, DEFAULT_PARTITIONS)
    }

    pub fn with_partitions(topology: Arc<ClusterTopology>, num_partitions: u32) -> Arc<Self> {
        Arc::new(Self {
            num_partitions: num_partitions.max(1),
            topology,
        })
    }

    pub fn num_partitions(&self) -> u32 {
        self.num_partitions
    }

    pub fn get_partition(&self, client_id: ClientId) -> PartitionId {
        let mut hasher = DefaultHasher::new();
        client_id.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_partitions
    }

    pub fn primary_owner(&self, partition: PartitionId) -> Option<NodeId> {
        let node_ids = self.topology.member_ids();
        if node_ids.is_empty() {
            return None;
        }
        let primary_idx = (partition as usize) % node_ids.len();
        Some(node_ids[primary_idx].clone())
    }

    pub fn is_local_primary(&self, partition: PartitionId) -> bool {
        self.primary_owner(partition)
            .map(|owner| self.topology.is_local(&owner))
            .unwrap_or(false)
    }

    pub fn my_primary_partitions(&self) -> Vec<PartitionId> {
        self.primary_partitions_of(&self.topology.local_node.id)
    }

    pub fn topology(&self) -> &Arc<ClusterTopology> {
        &self.topology
    }
}

impl PartitionOwnership for PartitionManager {
    fn primary_partitions_of(&self, node: &NodeId) -> Vec<PartitionId> {
        let node_ids = self.topology.member_ids();
        let Some(position) = node_ids.iter().position(|id| id == node) else {
            return Vec::new();
        };

        (0..self.num_partitions)
            .filter(|&partition| (partition as usize) % node_ids.len() == position)
            .collect()
    }
}
