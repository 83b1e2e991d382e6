use super::account::{AccountRecord, PartitionId};
use super::forward::{AppliedOps, RetryPolicy, post_json};
use super::partitioner::PartitionManager;
use super::protocol::*;
use crate::cluster::types::NodeId;
use crate::compute::error::{AggregateError, AggregateResult};
use crate::compute::types::{AccountCursor, PartitionScanner};

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Partitioned in-memory account store.
///
/// Layout: `partition -> key_json -> value_json`. Writes are routed to the primary of
/// the record's partition; scans only ever read the local copy.
pub struct AccountStore {
    local_data: Arc<DashMap<PartitionId, DashMap<String, String>>>,
    applied_ops: AppliedOps,
    partitioner: Arc<PartitionManager>,
    http_client: reqwest::Client,
    forward_policy: RetryPolicy,
}

impl AccountStore {
    pub fn new(partitioner: Arc<PartitionManager>) -> Arc<Self> {
        Self::with_forward_policy(partitioner, RetryPolicy::ACCOUNT_WRITES)
    }

    pub fn with_forward_policy(
        partitioner: Arc<PartitionManager>,
        forward_policy: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_data: Arc::new(DashMap::new()),
            applied_ops: AppliedOps::new(),
            partitioner,
            http_client: reqwest::Client::new(),
            forward_policy,
        })
    }

    pub fn partitioner(&self) -> &Arc<PartitionManager> {
        &self.partitioner
    }

    async fn forward_put(
        &self,
        primary_node_id: &NodeId,
        partition: PartitionId,
        op_id: String,
        key_json: String,
        value_json: String,
    ) -> Result<()> {
        let node = self
            .partitioner
            .topology()
            .get_member(primary_node_id)
            .ok_or_else(|| anyhow::anyhow!("Primary node not found: {}", primary_node_id))?;

        let payload = ForwardPutRequest {
            partition,
            op_id,
            key_json,
            value_json,
        };
        let url = format!("http://{}{}", node.http_addr, ENDPOINT_FORWARD_PUT);
        let response = post_json(&self.http_client, &url, &payload, self.forward_policy).await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Primary {} rejected forwarded write: {}",
                primary_node_id,
                response.status()
            ));
        }

        Ok(())
    }

    /// Stores a record that was forwarded to this node as primary.
    pub fn store_as_primary(
        &self,
        partition: PartitionId,
        op_id: &str,
        key_json: String,
        value_json: String,
    ) {
        if !self.applied_ops.first_time(op_id) {
            tracing::debug!("Dropping duplicate forwarded write {}", op_id);
            return;
        }
        if !self.partitioner.is_local_primary(partition) {
            tracing::warn!(
                "Storing forwarded write for partition {} that this node does not own",
                partition
            );
        }
        self.store_raw(partition, key_json, value_json);
    }

    /// Stores a typed record into `partition` without any routing.
    pub fn store_local(&self, partition: PartitionId, record: &AccountRecord) -> Result<()> {
        let (key_json, value_json) = record.encode()?;
        self.store_raw(partition, key_json, value_json);
        Ok(())
    }

    /// Stores an already encoded entry. Nothing is validated until the entry is scanned.
    pub fn store_raw(&self, partition: PartitionId, key_json: String, value_json: String) {
        let partition_map = self.local_data.entry(partition).or_default();
        partition_map.insert(key_json, value_json);
    }

    pub fn dump_partition(&self, partition: PartitionId) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        if let Some(partition_map) = self.local_data.get(&partition) {
            for entry in partition_map.iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        entries
    }

    pub fn local_node_id(&self) -> NodeId {
        self.partitioner.topology().local_node.id.clone()
    }

    pub fn local_partition_count(&self) -> usize {
        self.local_data.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.local_data
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    pub async fn put(&self, record: AccountRecord) -> Result<()> {
        let op_id = Uuid::new_v4().to_string();
        self.put_with_op(record, op_id).await
    }

    /// Routes a write to the primary of the record's partition.
    pub async fn put_with_op(&self, record: AccountRecord, op_id: String) -> Result<()> {
        let partition = self.partitioner.get_partition(record.client_id());
        let (key_json, value_json) = record.encode()?;

        let Some(owner) = self.partitioner.primary_owner(partition) else {
            tracing::warn!("No members in topology, storing locally as fallback");
            self.store_raw(partition, key_json, value_json);
            return Ok(());
        };

        if self.partitioner.topology().is_local(&owner) {
            if self.applied_ops.first_time(&op_id) {
                self.store_raw(partition, key_json, value_json);
            }
            return Ok(());
        }

        tracing::debug!("Forwarding account write for partition {} to {}", partition, owner);
        self.forward_put(&owner, partition, op_id, key_json, value_json)
            .await
    }
}

impl PartitionScanner for AccountStore {
    fn scan_partition(&self, partition: PartitionId) -> AggregateResult<AccountCursor> {
        let entries = self.dump_partition(partition);
        tracing::trace!("Scanning partition {} ({} entries)", partition, entries.len());

        Ok(Box::new(entries.into_iter().map(
            move |(key_json, value_json)| {
                AccountRecord::decode(&key_json, &value_json)
                    .map_err(|reason| AggregateError::MalformedRecord { partition, reason })
            },
        )))
    }
}
