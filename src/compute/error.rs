//! Aggregation errors.
//!
//! Every failure is surfaced to the caller of the aggregate; none are retried here.

use crate::cluster::types::NodeId;
use crate::storage::account::{ClientId, PartitionId};

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("No nodes to aggregate over")]
    EmptyCluster,

    #[error("Job on node {node} failed: {reason}")]
    RemoteExecution { node: NodeId, reason: String },

    #[error("Node {node} is not reachable")]
    NodeUnreachable { node: NodeId },

    #[error("Scan of partition {partition} failed: {reason}")]
    PartitionScan { partition: PartitionId, reason: String },

    #[error("Malformed record in partition {partition}: {reason}")]
    MalformedRecord { partition: PartitionId, reason: String },

    #[error("Balance of client {client_id} cannot be summed exactly (out of decimal range or precision)")]
    BalanceOverflow { client_id: ClientId },

    #[error("Partition task failed: {0}")]
    TaskFailed(String),

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("Aggregation timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
}

pub type AggregateResult<T> = std::result::Result<T, AggregateError>;
