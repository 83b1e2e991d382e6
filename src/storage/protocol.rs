//! Storage Network Protocol
//!
//! Endpoints and DTOs for account writes between nodes. Records travel in their
//! encoded form (`key_json` / `value_json`), the same form the store keeps them in.

use super::account::{AccountRecord, PartitionId};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Public endpoint for client writes of a single account.
pub const ENDPOINT_PUT_ACCOUNT: &str = "/accounts";
/// Public endpoint for CSV bulk loads.
pub const ENDPOINT_BULK_ACCOUNTS: &str = "/accounts/bulk";
/// Endpoint for forwarding a write from a non-owner to the primary.
pub const ENDPOINT_FORWARD_PUT: &str = "/internal/accounts/forward";
/// Local storage statistics.
pub const ENDPOINT_STATS: &str = "/internal/stats";

// --- Data Transfer Objects ---

/// Client write request.
#[derive(Debug, Serialize, Deserialize)]
pub struct PutAccountRequest {
    /// Optional operation id; generated when absent.
    #[serde(default)]
    pub op_id: Option<String>,
    pub record: AccountRecord,
}

/// Sent by a node that received a write for a partition it does not own.
///
/// The `op_id` lets the primary drop duplicates caused by retried forwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct ForwardPutRequest {
    pub partition: PartitionId,
    pub op_id: String,
    pub key_json: String,
    pub value_json: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub node_id: String,
    pub local_partitions: usize,
    pub local_entries: usize,
    pub primary_partitions: Vec<PartitionId>,
}
