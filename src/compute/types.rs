use crate::cluster::types::NodeId;
use crate::storage::account::{AccountRecord, ClientId, PartitionId};

use super::error::AggregateResult;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Aggregate balance per client.
pub type ClientBalances = HashMap<ClientId, Decimal>;

/// Lazy forward-only sequence over the records of one partition.
pub type AccountCursor = Box<dyn Iterator<Item = AggregateResult<AccountRecord>> + Send>;

/// Resolves which partitions a node holds as primary.
pub trait PartitionOwnership: Send + Sync {
    fn primary_partitions_of(&self, node: &NodeId) -> Vec<PartitionId>;
}

/// Opens local, partition-scoped scans over the account records.
///
/// Each call returns a fresh cursor; scans of distinct partitions may run concurrently.
pub trait PartitionScanner: Send + Sync {
    fn scan_partition(&self, partition: PartitionId) -> AggregateResult<AccountCursor>;
}

/// What to do when a scanned record cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRecordPolicy {
    /// Abort the job on the first malformed record.
    #[default]
    FailFast,
    /// Log the record and keep scanning.
    Skip,
}

/// Node-local knobs for running a job.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub malformed_records: MalformedRecordPolicy,
    /// `None` lets a job run until it finishes or is cancelled.
    pub job_timeout: Option<Duration>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            malformed_records: MalformedRecordPolicy::FailFast,
            job_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// The unit of work shipped to every node by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumBalancesJob {
    pub threshold: Option<Decimal>,
}

impl SumBalancesJob {
    pub fn new(threshold: Option<Decimal>) -> Self {
        Self { threshold }
    }
}

/// Keeps only the clients whose aggregate is strictly below `threshold`.
pub fn apply_threshold(balances: ClientBalances, threshold: Option<Decimal>) -> ClientBalances {
    match threshold {
        Some(limit) => balances
            .into_iter()
            .filter(|(_, balance)| *balance < limit)
            .collect(),
        None => balances,
    }
}
