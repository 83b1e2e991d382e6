//! Node-side execution of a `SumBalancesJob`.
//!
//! A job scans every partition the node holds as primary, one blocking task per
//! partition, and folds the balances into a shared `BalanceAccumulator`. The job only
//! finishes once every partition task has finished.

use super::accumulator::{BalanceAccumulator, add_local};
use super::error::{AggregateError, AggregateResult};
use super::types::*;
use crate::cluster::types::NodeId;
use crate::storage::account::PartitionId;

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything a node needs to run aggregation jobs locally.
pub struct ComputeNode {
    pub node_id: NodeId,
    ownership: Arc<dyn PartitionOwnership>,
    scanner: Arc<dyn PartitionScanner>,
    settings: JobSettings,
}

impl ComputeNode {
    pub fn new(
        node_id: NodeId,
        ownership: Arc<dyn PartitionOwnership>,
        scanner: Arc<dyn PartitionScanner>,
        settings: JobSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            node_id,
            ownership,
            scanner,
            settings,
        })
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Partitions this node currently holds as primary.
    pub fn owned_partitions(&self) -> Vec<PartitionId> {
        self.ownership.primary_partitions_of(&self.node_id)
    }
}

impl SumBalancesJob {
    /// Runs the job on `node`, bounded by the node's job timeout.
    pub async fn execute(
        &self,
        node: &ComputeNode,
        cancel: &CancellationToken,
    ) -> AggregateResult<ClientBalances> {
        let partitions = node.owned_partitions();
        tracing::info!(
            "Node {} summing balances over {} primary partition(s), threshold={:?}",
            node.node_id,
            partitions.len(),
            self.threshold
        );

        let job_cancel = cancel.child_token();
        let work = local_aggregate(
            node.scanner.clone(),
            &partitions,
            self.threshold,
            node.settings.malformed_records,
            &job_cancel,
        );

        let result = match node.settings.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    job_cancel.cancel();
                    Err(AggregateError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => work.await,
        };

        match &result {
            Ok(balances) => tracing::info!(
                "Node {} finished job with {} client(s)",
                node.node_id,
                balances.len()
            ),
            Err(e) => tracing::error!("Node {} job failed: {}", node.node_id, e),
        }

        result
    }
}

/// Sums balances per client over `partitions`, then applies the optional threshold.
///
/// Every partition is scanned on its own blocking task. The first failing task fails
/// the whole call; the remaining tasks are told to stop and are still awaited.
/// Dropping the returned future (timeout, disconnected caller) stops all scans.
pub async fn local_aggregate(
    scanner: Arc<dyn PartitionScanner>,
    partitions: &[PartitionId],
    threshold: Option<Decimal>,
    policy: MalformedRecordPolicy,
    cancel: &CancellationToken,
) -> AggregateResult<ClientBalances> {
    let accumulator = Arc::new(BalanceAccumulator::new());
    let scan_cancel = cancel.child_token();
    // Blocking scans outlive a dropped JoinSet; stop them when this future goes away.
    let _scan_guard = scan_cancel.clone().drop_guard();
    let mut scans = JoinSet::new();

    for &partition in partitions {
        let scanner = scanner.clone();
        let accumulator = accumulator.clone();
        let scan_cancel = scan_cancel.clone();
        scans.spawn_blocking(move || {
            scan_partition_into(
                scanner.as_ref(),
                partition,
                policy,
                &scan_cancel,
                &accumulator,
            )
        });
    }

    let mut first_error: Option<AggregateError> = None;
    loop {
        let joined = tokio::select! {
            joined = scans.join_next() => joined,
            _ = cancel.cancelled() => {
                tracing::warn!("Aggregation cancelled before all partition scans finished");
                return Err(AggregateError::Cancelled);
            }
        };
        let Some(joined) = joined else {
            break;
        };

        let outcome = joined
            .map_err(|e| AggregateError::TaskFailed(e.to_string()))
            .and_then(|scanned| scanned);

        if let Err(e) = outcome
            && first_error.is_none()
        {
            tracing::error!("Partition task failed, stopping remaining scans: {}", e);
            scan_cancel.cancel();
            first_error = Some(e);
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    let balances = match Arc::try_unwrap(accumulator) {
        Ok(accumulator) => accumulator.into_balances(),
        Err(shared) => shared.snapshot(),
    };

    Ok(apply_threshold(balances, threshold))
}

/// Scans one partition into a task-local map and merges it into `accumulator`.
///
/// Returns the number of records folded in.
fn scan_partition_into(
    scanner: &dyn PartitionScanner,
    partition: PartitionId,
    policy: MalformedRecordPolicy,
    cancel: &CancellationToken,
    accumulator: &BalanceAccumulator,
) -> AggregateResult<usize> {
    let cursor = scanner.scan_partition(partition)?;
    let mut partial = ClientBalances::new();
    let mut scanned = 0usize;
    let mut skipped = 0usize;

    for item in cursor {
        if cancel.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }

        match item {
            Ok(record) => add_local(&mut partial, record.client_id(), record.balance())?,
            Err(e @ AggregateError::MalformedRecord { .. })
                if policy == MalformedRecordPolicy::Skip =>
            {
                tracing::warn!("Skipping record: {}", e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
        scanned += 1;
    }

    accumulator.merge(partial)?;

    tracing::debug!(
        "Partition {} scanned: {} record(s), {} skipped",
        partition,
        scanned,
        skipped
    );

    Ok(scanned)
}
