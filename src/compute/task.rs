//! Cluster-wide balance aggregation.
//!
//! The dispatcher maps one `SumBalancesJob` to each node, waits for every node, and
//! reduces the partial maps into the final result.

use super::error::{AggregateError, AggregateResult};
use super::submitter::JobSubmitter;
use super::types::{ClientBalances, SumBalancesJob};
use crate::cluster::types::Node;

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct Dispatcher {
    submitter: Arc<dyn JobSubmitter>,
}

impl Dispatcher {
    pub fn new(submitter: Arc<dyn JobSubmitter>) -> Self {
        Self { submitter }
    }

    /// Per-client balance totals over every node, filtered to totals below `threshold`.
    pub async fn aggregate(
        &self,
        nodes: &[Node],
        threshold: Option<Decimal>,
    ) -> AggregateResult<ClientBalances> {
        self.aggregate_with_cancel(nodes, threshold, &CancellationToken::new())
            .await
    }

    /// Same as [`Dispatcher::aggregate`], stopping early once `cancel` fires.
    pub async fn aggregate_with_cancel(
        &self,
        nodes: &[Node],
        threshold: Option<Decimal>,
        cancel: &CancellationToken,
    ) -> AggregateResult<ClientBalances> {
        if nodes.is_empty() {
            return Err(AggregateError::EmptyCluster);
        }

        let jobs = map_jobs(nodes, threshold);
        tracing::info!("Dispatching {} sum-balances job(s)", jobs.len());

        let submissions = jobs
            .into_iter()
            .map(|(node, job)| async move {
                let result = self.submitter.submit(node, job, cancel).await;
                (node, result)
            });

        let results = tokio::select! {
            results = join_all(submissions) => results,
            _ = cancel.cancelled() => return Err(AggregateError::Cancelled),
        };

        let mut partials = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (node, result) in results {
            match result {
                Ok(partial) => {
                    tracing::debug!("Node {} returned {} client(s)", node.id, partial.len());
                    partials.push(partial);
                }
                Err(e) => {
                    tracing::error!("Job on node {} failed: {}", node.id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(reduce(partials))
    }
}

/// One job per distinct node, each carrying the same threshold.
pub fn map_jobs(nodes: &[Node], threshold: Option<Decimal>) -> Vec<(&Node, SumBalancesJob)> {
    let mut seen = HashSet::new();
    nodes
        .iter()
        .filter(|node| seen.insert(node.id.clone()))
        .map(|node| (node, SumBalancesJob::new(threshold)))
        .collect()
}

/// Unions partial maps in order. A client present in several partials keeps the
/// value of the last one.
pub fn reduce(partials: Vec<ClientBalances>) -> ClientBalances {
    let mut merged = ClientBalances::new();
    for partial in partials {
        for (client_id, balance) in partial {
            if let Some(previous) = merged.insert(client_id, balance) {
                tracing::warn!(
                    "Client {} reported by more than one node ({} replaced by {})",
                    client_id,
                    previous,
                    balance
                );
            }
        }
    }
    merged
}
