//! Job submission to cluster nodes.
//!
//! `LocalSubmitter` runs every node of an in-process cluster; `HttpJobSubmitter` runs
//! the local node directly and reaches the others over HTTP.

use super::error::{AggregateError, AggregateResult};
use super::job::ComputeNode;
use super::protocol::{ENDPOINT_RUN_JOB, RunJobRequest, RunJobResponse};
use super::types::{ClientBalances, SumBalancesJob};
use crate::cluster::types::{Node, NodeId};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Executes a job on a given node and hands back its partial result.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(
        &self,
        node: &Node,
        job: SumBalancesJob,
        cancel: &CancellationToken,
    ) -> AggregateResult<ClientBalances>;
}

/// In-process cluster: every node is a `ComputeNode` living in this process.
#[derive(Default)]
pub struct LocalSubmitter {
    nodes: HashMap<NodeId, Arc<ComputeNode>>,
}

impl LocalSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node: Arc<ComputeNode>) {
        self.nodes.insert(node.node_id.clone(), node);
    }
}

#[async_trait]
impl JobSubmitter for LocalSubmitter {
    async fn submit(
        &self,
        node: &Node,
        job: SumBalancesJob,
        cancel: &CancellationToken,
    ) -> AggregateResult<ClientBalances> {
        let compute = self
            .nodes
            .get(&node.id)
            .ok_or_else(|| AggregateError::NodeUnreachable {
                node: node.id.clone(),
            })?;
        job.execute(compute, cancel).await
    }
}

/// Submits jobs to remote nodes through their internal compute endpoint.
pub struct HttpJobSubmitter {
    local: Arc<ComputeNode>,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpJobSubmitter {
    pub fn new(local: Arc<ComputeNode>, request_timeout: Duration) -> Self {
        Self {
            local,
            http_client: reqwest::Client::new(),
            request_timeout,
        }
    }

    async fn submit_remote(
        &self,
        node: &Node,
        job: SumBalancesJob,
    ) -> AggregateResult<ClientBalances> {
        let url = format!("http://{}{}", node.http_addr, ENDPOINT_RUN_JOB);
        tracing::debug!("Submitting job to {} at {}", node.id, url);

        let response = self
            .http_client
            .post(url)
            .json(&RunJobRequest { job })
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&node.id, e))?;

        let status = response.status();
        let body: RunJobResponse = response
            .json()
            .await
            .map_err(|e| AggregateError::RemoteExecution {
                node: node.id.clone(),
                reason: format!("unreadable response ({}): {}", status, e),
            })?;

        match (body.balances, body.error) {
            (Some(balances), None) if status.is_success() => Ok(balances),
            (_, Some(error)) => Err(AggregateError::RemoteExecution {
                node: node.id.clone(),
                reason: error,
            }),
            _ => Err(AggregateError::RemoteExecution {
                node: node.id.clone(),
                reason: format!("unexpected response status {}", status),
            }),
        }
    }
}

#[async_trait]
impl JobSubmitter for HttpJobSubmitter {
    async fn submit(
        &self,
        node: &Node,
        job: SumBalancesJob,
        cancel: &CancellationToken,
    ) -> AggregateResult<ClientBalances> {
        if node.id == self.local.node_id {
            return job.execute(&self.local, cancel).await;
        }

        tokio::select! {
            result = self.submit_remote(node, job) => result,
            _ = cancel.cancelled() => Err(AggregateError::Cancelled),
        }
    }
}

fn transport_error(node: &NodeId, error: reqwest::Error) -> AggregateError {
    if error.is_connect() {
        AggregateError::NodeUnreachable { node: node.clone() }
    } else {
        AggregateError::RemoteExecution {
            node: node.clone(),
            reason: error.to_string(),
        }
    }
}
