use super::error::AggregateError;
use super::job::ComputeNode;
use super::protocol::*;
use super::task::Dispatcher;
use crate::cluster::topology::ClusterTopology;

use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn handle_sum_balances(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Extension(topology): Extension<Arc<ClusterTopology>>,
    Json(req): Json<SumBalancesRequest>,
) -> Result<Json<SumBalancesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let members = topology.members();

    match dispatcher.aggregate(&members, req.threshold).await {
        Ok(balances) => {
            tracing::info!(
                "Aggregated {} client(s) over {} node(s)",
                balances.len(),
                members.len()
            );
            Ok(Json(SumBalancesResponse { balances }))
        }
        Err(e) => {
            tracing::error!("Aggregation failed: {}", e);
            Err((
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

pub async fn handle_run_job(
    Extension(compute): Extension<Arc<ComputeNode>>,
    Json(req): Json<RunJobRequest>,
) -> (StatusCode, Json<RunJobResponse>) {
    tracing::debug!("Received sum-balances job: {:?}", req.job);

    let node_id = compute.node_id.0.clone();
    // A dispatcher that gives up closes the connection; dropping this future stops the scans.
    match req.job.execute(&compute, &CancellationToken::new()).await {
        Ok(balances) => (
            StatusCode::OK,
            Json(RunJobResponse {
                node_id,
                balances: Some(balances),
                error: None,
            }),
        ),
        Err(e) => (
            error_status(&e),
            Json(RunJobResponse {
                node_id,
                balances: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn error_status(error: &AggregateError) -> StatusCode {
    match error {
        AggregateError::EmptyCluster => StatusCode::SERVICE_UNAVAILABLE,
        AggregateError::RemoteExecution { .. } | AggregateError::NodeUnreachable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        AggregateError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
