use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::memory::AccountStore;
use super::protocol::{ForwardPutRequest, PutAccountRequest, PutResponse, StatsResponse};

pub async fn handle_put_account(
    Extension(store): Extension<Arc<AccountStore>>,
    Json(req): Json<PutAccountRequest>,
) -> (StatusCode, Json<PutResponse>) {
    let op_id = req
        .op_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match store.put_with_op(req.record, op_id).await {
        Ok(_) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(e) => {
            tracing::error!("Failed to put account: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PutResponse { success: false }),
            )
        }
    }
}

pub async fn handle_forward_put(
    Extension(store): Extension<Arc<AccountStore>>,
    Json(req): Json<ForwardPutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    tracing::debug!(
        "Received forwarded write {} for partition {}",
        req.op_id,
        req.partition
    );

    store.store_as_primary(req.partition, &req.op_id, req.key_json, req.value_json);

    (StatusCode::OK, Json(PutResponse { success: true }))
}

pub async fn handle_stats(Extension(store): Extension<Arc<AccountStore>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        node_id: store.local_node_id().0,
        local_partitions: store.local_partition_count(),
        local_entries: store.local_entry_count(),
        primary_partitions: store.partitioner().my_primary_partitions(),
    })
}
