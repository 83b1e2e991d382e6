use super::loader::{LoadReport, load_accounts, parse_accounts};
use crate::storage::memory::AccountStore;

use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct BulkLoadResponse {
    pub status: String,
    pub report: LoadReport,
}

/// Accepts a CSV body and writes every row into the cluster.
pub async fn handle_bulk_load(
    Extension(store): Extension<Arc<AccountStore>>,
    body: String,
) -> (StatusCode, Json<BulkLoadResponse>) {
    let records = match parse_accounts(body.as_bytes()) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Rejected bulk load: {:#}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(BulkLoadResponse {
                    status: format!("invalid_csv: {:#}", e),
                    report: LoadReport::default(),
                }),
            );
        }
    };

    match load_accounts(&store, records).await {
        Ok(report) => (
            StatusCode::OK,
            Json(BulkLoadResponse {
                status: "loaded".to_string(),
                report,
            }),
        ),
        Err(e) => {
            tracing::error!("Bulk load failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BulkLoadResponse {
                    status: format!("store_failed: {:#}", e),
                    report: LoadReport::default(),
                }),
            )
        }
    }
}
