//! Compute Network Protocol
//!
//! Endpoints and DTOs for running the balance aggregation across nodes. Decimals are
//! carried as JSON strings so no precision is lost on the wire.

use super::types::{ClientBalances, SumBalancesJob};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Public endpoint: aggregate over the whole cluster.
pub const ENDPOINT_SUM_BALANCES: &str = "/compute/sum_balances";
/// Internal endpoint: run one job on the receiving node.
pub const ENDPOINT_RUN_JOB: &str = "/internal/compute/sum_balances";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SumBalancesRequest {
    #[serde(default)]
    pub threshold: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SumBalancesResponse {
    pub balances: ClientBalances,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunJobRequest {
    pub job: SumBalancesJob,
}

/// Outcome of a job on one node. Exactly one of `balances` / `error` is set.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub node_id: String,
    pub balances: Option<ClientBalances>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
