//! Distributed Balance Aggregation Module
//!
//! Computes the per-client sum of account balances across the cluster, optionally
//! keeping only clients whose total is strictly below a threshold.
//!
//! ## Architecture Overview
//! 1. **Map**: the `Dispatcher` builds one `SumBalancesJob` per node.
//! 2. **Submit**: jobs go out through a `JobSubmitter`, all of them concurrently.
//! 3. **Scan**: on each node the job scans its primary partitions, one blocking task per
//!    partition, folding balances into a shared `BalanceAccumulator`.
//! 4. **Filter**: each node drops clients at or above the threshold.
//! 5. **Reduce**: the dispatcher waits for every node and unions the partial maps.
//!
//! Any failure at any level fails the whole aggregate.
//!
//! ## Submodules
//! - **`types`**: result types, job definition and the storage-facing traits.
//! - **`accumulator`**: the concurrent add-or-initialize map.
//! - **`job`**: node-side execution (`local_aggregate`).
//! - **`task`**: the cluster-wide dispatcher.
//! - **`submitter`**: in-process and HTTP job transport.
//! - **`protocol`** / **`handlers`**: HTTP contracts and axum handlers.

pub mod accumulator;
pub mod error;
pub mod handlers;
pub mod job;
pub mod protocol;
pub mod submitter;
pub mod task;
pub mod types;

#[cfg(test)]
mod tests;
