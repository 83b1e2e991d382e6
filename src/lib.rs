//! Distributed Client Balance Aggregation
//!
//! Sums account balances per client across a partitioned, multi-node account store,
//! optionally keeping only clients whose total is below a threshold.
//!
//! ## Modules
//! - **`cluster`**: static cluster topology (node ids and addresses).
//! - **`storage`**: account records, the client-affine partitioner and the in-memory
//!   partitioned `AccountStore` that compute jobs scan.
//! - **`compute`**: the aggregation itself: dispatcher, per-node job, concurrent
//!   accumulator and job transport.
//! - **`ingestion`**: CSV bulk loading of accounts.
//! - **`config`** / **`node`**: configuration and the wiring of one node's HTTP surface.

pub mod cluster;
pub mod compute;
pub mod config;
pub mod ingestion;
pub mod node;
pub mod storage;
