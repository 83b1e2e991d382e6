//! Account Storage Module
//!
//! A partitioned, in-memory account store that the aggregation scans.
//!
//! ## Core Concepts
//! - **Partitioning**: accounts are placed by hashing `client_id` into a fixed number of
//!   partitions, so all accounts of a client share one partition.
//! - **Placement**: `PartitionManager` assigns each partition a single primary node.
//! - **Access**: `AccountStore` routes writes to the primary and serves local
//!   partition scans (`PartitionScanner`) for compute jobs.
//! - **Forwarding**: writes for a remote primary are POSTed under a `RetryPolicy` and
//!   applied once per op id on arrival.

pub mod account;
pub mod forward;
pub mod handlers;
pub mod memory;
pub mod partitioner;
pub mod protocol;
