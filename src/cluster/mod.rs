//! Cluster Topology Module
//!
//! Describes which nodes make up the cluster and which of them is the local one.
//!
//! ## Core Concepts
//! - **Static membership**: every node is started with the same member list, so all of
//!   them agree on partition ownership without exchanging any messages.
//! - **Addressing**: each member exposes one HTTP address used both for account writes
//!   and for compute job submission.

pub mod topology;
pub mod types;
