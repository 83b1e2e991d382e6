//! Account Ingestion Module
//!
//! Bulk-loads account records into the cluster from CSV
//! (`account_id,client_id,balance`, header row required). Every row is written through
//! `AccountStore::put`, so it lands on the primary of its partition.

pub mod handlers;
pub mod loader;
