//! Account records as they are stored and as the aggregation reads them.
//!
//! Records are kept encoded (JSON key and value, like any other entry in the store)
//! and decoded into typed structs only when scanned.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type AccountId = i64;
pub type ClientId = i64;
pub type PartitionId = u32;

/// Composite key of an account. `client_id` is the affinity field used for partitioning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub account_id: AccountId,
    pub client_id: ClientId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub balance: Decimal,
}

/// A decoded `(key, value)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    pub key: AccountKey,
    pub value: Account,
}

impl AccountRecord {
    pub fn new(account_id: AccountId, client_id: ClientId, balance: Decimal) -> Self {
        Self {
            key: AccountKey {
                account_id,
                client_id,
            },
            value: Account { balance },
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.key.client_id
    }

    pub fn balance(&self) -> Decimal {
        self.value.balance
    }

    /// Encodes the record into the `(key_json, value_json)` form held by the store.
    pub fn encode(&self) -> serde_json::Result<(String, String)> {
        Ok((
            serde_json::to_string(&self.key)?,
            serde_json::to_string(&self.value)?,
        ))
    }

    /// Decodes a stored entry. Fails if either side misses a field or has the wrong type.
    pub fn decode(key_json: &str, value_json: &str) -> Result<Self, String> {
        let key: AccountKey =
            serde_json::from_str(key_json).map_err(|e| format!("bad key {}: {}", key_json, e))?;
        let value: Account = serde_json::from_str(value_json)
            .map_err(|e| format!("bad value for account {}: {}", key.account_id, e))?;
        Ok(Self { key, value })
    }
}
