use crate::storage::account::{AccountId, AccountRecord, ClientId};
use crate::storage::memory::AccountStore;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct AccountRow {
    account_id: AccountId,
    client_id: ClientId,
    // Parsed by hand so the decimal never goes through a float.
    balance: String,
}

/// Summary returned to the caller after a load.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
}

/// Parses every row up front; a single bad row rejects the whole input.
pub fn parse_accounts<R: Read>(reader: R) -> Result<Vec<AccountRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (line, row) in csv_reader.deserialize::<AccountRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid account row {}", line + 1))?;
        let balance = Decimal::from_str(&row.balance)
            .with_context(|| format!("Invalid account row {}: bad balance", line + 1))?;
        records.push(AccountRecord::new(row.account_id, row.client_id, balance));
    }
    Ok(records)
}

pub async fn load_accounts(store: &AccountStore, records: Vec<AccountRecord>) -> Result<LoadReport> {
    let mut report = LoadReport::default();
    for record in records {
        let account_id = record.key.account_id;
        store
            .put(record)
            .await
            .with_context(|| format!("Failed to store account {}", account_id))?;
        report.loaded += 1;
    }
    tracing::info!("Loaded {} account(s)", report.loaded);
    Ok(report)
}

pub async fn load_csv_file(store: &AccountStore, path: &Path) -> Result<LoadReport> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Cannot open account file {}", path.display()))?;
    let records = parse_accounts(file)?;
    tracing::info!("Parsed {} account(s) from {}", records.len(), path.display());
    load_accounts(store, records).await
}
