//! Shared per-node accumulation of client balances.

use super::error::{AggregateError, AggregateResult};
use super::types::ClientBalances;
use crate::storage::account::ClientId;

use dashmap::DashMap;
use rust_decimal::Decimal;

/// Sharded map of running totals, safe to update from many partition tasks at once.
///
/// Add-or-initialize happens under the shard lock of the key, so concurrent
/// contributions to the same client are never lost.
#[derive(Default)]
pub struct BalanceAccumulator {
    totals: DashMap<ClientId, Decimal>,
}

impl BalanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, client_id: ClientId, amount: Decimal) -> AggregateResult<()> {
        let mut total = self.totals.entry(client_id).or_insert(Decimal::ZERO);
        *total = exact_add(*total, amount).ok_or(AggregateError::BalanceOverflow { client_id })?;
        Ok(())
    }

    /// Folds a task-local partial map into the shared totals.
    pub fn merge(&self, partial: ClientBalances) -> AggregateResult<()> {
        for (client_id, amount) in partial {
            self.add(client_id, amount)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn snapshot(&self) -> ClientBalances {
        self.totals
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn into_balances(self) -> ClientBalances {
        self.totals.into_iter().collect()
    }
}

/// Adds `amount` into a task-local map with the same overflow rules as the accumulator.
pub fn add_local(
    partial: &mut ClientBalances,
    client_id: ClientId,
    amount: Decimal,
) -> AggregateResult<()> {
    let total = partial.entry(client_id).or_insert(Decimal::ZERO);
    *total = exact_add(*total, amount).ok_or(AggregateError::BalanceOverflow { client_id })?;
    Ok(())
}

/// `a + b`, or `None` when the sum does not fit or would need rounding.
///
/// `Decimal::checked_add` only fails on integer overflow; when the exact sum needs more
/// than 28 digits it drops fractional digits and reports the scale it kept.
pub fn exact_add(a: Decimal, b: Decimal) -> Option<Decimal> {
    let sum = a.checked_add(b)?;
    // Trailing zeros carry no digits that could be lost.
    let (a, b) = (a.normalize(), b.normalize());
    let scale = a.scale().max(b.scale());
    if sum.scale() >= scale {
        return Some(sum);
    }

    let exact = rescaled_mantissa(a, scale)?.checked_add(rescaled_mantissa(b, scale)?)?;
    (rescaled_mantissa(sum.normalize(), scale)? == exact).then_some(sum)
}

fn rescaled_mantissa(value: Decimal, scale: u32) -> Option<i128> {
    if value.is_zero() {
        return Some(0);
    }
    10i128
        .checked_pow(scale - value.scale())
        .and_then(|factor| value.mantissa().checked_mul(factor))
}
