use anyhow::{Context, Result};
use dashmap::DashSet;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// How a write forwarded to a partition primary is retried.
///
/// Only transport failures are retried. A primary that answers with an error status
/// has seen the write, so the response goes back to the caller as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub request_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// Account writes are small; a primary that needs more than half a second is
    /// treated as down for that attempt.
    pub const ACCOUNT_WRITES: RetryPolicy = RetryPolicy {
        attempts: 3,
        request_timeout: Duration::from_millis(500),
        initial_backoff: Duration::from_millis(150),
        max_backoff: Duration::from_millis(1200),
        max_jitter: Duration::from_millis(50),
    };

    /// Backoff before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    fn delay_before(&self, retry: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.backoff(retry) + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ACCOUNT_WRITES
    }
}

/// POSTs `payload` as JSON to `url`, retrying connection and timeout failures.
pub async fn post_json<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    payload: &T,
    policy: RetryPolicy,
) -> Result<reqwest::Response> {
    let attempts = policy.attempts.max(1);
    let mut retry = 0;

    loop {
        let sent = client
            .post(url)
            .json(payload)
            .timeout(policy.request_timeout)
            .send()
            .await;

        match sent {
            Ok(response) => return Ok(response),
            Err(e) if retry + 1 >= attempts => {
                return Err(e).with_context(|| format!("POST {} failed after {} attempts", url, attempts));
            }
            Err(e) => {
                tracing::debug!("POST {} attempt {} failed: {}", url, retry + 1, e);
                tokio::time::sleep(policy.delay_before(retry)).await;
                retry += 1;
            }
        }
    }
}

/// Op ids of writes already applied on this node.
///
/// A forwarded write may arrive twice when the sender retries after a timeout that
/// the primary did not notice. The log forgets everything once it grows past
/// `capacity`, so duplicates are only caught within a recent window.
pub struct AppliedOps {
    seen: DashSet<String>,
    capacity: usize,
}

impl AppliedOps {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: DashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records `op_id` and returns true if it had not been applied yet.
    pub fn first_time(&self, op_id: &str) -> bool {
        if self.seen.len() >= self.capacity {
            self.seen.clear();
        }
        self.seen.insert(op_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for AppliedOps {
    fn default() -> Self {
        Self::new()
    }
}
