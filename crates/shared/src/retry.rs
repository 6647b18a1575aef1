//! Retry helpers with exponential backoff and jitter.
//!
//! Background loops use `backoff_delay` directly (they reschedule rather
//! than block); request-path callers use `retry_async`.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

impl RetryPolicy {
    /// Background-loop policy: base = loop period, cap = 10x period, +/-25% jitter.
    #[must_use]
    pub const fn for_loop_period(period_ms: u64) -> Self {
        Self {
            max_attempts: u32::MAX,
            base_delay_ms: period_ms,
            max_delay_ms: period_ms.saturating_mul(10),
            jitter_ratio_pct: 25,
        }
    }
}

/// Retry a fallible async operation with backoff + jitter.
///
/// Only retriable errors are retried; cancellation aborts immediately.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.class.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error);
                }

                let delay = backoff_delay(policy, attempt, jitter_seed(operation, attempt));
                sleep_with_cancellation(ctx, delay, operation).await?;
            },
        }
    }
}

/// Compute the delay before retry number `attempt` (1-indexed).
///
/// `min(base * 2^(attempt-1), cap)` with a deterministic jitter offset in
/// `[-ratio, +ratio]` derived from `seed`, so tests never depend on the
/// wall clock or an RNG.
#[must_use]
pub fn backoff_delay(policy: RetryPolicy, attempt: u32, seed: u64) -> Duration {
    let pow = attempt.saturating_sub(1).min(30);
    let base = policy.base_delay_ms.saturating_mul(1u64 << pow);
    let capped = base.min(policy.max_delay_ms);
    let jitter_pct = u64::from(policy.jitter_ratio_pct.min(100));
    if jitter_pct == 0 {
        return Duration::from_millis(capped);
    }

    let jitter_range = (capped.saturating_mul(jitter_pct)) / 100;
    let unit = i64::from(u32::try_from(seed % 1000).unwrap_or(0));
    let signed = unit - 500;
    let jitter_range_i64 = i64::try_from(jitter_range).unwrap_or(i64::MAX);
    let capped_i64 = i64::try_from(capped).unwrap_or(i64::MAX);
    let offset = jitter_range_i64.saturating_mul(signed) / 500;
    let max_i64 = i64::try_from(policy.max_delay_ms).unwrap_or(i64::MAX);
    let jittered = capped_i64.saturating_add(offset).clamp(0, max_i64);
    Duration::from_millis(u64::try_from(jittered).unwrap_or(0))
}

/// Deterministic jitter seed from an operation label and attempt counter.
#[must_use]
pub fn jitter_seed(label: &str, attempt: u32) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in label.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => Err(cancelled_error(operation)),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn cancelled_error(operation: &'static str) -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", operation)
}
