//! Concurrency primitives and request-scoped context.
//!
//! The control plane is a set of timer-driven loops plus request handlers;
//! this module provides the three primitives they share:
//! - Cancellation + correlation identifiers via `RequestContext`
//! - A clonable awaitable `CancellationToken`
//! - A `TickGate` enforcing the single-inflight guarantee of background loops
//!
//! Cancellation is "best-effort": work that has not started is cancelled;
//! in-flight work may complete unless the task itself cooperates.

use crate::{ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;

/// A correlation identifier used for logging/telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Parse a correlation identifier from user input.
    ///
    /// The value is trimmed; empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::invalid("correlationId must be non-empty"));
        }
        Ok(Self(Arc::<str>::from(trimmed)))
    }

    /// Create a new request id, best-effort unique within this process.
    #[must_use]
    pub fn new_request_id() -> Self {
        next_scoped_id(&REQUEST_ID_COUNTER, "req_")
    }

    /// Create a new loop-tick id, best-effort unique within this process.
    #[must_use]
    pub fn new_tick_id() -> Self {
        next_scoped_id(&TICK_ID_COUNTER, "tick_")
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static TICK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_scoped_id(counter: &AtomicU64, prefix: &'static str) -> CorrelationId {
    let n = counter.fetch_add(1, Ordering::Relaxed);
    let id: Box<str> = format!("{prefix}{n}").into_boxed_str();
    CorrelationId(Arc::<str>::from(id))
}

/// A clonable cancellation token that can be awaited.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel the token and wake all current/future waiters.
    pub fn cancel(&self) {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a new request context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            cancellation: CancellationToken::new(),
        }
    }

    /// Convenience constructor: create a context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Create a context with an explicit cancellation token (for sharing cancellation).
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await cancellation.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Return a cancellation error when cancelled, including operation metadata.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}

/// Gate enforcing at most one tick of a background loop in flight.
///
/// If a tick is still running when the next timer fires, `try_enter`
/// returns `None` and the caller skips (and logs) the overlapping tick.
#[derive(Debug, Clone, Default)]
pub struct TickGate {
    busy: Arc<AtomicBool>,
}

impl TickGate {
    /// Create a new, open gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to enter the gate; `None` when a tick is already in flight.
    #[must_use]
    pub fn try_enter(&self) -> Option<TickPermit> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(TickPermit {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Returns true when a tick is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Permit held for the duration of one tick; releases the gate on drop.
#[derive(Debug)]
pub struct TickPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_rejects_empty() {
        assert!(CorrelationId::parse("  ").is_err());
        let id = CorrelationId::parse(" abc ").map(|id| id.as_str().to_owned());
        assert_eq!(id.as_deref(), Ok("abc"));
    }

    #[tokio::test]
    async fn cancellation_wakes_waiters() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::task::yield_now().await;
        token.cancel();
        assert!(handle.await.is_ok());
        assert!(token.is_cancelled());
    }

    #[test]
    fn request_context_cancellation_errors() {
        let ctx = RequestContext::new_request();
        assert!(ctx.ensure_not_cancelled("op").is_ok());
        ctx.cancel();
        let error = ctx.ensure_not_cancelled("op");
        assert!(error.is_err_and(|error| error.is_cancelled()));
    }

    #[test]
    fn tick_gate_skips_overlapping_ticks() {
        let gate = TickGate::new();
        let permit = gate.try_enter();
        assert!(permit.is_some());
        assert!(gate.try_enter().is_none(), "second tick must be skipped");
        drop(permit);
        assert!(gate.try_enter().is_some(), "gate reopens after the tick");
    }
}
