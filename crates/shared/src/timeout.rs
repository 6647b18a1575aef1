//! Outbound-call deadlines.
//!
//! Every remote call in the control plane is bounded: 10 s for ordinary
//! cluster/source/registry calls, 30 s for the initial apply of a
//! submission. Log-follow and exec streams are the two exceptions; they are
//! unbounded and close on cancellation instead. The constants live here so
//! adapters share one budget instead of each hardcoding its own.

use crate::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Deadline for ordinary outbound cluster/source/registry calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for the initial apply of a deployment submission.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound a remote call with the default deadline, honoring cancellation.
pub async fn bounded_call<T, F>(
    ctx: &RequestContext,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout_with_context(ctx, DEFAULT_CALL_TIMEOUT, operation, fut).await
}

/// Bound a future with an explicit deadline, honoring request cancellation.
///
/// Cancellation wins over the deadline; a deadline miss maps to a retriable
/// `timeout` error carrying the operation and the budget that was exceeded.
pub async fn timeout_with_context<T, F>(
    ctx: &RequestContext,
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    ctx.ensure_not_cancelled(operation)?;

    tokio::select! {
        () = ctx.cancelled() => {
            Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation))
        },
        res = tokio::time::timeout(timeout, fut) => {
            res.unwrap_or_else(|_| Err(deadline_exceeded(operation, timeout)))
        }
    }
}

fn deadline_exceeded(operation: &'static str, timeout: Duration) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::timeout(),
        format!("operation timed out: {operation}"),
        ErrorClass::Retriable,
    )
    .with_metadata("operation", operation)
    .with_metadata("timeout_ms", timeout.as_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_miss_is_a_retriable_timeout() {
        let ctx = RequestContext::new_request();
        let fut = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ErrorEnvelope>(())
        };

        let result = timeout_with_context(&ctx, Duration::from_millis(10), "test", fut).await;
        let error = result.expect_err("must time out");
        assert_eq!(error.code, ErrorCode::timeout());
        assert!(error.class.is_retriable());
        assert_eq!(
            error.metadata.get("timeout_ms").map(String::as_str),
            Some("10")
        );
    }

    #[tokio::test]
    async fn cancellation_wins_over_the_deadline() {
        let ctx = RequestContext::new_request();
        let token = ctx.cancellation_token();
        let fut = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, ErrorEnvelope>(())
        };

        let task = tokio::spawn(async move {
            timeout_with_context(&ctx, Duration::from_millis(200), "test_cancel", fut).await
        });

        tokio::task::yield_now().await;
        token.cancel();
        let result = task.await.unwrap_or_else(|_| Err(ErrorEnvelope::fatal("join")));
        assert!(result.is_err_and(|error| error.is_cancelled()));
    }

    #[tokio::test]
    async fn bounded_call_uses_the_shared_budget() {
        let ctx = RequestContext::new_request();
        let result = bounded_call(&ctx, "test.fast", async { Ok(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }
}
