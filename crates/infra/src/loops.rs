//! Timer-driven background loops.
//!
//! Every loop is single-inflight by construction (the tick is awaited in the
//! loop body), cancellation-aware, and backs off on failure with the shared
//! policy (base = loop period, cap = 10x, +/-25% jitter). Errors never
//! escape a loop; they are logged and counted.

use benchkube_shared::{
    CancellationToken, CorrelationId, RequestContext, RetryPolicy, backoff_delay, jitter_seed,
};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawn a named interval loop until the token is cancelled.
pub fn spawn_interval_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut(RequestContext) -> Fut + Send + 'static,
    Fut: Future<Output = benchkube_shared::Result<()>> + Send,
{
    tokio::spawn(async move {
        let policy = RetryPolicy::for_loop_period(u64::try_from(period.as_millis()).unwrap_or(u64::MAX));
        let mut failures: u32 = 0;
        let mut delay = period;
        info!(loop_name = name, period_ms = period.as_millis() as u64, "loop.started");

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = tokio::time::sleep(delay) => {},
            }
            if token.is_cancelled() {
                break;
            }

            let ctx = RequestContext::with_cancellation(CorrelationId::new_tick_id(), token.clone());
            match tick(ctx).await {
                Ok(()) => {
                    failures = 0;
                    delay = period;
                },
                Err(error) if error.is_cancelled() => break,
                Err(error) => {
                    failures = failures.saturating_add(1);
                    delay = backoff_delay(policy, failures, jitter_seed(name, failures));
                    warn!(
                        loop_name = name,
                        consecutive_failures = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "loop.tick failed"
                    );
                },
            }
        }
        debug!(loop_name = name, "loop.stopped");
    })
}
