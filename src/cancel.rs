//! Cancellable waits for load sessions.
//!
//! A session shares one [`CancellationToken`] with every continuation it
//! starts (runtime poll, render check, retry backoff). Once it is cancelled
//! each wait returns early and the continuation drops its result.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless `token` is cancelled first.
///
/// Returns `true` if the full duration elapsed, `false` on cancellation.
pub async fn sleep(token: &CancellationToken, duration: Duration) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
