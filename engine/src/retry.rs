// ============================================================================
// TRANSIENT-FAILURE RETRY
// ============================================================================
// Module: engine/src/retry.rs
// Description: Shared backoff loop wrapping the core C1-C4 operations so a
// live deadlock or serialization failure is retried instead of surfacing to
// the caller. Each attempt runs its own transaction from scratch - nothing
// commits until the final `tx.commit()`, so replaying a request this way
// never double-applies a mutation.
// ============================================================================

use std::future::Future;
use std::time::Duration;

use olympus_shared::error::Result;
use rand::Rng;
use tracing::warn;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 25;
const JITTER_MS: u64 = 25;

/// Retry `op` up to `MAX_RETRIES` times, with exponential backoff plus
/// jitter, when it fails with a transient error (deadlock, serialization
/// failure, connection pool exhaustion). Any other error surfaces on the
/// first attempt.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retries < MAX_RETRIES && err.is_retryable() => {
                retries += 1;
                let backoff_ms = BASE_BACKOFF_MS * 2u64.pow(retries - 1);
                let jitter_ms = rand::thread_rng().gen_range(0..JITTER_MS);
                warn!(retries, error = %err, "retrying transient failure");
                tokio::time::sleep(Duration::from_millis(backoff_ms + jitter_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
