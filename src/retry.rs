//! Retry helpers for optimistic-concurrency conflicts
//!
//! Status writes and the migration route update follow the same protocol:
//! fetch the latest object, recompute the change, attempt the update, and
//! retry only on a resource-version conflict. Other errors fail fast.
//! Backoff between attempts uses exponential delay with jitter.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::Error;

/// Configuration for conflict-retry loops
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts before the conflict is surfaced
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute an operation, retrying while it reports a 409 conflict.
///
/// The operation is expected to re-fetch the object it mutates on every
/// attempt; this function only schedules the attempts.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt,
                        "conflict persisted after max retries"
                    );
                    return Err(e);
                }

                // 0.5x..1.5x jitter avoids synchronized retries across workers
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = jittered.as_millis(),
                    "conflict on update, retrying"
                );
                tokio::time::sleep(jittered).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }
}
