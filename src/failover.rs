//! The failover strategy engine.
//!
//! Every dispatched operation runs under a [`FailoverStrategy`]: a retry
//! schedule applied to transient failures such as network errors, elections
//! in progress, and the server's published set of retryable command codes.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::error::{ErrorKind, Result};

/// The retry schedule applied to an operation.
///
/// Retry `n` (1-based) waits `initial_delay * delay_factor(n)` before the
/// next attempt. After `retries` failed retries the last error is returned.
#[derive(Clone)]
pub struct FailoverStrategy {
    /// The base delay between attempts.
    pub initial_delay: Duration,

    /// How many retries are made after the initial attempt.
    pub retries: u32,

    /// The multiplier applied to `initial_delay` for each retry index.
    pub delay_factor: Arc<dyn Fn(u32) -> f64 + Send + Sync>,
}

impl Default for FailoverStrategy {
    /// 10 linearly backed-off retries starting at 100ms.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            retries: 10,
            delay_factor: Arc::new(|n| n as f64),
        }
    }
}

impl fmt::Debug for FailoverStrategy {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("FailoverStrategy")
            .field("initial_delay", &self.initial_delay)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl FailoverStrategy {
    /// The delay before retry `n` (1-based).
    pub fn delay(&self, n: u32) -> Duration {
        self.initial_delay.mul_f64((self.delay_factor)(n))
    }

    /// The estimated time the whole schedule can take: the sum of all retry
    /// delays.
    pub fn estimated_timeout(&self) -> Duration {
        (1..=self.retries).map(|n| self.delay(n)).sum()
    }
}

/// Runs `operation` under `strategy`, retrying transient failures.
///
/// Before each sleep the remaining deadline budget is rechecked; if it
/// cannot cover the next delay the engine returns a timeout immediately
/// rather than sleeping through it.
pub(crate) async fn with_retries<T, F, Fut>(
    strategy: &FailoverStrategy,
    deadline: Option<Instant>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !error.is_retryable() => return Err(error),
            Err(error) => error,
        };

        attempt += 1;
        if attempt > strategy.retries {
            return Err(error);
        }

        let delay = strategy.delay(attempt);
        if let Some(deadline) = deadline {
            if Instant::now() + delay > deadline {
                return Err(ErrorKind::Timeout {
                    message: format!(
                        "remaining deadline cannot cover the {:?} delay before retry {}",
                        delay, attempt
                    ),
                }
                .into());
            }
        }

        tracing::debug!(
            target: "mongo_core::command",
            attempt,
            ?delay,
            %error,
            "retrying operation after transient failure"
        );
        tokio::time::sleep(delay).await;
    }
}
