//! Bounded retry for rate-limited store calls.

use std::time::Duration;

use reviewsync_storage::StorageError;
use tracing::warn;

use crate::error::EngineError;

/// Blocking pause between attempts. Injected so tests can observe delays
/// without waiting.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed, the first one included. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(65),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Run `call` until it succeeds, fails with a non-quota error, or the
    /// attempt budget is spent. Exhaustion maps to `EngineError::QuotaExceeded`.
    pub fn run<T>(
        &self,
        sleeper: &dyn Sleeper,
        operation: &str,
        mut call: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, EngineError> {
        let budget = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() => {
                    if attempt >= budget {
                        return Err(EngineError::QuotaExceeded {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(operation, attempt, budget, error = %e, "rate limited, backing off");
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
