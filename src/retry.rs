//! Bounded retry with exponential backoff
//!
//! A [`RetryPolicy`] is composed explicitly around each network call:
//!
//! ```ignore
//! let body = policy.run("block_by_hash", |_attempt| transport.get(&url))?;
//! ```
//!
//! Only errors accepted by the policy's predicate (transient network failures
//! by default) are retried. When attempts run out, the last error is returned
//! as-is.

use crate::error::{EtlError, Result};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocks the calling thread between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    jitter: bool,
}

impl Backoff {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2,
            jitter: false,
        }
    }

    /// Adds up to 50% random extra delay, still bounded by the cap.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `retry` (the sleep after the first failure is retry 1).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        let base = self.initial.saturating_mul(factor).min(self.max);
        if !self.jitter {
            return base;
        }
        let extra = base.mul_f64(rand::thread_rng().gen_range(0.0..0.5));
        (base + extra).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(10))
    }
}

pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retry_if: fn(&EtlError) -> bool,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retry_if: EtlError::is_transient,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    pub fn retry_if(mut self, predicate: fn(&EtlError) -> bool) -> Self {
        self.retry_if = predicate;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// the attempt limit is reached. `call` receives the 1-based attempt number.
    pub fn run<T, F>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            debug!(
                target: "chainetl::retry",
                operation,
                attempt,
                max_attempts = self.max_attempts,
                "calling"
            );

            let err = match call(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        info!(target: "chainetl::retry", operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !(self.retry_if)(&err) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                warn!(
                    target: "chainetl::retry",
                    operation,
                    attempts = attempt,
                    error = %err,
                    "giving up"
                );
                return Err(err);
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                target: "chainetl::retry",
                operation,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "retrying after backoff"
            );
            self.sleeper.sleep(delay);
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}
