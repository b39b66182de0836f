//! Retry manager for collaborator calls
//!
//! Generation, embedding and vector-store calls retry on transient
//! failures; the orchestration layer never retries. Delays double from a
//! base value up to a cap, with ±25% jitter.

use crate::errors::{RagError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default attempts per call, first try included
pub const MAX_RETRIES: u32 = 3;

const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct RetryManager {
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    pub fn new() -> Self {
        Self {
            attempts: MAX_RETRIES,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
            jitter: true,
        }
    }

    /// At least one attempt is always made
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    ///
    /// The last error is returned unchanged.
    pub async fn execute_with_retry<F, Fut, T>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= self.attempts || !is_transient(&error) {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            debug!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying collaborator call"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Delay after the `attempt`-th failure (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter {
            return delay;
        }
        // uniform in [0.75, 1.25)
        delay.mul_f64(0.75 + rand::random::<f64>() * 0.5)
    }
}

/// Whether another attempt could succeed
///
/// A run deadline (`Timeout`) never recovers, and HTTP client errors (4xx)
/// mean the request itself is wrong.
fn is_transient(error: &RagError) -> bool {
    match error {
        RagError::HttpError(e) => !e.status().is_some_and(|status| status.is_client_error()),
        RagError::Generation(_) | RagError::Embedding(_) | RagError::VectorStore(_) => true,
        _ => false,
    }
}
