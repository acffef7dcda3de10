//! Timeout, retry and fallback wrapper for capability invocations.
//!
//! Every call into an external provider goes through a [`CallPolicy`]: the call
//! is bounded by a deadline, retryable failures are retried with exponential
//! backoff, and callers that prefer a degraded answer over an error can supply
//! a fallback.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::CapabilityError;

/// Policy applied to one kind of capability call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Deadline for a single attempt.
    pub timeout: Duration,
    /// Number of additional attempts after the first one.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Cap for exponential growth of the backoff.
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            ..Default::default()
        }
    }

    /// Backoff to sleep before retry number `retry_count` (0-based).
    ///
    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = backoff_ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Whether another attempt should be made after `error` on attempt `retry_count`.
    pub fn should_retry<E: CapabilityError>(&self, error: &E, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }

    /// Run `op` under this policy.
    ///
    /// Each attempt is bounded by `timeout`; an elapsed deadline is reported as
    /// the capability's own timeout error and is retried like any other
    /// retryable failure.
    pub async fn call<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: CapabilityError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retry_count = 0;
        loop {
            let error = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => E::timeout(self.timeout),
            };

            if !self.should_retry(&error, retry_count) {
                if retry_count > 0 {
                    warn!(
                        "{} failed after {} attempts: {}",
                        label,
                        retry_count + 1,
                        error
                    );
                }
                return Err(error);
            }

            let backoff = self.backoff(retry_count);
            debug!(
                "{} failed ({}), retrying in {:?} (attempt {}/{})",
                label,
                error.kind(),
                backoff,
                retry_count + 2,
                self.max_retries + 1
            );
            tokio::time::sleep(backoff).await;
            retry_count += 1;
        }
    }

    /// Run `op` under this policy and downgrade a final failure through `fallback`.
    pub async fn call_or_else<T, E, F, Fut, G>(&self, label: &str, op: F, fallback: G) -> T
    where
        E: CapabilityError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(E) -> T,
    {
        match self.call(label, op).await {
            Ok(value) => value,
            Err(e) => fallback(e),
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}
