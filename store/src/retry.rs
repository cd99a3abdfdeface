//! Retry policy for transient storage failures.
//!
//! # Retryable Operations
//!
//! - Reads (`get_*`, `list_*`, `search_*`)
//! - Idempotent upserts (`upsert_answer`, `mark_section_reviewed`)
//!
//! Submit, review, form creation and document approval are never retried
//! here: callers must re-read state before trying them again.
//!
//! # Retryable Conditions
//!
//! - `SQLITE_BUSY` / `SQLITE_LOCKED` (see [`EngineError::is_transient`])

use std::thread;
use std::time::Duration;

use crate::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Initial backoff delay before first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff: `initial_delay * 2^backoff_step`, capped at
    /// `max_delay`, then down-jittered into `[1 - jitter_factor, 1.0]`.
    #[must_use]
    pub fn delay(&self, backoff_step: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = 1.0 - rand::random::<f64>() * self.jitter_factor.clamp(0.0, 1.0);
        Duration::from_secs_f64(capped * jitter)
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    pub fn run<T>(
        &self,
        op_name: &str,
        mut op: impl FnMut() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient storage error, retrying"
                    );
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}
