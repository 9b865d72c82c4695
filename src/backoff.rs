//! Bounded retry with exponential backoff for programmatic API calls.
//!
//! The browser-driven registries never retry (their failure handling is the
//! tier chain itself); only the name-lookup APIs go through this policy.
//! Rate limits honor a server-supplied retry delay when one is present,
//! everything else waits `min(cap, base^attempt + jitter)`.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::BackoffConfig;
use crate::error::LookupError;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base: f64,
    cap_secs: f64,
    jitter_max_secs: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base: config.base,
            cap_secs: config.cap_secs,
            jitter_max_secs: config.jitter_max_secs,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before retrying after `attempt` (0-based) failed, with the given
    /// jitter already drawn. Pure, so the wait schedule is testable: for a
    /// fixed jitter the sequence is non-decreasing and capped at `cap_secs`.
    pub fn delay_for(&self, attempt: u32, jitter_secs: f64) -> Duration {
        let exp = self.base.powi(attempt as i32);
        Duration::from_secs_f64((exp + jitter_secs).min(self.cap_secs))
    }

    fn draw_jitter(&self) -> f64 {
        if self.jitter_max_secs <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(0.0..self.jitter_max_secs)
    }

    /// Run `operation` up to `max_attempts` times. Retryable faults
    /// (rate-limit, server fault, network fault) wait and try again; all
    /// other faults, and exhaustion, surface the last observed error to the
    /// caller. Never panics past the caller.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt + 1 == self.max_attempts {
                        warn!(
                            "all {} attempts exhausted, giving up: {}",
                            self.max_attempts, err
                        );
                        return Err(err);
                    }

                    let wait = match &err {
                        LookupError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs_f64(*secs),
                        _ => self.delay_for(attempt, self.draw_jitter()),
                    };
                    debug!(
                        "attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        err,
                        wait
                    );
                    sleep(wait).await;
                }
            }
        }

        // max_attempts >= 1 is enforced by config validation
        unreachable!("backoff loop returns on the final attempt")
    }
}
