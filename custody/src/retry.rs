//! Retry of ledger writes across MVCC conflicts
//!
//! Exponential backoff with jitter. Only transient failures are retried: MVCC
//! read conflicts and submits whose outcome is unknown. Each attempt is told
//! its 1-based number so it can re-read state and look for a receipt left by
//! an earlier attempt before writing again.

use crate::metrics::CustodyMetrics;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Retry budget and backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,
    /// Upper bound on any delay (milliseconds)
    pub max_delay_ms: u64,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
    /// Relative jitter, 0.0 - 1.0
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
        }
    }
}

impl RetryConfig {
    /// Reject budgets the strategy cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::Config("retry.backoff_multiplier must be >= 1.0".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Error::Config("retry.jitter_factor must be within [0, 1]".into()));
        }
        Ok(())
    }
}

/// Conflict retry wrapper
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
    metrics: Option<CustodyMetrics>,
}

impl RetryStrategy {
    /// Create new strategy
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Strategy with default budget
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Count retries and conflicts on `metrics`
    pub fn with_metrics(mut self, metrics: CustodyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Budget in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the `retry`-th retry (0-based)
    pub fn calculate_delay(&self, retry: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(retry as i32);

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// Permanent failures return at once. When the budget runs out the last
    /// transient failure is returned, so exhausted conflicts surface as
    /// [`Error::LedgerConflict`].
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt, max_attempts, "Operation succeeded on retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if matches!(e, Error::LedgerConflict(_)) {
                        if let Some(metrics) = &self.metrics {
                            metrics.conflicts_total.inc();
                        }
                    }

                    if attempt >= max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient ledger failure, retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.retries_total.inc();
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
