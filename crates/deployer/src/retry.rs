//! Retry wrapper for deployment submissions

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DeployerError, DeployerResult};

/// Delay inserted between failed attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Retry immediately (tests)
    None,
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    },
}

/// How often and how patiently a stage is re-submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Fixed { delay_ms: 2000 },
        }
    }
}

impl RetryPolicy {
    /// Policy that never sleeps
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::None,
        }
    }

    /// Validate retry configuration
    pub fn validate(&self) -> DeployerResult<()> {
        if self.max_attempts == 0 {
            return Err(DeployerError::config("retry.max_attempts must be greater than 0"));
        }

        if let BackoffStrategy::Exponential {
            base_delay_ms,
            max_delay_ms,
            multiplier,
        } = &self.backoff
        {
            if *base_delay_ms == 0 {
                return Err(DeployerError::config("retry.backoff.base_delay_ms must be greater than 0"));
            }
            if max_delay_ms < base_delay_ms {
                return Err(DeployerError::config(format!(
                    "retry.backoff.max_delay_ms must be at least base_delay_ms ({})",
                    base_delay_ms
                )));
            }
            if *multiplier < 1.0 {
                return Err(DeployerError::config("retry.backoff.multiplier must be at least 1.0"));
            }
        }

        Ok(())
    }

    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            BackoffStrategy::None => Duration::ZERO,
            BackoffStrategy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffStrategy::Exponential {
                base_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let delay = *base_delay_ms as f64 * multiplier.powi(exponent);
                Duration::from_millis((delay as u64).min(*max_delay_ms))
            }
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// `op` receives the 1-based attempt number. After the last attempt the
/// error is reported as a `Deployment` failure carrying the stage name and
/// attempt count.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, stage: &str, mut op: F) -> DeployerResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DeployerResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                warn!(
                    stage,
                    attempt,
                    max_attempts,
                    "Attempt {}/{} failed for {}: {}",
                    attempt,
                    max_attempts,
                    stage,
                    err
                );

                if attempt >= max_attempts {
                    return Err(DeployerError::Deployment {
                        stage: stage.to_string(),
                        attempts: attempt,
                        message: root_message(err),
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    info!("Retrying {} in {:?}", stage, delay);
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn root_message(err: DeployerError) -> String {
    match err {
        DeployerError::Deployment { message, .. } => message,
        other => other.to_string(),
    }
}
