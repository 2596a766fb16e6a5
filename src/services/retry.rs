// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Retry helper with a fixed escalating delay schedule.

use crate::error::AppError;
use std::future::Future;
use std::time::Duration;

/// How often and how long to wait before re-issuing a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `delays[n]`; the last entry repeats.
    pub delays: Vec<Duration>,
    /// Longest wait honored from a `RateLimited` retry-after hint.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting. Used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            delays: vec![Duration::ZERO],
            max_rate_limit_wait: Duration::ZERO,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    /// Delay before the retry following failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Delay before retrying `err`: the schedule, stretched to cover a
    /// rate-limit window reset up to `max_rate_limit_wait`.
    pub fn delay_after(&self, attempt: u32, err: &AppError) -> Duration {
        let scheduled = self.delay_for(attempt);
        match err {
            AppError::RateLimited {
                retry_after_seconds,
            } => {
                let hinted = Duration::from_secs(*retry_after_seconds).min(self.max_rate_limit_wait);
                scheduled.max(hinted)
            }
            _ => scheduled,
        }
    }
}

/// Run `op`, re-issuing it on retryable failures per `policy`.
///
/// A `RateLimited` failure waits at least its retry-after hint (capped by
/// the policy). Non-retryable errors propagate unchanged after the first failure. When
/// every attempt fails with a retryable error the last one is wrapped in
/// [`AppError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_retries => {
                tracing::warn!(operation, attempts = attempt + 1, error = %err, "Retries exhausted");
                return Err(AppError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt, &err);
                tracing::info!(
                    operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Request failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}
