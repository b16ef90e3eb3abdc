// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded retry with exponential backoff for ledger calls.
//!
//! Every attempt runs under its own timeout, separate from the backoff
//! delay between attempts. Only transient errors are retried.

use std::future::Future;
use std::time::Duration;

use super::client::{LedgerError, LedgerResult};

/// Default number of attempts (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on a single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Default timeout for a single ledger call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(20);

/// Retry and timeout settings for ledger calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Timeout applied to each individual attempt.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.once(call()).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Ledger call recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient ledger failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(
                            operation,
                            attempts,
                            error = %e,
                            "Ledger retry budget exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Run a single attempt under the call timeout, without retrying.
    pub async fn once<T, Fut>(&self, call: Fut) -> LedgerResult<T>
    where
        Fut: Future<Output = LedgerResult<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        }
    }

    /// Fails with a network error `failures` times, then returns 7.
    async fn flaky(counter: &AtomicU32, failures: u32) -> LedgerResult<u64> {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(LedgerError::Network(format!("simulated failure {call}")))
        } else {
            Ok(7)
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for(10), DEFAULT_MAX_DELAY);
        assert_eq!(p.delay_for(u32::MAX), DEFAULT_MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fourth_attempt_with_budget_of_four() {
        let counter = AtomicU32::new(0);
        let result = policy(4).run("get_balance", || flaky(&counter, 3)).await;
        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_with_network_error_when_budget_is_three() {
        let counter = AtomicU32::new(0);
        let result = policy(3).run("get_balance", || flaky(&counter, 3)).await;
        assert!(matches!(result, Err(LedgerError::Network(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let result: LedgerResult<u64> = policy(5)
            .run("mint", || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::Authorization("no supply key".into()))
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Authorization(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_and_count_as_transient() {
        let counter = AtomicU32::new(0);
        let p = RetryPolicy {
            max_attempts: 2,
            call_timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        };
        let result = p
            .run("get_balance", || async {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                if call == 0 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(11u64)
            })
            .await;
        assert_eq!(result, Ok(11));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
