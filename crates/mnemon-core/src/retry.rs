// SPDX-FileCopyrightText: 2026 Mnemon Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff for transient failures.
//!
//! Only [`MnemonError::Transient`] is retried; every other kind propagates
//! on the first occurrence. After the attempt budget is exhausted the last
//! transient error is returned as-is so callers can promote it.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::MnemonError;

/// Retry schedule: `max_attempts` total tries, delays doubling from
/// `initial_delay` up to `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub const fn new(max_attempts: u32) -> Self {
        Backoff {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Delay before the given retry (0-based retry index).
    fn delay(&self, retry: u32) -> Duration {
        let exp = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry));
        exp.min(self.max_delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(3)
    }
}

/// Runs `op` until it succeeds, fails non-transiently, or the attempt budget
/// is exhausted.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    backoff: Backoff,
    mut op: F,
) -> Result<T, MnemonError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MnemonError>>,
{
    let attempts = backoff.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                warn!(
                    op = label,
                    attempt = attempt + 1,
                    max = attempts,
                    error = %err,
                    "transient failure"
                );
                last_err = Some(err);
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff.delay(attempt)).await;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.expect("at least one attempt was made"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", Backoff::new(3), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, MnemonError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", Backoff::new(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(MnemonError::transient("flaky"))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_budget_and_returns_last_transient() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("test", Backoff::new(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MnemonError::transient("still down")) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff("test", Backoff::new(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(MnemonError::fatal("schema mismatch")) }
        })
        .await;
        assert!(matches!(result, Err(MnemonError::Fatal { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let backoff = Backoff::new(5);
        assert_eq!(backoff.delay(0), Duration::from_millis(200));
        assert_eq!(backoff.delay(1), Duration::from_millis(400));
        assert_eq!(backoff.delay(2), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(2));
    }
}
