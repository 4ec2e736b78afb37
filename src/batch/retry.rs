//! 재시도 정책 모듈
//! Retry policy, delay calculation and the retry combinator used by the chunk executor.
//!
//! Sleeping goes through the [`Sleeper`] trait so retry loops can be driven
//! in tests without real delays.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay between two attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryDelay {
    /// Same delay before every retry
    Fixed(Duration),
    /// base * multiplier^(retry - 1), capped at `max`, plus 0..=jitter
    Exponential {
        base: Duration,
        multiplier: f64,
        max: Duration,
        jitter: Duration,
    },
}

/// 재시도 정책 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    pub delay: RetryDelay,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self::fixed(
            defaults::RETRY_ATTEMPTS,
            Duration::from_millis(defaults::RETRY_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay: RetryDelay::Fixed(delay) }
    }

    pub fn exponential(max_retries: u32, base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            max_retries,
            delay: RetryDelay::Exponential { base, multiplier, max, jitter: Duration::ZERO },
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Total number of attempts, first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts()
    }

    /// 지연 시간 계산 - delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match &self.delay {
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::Exponential { base, multiplier, max, jitter } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = base.as_secs_f64() * multiplier.powi(exponent);
                // 범위를 넘는 값은 상한으로
                let capped = Duration::try_from_secs_f64(scaled.max(0.0))
                    .map_or(*max, |d| d.min(*max));
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                if jitter_ms == 0 {
                    capped
                } else {
                    capped + Duration::from_millis(fastrand::u64(0..=jitter_ms))
                }
            }
        }
    }
}

/// Abstraction over `tokio::time::sleep`
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Sleeper that returns immediately and remembers every requested delay
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Result of a retried operation plus how many attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds or the policy is exhausted
///
/// The closure receives the 1-based attempt number. The last error is
/// returned when every attempt failed.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_with_policy_when(policy, sleeper, |_| true, operation).await
}

/// Like [`retry_with_policy`], but stops at the first error `is_retryable` refuses
pub async fn retry_with_policy_when<T, E, P, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    is_retryable: P,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    P: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return RetryOutcome { result: Ok(value), attempts: attempt };
            }
            Err(err) if policy.should_retry(attempt) && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts(),
                    ?delay,
                    error = %err,
                    "🔄 attempt failed, retrying"
                );
                sleeper.sleep(delay).await;
            }
            Err(err) => {
                if policy.should_retry(attempt) {
                    debug!(attempt, error = %err, "error is not retryable, giving up");
                }
                return RetryOutcome { result: Err(err), attempts: attempt };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_policy_matches_pipeline_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn should_retry_counts_attempts_made() {
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy = RetryPolicy::exponential(
            5,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(500),
        );
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[rstest::rstest]
    #[case(65)]
    #[case(100)]
    #[case(1100)]
    #[case(u32::MAX)]
    fn huge_retry_numbers_return_the_cap(#[case] retry: u32) {
        let policy =
            RetryPolicy::exponential(200, Duration::from_millis(100), 2.0, Duration::from_secs(60));
        assert_eq!(policy.delay_for(retry), Duration::from_secs(60));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy {
            max_retries: 3,
            delay: RetryDelay::Exponential {
                base: Duration::from_millis(1000),
                multiplier: 2.0,
                max: Duration::from_millis(10_000),
                jitter: Duration::from_millis(100),
            },
        };
        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2100));
        }
    }

    #[tokio::test]
    async fn retries_until_exhausted_and_returns_last_error() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::fixed(2, Duration::from_secs(2));
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<(), String> = retry_with_policy(&policy, &sleeper, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure #{attempt}")) }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap_err(), "failure #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::fixed(4, Duration::from_millis(10));

        let outcome: RetryOutcome<u32, String> =
            retry_with_policy(&policy, &sleeper, |attempt| async move {
                if attempt < 2 { Err("flaky".to_string()) } else { Ok(attempt * 10) }
            })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap(), 20);
        assert_eq!(sleeper.calls().len(), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let sleeper = RecordingSleeper::new();
        let policy = RetryPolicy::fixed(2, Duration::from_secs(2));

        let outcome: RetryOutcome<(), String> = retry_with_policy_when(
            &policy,
            &sleeper,
            |err: &String| err != "fatal",
            |attempt| async move {
                Err(if attempt == 1 { "flaky".to_string() } else { "fatal".to_string() })
            },
        )
        .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.unwrap_err(), "fatal");
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn no_retry_policy_runs_once() {
        let sleeper = RecordingSleeper::new();
        let outcome: RetryOutcome<u32, String> = tokio_test::block_on(retry_with_policy(
            &RetryPolicy::none(),
            &sleeper,
            |_| async { Err("down".to_string()) },
        ));

        assert_eq!(outcome.attempts, 1);
        tokio_test::assert_err!(outcome.result);
        assert!(sleeper.calls().is_empty());
    }

    #[tokio::test]
    async fn tokio_sleeper_skips_zero_delay() {
        let started = std::time::Instant::now();
        TokioSleeper.sleep(Duration::ZERO).await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
