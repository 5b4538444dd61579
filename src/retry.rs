//! Exponential backoff retry engine.
//!
//! Runs an async operation up to `max_attempts` times, sleeping between
//! failed attempts for the delay computed by [`compute_backoff_delay`]. Each
//! failure is classified by a caller-supplied predicate; non-retryable
//! failures end the loop immediately.
//!
//! Every wait races the caller's [`CancellationToken`], so a cancelled caller
//! never sleeps out a backoff delay.

use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::RetryOptions;
use crate::error::RetryError;
use crate::metrics::LockMetrics;
use crate::metrics::NoOpLockMetrics;
use crate::verified::compute_backoff_delay;

/// Generic retry executor.
///
/// The engine holds no per-call state and can be shared between callers.
#[derive(Clone)]
pub struct RetryEngine {
    options: RetryOptions,
    metrics: Arc<dyn LockMetrics>,
}

impl std::fmt::Debug for RetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryEngine").field("options", &self.options).finish_non_exhaustive()
    }
}

impl RetryEngine {
    /// Create an engine reporting to `metrics`.
    pub fn new(options: RetryOptions, metrics: Arc<dyn LockMetrics>) -> Self {
        Self { options, metrics }
    }

    /// Create an engine without metrics.
    pub fn without_metrics(options: RetryOptions) -> Self {
        Self::new(options, NoOpLockMetrics::shared())
    }

    /// Retry tuning used by this engine.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// - Attempts are numbered from 1; `max_attempts < 1` behaves as 1.
    /// - Cancellation is checked before every attempt after the first and
    ///   during every backoff delay. Either yields [`RetryError::Cancelled`],
    ///   discarding the previous attempt's error.
    /// - A failure on the last attempt, or one rejected by `should_retry`, is
    ///   returned unchanged as [`RetryError::Operation`] without sleeping.
    ///
    /// Emits `retry_attempt` for every attempt beyond the first and a single
    /// `retries_exhausted` when the loop ends in failure after at least one
    /// retry.
    pub async fn execute<T, E, F, Fut, P>(
        &self,
        mut operation: F,
        should_retry: P,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            if attempt > 1 {
                if cancel.is_cancelled() {
                    debug!(attempt, "retry loop cancelled before attempt");
                    return Err(RetryError::Cancelled { attempt });
                }
                self.metrics.retry_attempt(attempt);
            }

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let retryable = should_retry(&error);
            if attempt >= max_attempts || !retryable {
                if attempt > 1 {
                    warn!(attempts = attempt, retryable, "retries exhausted");
                    self.metrics.retries_exhausted(attempt);
                }
                return Err(RetryError::Operation {
                    source: error,
                    attempts: attempt,
                });
            }

            // ThreadRng is not Send; it must not live across the await below
            let jitter_sample: f64 = rand::rng().random();
            let delay = compute_backoff_delay(attempt, &self.options, jitter_sample);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "attempt failed, backing off");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt = attempt + 1, "retry loop cancelled during backoff");
                    return Err(RetryError::Cancelled { attempt: attempt + 1 });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::error::StoreError;
    use crate::metrics::LockMetricEvent;
    use crate::metrics::RecordingLockMetrics;
    use crate::verified::is_retryable_store_error;

    fn options(max_attempts: u32) -> RetryOptions {
        RetryOptions {
            max_attempts,
            use_jitter: false,
            ..RetryOptions::enabled()
        }
    }

    fn engine(max_attempts: u32) -> (RetryEngine, RecordingLockMetrics) {
        let metrics = RecordingLockMetrics::new();
        (RetryEngine::new(options(max_attempts), Arc::new(metrics.clone())), metrics)
    }

    fn contention() -> StoreError {
        StoreError::ConditionFailed { key: "lock#r".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_emits_nothing() {
        let (engine, metrics) = engine(3);
        let cancel = CancellationToken::new();

        let result: Result<u32, RetryError<StoreError>> =
            engine.execute(|| async { Ok(7) }, is_retryable_store_error, &cancel).await;

        assert_eq!(result, Ok(7));
        assert!(metrics.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt() {
        let (engine, metrics) = engine(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = engine
            .execute(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move { if n < 3 { Err(contention()) } else { Ok(n) } }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(
            metrics.events(),
            vec![
                LockMetricEvent::RetryAttempt { attempt: 2 },
                LockMetricEvent::RetryAttempt { attempt: 3 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let (engine, metrics) = engine(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(contention()) }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert_eq!(
            result,
            Err(RetryError::Operation {
                source: contention(),
                attempts: 3
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.retry_attempts(), 2);
        assert_eq!(metrics.retries_exhausted_count(), 1);
        assert_eq!(metrics.events().last(), Some(&LockMetricEvent::RetriesExhausted { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_first_attempt_is_not_exhaustion() {
        let (engine, metrics) = engine(3);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(StoreError::Other { detail: "denied".into() }) }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Operation { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(metrics.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_after_retry_counts_as_exhausted() {
        let (engine, metrics) = engine(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n == 1 {
                            Err(contention())
                        } else {
                            Err(StoreError::Other { detail: "denied".into() })
                        }
                    }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Operation { attempts: 2, .. })));
        assert_eq!(metrics.retry_attempts(), 1);
        assert_eq!(metrics.retries_exhausted_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_runs_once() {
        let (engine, metrics) = engine(0);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(contention()) }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert!(matches!(result, Err(RetryError::Operation { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(metrics.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_accumulate() {
        let (engine, _metrics) = engine(3);
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        let _: Result<(), _> = engine.execute(|| async { Err(contention()) }, is_retryable_store_error, &cancel).await;

        // 100ms after the first failure, 200ms after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (engine, metrics) = engine(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = engine
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    async { Err(contention()) }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        assert_eq!(result, Err(RetryError::Cancelled { attempt: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(metrics.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_another_task_stops_retries() {
        let (engine, _metrics) = engine(10);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let counter = calls.clone();
        let result: Result<(), _> = engine
            .execute(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(contention()) }
                },
                is_retryable_store_error,
                &cancel,
            )
            .await;

        // Attempts at 0ms and 100ms; cancelled during the 200ms wait
        assert_eq!(result, Err(RetryError::Cancelled { attempt: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
