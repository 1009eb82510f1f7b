//! Chunked dispatch with bounded retry and neutral-value degradation
//!
//! Every oracle call goes through [`dispatch_chunks`]: the input is cut into
//! chunks, each chunk is attempted up to `retries + 1` times with exponential
//! backoff, and a chunk that still fails is replaced by neutral values so the
//! import can continue. Chunks may be dispatched concurrently; output order
//! always matches input order.

use super::OracleError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule for one oracle
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, base: Duration, max: Duration) -> Self {
        Self { retries, base, max }
    }

    /// No retries, no sleeping
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(300), Duration::from_secs(2))
    }
}

/// Values for every input item, plus which chunks fell back to neutral values
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub values: Vec<T>,
    /// Indices of degraded chunks, ascending
    pub degraded_chunks: Vec<usize>,
}

impl<T> BatchOutcome<T> {
    pub fn complete(values: Vec<T>) -> Self {
        Self {
            values,
            degraded_chunks: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded_chunks.is_empty()
    }
}

/// Chunk sizing and concurrency for one oracle
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub oracle: &'static str,
    pub chunk_size: usize,
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

/// Run `call` once per chunk of `items`, degrading failed chunks to `neutral`.
///
/// A chunk answered with the wrong number of values is padded with `neutral`
/// or truncated.
pub async fn dispatch_chunks<I, T, F, Fut>(
    plan: &DispatchPlan,
    items: &[I],
    neutral: T,
    call: F,
) -> BatchOutcome<T>
where
    I: Clone,
    T: Clone,
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<T>, OracleError>>,
{
    if items.is_empty() {
        return BatchOutcome::complete(Vec::new());
    }

    let chunk_size = plan.chunk_size.max(1);
    let call = &call;
    let chunks: Vec<(usize, Vec<I>)> = items
        .chunks(chunk_size)
        .map(<[I]>::to_vec)
        .enumerate()
        .collect();
    let results: Vec<(usize, usize, Result<Vec<T>, OracleError>)> =
        stream::iter(chunks)
            .map(|(index, chunk)| async move {
                let len = chunk.len();
                let result = with_retry(plan, index, || call(chunk.clone())).await;
                (index, len, result)
            })
            .buffered(plan.max_in_flight.max(1))
            .collect()
            .await;

    let mut values = Vec::with_capacity(items.len());
    let mut degraded_chunks = Vec::new();

    for (index, len, result) in results {
        match result {
            Ok(mut chunk_values) => {
                if chunk_values.len() != len {
                    warn!(
                        oracle = plan.oracle,
                        chunk = index,
                        expected = len,
                        received = chunk_values.len(),
                        "Oracle returned wrong number of values; padding/truncating"
                    );
                    chunk_values.resize(len, neutral.clone());
                }
                values.extend(chunk_values);
            }
            Err(e) => {
                warn!(
                    oracle = plan.oracle,
                    chunk = index,
                    size = len,
                    error = %e,
                    "Oracle chunk failed; using neutral values"
                );
                values.extend(std::iter::repeat(neutral.clone()).take(len));
                degraded_chunks.push(index);
            }
        }
    }

    BatchOutcome {
        values,
        degraded_chunks,
    }
}

async fn with_retry<T, F, Fut>(plan: &DispatchPlan, chunk: usize, mut f: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < plan.retry.retries => {
                attempt += 1;
                let delay = plan.retry.delay(attempt);
                debug!(
                    oracle = plan.oracle,
                    chunk,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying oracle chunk"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan(chunk_size: usize, max_in_flight: usize, retries: u32) -> DispatchPlan {
        DispatchPlan {
            oracle: "test",
            chunk_size,
            max_in_flight,
            retry: RetryPolicy::new(retries, Duration::from_millis(1), Duration::from_millis(2)),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(300));
        assert_eq!(policy.delay(2), Duration::from_millis(600));
        assert_eq!(policy.delay(3), Duration::from_millis(1200));
        assert_eq!(policy.delay(4), Duration::from_secs(2));
        assert_eq!(policy.delay(40), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_order_preserved_with_concurrency() {
        let items: Vec<u32> = (0..10).collect();
        let outcome = dispatch_chunks(&plan(3, 4, 0), &items, 0u32, |chunk| async move {
            // Later chunks finish first
            let wait = 10 - chunk[0] as u64;
            tokio::time::sleep(Duration::from_millis(wait)).await;
            Ok(chunk.iter().map(|x| x * 10).collect())
        })
        .await;

        assert_eq!(outcome.values, (0..10).map(|x| x * 10).collect::<Vec<_>>());
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_dispatch_runs_on_spawned_task() {
        let items: Vec<String> = (0..5).map(|i| format!("t{}", i)).collect();
        let handle = tokio::spawn(async move {
            dispatch_chunks(&plan(2, 2, 0), &items, 0usize, |chunk: Vec<String>| async move {
                Ok(chunk.iter().map(String::len).collect())
            })
            .await
        });

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.values, vec![2; 5]);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn test_failed_chunk_degrades_to_neutral() {
        let items: Vec<u32> = (0..6).collect();
        let outcome = dispatch_chunks(&plan(2, 1, 1), &items, -1.0f64, |chunk| async move {
            if chunk.contains(&2) {
                Err(OracleError::Protocol("boom".into()))
            } else {
                Ok(chunk.iter().map(|&x| x as f64).collect())
            }
        })
        .await;

        assert_eq!(outcome.values, vec![0.0, 1.0, -1.0, -1.0, 4.0, 5.0]);
        assert_eq!(outcome.degraded_chunks, vec![1]);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let attempts = AtomicUsize::new(0);
        let items = vec![1u32, 2];
        let outcome = dispatch_chunks(&plan(8, 1, 2), &items, 0u32, |chunk| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(OracleError::Protocol("flaky".into()))
                } else {
                    Ok(chunk)
                }
            }
        })
        .await;

        assert_eq!(outcome.values, vec![1, 2]);
        assert!(!outcome.is_degraded());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let attempts = AtomicUsize::new(0);
        let items = vec![1u32];
        let outcome = dispatch_chunks(&plan(8, 1, 2), &items, 0u32, |_chunk| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Err::<Vec<u32>, _>(OracleError::Status {
                    status: 400,
                    body: "bad".into(),
                })
            }
        })
        .await;

        assert_eq!(outcome.values, vec![0]);
        assert_eq!(outcome.degraded_chunks, vec![0]);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_length_mismatch_padded_and_truncated() {
        let items: Vec<u32> = (0..4).collect();
        let outcome = dispatch_chunks(&plan(2, 1, 0), &items, 0.0f64, |chunk| async move {
            if chunk[0] == 0 {
                Ok(vec![0.5])
            } else {
                Ok(vec![0.1, 0.2, 0.3])
            }
        })
        .await;

        assert_eq!(outcome.values, vec![0.5, 0.0, 0.1, 0.2]);
        assert!(!outcome.is_degraded());
    }
}
