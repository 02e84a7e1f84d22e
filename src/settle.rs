//! All-settle aggregation for batches of independent async jobs.
//!
//! [`settle_all`] drives every job to completion with bounded concurrency and
//! hands back one `Result` per input, in input order. A failing job never
//! cancels its siblings. [`bounded`] puts a deadline on a single call and
//! turns expiry into an ordinary error value.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Duration;

/// Run `f` over every item with at most `concurrency` futures in flight.
///
/// Completion order is arbitrary; the returned vector is re-sorted so that
/// `out[i]` is the outcome of the `i`-th input item.
pub async fn settle_all<I, T, E, F, Fut>(items: I, concurrency: usize, mut f: F) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut settled: Vec<(usize, Result<T, E>)> = stream::iter(items.into_iter().enumerate())
        .map(|(i, item)| {
            let fut = f(item);
            async move { (i, fut.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    settled.sort_by_key(|(i, _)| *i);
    settled.into_iter().map(|(_, r)| r).collect()
}

/// Await `fut`, giving up after `limit`. `on_timeout` receives the limit in
/// whole seconds and builds the caller's error type.
pub async fn bounded<T, E, Fut>(
    limit: Duration,
    fut: Fut,
    on_timeout: impl FnOnce(u64) -> E,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        // Later items finish first.
        let out = settle_all(vec![30u64, 20, 10, 0], 4, |ms| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, String>(ms)
        })
        .await;
        let values: Vec<u64> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![30, 20, 10, 0]);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let out = settle_all(1..=5, 2, |n| async move {
            if n == 3 {
                Err(format!("boom {n}"))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        assert_eq!(out.len(), 5);
        assert_eq!(out[2], Err("boom 3".to_string()));
        let ok: Vec<i32> = out.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(ok, vec![10, 20, 40, 50]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        settle_all(0..12, 3, |_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ()>(())
            }
        })
        .await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let out: Vec<Result<(), ()>> = settle_all(Vec::<u8>::new(), 4, |_| async { Ok(()) }).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let r: Result<(), String> = bounded(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |secs| format!("timed out after {secs}s"),
        )
        .await;
        assert_eq!(r, Err("timed out after 0s".to_string()));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let r: Result<u8, String> =
            bounded(Duration::from_secs(1), async { Ok(7) }, |_| "late".into()).await;
        assert_eq!(r, Ok(7));
    }
}
