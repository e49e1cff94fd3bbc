//! Bounded-concurrency fan-out with inter-batch pacing.

use std::future::Future;
use std::time::Duration;

use futures::future;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Awaited between chunks only, never after the last.
    pub pacing_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            pacing_delay: Duration::from_secs(2),
        }
    }
}

/// Run `tasks` in consecutive chunks of `batch_size`; within a chunk all
/// futures run concurrently, and output order matches input order.
///
/// Fail-fast: the first `Err` in a chunk (by input index) aborts the whole
/// call, and later chunks are never started. Chunk K+1 never starts before
/// chunk K fully completes.
pub async fn run_batched<T, E, F>(tasks: Vec<F>, options: &BatchOptions) -> Result<Vec<T>, E>
where
    F: Future<Output = Result<T, E>>,
{
    let total = tasks.len();
    let mut results = Vec::with_capacity(total);
    let mut remaining = tasks.into_iter().peekable();
    let mut processed = 0usize;

    while remaining.peek().is_some() {
        let chunk: Vec<F> = remaining
            .by_ref()
            .take(options.batch_size.max(1))
            .collect();
        processed += chunk.len();

        for result in future::join_all(chunk).await {
            results.push(result?);
        }

        if remaining.peek().is_some() {
            debug!(processed, total, "chunk complete, pacing before next");
            tokio::time::sleep(options.pacing_delay).await;
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn options() -> BatchOptions {
        BatchOptions {
            batch_size: 50,
            pacing_delay: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_of_120_pace_exactly_twice_and_preserve_order() {
        let tasks: Vec<_> = (0..120)
            .map(|i| async move { Ok::<usize, &'static str>(i) })
            .collect();

        let started = tokio::time::Instant::now();
        let results = run_batched(tasks, &options()).await.unwrap();

        assert_eq!(results.len(), 120);
        assert!(results.iter().enumerate().all(|(i, &v)| i == v));
        // Three chunks, two pacing delays, none after the final chunk.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_in_second_chunk_stops_third_chunk_from_starting() {
        let polled = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..120)
            .map(|i| {
                let polled = polled.clone();
                async move {
                    polled.fetch_add(1, Ordering::SeqCst);
                    if i == 73 {
                        Err("boom")
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let result = run_batched(tasks, &options()).await;

        assert_eq!(result.unwrap_err(), "boom");
        // Chunks one and two ran; chunk three was never started.
        assert_eq!(polled.load(Ordering::SeqCst), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn single_chunk_has_no_pacing_delay() {
        let tasks: Vec<_> = (0..10)
            .map(|i| async move { Ok::<usize, &'static str>(i) })
            .collect();

        let started = tokio::time::Instant::now();
        let results = run_batched(tasks, &options()).await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_task_list_returns_empty_results() {
        let tasks: Vec<std::future::Ready<Result<(), ()>>> = Vec::new();
        let results = run_batched(tasks, &options()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_by_input_index_wins_within_a_chunk() {
        let tasks: Vec<_> = (0..3)
            .map(|i| async move {
                if i >= 1 {
                    Err(format!("task {i} failed"))
                } else {
                    Ok(i)
                }
            })
            .collect();

        let err = run_batched(tasks, &options()).await.unwrap_err();
        assert_eq!(err, "task 1 failed");
    }
}
