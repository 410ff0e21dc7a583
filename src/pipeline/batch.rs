//! Bounded fan-out over fetch targets.
//!
//! Targets are partitioned into consecutive chunks of the configured
//! concurrency; chunks run sequentially while targets within a chunk run
//! concurrently. A failing target never cancels its siblings or halts later
//! chunks; its failure is captured in place so the caller decides what the
//! stage does with it.

use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

/// A single target's terminal failure, captured without aborting the batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Run `per_target` for every target with bounded concurrency.
///
/// `results[i]` corresponds to `targets[i]`. `inter_batch_delay` is applied
/// after each chunk completes, success or not, to bound request rate against
/// the external source.
pub async fn run_batch<T, U, F, Fut>(
    targets: Vec<T>,
    concurrency: usize,
    inter_batch_delay: Duration,
    mut per_target: F,
) -> Vec<Result<U, TargetFailure>>
where
    T: Clone + fmt::Display,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = anyhow::Result<U>>,
{
    if targets.is_empty() {
        return Vec::new();
    }

    let concurrency = concurrency.max(1);
    let total_chunks = targets.len().div_ceil(concurrency);
    let mut results = Vec::with_capacity(targets.len());

    for (chunk_idx, chunk) in targets.chunks(concurrency).enumerate() {
        debug!(
            chunk = chunk_idx + 1,
            total_chunks,
            size = chunk.len(),
            "running batch chunk"
        );

        let futures: Vec<_> = chunk
            .iter()
            .map(|target| {
                let label = target.to_string();
                let fut = per_target(target.clone());
                async move {
                    fut.await.map_err(|e| {
                        let error = format!("{e:#}");
                        warn!(target = %label, error = %error, "batch target failed");
                        TargetFailure {
                            target: label,
                            error,
                        }
                    })
                }
            })
            .collect();

        results.extend(join_all(futures).await);

        if !inter_batch_delay.is_zero() {
            time::sleep(inter_batch_delay).await;
        }
    }

    results
}

/// Split batch results into successes and captured failures.
pub fn split_results<U>(results: Vec<Result<U, TargetFailure>>) -> (Vec<U>, Vec<TargetFailure>) {
    let mut successes = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(failure) => failures.push(failure),
        }
    }
    (successes, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn results_align_with_targets() {
        let results = run_batch(
            vec![1u32, 2, 3, 4, 5],
            2,
            Duration::from_millis(100),
            |n| async move { Ok(n * 10) },
        )
        .await;

        let values: Vec<u32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![10, 20, 30, 40, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_target_does_not_halt_siblings_or_later_chunks() {
        let results = run_batch(
            vec![1u32, 2, 3, 4],
            2,
            Duration::ZERO,
            |n| async move {
                if n == 2 {
                    Err(anyhow!("boom"))
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        let failure = results[1].as_ref().unwrap_err();
        assert_eq!(failure.target, "2");
        assert!(failure.error.contains("boom"));
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_run_sequentially() {
        let started = Arc::new(Mutex::new(Vec::new()));
        let observer = started.clone();
        run_batch(vec![1u32, 2, 3], 2, Duration::ZERO, move |n| {
            observer.lock().unwrap().push(n);
            async move { Ok::<_, anyhow::Error>(n) }
        })
        .await;

        // Target 3 is only started after the first chunk completed.
        assert_eq!(started.lock().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_targets_yield_empty_results() {
        let results =
            run_batch(Vec::<u32>::new(), 3, Duration::from_secs(1), |n| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }

    #[test]
    fn split_results_partitions() {
        let results: Vec<Result<u32, TargetFailure>> = vec![
            Ok(1),
            Err(TargetFailure {
                target: "x".into(),
                error: "failed".into(),
            }),
            Ok(3),
        ];
        let (ok, failed) = split_results(results);
        assert_eq!(ok, vec![1, 3]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].target, "x");
    }
}
