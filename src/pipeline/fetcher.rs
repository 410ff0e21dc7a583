//! Adaptive degrading retrieval: walk a threshold ladder until a viable
//! result is found.
//!
//! Each attempt is bounded by a per-attempt timeout; timeouts and transport
//! errors move to the next rung instead of aborting the fetch. The walk never
//! gives up before the ladder's end: the last rung is accepted regardless of
//! result size, and an undersized result from an earlier rung is kept as a
//! fallback in case later rungs fail outright.

use crate::pipeline::ladders::Threshold;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::{debug, warn};

/// A successful ladder walk.
#[derive(Debug)]
pub struct LadderFetch<T> {
    pub records: Vec<T>,
    /// The rung whose result was accepted.
    pub threshold_used: Threshold,
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Every rung of the ladder errored; the caller treats this as a
    /// non-fatal empty result for the target.
    #[error("no ladder attempt succeeded after {attempts} attempts")]
    ThresholdExhausted { attempts: u32 },
}

/// Try `attempt` at each rung of `ladder` in order.
///
/// Accepts the first result of at least `min_viable` records, or the last
/// rung's result regardless of size. A fixed `attempt_delay` is inserted
/// between attempts to respect the source's rate limits.
pub async fn fetch_with_ladder<T, E, F, Fut>(
    ladder: &[Threshold],
    min_viable: usize,
    per_attempt_timeout: Duration,
    attempt_delay: Duration,
    mut attempt: F,
) -> Result<LadderFetch<T>, FetchError>
where
    E: fmt::Display,
    F: FnMut(Threshold) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut attempts = 0u32;
    let mut fallback: Option<LadderFetch<T>> = None;
    let last_idx = ladder.len().saturating_sub(1);

    for (idx, &threshold) in ladder.iter().enumerate() {
        if attempts > 0 && !attempt_delay.is_zero() {
            time::sleep(attempt_delay).await;
        }
        attempts += 1;

        match time::timeout(per_attempt_timeout, attempt(threshold)).await {
            Err(_) => {
                warn!(threshold = %threshold, timeout = ?per_attempt_timeout, "fetch attempt timed out, degrading");
            }
            Ok(Err(e)) => {
                warn!(threshold = %threshold, error = %e, "fetch attempt failed, degrading");
            }
            Ok(Ok(records)) => {
                let fetched = LadderFetch {
                    records,
                    threshold_used: threshold,
                    attempts,
                };
                if fetched.records.len() >= min_viable || idx == last_idx {
                    return Ok(fetched);
                }
                debug!(
                    threshold = %threshold,
                    count = fetched.records.len(),
                    min_viable,
                    "result below minimum viable size, degrading"
                );
                if fallback
                    .as_ref()
                    .is_none_or(|f| f.records.len() < fetched.records.len())
                {
                    fallback = Some(fetched);
                }
            }
        }
    }

    // The last rung errored; fall back to the largest undersized result.
    if let Some(fetched) = fallback {
        return Ok(fetched);
    }
    Err(FetchError::ThresholdExhausted { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const L1: Threshold = Threshold::MinGames(1600);
    const L2: Threshold = Threshold::MinGames(800);
    const L3: Threshold = Threshold::MinGames(400);

    fn recorded() -> Arc<Mutex<Vec<Threshold>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_first_viable_rung_and_stops() {
        let calls = recorded();
        let seen = calls.clone();
        let result = fetch_with_ladder(
            &[L1, L2, L3],
            10,
            Duration::from_secs(5),
            Duration::from_millis(50),
            move |t| {
                seen.lock().unwrap().push(t);
                let count = match t {
                    L1 => 3,
                    L2 => 12,
                    _ => 99,
                };
                async move { Ok::<_, &str>(vec![0u8; count]) }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.threshold_used, L2);
        assert_eq!(result.records.len(), 12);
        assert_eq!(result.attempts, 2);
        assert_eq!(calls.lock().unwrap().as_slice(), &[L1, L2]);
    }

    #[tokio::test(start_paused = true)]
    async fn last_rung_accepted_regardless_of_size() {
        let result = fetch_with_ladder(
            &[L1, L2, L3],
            10,
            Duration::from_secs(5),
            Duration::ZERO,
            |t| {
                let count = match t {
                    L1 => 3,
                    L2 => 4,
                    _ => 1,
                };
                async move { Ok::<_, &str>(vec![0u8; count]) }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.threshold_used, L3);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn all_attempts_erroring_signals_exhaustion() {
        let result = fetch_with_ladder::<u8, _, _, _>(
            &[L1, L2, L3],
            10,
            Duration::from_secs(5),
            Duration::ZERO,
            |_| async { Err("connection refused") },
        )
        .await;

        match result {
            Err(FetchError::ThresholdExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn undersized_result_survives_later_errors() {
        let result = fetch_with_ladder(
            &[L1, L2, L3],
            10,
            Duration::from_secs(5),
            Duration::ZERO,
            |t| async move {
                match t {
                    L1 => Ok::<_, &str>(vec![0u8; 4]),
                    _ => Err("connection refused"),
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.threshold_used, L1);
        assert_eq!(result.records.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_attempt_times_out_and_degrades() {
        let result = fetch_with_ladder(
            &[L1, L2],
            10,
            Duration::from_secs(5),
            Duration::ZERO,
            |t| async move {
                if t == L1 {
                    std::future::pending::<Result<Vec<u8>, &str>>().await
                } else {
                    Ok(vec![0u8; 20])
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(result.threshold_used, L2);
        assert_eq!(result.records.len(), 20);
    }
}
