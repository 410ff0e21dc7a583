//! Daily refresh trigger.
//!
//! Wakes every minute and fires [`PipelineRunner::run`] once per day at the
//! configured UTC hour. The completion timestamp is persisted through
//! `app_kv`, so a restart shortly after a successful run does not trigger a
//! second harvest the same day.

use crate::data::kv;
use crate::pipeline::{PipelineError, PipelineRunner, Scope};
use crate::state::{ServiceStatus, ServiceStatusRegistry};
use crate::utils::fmt_duration;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// app_kv key persisting the last completed refresh across restarts.
pub const KV_LAST_REFRESH: &str = "scheduler.last_refresh";

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub struct Scheduler {
    pool: PgPool,
    runner: Arc<PipelineRunner>,
    refresh_hour_utc: u32,
    statuses: ServiceStatusRegistry,
}

/// The most recent scheduled fire time at or before `now`.
pub fn latest_scheduled_before(now: DateTime<Utc>, hour_utc: u32) -> DateTime<Utc> {
    let scheduled = now
        .date_naive()
        .and_hms_opt(hour_utc.min(23), 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    if scheduled <= now {
        scheduled
    } else {
        scheduled - ChronoDuration::days(1)
    }
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        runner: Arc<PipelineRunner>,
        refresh_hour_utc: u32,
        statuses: ServiceStatusRegistry,
    ) -> Self {
        Self {
            pool,
            runner,
            refresh_hour_utc,
            statuses,
        }
    }

    /// Runs the scheduler loop with graceful shutdown support.
    ///
    /// When a shutdown signal arrives while a refresh is in flight, the work
    /// task is cancelled and waited on briefly; an abandoned run leaves the
    /// lock held, which startup stale-lock recovery handles on the next boot.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(hour_utc = self.refresh_hour_utc, "Scheduler service started");
        self.statuses.set("scheduler", ServiceStatus::Active);

        let mut current_work: Option<(tokio::task::JoinHandle<()>, CancellationToken)> = None;

        loop {
            tokio::select! {
                _ = time::sleep(CHECK_INTERVAL) => {
                    if let Some((ref handle, _)) = current_work
                        && !handle.is_finished()
                    {
                        trace!("refresh still running, skipping cycle");
                        continue;
                    }

                    let now = Utc::now();
                    let due = latest_scheduled_before(now, self.refresh_hour_utc);
                    let last = kv::get_timestamp(&self.pool, KV_LAST_REFRESH)
                        .await
                        .unwrap_or(None);
                    if last.is_some_and(|ts| ts >= due) {
                        continue;
                    }

                    info!(scheduled_for = %due, "starting scheduled refresh");
                    let token = CancellationToken::new();
                    let handle = tokio::spawn({
                        let runner = self.runner.clone();
                        let pool = self.pool.clone();
                        let token = token.clone();
                        async move {
                            tokio::select! {
                                _ = async {
                                    match runner.run(Scope::All).await {
                                        Ok(report) => {
                                            info!(
                                                duration = fmt_duration(Duration::from_secs_f64(report.duration_secs)),
                                                records = report.total_records(),
                                                "scheduled refresh complete"
                                            );
                                            if let Err(e) = kv::set_timestamp(&pool, KV_LAST_REFRESH, Utc::now()).await {
                                                warn!(error = ?e, "failed to persist refresh timestamp");
                                            }
                                        }
                                        Err(PipelineError::LockContention) => {
                                            warn!("scheduled refresh skipped, another run is in progress");
                                        }
                                        Err(e) => error!(error = %e, "scheduled refresh failed"),
                                    }
                                } => {}
                                _ = token.cancelled() => {
                                    trace!("scheduled refresh cancelled");
                                }
                            }
                        }
                    });
                    current_work = Some((handle, token));
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    if let Some((handle, token)) = current_work.take() {
                        token.cancel();
                        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                            warn!("refresh work did not complete within 5s, abandoning");
                        }
                    }
                    break;
                }
            }
        }

        info!("Scheduler exiting gracefully");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn due_time_is_today_once_hour_passed() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 21, 30, 0).unwrap();
        let due = latest_scheduled_before(now, 20);
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 6, 15, 20, 0, 0).unwrap());
    }

    #[test]
    fn due_time_is_yesterday_before_hour() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 4, 0, 0).unwrap();
        let due = latest_scheduled_before(now, 20);
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 6, 14, 20, 0, 0).unwrap());
    }

    #[test]
    fn exact_hour_counts_as_due() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 20, 0, 0).unwrap();
        let due = latest_scheduled_before(now, 20);
        assert_eq!(due, now);
    }
}
