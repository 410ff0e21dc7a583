//! Orchestration of a refresh run: lock lifecycle, stage sequencing,
//! commit-or-abort, and the run report.

use crate::config::Config;
use crate::data::datasets::{Dataset, DatasetKind, Mode};
use crate::data::{lock, swap};
use crate::guru::GuruClient;
use crate::pipeline::batch::TargetFailure;
use crate::pipeline::stages::{self, StageContext, StageOutcome};
use crate::pipeline::PipelineError;
use crate::state::{self, CardCatalog, TranslationCache};
use crate::utils::fmt_duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Which dataset families a run rebuilds. Families run sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Standard,
    Wild,
    #[default]
    All,
}

impl Scope {
    pub fn modes(self) -> &'static [Mode] {
        match self {
            Scope::Standard => &[Mode::Standard],
            Scope::Wild => &[Mode::Wild],
            Scope::All => &[Mode::Standard, Mode::Wild],
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Standard => "standard",
            Scope::Wild => "wild",
            Scope::All => "all",
        };
        f.write_str(s)
    }
}

/// Knobs the pipeline stages run with; derived from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub list_concurrency: usize,
    pub detail_concurrency: usize,
    pub inter_batch_delay: Duration,
    pub attempt_delay: Duration,
    pub attempt_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            list_concurrency: config.list_concurrency,
            detail_concurrency: config.detail_concurrency,
            inter_batch_delay: config.inter_batch_delay(),
            attempt_delay: config.attempt_delay(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub dataset: String,
    pub records_written: usize,
    pub failed_targets: usize,
}

/// Observability summary of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub scope: Scope,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub stages: Vec<StageReport>,
    /// Non-fatal per-target failures collected across all stages.
    pub failures: Vec<TargetFailure>,
}

impl RunReport {
    pub fn total_records(&self) -> usize {
        self.stages.iter().map(|s| s.records_written).sum()
    }
}

/// Sequences stages, decides commit vs. abort, and owns the lock lifecycle.
pub struct PipelineRunner {
    pool: PgPool,
    guru: Arc<GuruClient>,
    translations: Arc<RwLock<TranslationCache>>,
    catalog: Arc<RwLock<CardCatalog>>,
    cfg: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(
        pool: PgPool,
        guru: Arc<GuruClient>,
        translations: Arc<RwLock<TranslationCache>>,
        catalog: Arc<RwLock<CardCatalog>>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            pool,
            guru,
            translations,
            catalog,
            cfg,
        }
    }

    /// Execute a refresh run.
    ///
    /// Rejects immediately with [`PipelineError::LockContention`] when another
    /// run holds the lock; there is no queueing. The lock is released on both
    /// the success and failure paths.
    pub async fn run(&self, scope: Scope) -> Result<RunReport, PipelineError> {
        match lock::acquire(&self.pool).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(scope = %scope, "refresh rejected, update lock is held");
                return Err(PipelineError::LockContention);
            }
            Err(e) => return Err(PipelineError::Lock(e)),
        }
        info!(scope = %scope, "refresh run started");

        let result = self.run_locked(scope).await;

        if let Err(e) = lock::release(&self.pool).await {
            error!(error = ?e, "failed to release update lock");
        }

        match &result {
            Ok(report) => info!(
                scope = %scope,
                duration = fmt_duration(Duration::from_secs_f64(report.duration_secs)),
                records = report.total_records(),
                failed_targets = report.failures.len(),
                "refresh run complete"
            ),
            Err(e) => error!(scope = %scope, error = %e, "refresh run failed"),
        }
        result
    }

    async fn run_locked(&self, scope: Scope) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let started = Instant::now();

        self.refresh_caches().await;
        let translations = self.translations.read().await.clone();
        let catalog = self.catalog.read().await.clone();

        let mut stage_reports = Vec::new();
        let mut failures = Vec::new();

        for &mode in scope.modes() {
            self.drop_orphaned_staging(mode).await?;

            let ctx = StageContext {
                pool: &self.pool,
                guru: &self.guru,
                translations: &translations,
                catalog: &catalog,
                cfg: &self.cfg,
                mode,
            };

            if let Err(e) = run_stages(&ctx, &mut stage_reports, &mut failures).await {
                error!(mode = %mode, error = %e, "stage failed, discarding staged data for this run");
                self.discard_staging(mode).await;
                return Err(e);
            }

            // All stages of this family succeeded; promote in stage order.
            // Datasets whose stage wrote nothing have no staging instance
            // and are skipped inside promote().
            for dataset in Dataset::all_for(mode) {
                swap::promote(&self.pool, dataset).await?;
            }
        }

        Ok(RunReport {
            scope,
            started_at,
            duration_secs: started.elapsed().as_secs_f64(),
            stages: stage_reports,
            failures,
        })
    }

    /// Refresh the card catalog and translation cache before the stages read
    /// them. Failures keep the previous cache generation; the run proceeds.
    async fn refresh_caches(&self) {
        match state::reload_card_catalog(&self.guru, &self.catalog).await {
            Ok(count) => info!(cards = count, "card catalog refreshed"),
            Err(e) => warn!(error = %e, "card catalog refresh failed, keeping previous catalog"),
        }
        match state::reload_translations(&self.pool, &self.translations).await {
            Ok(count) => info!(entries = count, "translation cache refreshed"),
            Err(e) => warn!(error = %e, "translation reload failed, keeping previous cache"),
        }
    }

    /// Drop staging instances left behind by a crashed run. The stages derive
    /// fetch targets from staging tables, so stale instances must not leak
    /// into this run.
    async fn drop_orphaned_staging(&self, mode: Mode) -> Result<(), PipelineError> {
        for dataset in Dataset::all_for(mode) {
            if swap::cleanup_staging(&self.pool, dataset)
                .await
                .map_err(PipelineError::StageQuery)?
            {
                warn!(dataset = %dataset, "dropped orphaned staging instance from a previous run");
            }
        }
        Ok(())
    }

    /// Best-effort staging cleanup on the abort path.
    async fn discard_staging(&self, mode: Mode) {
        for dataset in Dataset::all_for(mode) {
            match swap::cleanup_staging(&self.pool, dataset).await {
                Ok(true) => info!(dataset = %dataset, "staging discarded"),
                Ok(false) => {}
                Err(e) => error!(dataset = %dataset, error = ?e, "failed to drop staging instance"),
            }
        }
    }
}

async fn run_stages(
    ctx: &StageContext<'_>,
    reports: &mut Vec<StageReport>,
    failures: &mut Vec<TargetFailure>,
) -> Result<(), PipelineError> {
    let total = DatasetKind::STAGE_ORDER.len();
    record_outcome(stages::archetypes(ctx).await?, 1, total, reports, failures);
    record_outcome(stages::decks(ctx).await?, 2, total, reports, failures);
    record_outcome(stages::card_stats(ctx).await?, 3, total, reports, failures);
    record_outcome(
        stages::archetype_decks(ctx).await?,
        4,
        total,
        reports,
        failures,
    );
    record_outcome(
        stages::deck_matchups(ctx).await?,
        5,
        total,
        reports,
        failures,
    );
    Ok(())
}

fn record_outcome(
    outcome: StageOutcome,
    index: usize,
    total: usize,
    reports: &mut Vec<StageReport>,
    failures: &mut Vec<TargetFailure>,
) {
    info!(
        stage = format!("{index}/{total}"),
        dataset = %outcome.dataset,
        records = outcome.records_written,
        failed_targets = outcome.failures.len(),
        "stage complete"
    );
    reports.push(StageReport {
        dataset: outcome.dataset.live(),
        records_written: outcome.records_written,
        failed_targets: outcome.failures.len(),
    });
    failures.extend(outcome.failures);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_selects_mode_families() {
        assert_eq!(Scope::Standard.modes(), &[Mode::Standard]);
        assert_eq!(Scope::Wild.modes(), &[Mode::Wild]);
        assert_eq!(Scope::All.modes(), &[Mode::Standard, Mode::Wild]);
    }

    #[test]
    fn run_report_sums_stage_records() {
        let report = RunReport {
            scope: Scope::Standard,
            started_at: Utc::now(),
            duration_secs: 1.0,
            stages: vec![
                StageReport {
                    dataset: "archetypes".into(),
                    records_written: 40,
                    failed_targets: 0,
                },
                StageReport {
                    dataset: "decks".into(),
                    records_written: 160,
                    failed_targets: 2,
                },
            ],
            failures: Vec::new(),
        };
        assert_eq!(report.total_records(), 200);
    }
}
