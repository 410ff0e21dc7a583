//! Promotion of staging instances to live, atomically per dataset.
//!
//! One promotion is a single transaction: drop the old backup, rename live to
//! backup, rename staging to live. Readers therefore flip from the old
//! generation to the new one at commit, never observing a partial batch.
//! Promotions across datasets are sequential and intentionally NOT wrapped in
//! one cross-dataset transaction; a crash between two promotions leaves the
//! earlier dataset updated and the later one not, recoverable through the
//! admin force-promote/cleanup operations.

use crate::data::datasets::Dataset;
use sqlx::PgPool;
use tracing::{debug, info};

/// A rename/promotion step failed.
#[derive(Debug, thiserror::Error)]
#[error("promoting staging for {dataset} failed")]
pub struct SwapError {
    pub dataset: String,
    #[source]
    pub source: anyhow::Error,
}

fn swap_err(dataset: Dataset, source: impl Into<anyhow::Error>) -> SwapError {
    SwapError {
        dataset: dataset.live(),
        source: source.into(),
    }
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
        .bind(table)
        .fetch_one(pool)
        .await?;
    Ok(found.is_some())
}

/// Whether a staging instance currently exists for the dataset.
pub async fn staging_exists(pool: &PgPool, dataset: Dataset) -> Result<bool, sqlx::Error> {
    table_exists(pool, &dataset.staging()).await
}

/// Promote the staging instance to live.
///
/// No-op returning `false` when no staging instance exists. Otherwise the
/// backup/live/staging rotation happens in one transaction and `true` is
/// returned.
pub async fn promote(pool: &PgPool, dataset: Dataset) -> Result<bool, SwapError> {
    if !staging_exists(pool, dataset)
        .await
        .map_err(|e| swap_err(dataset, e))?
    {
        debug!(dataset = %dataset, "no staging instance, nothing to promote");
        return Ok(false);
    }

    let mut tx = pool.begin().await.map_err(|e| swap_err(dataset, e))?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", dataset.backup()))
        .execute(&mut *tx)
        .await
        .map_err(|e| swap_err(dataset, e))?;
    sqlx::query(&format!(
        "ALTER TABLE IF EXISTS {} RENAME TO {}",
        dataset.live(),
        dataset.backup()
    ))
    .execute(&mut *tx)
    .await
    .map_err(|e| swap_err(dataset, e))?;
    sqlx::query(&format!(
        "ALTER TABLE {} RENAME TO {}",
        dataset.staging(),
        dataset.live()
    ))
    .execute(&mut *tx)
    .await
    .map_err(|e| swap_err(dataset, e))?;

    tx.commit().await.map_err(|e| swap_err(dataset, e))?;

    info!(dataset = %dataset, "staging promoted to live");
    Ok(true)
}

/// Drop a staging instance without promoting it. Returns whether one existed.
pub async fn cleanup_staging(pool: &PgPool, dataset: Dataset) -> Result<bool, sqlx::Error> {
    if !staging_exists(pool, dataset).await? {
        return Ok(false);
    }
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", dataset.staging()))
        .execute(pool)
        .await?;
    Ok(true)
}

/// Row count of the staging instance, or `None` when it does not exist.
pub async fn staging_count(pool: &PgPool, dataset: Dataset) -> Result<Option<i64>, sqlx::Error> {
    if !staging_exists(pool, dataset).await? {
        return Ok(None);
    }
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", dataset.staging()))
        .fetch_one(pool)
        .await?;
    Ok(Some(count))
}
