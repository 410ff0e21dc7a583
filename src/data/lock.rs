//! The run-exclusivity guard: a single-row flag coordinating the refresh
//! pipeline (writer) with the query layer (readers).
//!
//! Acquisition is a single conditional upsert, so two concurrent triggers
//! cannot both observe "idle" and proceed: exactly one of them gets the row
//! back. Release is unconditional and runs on both the success and failure
//! paths of a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub is_updating: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            is_updating: false,
            locked_at: None,
            unlocked_at: None,
        }
    }
}

/// Attempt to acquire the lock. Returns `false` when another run holds it.
///
/// The row is created lazily on the first run. The conditional update only
/// fires when the stored state is idle, making this a compare-and-set.
pub async fn acquire(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let acquired: Option<(DateTime<Utc>,)> = sqlx::query_as(
        r#"
        INSERT INTO update_lock (id, is_updating, locked_at, unlocked_at)
        VALUES (TRUE, TRUE, now(), NULL)
        ON CONFLICT (id) DO UPDATE
        SET is_updating = TRUE, locked_at = now(), unlocked_at = NULL
        WHERE update_lock.is_updating = FALSE
        RETURNING locked_at
        "#,
    )
    .fetch_optional(pool)
    .await?;
    Ok(acquired.is_some())
}

/// Release the lock unconditionally, stamping `unlocked_at`.
pub async fn release(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE update_lock SET is_updating = FALSE, unlocked_at = now() WHERE id")
        .execute(pool)
        .await?;
    Ok(())
}

/// Release a lock still held from a previous process, if any.
///
/// The lock is single-process, so a held lock at startup can only be a crash
/// leftover. Returns whether a stale lock was released.
pub async fn release_stale(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE update_lock SET is_updating = FALSE, unlocked_at = now() WHERE id AND is_updating",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Current lock state; idle defaults before the first run ever starts.
pub async fn read(pool: &PgPool) -> Result<LockState, sqlx::Error> {
    let state: Option<LockState> =
        sqlx::query_as("SELECT is_updating, locked_at, unlocked_at FROM update_lock WHERE id")
            .fetch_optional(pool)
            .await?;
    Ok(state.unwrap_or_default())
}
