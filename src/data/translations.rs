//! Database operations for the `translations` table (archetype name localizations).

use crate::data::datasets::{Dataset, DatasetKind, Mode};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TranslationEntry {
    pub source_name: String,
    pub localized_name: String,
}

/// All entries, for cache initialization.
pub async fn get_all(pool: &PgPool) -> Result<Vec<TranslationEntry>, sqlx::Error> {
    sqlx::query_as("SELECT source_name, localized_name FROM translations ORDER BY source_name")
        .fetch_all(pool)
        .await
}

/// Insert or update a single entry.
pub async fn upsert(
    pool: &PgPool,
    source_name: &str,
    localized_name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO translations (source_name, localized_name)
        VALUES ($1, $2)
        ON CONFLICT (source_name)
        DO UPDATE SET localized_name = EXCLUDED.localized_name, updated_at = now()
        "#,
    )
    .bind(source_name)
    .bind(localized_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Re-localize names in the live datasets that denormalize a localized name.
///
/// Used after translation entries change, so already-published data picks up
/// new localizations without waiting for the next refresh run.
pub async fn reapply(pool: &PgPool, mode: Mode) -> Result<u64, sqlx::Error> {
    let mut updated = 0;
    for kind in [
        DatasetKind::Archetypes,
        DatasetKind::Decks,
        DatasetKind::ArchetypeDecks,
    ] {
        let table = Dataset::new(kind, mode).live();
        let result = sqlx::query(&format!(
            r#"
            UPDATE {table} t
            SET localized_name = tr.localized_name, updated_at = now()
            FROM translations tr
            WHERE t.name = tr.source_name AND t.localized_name <> tr.localized_name
            "#
        ))
        .execute(pool)
        .await?;
        debug!(table = %table, rows = result.rows_affected(), "reapplied translations");
        updated += result.rows_affected();
    }
    Ok(updated)
}
