//! Idempotent bulk upserts into staging instances.
//!
//! A staging table is created lazily on the first actual write (`LIKE` the
//! live table, so natural-key uniqueness carries over). Stages that produce
//! zero records therefore leave no staging instance behind, and promotion
//! later skips them. Batches are deduplicated by natural key before writing
//! (last write in traversal order wins), so re-applying the same batch is a
//! no-op for the final state.

use crate::data::datasets::Dataset;
use crate::data::models::{
    ArchetypeDeckRecord, ArchetypeRecord, CardStatsRecord, DeckRecord, MatchupRecord, NaturalKey,
};
use crate::utils::log_if_slow;
use indexmap::IndexMap;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::debug;

const SLOW_WRITE_THRESHOLD: Duration = Duration::from_millis(500);

/// A bulk upsert against a staging instance failed. Fatal to the stage: the
/// underlying write is not all-or-nothing across rows, but a partially
/// written staging table is never promoted.
#[derive(Debug, thiserror::Error)]
#[error("staging write to {dataset} failed")]
pub struct StagingWriteError {
    pub dataset: String,
    #[source]
    pub source: anyhow::Error,
}

fn write_err(dataset: Dataset, source: impl Into<anyhow::Error>) -> StagingWriteError {
    StagingWriteError {
        dataset: dataset.live(),
        source: source.into(),
    }
}

/// Deduplicate a batch by natural key; the last record for a key wins.
pub fn dedupe_by_key<R: NaturalKey>(records: Vec<R>) -> Vec<R> {
    let mut by_key: IndexMap<String, R> = IndexMap::with_capacity(records.len());
    for record in records {
        by_key.insert(record.natural_key(), record);
    }
    by_key.into_values().collect()
}

async fn ensure_staging(pool: &PgPool, dataset: Dataset) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (LIKE {} INCLUDING ALL)",
        dataset.staging(),
        dataset.live()
    ))
    .execute(pool)
    .await?;
    Ok(())
}

fn json_column<T: serde::Serialize>(
    items: impl Iterator<Item = T>,
) -> Result<Vec<serde_json::Value>, serde_json::Error> {
    items.map(|item| serde_json::to_value(&item)).collect()
}

/// Upsert archetype summaries into the staging instance.
pub async fn upsert_archetypes(
    pool: &PgPool,
    dataset: Dataset,
    records: Vec<ArchetypeRecord>,
) -> Result<usize, StagingWriteError> {
    let records = dedupe_by_key(records);
    if records.is_empty() {
        debug!(dataset = %dataset, "no records to stage");
        return Ok(0);
    }
    ensure_staging(pool, dataset)
        .await
        .map_err(|e| write_err(dataset, e))?;

    let brackets: Vec<&str> = records.iter().map(|r| r.bracket.as_str()).collect();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let localized: Vec<&str> = records.iter().map(|r| r.localized_name.as_str()).collect();
    let classes: Vec<&str> = records.iter().map(|r| r.class.as_str()).collect();
    let winrates: Vec<f64> = records.iter().map(|r| r.winrate).collect();
    let pop_percents: Vec<f64> = records.iter().map(|r| r.popularity_percent).collect();
    let pop_games: Vec<i32> = records.iter().map(|r| r.popularity_games).collect();
    let climbing: Vec<f64> = records.iter().map(|r| r.climbing_speed).collect();

    let start = Instant::now();
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (bracket, name, localized_name, class, winrate,
                        popularity_percent, popularity_games, climbing_speed)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[],
                             $5::float8[], $6::float8[], $7::int4[], $8::float8[])
        ON CONFLICT (bracket, name) DO UPDATE SET
            localized_name = EXCLUDED.localized_name,
            class = EXCLUDED.class,
            winrate = EXCLUDED.winrate,
            popularity_percent = EXCLUDED.popularity_percent,
            popularity_games = EXCLUDED.popularity_games,
            climbing_speed = EXCLUDED.climbing_speed,
            updated_at = now()
        "#,
        dataset.staging()
    ))
    .bind(&brackets)
    .bind(&names)
    .bind(&localized)
    .bind(&classes)
    .bind(&winrates)
    .bind(&pop_percents)
    .bind(&pop_games)
    .bind(&climbing)
    .execute(pool)
    .await
    .map_err(|e| write_err(dataset, e))?;
    log_if_slow(start, SLOW_WRITE_THRESHOLD, "upsert archetypes staging");

    Ok(records.len())
}

/// Upsert deck list rows into the staging instance.
pub async fn upsert_decks(
    pool: &PgPool,
    dataset: Dataset,
    records: Vec<DeckRecord>,
) -> Result<usize, StagingWriteError> {
    let records = dedupe_by_key(records);
    if records.is_empty() {
        debug!(dataset = %dataset, "no records to stage");
        return Ok(0);
    }
    ensure_staging(pool, dataset)
        .await
        .map_err(|e| write_err(dataset, e))?;

    let deck_ids: Vec<&str> = records.iter().map(|r| r.deck_id.as_str()).collect();
    let brackets: Vec<&str> = records.iter().map(|r| r.bracket.as_str()).collect();
    let past_days: Vec<bool> = records.iter().map(|r| r.past_day).collect();
    let positions: Vec<i32> = records.iter().map(|r| r.position).collect();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let localized: Vec<&str> = records.iter().map(|r| r.localized_name.as_str()).collect();
    let legendaries: Vec<i32> = records.iter().map(|r| r.legendary_count).collect();
    let deck_codes: Vec<&str> = records.iter().map(|r| r.deck_code.as_str()).collect();
    let cards = json_column(records.iter().map(|r| &r.cards))
        .map_err(|e| write_err(dataset, e))?;
    let dusts: Vec<i64> = records.iter().map(|r| r.dust).collect();
    let games: Vec<i64> = records.iter().map(|r| r.games).collect();
    let winrates: Vec<f64> = records.iter().map(|r| r.winrate).collect();
    let classes: Vec<&str> = records.iter().map(|r| r.class.as_str()).collect();

    let start = Instant::now();
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (deck_id, bracket, past_day, position, name, localized_name,
                        legendary_count, deck_code, cards, dust, games, winrate, class)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::bool[], $4::int4[], $5::text[],
                             $6::text[], $7::int4[], $8::text[], $9::jsonb[], $10::int8[],
                             $11::int8[], $12::float8[], $13::text[])
        ON CONFLICT (deck_id, bracket, past_day) DO UPDATE SET
            position = EXCLUDED.position,
            name = EXCLUDED.name,
            localized_name = EXCLUDED.localized_name,
            legendary_count = EXCLUDED.legendary_count,
            deck_code = EXCLUDED.deck_code,
            cards = EXCLUDED.cards,
            dust = EXCLUDED.dust,
            games = EXCLUDED.games,
            winrate = EXCLUDED.winrate,
            class = EXCLUDED.class,
            updated_at = now()
        "#,
        dataset.staging()
    ))
    .bind(&deck_ids)
    .bind(&brackets)
    .bind(&past_days)
    .bind(&positions)
    .bind(&names)
    .bind(&localized)
    .bind(&legendaries)
    .bind(&deck_codes)
    .bind(&cards)
    .bind(&dusts)
    .bind(&games)
    .bind(&winrates)
    .bind(&classes)
    .execute(pool)
    .await
    .map_err(|e| write_err(dataset, e))?;
    log_if_slow(start, SLOW_WRITE_THRESHOLD, "upsert decks staging");

    Ok(records.len())
}

/// Upsert card statistics rows into the staging instance.
pub async fn upsert_card_stats(
    pool: &PgPool,
    dataset: Dataset,
    records: Vec<CardStatsRecord>,
) -> Result<usize, StagingWriteError> {
    let records = dedupe_by_key(records);
    if records.is_empty() {
        debug!(dataset = %dataset, "no records to stage");
        return Ok(0);
    }
    ensure_staging(pool, dataset)
        .await
        .map_err(|e| write_err(dataset, e))?;

    let archetypes: Vec<&str> = records.iter().map(|r| r.archetype.as_str()).collect();
    let brackets: Vec<&str> = records.iter().map(|r| r.bracket.as_str()).collect();
    let cards = json_column(records.iter().map(|r| &r.cards))
        .map_err(|e| write_err(dataset, e))?;

    let start = Instant::now();
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (archetype, bracket, cards)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::jsonb[])
        ON CONFLICT (archetype, bracket) DO UPDATE SET
            cards = EXCLUDED.cards,
            updated_at = now()
        "#,
        dataset.staging()
    ))
    .bind(&archetypes)
    .bind(&brackets)
    .bind(&cards)
    .execute(pool)
    .await
    .map_err(|e| write_err(dataset, e))?;
    log_if_slow(start, SLOW_WRITE_THRESHOLD, "upsert card stats staging");

    Ok(records.len())
}

/// Upsert archetype-filtered deck rows into the staging instance.
pub async fn upsert_archetype_decks(
    pool: &PgPool,
    dataset: Dataset,
    records: Vec<ArchetypeDeckRecord>,
) -> Result<usize, StagingWriteError> {
    let records = dedupe_by_key(records);
    if records.is_empty() {
        debug!(dataset = %dataset, "no records to stage");
        return Ok(0);
    }
    ensure_staging(pool, dataset)
        .await
        .map_err(|e| write_err(dataset, e))?;

    let deck_ids: Vec<&str> = records.iter().map(|r| r.deck_id.as_str()).collect();
    let brackets: Vec<&str> = records.iter().map(|r| r.bracket.as_str()).collect();
    let archetypes: Vec<&str> = records.iter().map(|r| r.archetype.as_str()).collect();
    let positions: Vec<i32> = records.iter().map(|r| r.position).collect();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let localized: Vec<&str> = records.iter().map(|r| r.localized_name.as_str()).collect();
    let legendaries: Vec<i32> = records.iter().map(|r| r.legendary_count).collect();
    let deck_codes: Vec<&str> = records.iter().map(|r| r.deck_code.as_str()).collect();
    let cards = json_column(records.iter().map(|r| &r.cards))
        .map_err(|e| write_err(dataset, e))?;
    let dusts: Vec<i64> = records.iter().map(|r| r.dust).collect();
    let games: Vec<i64> = records.iter().map(|r| r.games).collect();
    let winrates: Vec<f64> = records.iter().map(|r| r.winrate).collect();
    let classes: Vec<&str> = records.iter().map(|r| r.class.as_str()).collect();

    let start = Instant::now();
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (deck_id, bracket, archetype, position, name, localized_name,
                        legendary_count, deck_code, cards, dust, games, winrate, class)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::int4[], $5::text[],
                             $6::text[], $7::int4[], $8::text[], $9::jsonb[], $10::int8[],
                             $11::int8[], $12::float8[], $13::text[])
        ON CONFLICT (deck_id, bracket, archetype) DO UPDATE SET
            position = EXCLUDED.position,
            name = EXCLUDED.name,
            localized_name = EXCLUDED.localized_name,
            legendary_count = EXCLUDED.legendary_count,
            deck_code = EXCLUDED.deck_code,
            cards = EXCLUDED.cards,
            dust = EXCLUDED.dust,
            games = EXCLUDED.games,
            winrate = EXCLUDED.winrate,
            class = EXCLUDED.class,
            updated_at = now()
        "#,
        dataset.staging()
    ))
    .bind(&deck_ids)
    .bind(&brackets)
    .bind(&archetypes)
    .bind(&positions)
    .bind(&names)
    .bind(&localized)
    .bind(&legendaries)
    .bind(&deck_codes)
    .bind(&cards)
    .bind(&dusts)
    .bind(&games)
    .bind(&winrates)
    .bind(&classes)
    .execute(pool)
    .await
    .map_err(|e| write_err(dataset, e))?;
    log_if_slow(start, SLOW_WRITE_THRESHOLD, "upsert archetype decks staging");

    Ok(records.len())
}

/// Upsert matchup rows into the staging instance.
pub async fn upsert_matchups(
    pool: &PgPool,
    dataset: Dataset,
    records: Vec<MatchupRecord>,
) -> Result<usize, StagingWriteError> {
    let records = dedupe_by_key(records);
    if records.is_empty() {
        debug!(dataset = %dataset, "no records to stage");
        return Ok(0);
    }
    ensure_staging(pool, dataset)
        .await
        .map_err(|e| write_err(dataset, e))?;

    let deck_ids: Vec<&str> = records.iter().map(|r| r.deck_id.as_str()).collect();
    let brackets: Vec<&str> = records.iter().map(|r| r.bracket.as_str()).collect();
    let opponents = json_column(records.iter().map(|r| &r.opponents))
        .map_err(|e| write_err(dataset, e))?;

    let start = Instant::now();
    sqlx::query(&format!(
        r#"
        INSERT INTO {} (deck_id, bracket, opponents)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::jsonb[])
        ON CONFLICT (deck_id, bracket) DO UPDATE SET
            opponents = EXCLUDED.opponents,
            updated_at = now()
        "#,
        dataset.staging()
    ))
    .bind(&deck_ids)
    .bind(&brackets)
    .bind(&opponents)
    .execute(pool)
    .await
    .map_err(|e| write_err(dataset, e))?;
    log_if_slow(start, SLOW_WRITE_THRESHOLD, "upsert matchups staging");

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archetype(bracket: &str, name: &str, winrate: f64) -> ArchetypeRecord {
        ArchetypeRecord {
            bracket: bracket.to_string(),
            name: name.to_string(),
            localized_name: name.to_string(),
            class: "mage".to_string(),
            winrate,
            popularity_percent: 1.0,
            popularity_games: 100,
            climbing_speed: 0.1,
        }
    }

    #[test]
    fn dedupe_keeps_last_record_for_key() {
        let records = vec![
            archetype("top_legend", "Mech Mage", 50.0),
            archetype("top_legend", "Pirate Rogue", 52.0),
            archetype("top_legend", "Mech Mage", 54.5),
        ];
        let deduped = dedupe_by_key(records);
        assert_eq!(deduped.len(), 2);
        let mech = deduped.iter().find(|r| r.name == "Mech Mage").unwrap();
        assert!((mech.winrate - 54.5).abs() < f64::EPSILON);
    }

    #[test]
    fn dedupe_distinguishes_brackets() {
        let records = vec![
            archetype("top_legend", "Mech Mage", 50.0),
            archetype("top_10k", "Mech Mage", 51.0),
        ];
        assert_eq!(dedupe_by_key(records).len(), 2);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let records = vec![
            archetype("top_legend", "Mech Mage", 50.0),
            archetype("top_legend", "Mech Mage", 54.5),
            archetype("top_10k", "Pirate Rogue", 48.0),
        ];
        let once = dedupe_by_key(records);
        let keys_once: Vec<String> = once.iter().map(|r| r.natural_key()).collect();
        let twice = dedupe_by_key(once);
        let keys_twice: Vec<String> = twice.iter().map(|r| r.natural_key()).collect();
        assert_eq!(keys_once, keys_twice);
    }
}
