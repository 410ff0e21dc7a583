//! Read-only projections over live dataset instances.
//!
//! These are the thin queries the web layer serves; they never touch staging
//! or backup instances.

use crate::data::datasets::{Dataset, DatasetKind, Mode};
use crate::data::models::{
    ArchetypeDeckRecord, ArchetypeRecord, CardStatsRecord, DeckRecord, MatchupRecord,
};
use sqlx::PgPool;

/// Deck lists for a period, ordered by bracket then list position.
///
/// Rows without cards are filtered out; a deck entry whose card extraction
/// failed upstream is not worth showing.
pub async fn decks(pool: &PgPool, mode: Mode, past_day: bool) -> Result<Vec<DeckRecord>, sqlx::Error> {
    let table = Dataset::new(DatasetKind::Decks, mode).live();
    sqlx::query_as(&format!(
        r#"
        SELECT deck_id, bracket, past_day, position, name, localized_name,
               legendary_count, deck_code, cards, dust, games, winrate, class
        FROM {table}
        WHERE past_day = $1 AND jsonb_array_length(cards) > 0
        ORDER BY bracket, position
        "#
    ))
    .bind(past_day)
    .fetch_all(pool)
    .await
}

/// Archetype summaries, ordered by bracket then winrate descending.
pub async fn archetypes(pool: &PgPool, mode: Mode) -> Result<Vec<ArchetypeRecord>, sqlx::Error> {
    let table = Dataset::new(DatasetKind::Archetypes, mode).live();
    sqlx::query_as(&format!(
        r#"
        SELECT bracket, name, localized_name, class, winrate,
               popularity_percent, popularity_games, climbing_speed
        FROM {table}
        ORDER BY bracket, winrate DESC
        "#
    ))
    .fetch_all(pool)
    .await
}

/// Card statistics for one archetype across brackets.
pub async fn card_stats(
    pool: &PgPool,
    mode: Mode,
    archetype: &str,
) -> Result<Vec<CardStatsRecord>, sqlx::Error> {
    let table = Dataset::new(DatasetKind::CardStats, mode).live();
    sqlx::query_as(&format!(
        "SELECT archetype, bracket, cards FROM {table} WHERE archetype = $1"
    ))
    .bind(archetype)
    .fetch_all(pool)
    .await
}

/// Deck lists filtered to one archetype, ordered by bracket then position.
pub async fn archetype_decks(
    pool: &PgPool,
    mode: Mode,
    archetype: &str,
) -> Result<Vec<ArchetypeDeckRecord>, sqlx::Error> {
    let table = Dataset::new(DatasetKind::ArchetypeDecks, mode).live();
    sqlx::query_as(&format!(
        r#"
        SELECT deck_id, bracket, archetype, position, name, localized_name,
               legendary_count, deck_code, cards, dust, games, winrate, class
        FROM {table}
        WHERE archetype = $1 AND jsonb_array_length(cards) > 0
        ORDER BY bracket, position
        "#
    ))
    .bind(archetype)
    .fetch_all(pool)
    .await
}

/// Matchup spreads for one deck across brackets.
pub async fn deck_matchups(
    pool: &PgPool,
    mode: Mode,
    deck_id: &str,
) -> Result<Vec<MatchupRecord>, sqlx::Error> {
    let table = Dataset::new(DatasetKind::DeckMatchups, mode).live();
    sqlx::query_as(&format!(
        "SELECT deck_id, bracket, opponents FROM {table} WHERE deck_id = $1"
    ))
    .bind(deck_id)
    .fetch_all(pool)
    .await
}
