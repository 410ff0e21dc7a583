//! Record types for the five datasets, keyed by their natural keys.

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Catalog metadata for a collectible card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub dbf_id: u32,
    pub cost: Option<i32>,
    pub id: String,
    pub rarity: Option<String>,
    pub name: String,
}

/// A card within a deck list, with how many copies the deck runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckCard {
    #[serde(flatten)]
    pub card: CardInfo,
    pub copies: u32,
}

/// A card within a card statistics row, with its impact values and the
/// derived display colors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardImpact {
    #[serde(flatten)]
    pub card: CardInfo,
    pub mulligan_impact: f64,
    pub drawn_impact: f64,
    pub kept_impact: f64,
    pub mulligan_impact_color: String,
    pub drawn_impact_color: String,
    pub kept_impact_color: String,
}

/// An opponent class entry in a deck's matchup spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opponent {
    pub class: String,
    pub winrate: f64,
    pub games: i64,
}

/// The business-field tuple identifying a record within its dataset.
pub trait NaturalKey {
    fn natural_key(&self) -> String;
}

/// Archetype summary row. Natural key: `(bracket, name)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeRecord {
    pub bracket: String,
    pub name: String,
    pub localized_name: String,
    pub class: String,
    pub winrate: f64,
    pub popularity_percent: f64,
    pub popularity_games: i32,
    pub climbing_speed: f64,
}

impl NaturalKey for ArchetypeRecord {
    fn natural_key(&self) -> String {
        format!("{}\u{1f}{}", self.bracket, self.name)
    }
}

/// Deck list row. Natural key: `(deck_id, bracket, past_day)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DeckRecord {
    pub deck_id: String,
    pub bracket: String,
    pub past_day: bool,
    pub position: i32,
    pub name: String,
    pub localized_name: String,
    pub legendary_count: i32,
    pub deck_code: String,
    pub cards: Json<Vec<DeckCard>>,
    pub dust: i64,
    pub games: i64,
    pub winrate: f64,
    pub class: String,
}

impl NaturalKey for DeckRecord {
    fn natural_key(&self) -> String {
        format!("{}\u{1f}{}\u{1f}{}", self.deck_id, self.bracket, self.past_day)
    }
}

/// Per-archetype card statistics row. Natural key: `(archetype, bracket)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CardStatsRecord {
    pub archetype: String,
    pub bracket: String,
    pub cards: Json<Vec<CardImpact>>,
}

impl NaturalKey for CardStatsRecord {
    fn natural_key(&self) -> String {
        format!("{}\u{1f}{}", self.archetype, self.bracket)
    }
}

/// Deck list row filtered to a single archetype.
/// Natural key: `(deck_id, bracket, archetype)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeDeckRecord {
    pub deck_id: String,
    pub bracket: String,
    pub archetype: String,
    pub position: i32,
    pub name: String,
    pub localized_name: String,
    pub legendary_count: i32,
    pub deck_code: String,
    pub cards: Json<Vec<DeckCard>>,
    pub dust: i64,
    pub games: i64,
    pub winrate: f64,
    pub class: String,
}

impl NaturalKey for ArchetypeDeckRecord {
    fn natural_key(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.deck_id, self.bracket, self.archetype
        )
    }
}

/// Matchup spread for one deck. Natural key: `(deck_id, bracket)`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MatchupRecord {
    pub deck_id: String,
    pub bracket: String,
    pub opponents: Json<Vec<Opponent>>,
}

impl NaturalKey for MatchupRecord {
    fn natural_key(&self) -> String {
        format!("{}\u{1f}{}", self.deck_id, self.bracket)
    }
}
