//! Read handlers: filtered, sorted projections over the live datasets,
//! grouped by bracket.

use axum::extract::{Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::datasets::Mode;
use crate::data::live;
use crate::data::models::{
    ArchetypeDeckRecord, ArchetypeRecord, CardImpact, DeckRecord, Opponent,
};
use crate::state::AppState;
use crate::web::error::{db_error, ApiError};
use crate::web::routes::{cache, with_cache_control};

/// Time window of a deck list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    #[default]
    AllTime,
    PastDay,
}

impl Period {
    fn past_day(self) -> bool {
        matches!(self, Period::PastDay)
    }
}

#[derive(Debug, Deserialize)]
pub struct ModeParams {
    #[serde(default)]
    pub mode: Mode,
}

#[derive(Debug, Deserialize)]
pub struct DecksParams {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub period: Period,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeParams {
    #[serde(default)]
    pub mode: Mode,
    pub archetype: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckParams {
    #[serde(default)]
    pub mode: Mode,
    pub deck_id: String,
}

#[derive(Serialize)]
pub struct DecksResponse {
    pub data: BTreeMap<String, Vec<DeckRecord>>,
    pub mode: Mode,
    pub period: Period,
}

#[derive(Serialize)]
pub struct GroupedResponse<T> {
    pub data: BTreeMap<String, Vec<T>>,
    pub mode: Mode,
}

fn group_by_bracket<T>(rows: Vec<T>, bracket_of: impl Fn(&T) -> String) -> BTreeMap<String, Vec<T>> {
    let mut grouped: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for row in rows {
        grouped.entry(bracket_of(&row)).or_default().push(row);
    }
    grouped
}

/// Deck lists grouped by bracket, in list position order.
pub(super) async fn decks(
    State(state): State<AppState>,
    Query(params): Query<DecksParams>,
) -> Result<Response, ApiError> {
    let rows = live::decks(&state.db_pool, params.mode, params.period.past_day())
        .await
        .map_err(db_error)?;
    let data = group_by_bracket(rows, |r| r.bracket.clone());
    Ok(with_cache_control(
        DecksResponse {
            data,
            mode: params.mode,
            period: params.period,
        },
        cache::SEARCH,
    ))
}

/// Archetype summaries grouped by bracket, winrate descending.
pub(super) async fn archetypes(
    State(state): State<AppState>,
    Query(params): Query<ModeParams>,
) -> Result<Response, ApiError> {
    let rows = live::archetypes(&state.db_pool, params.mode)
        .await
        .map_err(db_error)?;
    let data: BTreeMap<String, Vec<ArchetypeRecord>> =
        group_by_bracket(rows, |r| r.bracket.clone());
    Ok(with_cache_control(
        GroupedResponse {
            data,
            mode: params.mode,
        },
        cache::SEARCH,
    ))
}

/// Card statistics for one archetype, keyed by bracket.
pub(super) async fn card_stats(
    State(state): State<AppState>,
    Query(params): Query<ArchetypeParams>,
) -> Result<Response, ApiError> {
    if params.archetype.is_empty() {
        return Err(ApiError::bad_request("missing required archetype parameter"));
    }
    let rows = live::card_stats(&state.db_pool, params.mode, &params.archetype)
        .await
        .map_err(db_error)?;
    let data: BTreeMap<String, Vec<CardImpact>> = rows
        .into_iter()
        .map(|r| (r.bracket, r.cards.0))
        .collect();
    Ok(with_cache_control(
        GroupedResponse {
            data,
            mode: params.mode,
        },
        cache::DETAIL,
    ))
}

/// Deck lists filtered to one archetype, grouped by bracket.
pub(super) async fn archetype_decks(
    State(state): State<AppState>,
    Query(params): Query<ArchetypeParams>,
) -> Result<Response, ApiError> {
    if params.archetype.is_empty() {
        return Err(ApiError::bad_request("missing required archetype parameter"));
    }
    let rows = live::archetype_decks(&state.db_pool, params.mode, &params.archetype)
        .await
        .map_err(db_error)?;
    let data: BTreeMap<String, Vec<ArchetypeDeckRecord>> =
        group_by_bracket(rows, |r| r.bracket.clone());
    Ok(with_cache_control(
        GroupedResponse {
            data,
            mode: params.mode,
        },
        cache::DETAIL,
    ))
}

/// Matchup spreads for one deck, keyed by bracket.
pub(super) async fn deck_matchups(
    State(state): State<AppState>,
    Query(params): Query<DeckParams>,
) -> Result<Response, ApiError> {
    if params.deck_id.is_empty() {
        return Err(ApiError::bad_request("missing required deckId parameter"));
    }
    let rows = live::deck_matchups(&state.db_pool, params.mode, &params.deck_id)
        .await
        .map_err(db_error)?;
    let data: BTreeMap<String, Vec<Opponent>> = rows
        .into_iter()
        .map(|r| (r.bracket, r.opponents.0))
        .collect();
    Ok(with_cache_control(
        GroupedResponse {
            data,
            mode: params.mode,
        },
        cache::DETAIL,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_defaults_to_all_time() {
        assert_eq!(Period::default(), Period::AllTime);
        assert!(!Period::AllTime.past_day());
        assert!(Period::PastDay.past_day());
    }

    #[test]
    fn grouping_preserves_row_order_within_bracket() {
        let rows = vec![
            ("top_legend", 1),
            ("top_10k", 2),
            ("top_legend", 3),
        ];
        let grouped = group_by_bracket(rows, |r| r.0.to_string());
        assert_eq!(grouped["top_legend"], vec![("top_legend", 1), ("top_legend", 3)]);
        assert_eq!(grouped["top_10k"], vec![("top_10k", 2)]);
    }
}
