//! The five refresh stages, in dependency order.
//!
//! Stage 1 (archetype summaries) feeds the detail stages: card statistics and
//! archetype deck lists derive their fetch targets from the names staged in
//! this run, and the matchup stage derives its deck ids from both staged deck
//! datasets. All of that sequencing happens through direct staging-table
//! reads, never through the service's own HTTP surface.

use crate::data::datasets::{Bracket, Dataset, DatasetKind, Mode};
use crate::data::models::{
    ArchetypeDeckRecord, ArchetypeRecord, CardImpact, CardStatsRecord, DeckCard, DeckRecord,
    MatchupRecord, Opponent,
};
use crate::data::{staging, swap};
use crate::guru::parse::{self, CardStatRow, DeckRow};
use crate::pipeline::batch::{run_batch, split_results, TargetFailure};
use crate::pipeline::fetcher::fetch_with_ladder;
use crate::pipeline::runner::PipelineConfig;
use crate::pipeline::{ladders, PipelineError};
use crate::guru::GuruClient;
use crate::state::{CardCatalog, TranslationCache};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Archetypes below this popularity share are noise and are not staged.
const MIN_POPULARITY_PERCENT: f64 = 0.2;

/// Everything a stage needs, snapshot for one mode family of one run.
pub struct StageContext<'a> {
    pub pool: &'a PgPool,
    pub guru: &'a GuruClient,
    pub translations: &'a TranslationCache,
    pub catalog: &'a CardCatalog,
    pub cfg: &'a PipelineConfig,
    pub mode: Mode,
}

/// What one stage produced. Per-target failures are carried for the run
/// report; they do not fail the stage.
pub struct StageOutcome {
    pub dataset: Dataset,
    pub records_written: usize,
    pub failures: Vec<TargetFailure>,
}

impl StageOutcome {
    fn empty(dataset: Dataset) -> Self {
        Self {
            dataset,
            records_written: 0,
            failures: Vec::new(),
        }
    }
}

/// Resolve scraped `(dbf_id, copies)` pairs against the card catalog.
fn build_deck_cards(catalog: &CardCatalog, cards: &[(u32, u32)]) -> Vec<DeckCard> {
    cards
        .iter()
        .filter_map(|&(dbf_id, copies)| {
            catalog.get(dbf_id).map(|card| DeckCard {
                card: card.clone(),
                copies,
            })
        })
        .collect()
}

fn legendary_count(cards: &[DeckCard]) -> i32 {
    cards
        .iter()
        .filter(|c| c.card.rarity.as_deref() == Some("LEGENDARY"))
        .count() as i32
}

fn card_impact(catalog: &CardCatalog, row: &CardStatRow) -> Option<CardImpact> {
    let card = catalog.get(row.dbf_id)?.clone();
    Some(CardImpact {
        card,
        mulligan_impact: row.mulligan_impact,
        drawn_impact: row.drawn_impact,
        kept_impact: row.kept_impact,
        mulligan_impact_color: parse::impact_color(row.mulligan_impact),
        drawn_impact_color: parse::impact_color(row.drawn_impact),
        kept_impact_color: parse::impact_color(row.kept_impact),
    })
}

/// Stage 1: archetype summaries per bracket from the meta page.
pub async fn archetypes(ctx: &StageContext<'_>) -> Result<StageOutcome, PipelineError> {
    let dataset = Dataset::new(DatasetKind::Archetypes, ctx.mode);

    let results = run_batch(
        Bracket::ALL.to_vec(),
        ctx.cfg.list_concurrency,
        ctx.cfg.inter_batch_delay,
        |bracket| async move {
            let fetched = fetch_with_ladder(
                ladders::META,
                ladders::META_MIN_VIABLE,
                ctx.cfg.attempt_timeout,
                ctx.cfg.attempt_delay,
                |threshold| ctx.guru.fetch_meta_rows(bracket, ctx.mode, threshold),
            )
            .await?;
            info!(
                bracket = %bracket,
                threshold = %fetched.threshold_used,
                count = fetched.records.len(),
                "fetched archetype summaries"
            );
            Ok((bracket, fetched.records))
        },
    )
    .await;

    let (per_bracket, failures) = split_results(results);
    let mut records = Vec::new();
    for (bracket, rows) in per_bracket {
        for row in rows {
            if row.popularity_percent <= MIN_POPULARITY_PERCENT {
                continue;
            }
            records.push(ArchetypeRecord {
                bracket: bracket.as_str().to_string(),
                localized_name: ctx.translations.localize(&row.name).to_string(),
                name: row.name,
                class: row.class,
                winrate: row.winrate,
                popularity_percent: row.popularity_percent,
                popularity_games: row.popularity_games,
                climbing_speed: row.climbing_speed,
            });
        }
    }

    let records_written = staging::upsert_archetypes(ctx.pool, dataset, records).await?;
    Ok(StageOutcome {
        dataset,
        records_written,
        failures,
    })
}

#[derive(Debug, Clone, Copy)]
struct DeckTarget {
    bracket: Bracket,
    past_day: bool,
}

impl fmt::Display for DeckTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.past_day {
            write!(f, "{} (past day)", self.bracket)
        } else {
            write!(f, "{}", self.bracket)
        }
    }
}

fn deck_record_from_row(
    ctx: &StageContext<'_>,
    bracket: Bracket,
    past_day: bool,
    position: usize,
    row: DeckRow,
) -> Option<DeckRecord> {
    let cards = build_deck_cards(ctx.catalog, &row.cards);
    if cards.is_empty() {
        debug!(deck_id = %row.deck_id, "no catalog entries for deck cards, skipping");
        return None;
    }
    Some(DeckRecord {
        deck_id: row.deck_id,
        bracket: bracket.as_str().to_string(),
        past_day,
        position: position as i32,
        localized_name: ctx.translations.localize(&row.name).to_string(),
        name: row.name,
        legendary_count: legendary_count(&cards),
        deck_code: row.deck_code,
        cards: Json(cards),
        dust: row.dust,
        games: row.games,
        winrate: row.winrate,
        class: row.class,
    })
}

/// Stage 2: top deck lists per bracket, for the all-time and past-day periods.
pub async fn decks(ctx: &StageContext<'_>) -> Result<StageOutcome, PipelineError> {
    let dataset = Dataset::new(DatasetKind::Decks, ctx.mode);

    let mut targets = Vec::with_capacity(Bracket::ALL.len() * 2);
    for bracket in Bracket::ALL {
        for past_day in [false, true] {
            targets.push(DeckTarget { bracket, past_day });
        }
    }

    let results = run_batch(
        targets,
        ctx.cfg.list_concurrency,
        ctx.cfg.inter_batch_delay,
        |target| async move {
            let fetched = fetch_with_ladder(
                ladders::DECK_LIST,
                ladders::DECK_LIST_MIN_VIABLE,
                ctx.cfg.attempt_timeout,
                ctx.cfg.attempt_delay,
                |threshold| {
                    ctx.guru
                        .fetch_deck_rows(target.bracket, ctx.mode, threshold, None, target.past_day)
                },
            )
            .await?;
            info!(
                target = %target,
                threshold = %fetched.threshold_used,
                count = fetched.records.len(),
                "fetched deck list"
            );
            Ok((target, fetched.records))
        },
    )
    .await;

    let (per_target, failures) = split_results(results);
    let mut records = Vec::new();
    for (target, rows) in per_target {
        for (position, row) in rows.into_iter().enumerate() {
            if let Some(record) =
                deck_record_from_row(ctx, target.bracket, target.past_day, position, row)
            {
                records.push(record);
            }
        }
    }

    let records_written = staging::upsert_decks(ctx.pool, dataset, records).await?;
    Ok(StageOutcome {
        dataset,
        records_written,
        failures,
    })
}

/// Stage 3: per-card statistics for every archetype staged in stage 1.
pub async fn card_stats(ctx: &StageContext<'_>) -> Result<StageOutcome, PipelineError> {
    let dataset = Dataset::new(DatasetKind::CardStats, ctx.mode);

    let archetype_names = staged_archetype_names(ctx).await?;
    if archetype_names.is_empty() {
        info!(dataset = %dataset, "no staged archetypes, skipping card statistics");
        return Ok(StageOutcome::empty(dataset));
    }
    info!(targets = archetype_names.len(), "fetching card statistics");

    let results = run_batch(
        archetype_names,
        ctx.cfg.detail_concurrency,
        ctx.cfg.inter_batch_delay,
        |archetype| async move {
            let mut records = Vec::new();
            for bracket in Bracket::ALL {
                let fetched = fetch_with_ladder(
                    ladders::SINGLE_PAGE,
                    1,
                    ctx.cfg.attempt_timeout,
                    ctx.cfg.attempt_delay,
                    |_| ctx.guru.fetch_card_stat_rows(&archetype, bracket, ctx.mode),
                )
                .await;
                match fetched {
                    Ok(f) if !f.records.is_empty() => {
                        let cards: Vec<CardImpact> = f
                            .records
                            .iter()
                            .filter_map(|row| card_impact(ctx.catalog, row))
                            .collect();
                        if cards.is_empty() {
                            continue;
                        }
                        records.push(CardStatsRecord {
                            archetype: archetype.clone(),
                            bracket: bracket.as_str().to_string(),
                            cards: Json(cards),
                        });
                    }
                    Ok(_) => {
                        debug!(archetype = %archetype, bracket = %bracket, "no card statistics published")
                    }
                    Err(e) => {
                        warn!(archetype = %archetype, bracket = %bracket, error = %e, "card statistics fetch exhausted")
                    }
                }
            }
            Ok(records)
        },
    )
    .await;

    let (per_archetype, failures) = split_results(results);
    let records: Vec<CardStatsRecord> = per_archetype.into_iter().flatten().collect();

    let records_written = staging::upsert_card_stats(ctx.pool, dataset, records).await?;
    Ok(StageOutcome {
        dataset,
        records_written,
        failures,
    })
}

/// Stage 4: deck lists filtered per archetype, with per-bracket ladders.
pub async fn archetype_decks(ctx: &StageContext<'_>) -> Result<StageOutcome, PipelineError> {
    let dataset = Dataset::new(DatasetKind::ArchetypeDecks, ctx.mode);

    let archetype_names = staged_archetype_names(ctx).await?;
    if archetype_names.is_empty() {
        info!(dataset = %dataset, "no staged archetypes, skipping archetype decks");
        return Ok(StageOutcome::empty(dataset));
    }
    info!(targets = archetype_names.len(), "fetching archetype deck lists");

    let results = run_batch(
        archetype_names,
        ctx.cfg.detail_concurrency,
        ctx.cfg.inter_batch_delay,
        |archetype| async move {
            let mut records = Vec::new();
            for bracket in Bracket::ALL {
                let ladder = ladders::archetype_decks(bracket, ctx.mode);
                let fetched = fetch_with_ladder(
                    ladder,
                    ladders::ARCHETYPE_DECKS_MIN_VIABLE,
                    ctx.cfg.attempt_timeout,
                    ctx.cfg.attempt_delay,
                    |threshold| {
                        ctx.guru
                            .fetch_deck_rows(bracket, ctx.mode, threshold, Some(&archetype), false)
                    },
                )
                .await;
                match fetched {
                    Ok(f) => {
                        debug!(
                            archetype = %archetype,
                            bracket = %bracket,
                            threshold = %f.threshold_used,
                            count = f.records.len(),
                            "fetched archetype decks"
                        );
                        for (position, mut row) in f.records.into_iter().enumerate() {
                            // The site echoes variant names here; keep the
                            // name the lists were filtered by.
                            row.name = archetype.clone();
                            let cards = build_deck_cards(ctx.catalog, &row.cards);
                            if cards.is_empty() {
                                continue;
                            }
                            records.push(ArchetypeDeckRecord {
                                deck_id: row.deck_id,
                                bracket: bracket.as_str().to_string(),
                                archetype: archetype.clone(),
                                position: position as i32,
                                localized_name: ctx
                                    .translations
                                    .localize(&row.name)
                                    .to_string(),
                                name: row.name,
                                legendary_count: legendary_count(&cards),
                                deck_code: row.deck_code,
                                cards: Json(cards),
                                dust: row.dust,
                                games: row.games,
                                winrate: row.winrate,
                                class: row.class,
                            });
                        }
                    }
                    Err(e) => {
                        warn!(archetype = %archetype, bracket = %bracket, error = %e, "archetype deck fetch exhausted")
                    }
                }
            }
            Ok(records)
        },
    )
    .await;

    let (per_archetype, failures) = split_results(results);
    let records: Vec<ArchetypeDeckRecord> = per_archetype.into_iter().flatten().collect();

    let records_written = staging::upsert_archetype_decks(ctx.pool, dataset, records).await?;
    Ok(StageOutcome {
        dataset,
        records_written,
        failures,
    })
}

/// Stage 5: matchup spreads for every deck staged in stages 2 and 4.
pub async fn deck_matchups(ctx: &StageContext<'_>) -> Result<StageOutcome, PipelineError> {
    let dataset = Dataset::new(DatasetKind::DeckMatchups, ctx.mode);

    let deck_ids = staged_deck_ids(ctx).await?;
    if deck_ids.is_empty() {
        info!(dataset = %dataset, "no staged decks, skipping matchups");
        return Ok(StageOutcome::empty(dataset));
    }
    info!(targets = deck_ids.len(), "fetching deck matchups");

    let results = run_batch(
        deck_ids,
        ctx.cfg.detail_concurrency,
        ctx.cfg.inter_batch_delay,
        |deck_id| async move {
            let mut records = Vec::new();
            for bracket in Bracket::ALL {
                let fetched = fetch_with_ladder(
                    ladders::SINGLE_PAGE,
                    1,
                    ctx.cfg.attempt_timeout,
                    ctx.cfg.attempt_delay,
                    |_| ctx.guru.fetch_matchup_rows(&deck_id, bracket),
                )
                .await;
                match fetched {
                    Ok(f) if !f.records.is_empty() => {
                        let opponents: Vec<Opponent> = f
                            .records
                            .into_iter()
                            .map(|row| Opponent {
                                class: row.class,
                                winrate: row.winrate,
                                games: row.games,
                            })
                            .collect();
                        records.push(MatchupRecord {
                            deck_id: deck_id.clone(),
                            bracket: bracket.as_str().to_string(),
                            opponents: Json(opponents),
                        });
                    }
                    Ok(_) => {
                        debug!(deck_id = %deck_id, bracket = %bracket, "no matchup data published")
                    }
                    Err(e) => {
                        warn!(deck_id = %deck_id, bracket = %bracket, error = %e, "matchup fetch exhausted")
                    }
                }
            }
            Ok(records)
        },
    )
    .await;

    let (per_deck, failures) = split_results(results);
    let records: Vec<MatchupRecord> = per_deck.into_iter().flatten().collect();

    let records_written = staging::upsert_matchups(ctx.pool, dataset, records).await?;
    Ok(StageOutcome {
        dataset,
        records_written,
        failures,
    })
}

/// Distinct archetype names staged by stage 1 this run; empty when the stage
/// produced nothing.
async fn staged_archetype_names(ctx: &StageContext<'_>) -> Result<Vec<String>, PipelineError> {
    let dataset = Dataset::new(DatasetKind::Archetypes, ctx.mode);
    if !swap::staging_exists(ctx.pool, dataset)
        .await
        .map_err(PipelineError::StageQuery)?
    {
        return Ok(Vec::new());
    }
    sqlx::query_scalar(&format!(
        "SELECT DISTINCT name FROM {} ORDER BY name",
        dataset.staging()
    ))
    .fetch_all(ctx.pool)
    .await
    .map_err(PipelineError::StageQuery)
}

/// Distinct deck ids staged by stages 2 and 4 this run.
async fn staged_deck_ids(ctx: &StageContext<'_>) -> Result<Vec<String>, PipelineError> {
    let mut ids = BTreeSet::new();
    for kind in [DatasetKind::Decks, DatasetKind::ArchetypeDecks] {
        let dataset = Dataset::new(kind, ctx.mode);
        if !swap::staging_exists(ctx.pool, dataset)
            .await
            .map_err(PipelineError::StageQuery)?
        {
            continue;
        }
        let batch: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT DISTINCT deck_id FROM {}",
            dataset.staging()
        ))
        .fetch_all(ctx.pool)
        .await
        .map_err(PipelineError::StageQuery)?;
        ids.extend(batch);
    }
    Ok(ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::CardInfo;

    fn catalog() -> CardCatalog {
        CardCatalog::from_cards(vec![
            CardInfo {
                dbf_id: 64,
                cost: Some(2),
                id: "EX1_001".to_string(),
                rarity: Some("LEGENDARY".to_string()),
                name: "Lightwarden".to_string(),
            },
            CardInfo {
                dbf_id: 70,
                cost: Some(1),
                id: "EX1_002".to_string(),
                rarity: Some("COMMON".to_string()),
                name: "Murloc Raider".to_string(),
            },
        ])
    }

    #[test]
    fn deck_cards_skip_unknown_catalog_entries() {
        let cards = build_deck_cards(&catalog(), &[(64, 2), (9999, 1), (70, 1)]);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].card.dbf_id, 64);
        assert_eq!(cards[0].copies, 2);
    }

    #[test]
    fn legendary_count_counts_only_legendaries() {
        let cards = build_deck_cards(&catalog(), &[(64, 1), (70, 2)]);
        assert_eq!(legendary_count(&cards), 1);
    }

    #[test]
    fn card_impact_requires_catalog_entry() {
        let row = CardStatRow {
            dbf_id: 9999,
            mulligan_impact: 1.0,
            drawn_impact: 1.0,
            kept_impact: 1.0,
        };
        assert!(card_impact(&catalog(), &row).is_none());

        let known = CardStatRow { dbf_id: 64, ..row };
        let impact = card_impact(&catalog(), &known).unwrap();
        assert_eq!(impact.card.name, "Lightwarden");
        assert_eq!(impact.mulligan_impact_color, impact.drawn_impact_color);
    }

    #[test]
    fn deck_target_labels_period() {
        let all_time = DeckTarget {
            bracket: Bracket::TopLegend,
            past_day: false,
        };
        let past_day = DeckTarget {
            bracket: Bracket::TopLegend,
            past_day: true,
        };
        assert_eq!(all_time.to_string(), "top_legend");
        assert_eq!(past_day.to_string(), "top_legend (past day)");
    }
}
