//! HTML extraction for the four guru page types.
//!
//! Parsing is lenient: a row missing required pieces is skipped rather than
//! failing the page, matching how the site intermittently renders partial
//! markup. Page-level emptiness is handled by the caller's threshold ladder.

use html_scraper::{ElementRef, Html, Selector};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(\.\d+)?").unwrap());
static WINRATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+\.?\d*)").unwrap());
static GAMES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Games:\s*(\d+)").unwrap());
static POPULARITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)%\s*\((\d+)\)").unwrap());
static CLIMBING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([-\d.]+)⭐/h").unwrap());
static CARD_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^card-(\d+)$").unwrap());

/// A deck entry scraped from a deck list page.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckRow {
    pub deck_id: String,
    pub name: String,
    pub deck_code: String,
    /// `(dbf_id, copies)` pairs, deduplicated within the deck.
    pub cards: Vec<(u32, u32)>,
    pub dust: i64,
    pub games: i64,
    pub winrate: f64,
    pub class: String,
}

/// An archetype summary row scraped from the meta page.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeRow {
    pub name: String,
    pub class: String,
    pub winrate: f64,
    pub popularity_percent: f64,
    pub popularity_games: i32,
    pub climbing_speed: f64,
}

/// A per-card impact row scraped from a card statistics page.
#[derive(Debug, Clone, PartialEq)]
pub struct CardStatRow {
    pub dbf_id: u32,
    pub mulligan_impact: f64,
    pub drawn_impact: f64,
    pub kept_impact: f64,
}

/// An opponent row scraped from a deck's matchup table.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupRow {
    pub class: String,
    pub winrate: f64,
    pub games: i64,
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// First number in `text`, or 0 if none parses.
pub fn parse_number(text: &str) -> f64 {
    NUMBER_RE
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// The class name carried as an extra CSS class alongside known layout classes.
fn extract_extra_class(el: ElementRef, known: &[&str]) -> String {
    el.value()
        .classes()
        .find(|c| !known.contains(c))
        .unwrap_or("unknown")
        .to_string()
}

/// Map an impact value to the red-green gradient used by the card stats view.
pub fn impact_color(value: f64) -> String {
    if value <= -20.0 {
        "rgb(255, 0, 0)".to_string()
    } else if value >= 20.0 {
        "rgb(0, 255, 0)".to_string()
    } else {
        let ratio = (value + 20.0) / 40.0;
        let red = (255.0 * (1.0 - ratio)).round() as u8;
        let green = (255.0 * ratio).round() as u8;
        format!("rgb({red}, {green}, 0)")
    }
}

/// Extract deck entries from a deck list page.
pub fn parse_deck_list(html_str: &str) -> Vec<DeckRow> {
    let html = Html::parse_document(html_str);
    let deck_sel = Selector::parse(r#"div[id^="deck_stats-"]"#).unwrap();
    let name_sel = Selector::parse(".deck-title a.basic-black-text").unwrap();
    let code_sel =
        Selector::parse(r#".deck-title span[style="font-size: 0; line-size: 0; display: block"]"#)
            .unwrap();
    let card_sel = Selector::parse("div[phx-value-card_id]").unwrap();
    let copies_sel =
        Selector::parse(".has-text-right.card-number.deck-text.decklist-card-background").unwrap();
    let dust_sel = Selector::parse(".dust-bar-inner").unwrap();
    let tag_sel = Selector::parse(".column.tag").unwrap();
    let class_sel = Selector::parse(".decklist-info.dust-bar").unwrap();

    let mut rows = Vec::new();
    for el in html.select(&deck_sel) {
        let Some(deck_id) = el.value().attr("id").and_then(|id| id.split('-').nth(1)) else {
            continue;
        };
        if deck_id.is_empty() {
            continue;
        }

        let name = el.select(&name_sel).next().map(element_text).unwrap_or_default();
        let deck_code = el.select(&code_sel).next().map(element_text).unwrap_or_default();
        let dust = el
            .select(&dust_sel)
            .next()
            .map(|e| parse_number(&element_text(e)) as i64)
            .unwrap_or(0);

        let tag_text = el.select(&tag_sel).next().map(element_text).unwrap_or_default();
        let winrate = WINRATE_RE
            .captures(&tag_text)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0.0);
        let games = GAMES_RE
            .captures(&tag_text)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);

        // The same card id can appear twice in the markup; last one wins.
        let mut cards: IndexMap<u32, u32> = IndexMap::new();
        for card_el in el.select(&card_sel) {
            let Some(dbf_id) = card_el
                .value()
                .attr("phx-value-card_id")
                .and_then(|v| v.parse().ok())
            else {
                continue;
            };
            let copies = card_el
                .select(&copies_sel)
                .next()
                .and_then(|c| element_text(c).parse().ok())
                .unwrap_or(1);
            cards.insert(dbf_id, copies);
        }

        let class = el
            .select(&class_sel)
            .next()
            .map(|e| extract_extra_class(e, &["basic-black-text", "decklist-info", "dust-bar"]))
            .unwrap_or_else(|| "unknown".to_string());

        if name.is_empty() || cards.is_empty() {
            continue;
        }

        rows.push(DeckRow {
            deck_id: deck_id.to_string(),
            name,
            deck_code,
            cards: cards.into_iter().collect(),
            dust,
            games,
            winrate,
            class,
        });
    }
    rows
}

/// Extract archetype summary rows from the meta page.
pub fn parse_meta_table(html_str: &str) -> Vec<ArchetypeRow> {
    let html = Html::parse_document(html_str);
    let row_sel = Selector::parse("tbody tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let link_sel = Selector::parse("a.basic-black-text").unwrap();
    let value_sel = Selector::parse(".basic-black-text").unwrap();

    let mut rows = Vec::new();
    for row in html.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&td_sel).collect();
        if cells.len() < 4 {
            continue;
        }

        let name = cells[0].select(&link_sel).next().map(element_text).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let class = extract_extra_class(cells[0], &["decklist-info", "basic-black-text"]);

        let winrate = cells[1]
            .select(&value_sel)
            .next()
            .map(|e| parse_number(&element_text(e)))
            .unwrap_or(0.0);

        let popularity_text = element_text(cells[2]);
        let (popularity_percent, popularity_games) = POPULARITY_RE
            .captures(&popularity_text)
            .map(|c| {
                (
                    c[1].parse().unwrap_or(0.0),
                    c[2].parse().unwrap_or(0),
                )
            })
            .unwrap_or((0.0, 0));

        let climbing_text = element_text(cells[cells.len() - 1]);
        let climbing_speed = CLIMBING_RE
            .captures(&climbing_text)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0.0);

        rows.push(ArchetypeRow {
            name,
            class,
            winrate,
            popularity_percent,
            popularity_games,
            climbing_speed,
        });
    }
    rows
}

/// Extract per-card impact rows from a card statistics page.
pub fn parse_card_stats(html_str: &str) -> Vec<CardStatRow> {
    let html = Html::parse_document(html_str);
    let row_sel = Selector::parse("tbody tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let card_sel = Selector::parse(".decklist-card").unwrap();
    let value_sel = Selector::parse(".basic-black-text").unwrap();

    let mut rows = Vec::new();
    for row in html.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&td_sel).collect();
        if cells.len() < 4 {
            continue;
        }

        let Some(dbf_id) = row.select(&card_sel).next().and_then(|el| {
            el.value()
                .classes()
                .find_map(|c| CARD_CLASS_RE.captures(c).and_then(|m| m[1].parse().ok()))
        }) else {
            continue;
        };

        let impact = |cell: ElementRef| {
            cell.select(&value_sel)
                .next()
                .map(|e| parse_number(&element_text(e)))
                .unwrap_or(0.0)
        };

        rows.push(CardStatRow {
            dbf_id,
            mulligan_impact: impact(cells[1]),
            drawn_impact: impact(cells[2]),
            kept_impact: impact(cells[3]),
        });
    }
    rows
}

/// Extract opponent rows from a deck's matchup table.
pub fn parse_matchups(html_str: &str) -> Vec<MatchupRow> {
    let html = Html::parse_document(html_str);
    let row_sel = Selector::parse("tbody tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let tag_sel = Selector::parse(".tag").unwrap();
    let value_sel = Selector::parse(".basic-black-text").unwrap();

    let mut rows = Vec::new();
    for row in html.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&td_sel).collect();
        if cells.len() < 3 {
            continue;
        }

        let class = if element_text(cells[0]) == "Total" {
            "total".to_string()
        } else {
            cells[0]
                .select(&tag_sel)
                .next()
                .map(|e| extract_extra_class(e, &["tag", "player-name"]))
                .unwrap_or_else(|| "unknown".to_string())
        };

        let winrate = cells[1]
            .select(&value_sel)
            .next()
            .map(|e| parse_number(&element_text(e)))
            .unwrap_or(0.0);
        let games = parse_number(&element_text(cells[2])) as i64;

        rows.push(MatchupRow {
            class,
            winrate,
            games,
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK_LIST_HTML: &str = r#"
        <div id="deck_stats-12345">
            <div class="deck-title">
                <a class="basic-black-text">Pirate Rogue</a>
                <span style="font-size: 0; line-size: 0; display: block">AAECAaIHBMv</span>
            </div>
            <div class="decklist-info dust-bar rogue basic-black-text">
                <div class="dust-bar-inner">5200</div>
            </div>
            <div class="column tag">55.3% Games: 1234</div>
            <div phx-value-card_id="64">
                <div class="has-text-right card-number deck-text decklist-card-background">2</div>
            </div>
            <div phx-value-card_id="70">
                <div class="has-text-right card-number deck-text decklist-card-background"></div>
            </div>
        </div>
        <div id="deck_stats-">
            <div class="deck-title"><a class="basic-black-text">Broken</a></div>
        </div>
    "#;

    #[test]
    fn deck_list_extracts_fields() {
        let rows = parse_deck_list(DECK_LIST_HTML);
        assert_eq!(rows.len(), 1);
        let deck = &rows[0];
        assert_eq!(deck.deck_id, "12345");
        assert_eq!(deck.name, "Pirate Rogue");
        assert_eq!(deck.deck_code, "AAECAaIHBMv");
        assert_eq!(deck.class, "rogue");
        assert_eq!(deck.dust, 5200);
        assert_eq!(deck.games, 1234);
        assert!((deck.winrate - 55.3).abs() < f64::EPSILON);
    }

    #[test]
    fn deck_list_card_copies_default_to_one() {
        let rows = parse_deck_list(DECK_LIST_HTML);
        assert_eq!(rows[0].cards, vec![(64, 2), (70, 1)]);
    }

    #[test]
    fn deck_list_skips_entries_without_cards() {
        let html = r#"
            <div id="deck_stats-99">
                <div class="deck-title"><a class="basic-black-text">Cardless</a></div>
            </div>
        "#;
        assert!(parse_deck_list(html).is_empty());
    }

    const META_HTML: &str = r#"
        <table><tbody>
            <tr>
                <td class="decklist-info basic-black-text warrior">
                    <a class="basic-black-text">Control Warrior</a>
                </td>
                <td><span class="basic-black-text">52.1</span></td>
                <td>3.4% (1523)</td>
                <td>0.42⭐/h</td>
            </tr>
            <tr>
                <td class="decklist-info basic-black-text"><a class="basic-black-text"></a></td>
                <td><span class="basic-black-text">50.0</span></td>
                <td>1.0% (10)</td>
                <td>0.1⭐/h</td>
            </tr>
        </tbody></table>
    "#;

    #[test]
    fn meta_table_extracts_rows() {
        let rows = parse_meta_table(META_HTML);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.name, "Control Warrior");
        assert_eq!(row.class, "warrior");
        assert!((row.winrate - 52.1).abs() < f64::EPSILON);
        assert!((row.popularity_percent - 3.4).abs() < f64::EPSILON);
        assert_eq!(row.popularity_games, 1523);
        assert!((row.climbing_speed - 0.42).abs() < f64::EPSILON);
    }

    const CARD_STATS_HTML: &str = r#"
        <table><tbody>
            <tr>
                <td><div class="decklist-card card-64"></div></td>
                <td><span class="basic-black-text">3.2</span></td>
                <td><span class="basic-black-text">-1.5</span></td>
                <td><span class="basic-black-text">0.8</span></td>
            </tr>
            <tr>
                <td><div class="decklist-card"></div></td>
                <td><span class="basic-black-text">1.0</span></td>
                <td><span class="basic-black-text">1.0</span></td>
                <td><span class="basic-black-text">1.0</span></td>
            </tr>
        </tbody></table>
    "#;

    #[test]
    fn card_stats_extracts_impacts() {
        let rows = parse_card_stats(CARD_STATS_HTML);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.dbf_id, 64);
        assert!((row.mulligan_impact - 3.2).abs() < f64::EPSILON);
        assert!((row.drawn_impact - -1.5).abs() < f64::EPSILON);
        assert!((row.kept_impact - 0.8).abs() < f64::EPSILON);
    }

    const MATCHUP_HTML: &str = r#"
        <table><tbody>
            <tr>
                <td class="player-name"><span class="tag player-name mage">Mage</span></td>
                <td><span class="basic-black-text">47.5</span></td>
                <td>321</td>
            </tr>
            <tr>
                <td>Total</td>
                <td><span class="basic-black-text">51.0</span></td>
                <td>5000</td>
            </tr>
        </tbody></table>
    "#;

    #[test]
    fn matchups_extract_class_and_total() {
        let rows = parse_matchups(MATCHUP_HTML);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class, "mage");
        assert!((rows[0].winrate - 47.5).abs() < f64::EPSILON);
        assert_eq!(rows[0].games, 321);
        assert_eq!(rows[1].class, "total");
        assert_eq!(rows[1].games, 5000);
    }

    #[test]
    fn number_parsing_handles_junk() {
        assert_eq!(parse_number("  52.3% "), 52.3);
        assert_eq!(parse_number("-1.5"), -1.5);
        assert_eq!(parse_number("n/a"), 0.0);
    }

    #[test]
    fn impact_color_gradient() {
        assert_eq!(impact_color(-25.0), "rgb(255, 0, 0)");
        assert_eq!(impact_color(25.0), "rgb(0, 255, 0)");
        assert_eq!(impact_color(0.0), "rgb(128, 128, 0)");
    }
}
