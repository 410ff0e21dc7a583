//! Client for the deck statistics site ("guru") and its card catalog endpoint.
//!
//! The site is server-rendered HTML (Phoenix LiveView); every fetch is a plain
//! GET whose response body is handed to the parsers in [`parse`]. Retry policy
//! does not live here: callers walk a degrading threshold ladder instead
//! (`pipeline::fetcher`), so a single failed request is simply reported.

pub mod errors;
pub mod parse;

pub use errors::GuruError;

use crate::data::datasets::{Bracket, Mode};
use crate::data::models::CardInfo;
use crate::pipeline::ladders::Threshold;
use anyhow::Context;
use parse::{ArchetypeRow, CardStatRow, DeckRow, MatchupRow};
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// A collectible card as served by the catalog JSON endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogCard {
    dbf_id: u32,
    cost: Option<i32>,
    id: String,
    rarity: Option<String>,
    name: String,
}

pub struct GuruClient {
    http: reqwest::Client,
    base: Url,
    catalog_url: Url,
}

impl GuruClient {
    pub fn new(base_url: &str, catalog_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("metaguru/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base: Url::parse(base_url).context("invalid guru base URL")?,
            catalog_url: Url::parse(catalog_url).context("invalid card catalog URL")?,
        })
    }

    /// The `format` query parameter distinguishing the two game modes.
    fn format_param(mode: Mode) -> &'static str {
        match mode {
            Mode::Wild => "1",
            Mode::Standard => "2",
        }
    }

    fn page_url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    /// URL of a deck list page, optionally filtered to a single archetype
    /// or restricted to the past day.
    pub fn deck_list_url(
        &self,
        bracket: Bracket,
        mode: Mode,
        threshold: Threshold,
        archetype: Option<&str>,
        past_day: bool,
    ) -> Url {
        let mut url = self.page_url("/decks");
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("rank", bracket.as_str());
            q.append_pair("format", Self::format_param(mode));
            if let Threshold::MinGames(n) = threshold {
                q.append_pair("min_games", &n.to_string());
            }
            if let Some(name) = archetype {
                q.append_pair("player_deck_archetype[]", name);
            }
            if past_day {
                q.append_pair("period", "past_day");
            }
        }
        url
    }

    /// URL of the archetype summary ("meta") page.
    pub fn meta_url(&self, bracket: Bracket, mode: Mode, threshold: Threshold) -> Url {
        let mut url = self.page_url("/meta");
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("rank", bracket.as_str());
            q.append_pair("format", Self::format_param(mode));
            if let Threshold::MinGames(n) = threshold {
                q.append_pair("min_games", &n.to_string());
            }
        }
        url
    }

    /// URL of an archetype's per-card statistics page.
    pub fn card_stats_url(&self, archetype: &str, bracket: Bracket, mode: Mode) -> Url {
        let mut url = self.page_url("/card-stats");
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("archetype", archetype);
            q.append_pair("rank", bracket.as_str());
            q.append_pair("format", Self::format_param(mode));
        }
        url
    }

    /// URL of a single deck's matchup page.
    pub fn deck_url(&self, deck_id: &str, bracket: Bracket) -> Url {
        let mut url = self.page_url(&format!("/deck/{deck_id}"));
        url.query_pairs_mut().append_pair("rank", bracket.as_str());
        url
    }

    async fn get_page(&self, url: Url) -> Result<String, GuruError> {
        trace!(url = %url, "fetching page");
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| GuruError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuruError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|source| GuruError::Transport {
            url: url.to_string(),
            source,
        })
    }

    pub async fn fetch_deck_rows(
        &self,
        bracket: Bracket,
        mode: Mode,
        threshold: Threshold,
        archetype: Option<&str>,
        past_day: bool,
    ) -> Result<Vec<DeckRow>, GuruError> {
        let url = self.deck_list_url(bracket, mode, threshold, archetype, past_day);
        let body = self.get_page(url).await?;
        Ok(parse::parse_deck_list(&body))
    }

    pub async fn fetch_meta_rows(
        &self,
        bracket: Bracket,
        mode: Mode,
        threshold: Threshold,
    ) -> Result<Vec<ArchetypeRow>, GuruError> {
        let url = self.meta_url(bracket, mode, threshold);
        let body = self.get_page(url).await?;
        Ok(parse::parse_meta_table(&body))
    }

    pub async fn fetch_card_stat_rows(
        &self,
        archetype: &str,
        bracket: Bracket,
        mode: Mode,
    ) -> Result<Vec<CardStatRow>, GuruError> {
        let url = self.card_stats_url(archetype, bracket, mode);
        let body = self.get_page(url).await?;
        Ok(parse::parse_card_stats(&body))
    }

    pub async fn fetch_matchup_rows(
        &self,
        deck_id: &str,
        bracket: Bracket,
    ) -> Result<Vec<MatchupRow>, GuruError> {
        let url = self.deck_url(deck_id, bracket);
        let body = self.get_page(url).await?;
        Ok(parse::parse_matchups(&body))
    }

    /// Fetch the full collectible card catalog.
    pub async fn fetch_card_catalog(&self) -> anyhow::Result<Vec<CardInfo>> {
        let cards: Vec<CatalogCard> = self
            .http
            .get(self.catalog_url.clone())
            .send()
            .await
            .context("card catalog request failed")?
            .error_for_status()
            .context("card catalog request returned an error status")?
            .json()
            .await
            .context("failed to decode card catalog JSON")?;

        Ok(cards
            .into_iter()
            .map(|c| CardInfo {
                dbf_id: c.dbf_id,
                cost: c.cost,
                id: c.id,
                rarity: c.rarity,
                name: c.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GuruClient {
        GuruClient::new("https://stats.example.com", "https://cards.example.com/cards.json")
            .unwrap()
    }

    #[test]
    fn deck_list_url_includes_threshold_and_mode() {
        let url = client().deck_list_url(
            Bracket::TopLegend,
            Mode::Standard,
            Threshold::MinGames(400),
            None,
            false,
        );
        assert_eq!(url.path(), "/decks");
        assert!(url.query().unwrap().contains("rank=top_legend"));
        assert!(url.query().unwrap().contains("format=2"));
        assert!(url.query().unwrap().contains("min_games=400"));
    }

    #[test]
    fn deck_list_url_site_default_omits_min_games() {
        let url = client().deck_list_url(
            Bracket::Top10k,
            Mode::Wild,
            Threshold::SiteDefault,
            None,
            true,
        );
        assert!(!url.query().unwrap().contains("min_games"));
        assert!(url.query().unwrap().contains("format=1"));
        assert!(url.query().unwrap().contains("period=past_day"));
    }

    #[test]
    fn deck_list_url_encodes_archetype_filter() {
        let url = client().deck_list_url(
            Bracket::Diamond4To1,
            Mode::Standard,
            Threshold::SiteDefault,
            Some("Pirate Rogue"),
            false,
        );
        assert!(url
            .query()
            .unwrap()
            .contains("player_deck_archetype%5B%5D=Pirate+Rogue"));
    }

    #[test]
    fn deck_url_embeds_deck_id() {
        let url = client().deck_url("123456", Bracket::DiamondToLegend);
        assert_eq!(url.path(), "/deck/123456");
        assert_eq!(url.query(), Some("rank=diamond_to_legend"));
    }
}
