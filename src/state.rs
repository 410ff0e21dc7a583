//! Application state shared across components (web, scheduler, pipeline).

use crate::config::LockPolicy;
use crate::data::models::CardInfo;
use crate::data::translations::{self, TranslationEntry};
use crate::guru::GuruClient;
use crate::pipeline::PipelineRunner;
use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Starting,
    Active,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    /// Returns a snapshot of all service statuses.
    pub fn all(&self) -> Vec<(String, ServiceStatus)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status.clone()))
            .collect()
    }
}

/// In-memory cache of archetype name localizations (`source name -> localized name`).
///
/// Loaded from the `translations` table on startup and whenever an
/// administrative update lands. Reload builds a fresh map and swaps the whole
/// reference, so concurrent readers see either the old or the new mapping,
/// never a half-populated one.
#[derive(Debug, Clone, Default)]
pub struct TranslationCache {
    map: HashMap<String, String>,
}

impl TranslationCache {
    pub fn from_entries(entries: Vec<TranslationEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|e| (e.source_name, e.localized_name))
            .collect();
        Self { map }
    }

    /// Localized name for `name`, falling back to the source name itself.
    pub fn localize<'a>(&'a self, name: &'a str) -> &'a str {
        self.map.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// In-memory catalog of collectible cards, keyed by dbf id.
///
/// Fetched from the card catalog JSON endpoint; used to enrich scraped deck
/// lists with card metadata. Same whole-map swap discipline as
/// [`TranslationCache`].
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    by_dbf_id: HashMap<u32, CardInfo>,
}

impl CardCatalog {
    pub fn from_cards(cards: Vec<CardInfo>) -> Self {
        let by_dbf_id = cards.into_iter().map(|c| (c.dbf_id, c)).collect();
        Self { by_dbf_id }
    }

    pub fn get(&self, dbf_id: u32) -> Option<&CardInfo> {
        self.by_dbf_id.get(&dbf_id)
    }

    pub fn len(&self) -> usize {
        self.by_dbf_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dbf_id.is_empty()
    }
}

/// Reload the translation cache from the database, replacing the whole map.
pub async fn reload_translations(
    pool: &PgPool,
    cache: &Arc<RwLock<TranslationCache>>,
) -> Result<usize> {
    let entries = translations::get_all(pool).await?;
    let fresh = TranslationCache::from_entries(entries);
    let count = fresh.len();
    *cache.write().await = fresh;
    Ok(count)
}

/// Reload the card catalog from the remote JSON endpoint, replacing the whole map.
pub async fn reload_card_catalog(
    guru: &GuruClient,
    cache: &Arc<RwLock<CardCatalog>>,
) -> Result<usize> {
    let cards = guru.fetch_card_catalog().await?;
    let fresh = CardCatalog::from_cards(cards);
    let count = fresh.len();
    *cache.write().await = fresh;
    Ok(count)
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub guru: Arc<GuruClient>,
    pub translations: Arc<RwLock<TranslationCache>>,
    pub catalog: Arc<RwLock<CardCatalog>>,
    pub runner: Arc<PipelineRunner>,
    pub service_statuses: ServiceStatusRegistry,
    pub lock_policy: LockPolicy,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        guru: Arc<GuruClient>,
        translations: Arc<RwLock<TranslationCache>>,
        catalog: Arc<RwLock<CardCatalog>>,
        runner: Arc<PipelineRunner>,
        lock_policy: LockPolicy,
    ) -> Self {
        Self {
            db_pool,
            guru,
            translations,
            catalog,
            runner,
            service_statuses: ServiceStatusRegistry::new(),
            lock_policy,
        }
    }

    /// Initialize the translation cache from the database.
    pub async fn load_translation_cache(&self) -> Result<usize> {
        let count = reload_translations(&self.db_pool, &self.translations).await?;
        tracing::info!(entries = count, "Translation cache loaded");
        Ok(count)
    }

    /// Initialize the card catalog from the remote endpoint.
    pub async fn load_card_catalog(&self) -> Result<usize> {
        let count = reload_card_catalog(&self.guru, &self.catalog).await?;
        tracing::info!(cards = count, "Card catalog loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, localized: &str) -> TranslationEntry {
        TranslationEntry {
            source_name: source.to_string(),
            localized_name: localized.to_string(),
        }
    }

    #[test]
    fn localize_known_name() {
        let cache = TranslationCache::from_entries(vec![entry("Pirate Rogue", "海盗贼")]);
        assert_eq!(cache.localize("Pirate Rogue"), "海盗贼");
    }

    #[test]
    fn localize_falls_back_to_source_name() {
        let cache = TranslationCache::from_entries(vec![entry("Pirate Rogue", "海盗贼")]);
        assert_eq!(cache.localize("Mech Mage"), "Mech Mage");
    }

    #[test]
    fn catalog_lookup_by_dbf_id() {
        let card = CardInfo {
            dbf_id: 64,
            cost: Some(2),
            id: "EX1_001".to_string(),
            rarity: Some("COMMON".to_string()),
            name: "Lightwarden".to_string(),
        };
        let catalog = CardCatalog::from_cards(vec![card]);
        assert_eq!(catalog.get(64).map(|c| c.name.as_str()), Some("Lightwarden"));
        assert!(catalog.get(65).is_none());
    }
}
