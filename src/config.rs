//! Environment-driven application configuration.

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;
use std::time::Duration;

/// What readers experience while a refresh run holds the update lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Serve the previously published data, flagged with `X-Data-Refreshing: true`.
    #[default]
    Advisory,
    /// Reject reads with 503 + `Retry-After` until the run completes.
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Base URL of the statistics site being harvested.
    #[serde(default = "default_guru_base_url")]
    pub guru_base_url: String,

    /// Collectible card catalog JSON (dbfId -> card metadata).
    #[serde(default = "default_card_catalog_url")]
    pub card_catalog_url: String,

    /// Concurrent targets per chunk for list-page stages (archetypes, decks).
    #[serde(default = "default_list_concurrency")]
    pub list_concurrency: usize,

    /// Concurrent targets per chunk for detail-page stages (card stats,
    /// archetype decks, matchups). Kept lower: these fan out to many more pages.
    #[serde(default = "default_detail_concurrency")]
    pub detail_concurrency: usize,

    /// Pause after each batch chunk, bounding request rate against the source.
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,

    /// Pause between ladder attempts within a single fetch.
    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,

    /// Per-attempt timeout for a single page fetch.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Hour of day (UTC) at which the daily refresh fires.
    #[serde(default = "default_refresh_hour_utc")]
    pub refresh_hour_utc: u32,

    #[serde(default)]
    pub lock_policy: LockPolicy,

    /// Grace period for services to finish during shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_guru_base_url() -> String {
    "https://www.hsguru.com".to_string()
}

fn default_card_catalog_url() -> String {
    "https://api.hearthstonejson.com/v1/latest/zhCN/cards.collectible.json".to_string()
}

fn default_list_concurrency() -> usize {
    2
}

fn default_detail_concurrency() -> usize {
    3
}

fn default_inter_batch_delay_ms() -> u64 {
    500
}

fn default_attempt_delay_ms() -> u64 {
    50
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_refresh_hour_utc() -> u32 {
    20
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn attempt_delay(&self) -> Duration {
        Duration::from_millis(self.attempt_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
