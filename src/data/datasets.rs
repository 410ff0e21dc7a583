//! Dataset naming: live/staging/backup instances per game-mode family.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Game-mode variant; each mode is an independent dataset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Standard,
    Wild,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Standard, Mode::Wild];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Wild => "wild",
        }
    }

    fn table_suffix(self) -> &'static str {
        match self {
            Mode::Standard => "",
            Mode::Wild => "_wild",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ladder bracket a statistics page is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bracket {
    #[serde(rename = "diamond_4to1")]
    Diamond4To1,
    #[serde(rename = "diamond_to_legend")]
    DiamondToLegend,
    #[serde(rename = "top_10k")]
    Top10k,
    #[serde(rename = "top_legend")]
    TopLegend,
}

impl Bracket {
    pub const ALL: [Bracket; 4] = [
        Bracket::Diamond4To1,
        Bracket::DiamondToLegend,
        Bracket::Top10k,
        Bracket::TopLegend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Bracket::Diamond4To1 => "diamond_4to1",
            Bracket::DiamondToLegend => "diamond_to_legend",
            Bracket::Top10k => "top_10k",
            Bracket::TopLegend => "top_legend",
        }
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five logical tables a refresh run rebuilds, in stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Archetypes,
    Decks,
    CardStats,
    ArchetypeDecks,
    DeckMatchups,
}

impl DatasetKind {
    /// Fixed dependency order: archetype summaries come first because the
    /// detail stages derive their fetch targets from them.
    pub const STAGE_ORDER: [DatasetKind; 5] = [
        DatasetKind::Archetypes,
        DatasetKind::Decks,
        DatasetKind::CardStats,
        DatasetKind::ArchetypeDecks,
        DatasetKind::DeckMatchups,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Archetypes => "archetypes",
            DatasetKind::Decks => "decks",
            DatasetKind::CardStats => "card_stats",
            DatasetKind::ArchetypeDecks => "archetype_decks",
            DatasetKind::DeckMatchups => "deck_matchups",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::STAGE_ORDER.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical dataset (kind + mode family) with its three storage instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub mode: Mode,
}

impl Dataset {
    pub fn new(kind: DatasetKind, mode: Mode) -> Self {
        Self { kind, mode }
    }

    /// The table readers see.
    pub fn live(self) -> String {
        format!("{}{}", self.kind.as_str(), self.mode.table_suffix())
    }

    /// Write target during a run; invisible to readers.
    pub fn staging(self) -> String {
        format!("{}_staging", self.live())
    }

    /// Previous live generation, kept for one promotion for manual recovery.
    pub fn backup(self) -> String {
        format!("{}_backup", self.live())
    }

    /// All datasets of a mode family in stage order.
    pub fn all_for(mode: Mode) -> [Dataset; 5] {
        DatasetKind::STAGE_ORDER.map(|kind| Dataset::new(kind, mode))
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tables_have_no_suffix() {
        let ds = Dataset::new(DatasetKind::Decks, Mode::Standard);
        assert_eq!(ds.live(), "decks");
        assert_eq!(ds.staging(), "decks_staging");
        assert_eq!(ds.backup(), "decks_backup");
    }

    #[test]
    fn wild_tables_carry_mode_suffix() {
        let ds = Dataset::new(DatasetKind::DeckMatchups, Mode::Wild);
        assert_eq!(ds.live(), "deck_matchups_wild");
        assert_eq!(ds.staging(), "deck_matchups_wild_staging");
    }

    #[test]
    fn stage_order_starts_with_archetypes() {
        assert_eq!(DatasetKind::STAGE_ORDER[0], DatasetKind::Archetypes);
        assert_eq!(DatasetKind::STAGE_ORDER.len(), 5);
    }

    #[test]
    fn kind_parse_round_trips() {
        for kind in DatasetKind::STAGE_ORDER {
            assert_eq!(DatasetKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(DatasetKind::parse("nonsense"), None);
    }

    #[test]
    fn bracket_names_match_site_params() {
        assert_eq!(Bracket::Diamond4To1.as_str(), "diamond_4to1");
        assert_eq!(Bracket::TopLegend.as_str(), "top_legend");
    }
}
