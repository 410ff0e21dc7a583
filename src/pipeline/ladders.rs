//! Per-category threshold ladders, as configuration data rather than control
//! flow.
//!
//! A ladder is ordered most selective first: a high `min_games` filter returns
//! a small but statistically solid result, and each following rung loosens the
//! filter. The site's own default filter is the first rung where the original
//! page is usable without parameters.

use crate::data::datasets::{Bracket, Mode};
use std::fmt;

/// One rung of a ladder: the site's default filter, or an explicit
/// `min_games` floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    SiteDefault,
    MinGames(u32),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::SiteDefault => f.write_str("default"),
            Threshold::MinGames(n) => write!(f, "min_games={n}"),
        }
    }
}

use Threshold::{MinGames, SiteDefault};

/// Ladder for full deck list pages.
pub const DECK_LIST: &[Threshold] = &[
    SiteDefault,
    MinGames(1600),
    MinGames(800),
    MinGames(400),
    MinGames(200),
    MinGames(50),
];

/// Ladder for the archetype summary (meta) page.
pub const META: &[Threshold] = &[
    SiteDefault,
    MinGames(1000),
    MinGames(500),
    MinGames(250),
    MinGames(100),
];

/// Degenerate ladder for detail pages that have no selectivity parameter.
pub const SINGLE_PAGE: &[Threshold] = &[SiteDefault];

pub const DECK_LIST_MIN_VIABLE: usize = 10;
pub const META_MIN_VIABLE: usize = 10;
pub const ARCHETYPE_DECKS_MIN_VIABLE: usize = 3;

/// Ladder for archetype-filtered deck lists. Brackets with more traffic carry
/// higher floors, and the wild population is thinner across the board.
pub fn archetype_decks(bracket: Bracket, mode: Mode) -> &'static [Threshold] {
    match (mode, bracket) {
        (Mode::Standard, Bracket::TopLegend) => &[MinGames(200), MinGames(100), MinGames(50)],
        (Mode::Standard, Bracket::Top10k) => {
            &[MinGames(400), MinGames(200), MinGames(100), MinGames(50)]
        }
        (Mode::Standard, Bracket::Diamond4To1) => &[
            MinGames(6400),
            MinGames(3200),
            MinGames(1600),
            MinGames(400),
            MinGames(100),
        ],
        (Mode::Standard, Bracket::DiamondToLegend) => &[
            MinGames(12800),
            MinGames(6400),
            MinGames(3200),
            MinGames(800),
            MinGames(200),
        ],
        (Mode::Wild, Bracket::TopLegend) => &[MinGames(100), MinGames(50)],
        (Mode::Wild, Bracket::Top10k) => &[MinGames(200), MinGames(100), MinGames(50)],
        (Mode::Wild, Bracket::Diamond4To1) => &[MinGames(1600), MinGames(400), MinGames(100)],
        (Mode::Wild, Bracket::DiamondToLegend) => &[MinGames(3200), MinGames(800), MinGames(200)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_games_values(ladder: &[Threshold]) -> Vec<u32> {
        ladder
            .iter()
            .filter_map(|t| match t {
                MinGames(n) => Some(*n),
                SiteDefault => None,
            })
            .collect()
    }

    #[test]
    fn list_ladders_start_with_site_default() {
        assert_eq!(DECK_LIST[0], SiteDefault);
        assert_eq!(META[0], SiteDefault);
    }

    #[test]
    fn ladders_loosen_monotonically() {
        let mut all: Vec<&[Threshold]> = vec![DECK_LIST, META];
        for mode in Mode::ALL {
            for bracket in Bracket::ALL {
                all.push(archetype_decks(bracket, mode));
            }
        }
        for ladder in all {
            let values = min_games_values(ladder);
            assert!(
                values.windows(2).all(|w| w[0] > w[1]),
                "ladder {ladder:?} is not strictly decreasing"
            );
        }
    }

    #[test]
    fn every_bracket_has_an_archetype_deck_ladder() {
        for mode in Mode::ALL {
            for bracket in Bracket::ALL {
                assert!(!archetype_decks(bracket, mode).is_empty());
            }
        }
    }

    #[test]
    fn wild_floors_are_not_above_standard() {
        for bracket in Bracket::ALL {
            let standard = min_games_values(archetype_decks(bracket, Mode::Standard));
            let wild = min_games_values(archetype_decks(bracket, Mode::Wild));
            assert!(wild.first() <= standard.first());
        }
    }
}
