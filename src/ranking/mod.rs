//! Competitive ranking evaluation.
//!
//! Each ranking candidate is checked against the rank window the user set
//! for its league. The window is the union of the species selector window
//! and the global window when both are active, whichever one is active
//! otherwise, and the closed `[0, 0]` window when neither is. Ranks start at
//! 1, so the closed window never qualifies anything.

mod table;

pub use table::RankingTable;

use tracing::warn;

use crate::compile::{is_active, BackendMode};
use crate::config::PvpConfig;
use crate::model::{
    FilterObject, FilterSpec, RankingEntry, Rankings, RawEntityRecord, SelectorKey,
    SENTINEL_RANK,
};
use crate::schema::{Dimension, DimensionKind, StandardFilter};

/// Inclusive rank window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankWindow {
    /// Best accepted rank.
    pub min: i64,
    /// Worst accepted rank.
    pub max: i64,
}

impl RankWindow {
    /// Window that accepts no ranking candidate.
    pub const CLOSED: RankWindow = RankWindow { min: 0, max: 0 };

    /// Whether `rank` lies inside the window.
    pub fn contains(&self, rank: u32) -> bool {
        let rank = i64::from(rank);
        self.min <= rank && rank <= self.max
    }

    /// Smallest window covering both.
    pub fn union(self, other: RankWindow) -> RankWindow {
        RankWindow {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn of(filter: &FilterObject, league: &Dimension) -> Option<RankWindow> {
        if !is_active(filter, league) {
            return None;
        }
        filter
            .effective(league)
            .as_range()
            .map(|[min, max]| RankWindow { min, max })
    }
}

/// Window for `league` given the species selector (if any) and the global
/// selector.
pub fn resolve_window(
    selector: Option<&FilterObject>,
    global: &FilterObject,
    league: &Dimension,
) -> RankWindow {
    let global = RankWindow::of(global, league);
    let specific = selector.and_then(|filter| RankWindow::of(filter, league));
    match (specific, global) {
        (Some(specific), Some(global)) => specific.union(global),
        (Some(window), None) | (None, Some(window)) => window,
        (None, None) => RankWindow::CLOSED,
    }
}

/// Qualifying candidates of one league and the best qualifying rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RankOutcome {
    /// Candidates that passed every check, in payload order.
    pub filtered: Vec<RankingEntry>,
    /// Minimum qualifying rank, or [`SENTINEL_RANK`].
    pub best: u32,
}

/// Per-request inputs of ranking evaluation.
#[derive(Clone, Copy)]
pub struct RankingContext<'a> {
    /// Request filters.
    pub filters: &'a FilterSpec,
    /// Standard filter (league dimensions and defaults).
    pub standard: &'a StandardFilter,
    /// League configuration.
    pub pvp: &'a PvpConfig,
    /// Backend capabilities.
    pub mode: &'a BackendMode,
}

impl RankingContext<'_> {
    /// Filters `entries` of `league` for the entity identified by `selector`.
    pub fn rank(
        &self,
        entries: &[RankingEntry],
        league: &Dimension,
        selector: SelectorKey,
    ) -> RankOutcome {
        let window = resolve_window(
            self.filters.selectors.get(&selector),
            &self.filters.global,
            league,
        );
        let min_cp = self.pvp.league(&league.name).map_or(0, |l| l.min_cp);
        let mut best = SENTINEL_RANK;
        let filtered: Vec<RankingEntry> = entries
            .iter()
            .filter(|entry| self.qualifies(entry, window, min_cp))
            .inspect(|entry| best = best.min(entry.rank))
            .cloned()
            .collect();
        RankOutcome { filtered, best }
    }

    /// Evaluates every configured league present in `rankings`. Leagues with
    /// no qualifying candidate are left out.
    pub fn evaluate(&self, rankings: &Rankings, selector: SelectorKey) -> (Rankings, u32) {
        let mut clean = Rankings::new();
        let mut best = SENTINEL_RANK;
        for (name, entries) in rankings {
            let Some(league) = self
                .standard
                .get(name)
                .filter(|dim| dim.kind == DimensionKind::LeagueRank)
            else {
                continue;
            };
            let outcome = self.rank(entries, league, selector);
            if !outcome.filtered.is_empty() {
                best = best.min(outcome.best);
                clean.insert(name.clone(), outcome.filtered);
            }
        }
        (clean, best)
    }

    fn qualifies(&self, entry: &RankingEntry, window: RankWindow, min_cp: u32) -> bool {
        let cap_aware = self.mode.cap_aware();
        let flags = &self.filters.flags;
        window.contains(entry.rank)
            && (cap_aware || entry.cp >= min_cp)
            && (!entry.is_evolution() || flags.pvp_mega)
            && (!cap_aware
                || entry.capped
                || entry.cap.is_some_and(|cap| flags.caps.contains(&cap)))
    }
}

/// Ranking payload stored on the row itself: the `pvp` column (JSON text or
/// object) or, failing that, the legacy per-league columns. Malformed
/// payloads are logged and treated as empty.
pub fn parse_inline(record: &RawEntityRecord) -> Rankings {
    if let Some(pvp) = record.pvp.as_ref().filter(|pvp| !pvp.is_null()) {
        let parsed = match pvp {
            serde_json::Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        return parsed.unwrap_or_else(|err| {
            warn!(id = %record.id, error = %err, "malformed ranking payload");
            Rankings::new()
        });
    }
    let mut rankings = Rankings::new();
    let legacy = [
        ("great", record.pvp_rankings_great_league.as_deref()),
        ("ultra", record.pvp_rankings_ultra_league.as_deref()),
    ];
    for (league, column) in legacy {
        let Some(text) = column else { continue };
        match serde_json::from_str::<Vec<RankingEntry>>(text) {
            Ok(entries) => {
                rankings.insert(league.to_owned(), entries);
            }
            Err(err) => {
                warn!(id = %record.id, league, error = %err, "malformed legacy ranking column");
            }
        }
    }
    rankings
}
