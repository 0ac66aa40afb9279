//! Post-query processing of scan rows.
//!
//! Primary rows are normalised and split into stat matches and ranking
//! candidates. Ranking candidates (plus follow-up rows) are evaluated against
//! the league windows, and the two streams are joined with stat matches
//! first. An identity is emitted at most once.

use std::collections::HashSet;

use tracing::debug;

use crate::areas::AreaFilter;
use crate::compile::BackendMode;
use crate::config::PvpConfig;
use crate::masterfile::Masterfile;
use crate::model::{
    EntityView, FilterSpec, MatchSource, Permissions, RawEntityRecord, SelectorKey,
    DISGUISE_SPECIES,
};
use crate::ranking::{parse_inline, RankingContext, RankingTable};
use crate::schema::StandardFilter;
use crate::snapshot::Snapshot;

/// Primary rows split by pipeline.
#[derive(Debug, Default)]
pub struct Partition {
    /// Rows emitted on their stats.
    pub stat: Vec<EntityView>,
    /// Rows awaiting ranking evaluation.
    pub ranking: Vec<RawEntityRecord>,
    /// Identities already routed to ranking evaluation.
    pub ranking_ids: Vec<String>,
}

/// Merges rows of one scan request.
pub struct Merger<'a> {
    filters: &'a FilterSpec,
    permissions: &'a Permissions,
    standard: &'a StandardFilter,
    rankings: &'a RankingTable,
    masterfile: &'a Masterfile,
    pvp: &'a PvpConfig,
    mode: BackendMode,
    areas: AreaFilter<'a>,
}

impl<'a> Merger<'a> {
    /// Creates a merger over the reference tables of `snapshot`.
    pub fn new(
        filters: &'a FilterSpec,
        permissions: &'a Permissions,
        snapshot: &'a Snapshot,
        pvp: &'a PvpConfig,
        mode: BackendMode,
        areas: AreaFilter<'a>,
    ) -> Self {
        Self {
            filters,
            permissions,
            standard: &snapshot.standard,
            rankings: &snapshot.rankings,
            masterfile: &snapshot.masterfile,
            pvp,
            mode,
            areas,
        }
    }

    /// Normalises primary rows and routes each to the stat or ranking path.
    /// Rows outside the visible areas are dropped.
    pub fn partition(&self, rows: Vec<RawEntityRecord>) -> Partition {
        let mut partition = Partition::default();
        for mut record in rows {
            if !self.areas.admits(record.lat, record.lon) {
                continue;
            }
            self.undisguise(&mut record);
            if record.seen_type.as_deref().map_or(true, str::is_empty) {
                record.seen_type = Some(infer_seen_type(&record).to_owned());
            }
            if self.permissions.pvp && self.carries_rankings(&record) {
                partition.ranking_ids.push(record.id.clone());
                partition.ranking.push(record);
            } else if self.linked(&record) {
                if !self.permissions.pvp {
                    record.strip_rankings();
                }
                partition.stat.push(EntityView::stat(record));
            }
        }
        debug!(
            stat = partition.stat.len(),
            ranking = partition.ranking.len(),
            "primary rows partitioned"
        );
        partition
    }

    /// Adds follow-up rows to the ranking path.
    pub fn absorb_followup(&self, partition: &mut Partition, rows: Vec<RawEntityRecord>) {
        for mut record in rows {
            if !self.areas.admits(record.lat, record.lon) {
                continue;
            }
            self.undisguise(&mut record);
            if record.seen_type.as_deref().map_or(true, str::is_empty) {
                record.seen_type = Some("encounter".to_owned());
            }
            partition.ranking.push(record);
        }
    }

    /// Evaluates ranking candidates and joins both streams.
    pub fn finish(&self, partition: Partition) -> Vec<EntityView> {
        let ctx = RankingContext {
            filters: self.filters,
            standard: self.standard,
            pvp: self.pvp,
            mode: &self.mode,
        };
        let Partition { stat, ranking, .. } = partition;
        let ranked = ranking.into_iter().filter_map(|record| {
            let rankings = if self.mode.engine_handles_ranking {
                self.rankings.lookup(&record)
            } else {
                parse_inline(&record)
            };
            let selector = SelectorKey::new(record.pokemon_id, record.form_id());
            let (clean, best) = ctx.evaluate(&rankings, selector);
            if (clean.is_empty() && record.pvp_check) || !self.linked(&record) {
                return None;
            }
            Some(EntityView {
                record,
                clean_rankings: Some(clean),
                best_rank: Some(best),
                source: MatchSource::Ranking,
            })
        });

        let mut seen = HashSet::new();
        stat.into_iter()
            .chain(ranked)
            .filter(|view| seen.insert(view.record.id.clone()))
            .collect()
    }

    fn carries_rankings(&self, record: &RawEntityRecord) -> bool {
        record.has_inline_rankings()
            || (self.mode.alternate_schema
                && self.mode.engine_handles_ranking
                && record.cp.is_some())
    }

    fn linked(&self, record: &RawEntityRecord) -> bool {
        !self.filters.flags.link_global
            || self
                .filters
                .selector(record.pokemon_id, record.form_id())
                .is_some()
    }

    /// A disguised entity reports the form of what it imitates; move that to
    /// `ditto_form` and show the species' own default form.
    fn undisguise(&self, record: &mut RawEntityRecord) {
        if record.pokemon_id != DISGUISE_SPECIES || record.ditto_form.is_some() {
            return;
        }
        record.ditto_form = record.form;
        record.form = Some(self.masterfile.default_form(DISGUISE_SPECIES).unwrap_or(0));
    }
}

fn infer_seen_type(record: &RawEntityRecord) -> &'static str {
    match &record.spawn_id {
        Some(spawn) if spawn.is_null() => {
            if record.pokestop_id.is_some() {
                "nearby_stop"
            } else {
                "nearby_cell"
            }
        }
        _ => "encounter",
    }
}
