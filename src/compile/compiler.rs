//! Assembly of complete queries from a filter tree.

use geo::Rect;
use tracing::trace;

use super::ast::{BoolExpr, Comparison};
use super::builder::{Connector, PredicateBuilder};
use super::columns::{mapper_for, ColumnMapper};
use super::predicate::{build_predicate, PredicateContext};
use super::relevance::relevant_dimensions;
use super::sql::SelectQuery;
use super::BackendMode;
use crate::model::{BoundingBox, FilterSpec, Permissions, DISGUISE_SPECIES};
use crate::schema::{StandardFilter, Stat};

/// Primary query plus whether the ranking follow-up is required.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledScan {
    /// Stat-matched selection.
    pub query: SelectQuery,
    /// A league window was compiled for a permitted caller.
    pub query_pvp: bool,
}

/// Compiles filter trees for one caller against one backend.
pub struct FilterCompiler<'a> {
    standard: &'a StandardFilter,
    permissions: &'a Permissions,
    mode: &'a BackendMode,
    columns: &'static dyn ColumnMapper,
    areas: &'a [Rect<f64>],
}

impl<'a> FilterCompiler<'a> {
    /// Creates a compiler; the column strategy follows `mode`.
    pub fn new(
        standard: &'a StandardFilter,
        permissions: &'a Permissions,
        mode: &'a BackendMode,
    ) -> Self {
        Self {
            standard,
            permissions,
            mode,
            columns: mapper_for(mode),
            areas: &[],
        }
    }

    /// Restricts scans to points inside one of the rectangles. Rows still
    /// need the exact polygon test afterwards.
    pub fn within_areas(mut self, areas: &'a [Rect<f64>]) -> Self {
        self.areas = areas;
        self
    }

    /// Column strategy in use.
    pub fn columns(&self) -> &'static dyn ColumnMapper {
        self.columns
    }

    /// Callers without stat or ranking access only see explicitly selected
    /// species; with none selected there is nothing to query.
    pub fn has_work(&self, filters: &FilterSpec) -> bool {
        self.permissions.iv || self.permissions.pvp || !filters.selectors.is_empty()
    }

    /// Disjunction of every selector branch and whether any branch compiled a
    /// league window. An empty disjunction selects nothing.
    pub fn selection(&self, filters: &FilterSpec) -> (BoolExpr, bool) {
        let ctx = PredicateContext {
            permissions: self.permissions,
            mode: self.mode,
            columns: self.columns,
        };
        let mut query_pvp = false;
        let mut branches = PredicateBuilder::new();

        if self.permissions.iv || self.permissions.pvp {
            let relevant = relevant_dimensions(&filters.global, self.standard);
            if relevant.is_empty() {
                branches.or_is_null(self.columns.identity());
            } else {
                branches.or_group(|global| {
                    query_pvp |= build_predicate(global, &filters.global, &relevant, &ctx);
                });
            }
        }

        for (key, filter) in &filters.selectors {
            let relevant = relevant_dimensions(filter, self.standard);
            branches.or_group(|species| {
                species.eq(self.columns.species(), key.species);
                if key.species != DISGUISE_SPECIES {
                    species.eq(self.columns.form(), key.form);
                }
                if !relevant.is_empty() {
                    species.and_group(|dims| {
                        query_pvp |= build_predicate(dims, filter, &relevant, &ctx);
                    });
                }
            });
        }

        if self.permissions.iv {
            if filters.flags.zero_iv {
                branches.or_eq(self.columns.stat(Stat::Iv), 0_i64);
            }
            if filters.flags.hundo_iv {
                branches.or_eq(self.columns.stat(Stat::Iv), 100_i64);
            }
        }

        let selection = branches.finish().unwrap_or_else(|| {
            Comparison::IsNull {
                column: self.columns.identity(),
            }
            .into()
        });
        (selection, query_pvp)
    }

    /// Primary scan: active entities in `bbox` matching any selector branch.
    pub fn primary(
        &self,
        bbox: &BoundingBox,
        filters: &FilterSpec,
        ts: i64,
        limit: usize,
    ) -> CompiledScan {
        let (selection, query_pvp) = self.selection(filters);
        let mut builder = self.scope(bbox, ts);
        builder.push(Connector::And, selection);
        let query = SelectQuery {
            projection: self.columns.projection(self.mode),
            from: self.columns.from_clause().to_owned(),
            predicate: builder.finish(),
            limit: Some(limit),
            ..SelectQuery::default()
        };
        trace!(query_pvp, "primary scan compiled");
        CompiledScan { query, query_pvp }
    }

    /// Ranking follow-up: active entities in `bbox` not already returned that
    /// carry ranking data.
    pub fn ranking_followup(
        &self,
        bbox: &BoundingBox,
        ts: i64,
        exclude: &[String],
        limit: usize,
    ) -> SelectQuery {
        let mut builder = self.scope(bbox, ts);
        builder.not_in(self.columns.identity(), exclude.iter().map(String::as_str));
        if self.mode.engine_handles_ranking {
            builder.is_not_null(self.columns.stat(Stat::Cp));
        } else if self.mode.pvp_v2 {
            builder.is_not_null("pvp");
        } else {
            builder.and_group(|presence| {
                presence
                    .is_not_null("pvp_rankings_great_league")
                    .or_is_not_null("pvp_rankings_ultra_league");
            });
        }
        SelectQuery {
            projection: format!("{}, 1 AS pvp_check", self.columns.projection(self.mode)),
            from: self.columns.from_clause().to_owned(),
            predicate: builder.finish(),
            limit: Some(limit),
            ..SelectQuery::default()
        }
    }

    /// Active species/form pairs with their counts.
    pub fn available(&self, ts: i64) -> SelectQuery {
        let species = self.columns.species();
        let form = self.columns.form();
        let mut builder = PredicateBuilder::new();
        builder.push(Connector::And, self.columns.active_at(ts));
        SelectQuery {
            projection: format!("{species} AS id, {form} AS form, COUNT({species}) AS count"),
            from: self.columns.from_clause().to_owned(),
            predicate: builder.finish(),
            group_by: vec![species.to_string(), form.to_string()],
            order_by: vec![species.to_string(), form.to_string()],
            limit: None,
        }
    }

    /// Position of a single entity.
    pub fn position(&self, id: &str) -> SelectQuery {
        let mut builder = PredicateBuilder::new();
        builder.eq(self.columns.identity(), id);
        SelectQuery {
            projection: format!(
                "{} AS lat, {} AS lon",
                self.columns.latitude(),
                self.columns.longitude()
            ),
            from: self.columns.from_clause().to_owned(),
            predicate: builder.finish(),
            limit: Some(1),
            ..SelectQuery::default()
        }
    }

    /// Active entities of the listed species, roughly nearest to `center`
    /// first. The planar ordering only pre-selects candidates; callers rank
    /// them by great-circle distance. `center` must be finite.
    pub fn species_search(
        &self,
        species: &[u32],
        center: (f64, f64),
        ts: i64,
        limit: usize,
    ) -> SelectQuery {
        let mut builder = PredicateBuilder::new();
        builder
            .in_list(self.columns.species(), species.iter().copied())
            .push(Connector::And, self.columns.active_at(ts));
        self.area_bounds(&mut builder);
        let (lat, lon) = (self.columns.latitude(), self.columns.longitude());
        let (center_lat, center_lon) = center;
        SelectQuery {
            projection: self.columns.projection(self.mode),
            from: self.columns.from_clause().to_owned(),
            predicate: builder.finish(),
            order_by: vec![format!(
                "(({lat} - {center_lat:?}) * ({lat} - {center_lat:?}) + ({lon} - {center_lon:?}) * ({lon} - {center_lon:?}))"
            )],
            limit: Some(limit),
            ..SelectQuery::default()
        }
    }

    fn scope(&self, bbox: &BoundingBox, ts: i64) -> PredicateBuilder {
        let mut builder = PredicateBuilder::new();
        builder
            .push(Connector::And, self.columns.active_at(ts))
            .between(self.columns.latitude(), bbox.min_lat, bbox.max_lat)
            .between(self.columns.longitude(), bbox.min_lon, bbox.max_lon);
        self.area_bounds(&mut builder);
        builder
    }

    fn area_bounds(&self, builder: &mut PredicateBuilder) {
        let (lat, lon) = (self.columns.latitude(), self.columns.longitude());
        builder.and_group(|any| {
            for rect in self.areas {
                any.or_group(|inside| {
                    inside
                        .between(lat.clone(), rect.min().y, rect.max().y)
                        .between(lon.clone(), rect.min().x, rect.max().x);
                });
            }
        });
    }
}
