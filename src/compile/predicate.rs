//! Translation of relevant dimensions into predicates.

use super::builder::PredicateBuilder;
use super::columns::ColumnMapper;
use super::BackendMode;
use crate::model::{FilterObject, Permissions};
use crate::schema::{Dimension, DimensionKind};

/// Inputs shared by every selector of one request.
#[derive(Clone, Copy)]
pub struct PredicateContext<'a> {
    /// Caller capabilities.
    pub permissions: &'a Permissions,
    /// Store capabilities.
    pub mode: &'a BackendMode,
    /// Column strategy.
    pub columns: &'a dyn ColumnMapper,
}

/// Appends the predicates for `relevant` dimensions of `filter` to `builder`
/// and reports whether the ranking follow-up query is needed.
///
/// Size buckets join with `OR` and only exist when the store has a size
/// column. Gender is an ungated equality. Stat ranges need the `iv`
/// permission. League windows need `pvp`; they flag the ranking query and,
/// when no stat or size dimension is relevant, add an identity `IS NULL` so
/// the selector matches nothing in the primary query.
pub fn build_predicate(
    builder: &mut PredicateBuilder,
    filter: &FilterObject,
    relevant: &[&Dimension],
    ctx: &PredicateContext<'_>,
) -> bool {
    let stat_like = relevant.iter().any(|dim| dim.kind.is_stat_like());
    let mut ranking = false;
    let mut guarded = false;
    for dimension in relevant {
        let value = filter.effective(dimension);
        match dimension.kind {
            DimensionKind::SizeClass(size) => {
                if ctx.mode.has_size && value.as_bool() {
                    builder.or_eq(ctx.columns.size(), size.column_value());
                }
            }
            DimensionKind::Gender => {
                if let Some(gender) = value.as_int() {
                    builder.eq(ctx.columns.gender(), gender);
                }
            }
            DimensionKind::Range(stat) => {
                if ctx.permissions.iv {
                    if let Some([low, high]) = value.as_range() {
                        builder.between(ctx.columns.stat(stat), low, high);
                    }
                }
            }
            DimensionKind::LeagueRank => {
                if ctx.permissions.pvp {
                    ranking = true;
                    if !stat_like && !guarded {
                        builder.is_null(ctx.columns.identity());
                        guarded = true;
                    }
                }
            }
        }
    }
    ranking
}
