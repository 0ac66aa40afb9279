//! Filter tree compilation.
//!
//! A request's [`FilterSpec`](crate::model::FilterSpec) is reduced to the
//! dimensions that differ from the standard filter, translated into a
//! predicate tree through a [`ColumnMapper`], and rendered to SQLite SQL.
//! The remote aggregator receives the same decisions as a JSON payload
//! built in [`crate::exec::payload`].

mod ast;
mod builder;
mod columns;
mod compiler;
mod predicate;
mod relevance;
mod sql;

pub use ast::{BoolExpr, Column, Comparison, SqlValue};
pub use builder::{Connector, PredicateBuilder};
pub use columns::{mapper_for, ColumnMapper, ComputedColumns, NativeColumns};
pub use compiler::{CompiledScan, FilterCompiler};
pub use predicate::{build_predicate, PredicateContext};
pub use relevance::{is_active, relevant_dimensions};
pub use sql::{RenderedSql, SelectQuery};

use crate::config::Config;

/// Store and backend capabilities that shape compilation and merging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendMode {
    /// Alternate vendor schema with computed stats.
    pub alternate_schema: bool,
    /// The `size` column exists.
    pub has_size: bool,
    /// A dedicated `height` column exists.
    pub has_height: bool,
    /// Rankings live in a single `pvp` JSON column with cap-aware entries.
    pub pvp_v2: bool,
    /// Rankings come from the precomputed ranking table.
    pub engine_handles_ranking: bool,
    /// Scans go to the remote aggregator.
    pub remote: bool,
}

impl BackendMode {
    /// Derives the mode from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            alternate_schema: config.store.alternate_schema,
            has_size: config.store.has_size,
            has_height: config.store.has_height,
            pvp_v2: config.store.pvp_v2,
            engine_handles_ranking: config.pvp.engine_handles_ranking,
            remote: config.is_remote(),
        }
    }

    /// Ranking entries are already gated by CP and cap upstream.
    pub fn cap_aware(&self) -> bool {
        self.pvp_v2 || self.engine_handles_ranking
    }

    /// Whether the local ranking follow-up query may run.
    pub fn runs_followup(&self) -> bool {
        !self.remote && (!self.alternate_schema || self.engine_handles_ranking)
    }
}
