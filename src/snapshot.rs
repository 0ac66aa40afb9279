//! Process-wide reference tables.
//!
//! Everything a request reads but never writes lives in one immutable
//! [`Snapshot`]. Requests clone the `Arc` once and keep using it even if a
//! reload swaps in a newer snapshot meanwhile.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::areas::AreaIndex;
use crate::config::{Config, ConfigError};
use crate::masterfile::Masterfile;
use crate::ranking::RankingTable;
use crate::schema::StandardFilter;

/// Immutable reference tables.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Default of every filter dimension.
    pub standard: StandardFilter,
    /// Precomputed rankings.
    pub rankings: RankingTable,
    /// Scan areas.
    pub areas: AreaIndex,
    /// Species reference data.
    pub masterfile: Masterfile,
}

impl Snapshot {
    /// Builds a snapshot from configuration. Missing data files yield empty
    /// tables; unreadable ones are errors, except areas which fail open.
    pub fn load(config: &Config) -> Result<Self, ConfigError> {
        let masterfile = match &config.data.masterfile {
            Some(path) => Masterfile::load(path)?,
            None => Masterfile::default(),
        };
        let rankings = match &config.data.rankings {
            Some(path) => RankingTable::load(path)?,
            None => RankingTable::default(),
        };
        let snapshot = Self {
            standard: StandardFilter::from_config(&config.filters, &config.pvp),
            rankings,
            areas: AreaIndex::load(&config.areas),
            masterfile,
        };
        info!(
            dimensions = snapshot.standard.dimensions().len(),
            ranking_species = snapshot.rankings.len(),
            areas = snapshot.areas.len(),
            "snapshot built"
        );
        Ok(snapshot)
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Wraps an initial snapshot.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the snapshot and returns the previous one.
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        std::mem::replace(&mut *self.current.write(), Arc::new(snapshot))
    }

    /// Rebuilds from configuration and swaps on success.
    pub fn reload(&self, config: &Config) -> Result<Arc<Snapshot>, ConfigError> {
        let fresh = Snapshot::load(config)?;
        self.swap(fresh);
        Ok(self.current())
    }
}
