//! JSON bodies sent to the remote aggregator.
//!
//! The aggregator evaluates the same relevance decisions the SQL compiler
//! makes, so each selector is reduced to the dimensions that differ from the
//! standard filter and the caller may use. Everything else is omitted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::compile::{is_active, relevant_dimensions};
use crate::model::{BoundingBox, FilterObject, FilterSpec, Permissions};
use crate::schema::{DimensionKind, SizeClass, StandardFilter, Stat};

/// A coordinate in the aggregator's wire format.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WirePoint {
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

impl WirePoint {
    /// Creates a point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Inclusion switches of a selector.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Additional {
    /// The selector has no relevant dimension and matches everything.
    pub include_everything: bool,
    /// Include the smallest size bucket.
    pub include_xxs: bool,
    /// Include the largest size bucket.
    pub include_xxl: bool,
    /// Include 0% IV entities (global selector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_zeroiv: Option<bool>,
    /// Include 100% IV entities (global selector only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_hundoiv: Option<bool>,
}

/// One selector reduced to its non-default, permitted dimensions.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SelectorPayload {
    /// IV range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<[i64; 2]>,
    /// Attack range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atk_iv: Option<[i64; 2]>,
    /// Defense range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub def_iv: Option<[i64; 2]>,
    /// Stamina range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sta_iv: Option<[i64; 2]>,
    /// CP range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cp: Option<[i64; 2]>,
    /// Level range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<[i64; 2]>,
    /// Gender scalar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<i64>,
    /// Rank windows of the leagues that differ from the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvp: Option<BTreeMap<String, [i64; 2]>>,
    /// Inclusion switches.
    pub additional: Additional,
}

impl SelectorPayload {
    fn stat_slot(&mut self, stat: Stat) -> &mut Option<[i64; 2]> {
        match stat {
            Stat::Iv => &mut self.iv,
            Stat::Cp => &mut self.cp,
            Stat::Level => &mut self.level,
            Stat::AtkIv => &mut self.atk_iv,
            Stat::DefIv => &mut self.def_iv,
            Stat::StaIv => &mut self.sta_iv,
        }
    }
}

/// Body of `POST /api/pokemon/scan`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanPayload {
    /// South-west corner.
    pub min: WirePoint,
    /// North-east corner.
    pub max: WirePoint,
    /// Unused by scans; always the origin.
    pub center: WirePoint,
    /// Unused by scans; always empty.
    #[serde(rename = "searchIds")]
    pub search_ids: Vec<u32>,
    /// Global selector.
    pub global: SelectorPayload,
    /// Combined row cap of both phases.
    pub limit: usize,
    /// Species selectors keyed `"<species>-<form>"`.
    pub filters: BTreeMap<String, SelectorPayload>,
}

/// Body of `POST /api/pokemon/search`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchPayload {
    /// Point distances are measured from.
    pub center: WirePoint,
    /// Row cap.
    pub limit: usize,
    /// Species to search for.
    #[serde(rename = "searchIds")]
    pub search_ids: Vec<u32>,
    /// Always empty.
    pub global: BTreeMap<String, ()>,
    /// Always empty.
    pub filters: BTreeMap<String, ()>,
}

impl SearchPayload {
    /// Builds a search body around `center`.
    pub fn new(center: WirePoint, search_ids: Vec<u32>, limit: usize) -> Self {
        Self {
            center,
            limit,
            search_ids,
            global: BTreeMap::new(),
            filters: BTreeMap::new(),
        }
    }
}

/// Builds scan payloads for one caller.
pub struct PayloadBuilder<'a> {
    standard: &'a StandardFilter,
    permissions: &'a Permissions,
}

impl<'a> PayloadBuilder<'a> {
    /// Creates a builder.
    pub fn new(standard: &'a StandardFilter, permissions: &'a Permissions) -> Self {
        Self {
            standard,
            permissions,
        }
    }

    /// Scan body for `bbox` with the combined row cap `limit`.
    pub fn scan(&self, bbox: &BoundingBox, filters: &FilterSpec, limit: usize) -> ScanPayload {
        let mut global = self.selector(&filters.global);
        global.additional = Additional {
            include_everything: false,
            include_xxs: self.size_flag(&filters.global, SizeClass::Xxs),
            include_xxl: self.size_flag(&filters.global, SizeClass::Xxl),
            include_zeroiv: Some(filters.flags.zero_iv),
            include_hundoiv: Some(filters.flags.hundo_iv),
        };
        ScanPayload {
            min: WirePoint::new(bbox.min_lat, bbox.min_lon),
            max: WirePoint::new(bbox.max_lat, bbox.max_lon),
            center: WirePoint::new(0.0, 0.0),
            search_ids: Vec::new(),
            global,
            limit,
            filters: filters
                .selectors
                .iter()
                .map(|(key, filter)| (key.to_string(), self.selector(filter)))
                .collect(),
        }
    }

    /// Reduces one selector. Stats and gender need the IV permission, rank
    /// windows the ranking permission.
    pub fn selector(&self, filter: &FilterObject) -> SelectorPayload {
        let mut payload = SelectorPayload::default();
        let mut leagues = BTreeMap::new();
        for dimension in self.standard.dimensions() {
            if !is_active(filter, dimension) {
                continue;
            }
            let value = filter.effective(dimension);
            match dimension.kind {
                DimensionKind::Range(stat) if self.permissions.iv => {
                    *payload.stat_slot(stat) = value.as_range();
                }
                DimensionKind::Gender if self.permissions.iv => {
                    payload.gender = value.as_int();
                }
                DimensionKind::LeagueRank if self.permissions.pvp => {
                    if let Some(window) = value.as_range() {
                        leagues.insert(dimension.name.clone(), window);
                    }
                }
                _ => {}
            }
        }
        if !leagues.is_empty() {
            payload.pvp = Some(leagues);
        }
        payload.additional = Additional {
            include_everything: relevant_dimensions(filter, self.standard).is_empty(),
            include_xxs: self.size_flag(filter, SizeClass::Xxs),
            include_xxl: self.size_flag(filter, SizeClass::Xxl),
            ..Additional::default()
        };
        payload
    }

    fn size_flag(&self, filter: &FilterObject, size: SizeClass) -> bool {
        filter
            .get(size.name())
            .is_some_and(|value| value.as_bool())
    }
}
