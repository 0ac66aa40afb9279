//! Entity search service.
//!
//! [`EntityService`] ties the compiler, the executor and the merge stage
//! together. It owns the backend handle and the snapshot store; every request
//! works on the snapshot that was current when it started.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::compile::{BackendMode, FilterCompiler};
use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::exec::payload::{PayloadBuilder, SearchPayload, WirePoint};
use crate::exec::{PreparedQuery, QueryTarget, RemoteRequest};
use crate::merge::Merger;
use crate::model::{BoundingBox, EntityView, FilterSpec, Permissions, RawEntityRecord};
use crate::snapshot::{Snapshot, SnapshotStore};

/// One scan request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanArgs {
    /// Capabilities of the caller.
    #[serde(default)]
    pub permissions: Permissions,
    /// Visible map region.
    pub bbox: BoundingBox,
    /// Filter tree.
    #[serde(default)]
    pub filters: FilterSpec,
}

/// Species currently on the map.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Available {
    /// `"<species>-<form>"` keys in backend order.
    pub available: Vec<String>,
    /// Active count per key.
    pub rarity: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
struct AvailableRow {
    id: u32,
    #[serde(default)]
    form: Option<u32>,
    #[serde(default)]
    count: u64,
}

/// Location of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// Nearest-entity search request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    /// Species to look for.
    pub species_ids: Vec<u32>,
    /// Latitude distances are measured from.
    pub lat: f64,
    /// Longitude distances are measured from.
    pub lon: f64,
    /// Areas the user narrowed the view to.
    #[serde(default)]
    pub only_areas: Vec<String>,
    /// Reference timestamp for expiry checks.
    #[serde(default)]
    pub ts: Option<i64>,
}

/// One search result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    /// Identity.
    pub id: String,
    /// Species id.
    pub pokemon_id: u32,
    /// Form id.
    pub form: Option<u32>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// IV percentage with two decimals, only for callers allowed to see it.
    pub iv: Option<String>,
    /// Distance from the search centre in the configured unit.
    pub distance: f64,
    /// Cosmetic attributes (`gender`, `costume`, `shiny`) when present.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

const SEARCH_DETAILS: [&str; 3] = ["gender", "costume", "shiny"];

/// Entity search over the configured backend.
pub struct EntityService {
    config: Arc<Config>,
    mode: BackendMode,
    target: QueryTarget,
    snapshots: SnapshotStore,
}

impl EntityService {
    /// Assembles a service from parts.
    pub fn new(config: Config, target: QueryTarget, snapshot: Snapshot) -> Self {
        let mut mode = BackendMode::from_config(&config);
        mode.remote = target.is_remote();
        Self {
            config: Arc::new(config),
            mode,
            target,
            snapshots: SnapshotStore::new(snapshot),
        }
    }

    /// Opens the configured backend and loads reference data.
    pub fn from_config(config: Config) -> Result<Self> {
        let snapshot = Snapshot::load(&config)?;
        let target = QueryTarget::from_config(&config)?;
        Ok(Self::new(config, target, snapshot))
    }

    /// Service configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend capabilities in effect.
    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Backend handle.
    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Snapshot in effect for new requests.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.current()
    }

    /// Entities in the box that match the filter tree.
    #[instrument(skip_all, fields(selectors = args.filters.selectors.len()))]
    pub async fn get_all(&self, args: &ScanArgs) -> Result<Vec<EntityView>> {
        args.bbox.validate()?;
        let snapshot = self.snapshots.current();
        let ScanArgs {
            permissions,
            bbox,
            filters,
        } = args;
        let scope = snapshot
            .areas
            .scope(&permissions.area_restrictions, &filters.only_areas);
        let areas = snapshot.areas.filter(scope);
        let area_bounds = areas.bounds();
        let compiler = FilterCompiler::new(&snapshot.standard, permissions, &self.mode)
            .within_areas(&area_bounds);
        if !compiler.has_work(filters) {
            debug!("nothing selected");
            return Ok(Vec::new());
        }
        if areas.is_nothing() {
            debug!("area scope excludes everything");
            return Ok(Vec::new());
        }
        let limits = &self.config.limits;
        let ts = filters.ts.unwrap_or_else(now);

        let (primary, query_pvp) = if self.target.is_remote() {
            let payload = PayloadBuilder::new(&snapshot.standard, permissions).scan(
                bbox,
                filters,
                limits.pokemon + limits.pokemon_pvp,
            );
            let request = RemoteRequest::post("/api/pokemon/scan", serde_json::to_value(payload)?);
            (PreparedQuery::Remote(request), false)
        } else {
            let scan = compiler.primary(bbox, filters, ts, limits.pokemon);
            (PreparedQuery::Sql(scan.query), scan.query_pvp)
        };
        let rows: Vec<RawEntityRecord> = self.target.execute(primary).await;
        let primary_count = rows.len();

        let merger = Merger::new(
            filters,
            permissions,
            &snapshot,
            &self.config.pvp,
            self.mode,
            areas,
        );
        let mut partition = merger.partition(rows);

        if query_pvp && self.mode.runs_followup() {
            let remaining = limits.pokemon_pvp.saturating_sub(primary_count);
            if remaining > 0 {
                let followup =
                    compiler.ranking_followup(bbox, ts, &partition.ranking_ids, remaining);
                let rows: Vec<RawEntityRecord> =
                    self.target.execute(PreparedQuery::Sql(followup)).await;
                debug!(rows = rows.len(), "ranking follow-up fetched");
                merger.absorb_followup(&mut partition, rows);
            }
        }

        let views = merger.finish(partition);
        debug!(primary = primary_count, emitted = views.len(), "scan finished");
        Ok(views)
    }

    /// Active species/form keys and their counts.
    pub async fn available(&self) -> Result<Available> {
        let query = if self.target.is_remote() {
            PreparedQuery::Remote(RemoteRequest::get("/api/pokemon/available"))
        } else {
            let snapshot = self.snapshots.current();
            let permissions = Permissions::default();
            let compiler = FilterCompiler::new(&snapshot.standard, &permissions, &self.mode);
            PreparedQuery::Sql(compiler.available(now()))
        };
        let rows: Vec<AvailableRow> = self.target.execute(query).await;
        let mut available = Available::default();
        for row in rows {
            let key = format!("{}-{}", row.id, row.form.unwrap_or(0));
            available.rarity.insert(key.clone(), row.count);
            available.available.push(key);
        }
        Ok(available)
    }

    /// Position of one entity.
    pub async fn get_one(&self, id: &str) -> Result<Position> {
        let query = if self.target.is_remote() {
            if !is_path_safe(id) {
                debug!(id, "identity cannot be used as a path segment");
                return Err(QueryError::NotFound("pokemon"));
            }
            PreparedQuery::Remote(RemoteRequest::get(format!("/api/pokemon/id/{id}")))
        } else {
            let snapshot = self.snapshots.current();
            let permissions = Permissions::default();
            let compiler = FilterCompiler::new(&snapshot.standard, &permissions, &self.mode);
            PreparedQuery::Sql(compiler.position(id))
        };
        self.target
            .execute::<Position>(query)
            .await
            .into_iter()
            .next()
            .ok_or(QueryError::NotFound("pokemon"))
    }

    /// Nearest active entities of the requested species, closest first.
    pub async fn search(&self, permissions: &Permissions, args: &SearchArgs) -> Result<Vec<SearchHit>> {
        if !args.lat.is_finite() || !args.lon.is_finite() {
            return Err(QueryError::InvalidBounds("search centre must be finite".into()));
        }
        if args.species_ids.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshots.current();
        let areas = snapshot
            .areas
            .filter(snapshot.areas.scope(&permissions.area_restrictions, &args.only_areas));
        if areas.is_nothing() {
            return Ok(Vec::new());
        }
        let wanted = self.config.limits.search_results;
        let query = if self.target.is_remote() {
            let payload = SearchPayload::new(
                WirePoint::new(args.lat, args.lon),
                args.species_ids.clone(),
                wanted * 4,
            );
            PreparedQuery::Remote(RemoteRequest::post(
                "/api/pokemon/search",
                serde_json::to_value(payload)?,
            ))
        } else {
            let area_bounds = areas.bounds();
            let compiler = FilterCompiler::new(&snapshot.standard, permissions, &self.mode)
                .within_areas(&area_bounds);
            PreparedQuery::Sql(compiler.species_search(
                &args.species_ids,
                (args.lat, args.lon),
                args.ts.unwrap_or_else(now),
                wanted * 4,
            ))
        };
        let rows: Vec<RawEntityRecord> = self.target.execute(query).await;
        let center = Point::new(args.lon, args.lat);
        let unit = self.config.map.distance_unit;
        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter(|row| areas.admits(row.lat, row.lon))
            .map(|mut row| {
                let meters = center.haversine_distance(&Point::new(row.lon, row.lat));
                let details = SEARCH_DETAILS
                    .iter()
                    .filter_map(|key| row.extra.remove(*key).map(|value| ((*key).to_owned(), value)))
                    .collect();
                SearchHit {
                    iv: row
                        .iv
                        .filter(|_| permissions.iv)
                        .map(|iv| format!("{iv:.2}")),
                    distance: round2(unit.from_meters(meters)),
                    id: row.id,
                    pokemon_id: row.pokemon_id,
                    form: row.form,
                    lat: row.lat,
                    lon: row.lon,
                    details,
                }
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(wanted);
        Ok(hits)
    }

    /// Rebuilds reference tables from configuration and swaps them in.
    pub fn reload(&self) -> Result<()> {
        let snapshot = self.snapshots.reload(&self.config)?;
        info!(areas = snapshot.areas.len(), "reference data reloaded");
        Ok(())
    }
}

fn is_path_safe(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
