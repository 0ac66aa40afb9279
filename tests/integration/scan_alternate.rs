#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};
use serde_json::{json, Value};
use spawnfilter::config::Config;
use spawnfilter::model::{EntityView, Permissions};
use spawnfilter::service::{EntityService, ScanArgs};
use tempfile::TempDir;

const TS: i64 = 1_700_000_000;
const LIVE: i64 = 2_000_000_000;

const SCHEMA: &str = "
CREATE TABLE pokemon (
    encounter_id INTEGER PRIMARY KEY,
    pokemon_id INTEGER NOT NULL,
    form INTEGER,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    individual_attack INTEGER,
    individual_defense INTEGER,
    individual_stamina INTEGER,
    cp INTEGER,
    cp_multiplier REAL,
    gender INTEGER,
    size INTEGER,
    disappear_time TEXT NOT NULL,
    last_modified TEXT,
    spawnpoint_id INTEGER,
    weather_boosted_condition INTEGER
);
CREATE TABLE trs_spawn (
    spawnpoint INTEGER PRIMARY KEY,
    calc_endminsec TEXT
);
CREATE TABLE pokemon_display (
    encounter_id INTEGER PRIMARY KEY,
    pokemon INTEGER,
    form INTEGER
);";

// (encounter, species, form, lat, lon, [atk, def, sta], cp multiplier, expiry)
type Row = (i64, u32, u32, f64, f64, [u32; 3], f64, i64);

const ROWS: [Row; 5] = [
    (1_000_000_000_001, 1, 163, 40.50, -73.50, [14, 15, 15], 0.7317, LIVE),
    (1_000_000_000_002, 4, 0, 40.52, -73.52, [0, 0, 0], 0.761_563_84, LIVE),
    (1_000_000_000_003, 25, 0, 40.51, -73.51, [0, 15, 15], 0.7317, LIVE),
    (1_000_000_000_004, 132, 0, 40.53, -73.53, [5, 5, 5], 0.5974, LIVE),
    (1_000_000_000_005, 1, 163, 40.54, -73.54, [15, 15, 14], 0.7317, TS - 600),
];

fn seed(path: &Path) {
    let conn = Connection::open(path).expect("open db");
    conn.execute_batch(SCHEMA).expect("schema");
    for (encounter, species, form, lat, lon, [atk, def, sta], cpm, expire) in ROWS {
        conn.execute(
            "INSERT INTO pokemon (encounter_id, pokemon_id, form, latitude, longitude,
                                  individual_attack, individual_defense, individual_stamina,
                                  cp, cp_multiplier, disappear_time, last_modified, spawnpoint_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1500, ?9,
                     datetime(?10, 'unixepoch'), datetime(?11, 'unixepoch'), ?1)",
            params![encounter, species, form, lat, lon, atk, def, sta, cpm, expire, TS - 60],
        )
        .expect("insert pokemon");
    }
    conn.execute(
        "INSERT INTO trs_spawn (spawnpoint, calc_endminsec) VALUES (?1, '12:30')",
        params![ROWS[0].0],
    )
    .expect("insert spawn");
    conn.execute(
        "INSERT INTO pokemon_display (encounter_id, pokemon, form) VALUES (?1, 1, 13)",
        params![ROWS[3].0],
    )
    .expect("insert display");
}

fn open_service(dir: &TempDir, extra: &str) -> EntityService {
    let db = dir.path().join("alt.db");
    if !db.exists() {
        seed(&db);
    }
    let rankings = dir.path().join("rankings.json");
    fs::write(
        &rankings,
        json!({
            "25-0": {"0-15-15": {"great": [{"rank": 1, "cp": 1498, "capped": true}]}},
            "1-163": {"14-15-15": {"great": [{"rank": 900, "cp": 1490, "capped": true}]}}
        })
        .to_string(),
    )
    .expect("write rankings");
    let config = Config::from_toml(&format!(
        "[store]\npath = {db:?}\nalternate_schema = true\n[data]\nrankings = {rankings:?}\n{extra}"
    ))
    .expect("config");
    EntityService::from_config(config).expect("service")
}

fn args(permissions: Permissions, filters: Value) -> ScanArgs {
    let mut filters = filters;
    filters["ts"] = json!(TS);
    serde_json::from_value(json!({
        "permissions": permissions,
        "bbox": {"minLat": 40.0, "maxLat": 41.0, "minLon": -74.0, "maxLon": -73.0},
        "filters": filters,
    }))
    .expect("scan args")
}

fn ids(views: &[EntityView]) -> Vec<&str> {
    let mut ids: Vec<&str> = views.iter().map(|v| v.record.id.as_str()).collect();
    ids.sort_unstable();
    ids
}

fn iv_only() -> Permissions {
    Permissions {
        iv: true,
        ..Permissions::default()
    }
}

#[tokio::test]
async fn computed_iv_filters_and_maps_columns() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(iv_only(), json!({"onlyIvOr": {"iv": [90, 100]}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["1000000000001"]);
    let record = &views[0].record;
    assert_eq!((record.lat, record.lon), (40.5, -73.5));
    assert_eq!(record.atk_iv, Some(14));
    assert_eq!(record.expire_timestamp, Some(LIVE));
    assert!(record.expire_timestamp_verified);
    assert!(record.iv.is_some_and(|iv| (iv - 97.78).abs() < 0.01));
}

#[tokio::test]
async fn level_is_derived_from_the_cp_multiplier() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(iv_only(), json!({"onlyIvOr": {"level": [35, 35]}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["1000000000002"]);
    assert_eq!(views[0].record.level, Some(35.0));
    assert!(!views[0].record.expire_timestamp_verified);
}

#[tokio::test]
async fn joined_display_form_is_kept_for_disguised_entities() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(Permissions::default(), json!({"132-0": {}})))
        .await
        .expect("scan");
    assert_eq!(views.len(), 1);
    let record = &views[0].record;
    assert_eq!(record.ditto_form, Some(13));
    assert_eq!(record.form, Some(0));
    assert_eq!(record.seen_type.as_deref(), Some("encounter"));
}

#[tokio::test]
async fn league_windows_need_the_ranking_engine() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let filters = json!({"onlyIvOr": {"great": [1, 10]}});
    let views = service
        .get_all(&args(Permissions::all(), filters.clone()))
        .await
        .expect("scan");
    assert!(views.is_empty());

    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "[pvp]\nengine_handles_ranking = true\n");
    let views = service
        .get_all(&args(Permissions::all(), filters))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["1000000000003"]);
    assert_eq!(views[0].best_rank, Some(1));
    let clean = views[0].clean_rankings.as_ref().expect("rankings evaluated");
    assert_eq!(clean["great"][0].cp, 1498);
}
