#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde_json::{json, Value};
use spawnfilter::config::Config;
use spawnfilter::model::EntityView;
use spawnfilter::service::{EntityService, ScanArgs, SearchArgs};
use spawnfilter::{model::Permissions, QueryError};
use tempfile::TempDir;

const TS: i64 = 1_700_000_000;
const LIVE: i64 = 2_000_000_000;

const SCHEMA: &str = "CREATE TABLE pokemon (
    id TEXT PRIMARY KEY,
    pokemon_id INTEGER NOT NULL,
    form INTEGER,
    costume INTEGER,
    gender INTEGER,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    expire_timestamp INTEGER,
    expire_timestamp_verified INTEGER,
    updated INTEGER,
    changed INTEGER,
    iv REAL,
    cp INTEGER,
    level INTEGER,
    atk_iv INTEGER,
    def_iv INTEGER,
    sta_iv INTEGER,
    size INTEGER,
    weight REAL,
    pvp TEXT,
    pvp_rankings_great_league TEXT,
    pvp_rankings_ultra_league TEXT,
    spawn_id INTEGER,
    pokestop_id TEXT,
    seen_type TEXT,
    shiny INTEGER
)";

#[derive(Clone, Copy)]
struct Row {
    id: &'static str,
    species: u32,
    form: u32,
    lat: f64,
    lon: f64,
    expire: i64,
    iv: Option<f64>,
    great: Option<&'static str>,
    spawn_id: Option<i64>,
    pokestop: Option<&'static str>,
}

fn rows() -> Vec<Row> {
    let base = Row {
        id: "",
        species: 1,
        form: 163,
        lat: 40.5,
        lon: -73.5,
        expire: LIVE,
        iv: None,
        great: None,
        spawn_id: Some(1),
        pokestop: None,
    };
    vec![
        Row { id: "hundo", iv: Some(100.0), ..base },
        Row { id: "low", species: 4, form: 0, lat: 40.52, lon: -73.52, iv: Some(20.0), ..base },
        Row {
            id: "pvp1",
            species: 25,
            form: 0,
            lat: 40.51,
            lon: -73.51,
            iv: Some(60.0),
            great: Some(r#"[{"rank": 3, "cp": 1450}]"#),
            ..base
        },
        Row {
            id: "pvp2",
            species: 25,
            form: 0,
            lat: 40.7,
            lon: -73.7,
            iv: Some(50.0),
            great: Some(r#"[{"rank": 500, "cp": 1450}]"#),
            ..base
        },
        Row {
            id: "ditto",
            species: 132,
            form: 13,
            lat: 40.65,
            lon: -73.45,
            iv: Some(70.0),
            spawn_id: None,
            pokestop: Some("stop-1"),
            ..base
        },
        Row { id: "expired", expire: TS - 60, iv: Some(100.0), ..base },
        Row { id: "outside", species: 7, form: 0, lat: 10.0, lon: 10.0, iv: Some(100.0), ..base },
    ]
}

fn seed(path: &Path) {
    let conn = Connection::open(path).expect("open db");
    conn.execute_batch(SCHEMA).expect("schema");
    for row in rows() {
        conn.execute(
            "INSERT INTO pokemon (id, pokemon_id, form, lat, lon, expire_timestamp, iv, cp,
                                  pvp_rankings_great_league, spawn_id, pokestop_id, changed, shiny)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 500, ?8, ?9, ?10, 1, 0)",
            params![
                row.id,
                row.species,
                row.form,
                row.lat,
                row.lon,
                row.expire,
                row.iv,
                row.great,
                row.spawn_id,
                row.pokestop
            ],
        )
        .expect("insert");
    }
}

const DOWNTOWN: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": {"name": "Downtown"},
        "geometry": {"type": "Polygon", "coordinates": [[
            [-73.6, 40.4], [-73.4, 40.4], [-73.4, 40.55], [-73.6, 40.55], [-73.6, 40.4]
        ]]}
    }]
}"#;

fn open_service(dir: &TempDir, extra: &str) -> EntityService {
    let db = dir.path().join("map.db");
    if !db.exists() {
        seed(&db);
    }
    let areas: PathBuf = dir.path().join("areas.geojson");
    fs::write(&areas, DOWNTOWN).expect("write areas");
    let config = Config::from_toml(&format!(
        "[store]\npath = {db:?}\n[areas]\ngeojson = {areas:?}\n{extra}"
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
async fn global_iv_window_selects_matching_live_rows_in_box() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(iv_only(), json!({"onlyIvOr": {"iv": [90, 100]}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["hundo"]);
    let record = &views[0].record;
    assert!(record.changed);
    assert_eq!(record.seen_type.as_deref(), Some("encounter"));
    assert_eq!(views[0].best_rank, None);
}

#[tokio::test]
async fn league_window_runs_the_ranking_followup() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(
            Permissions::all(),
            json!({"onlyIvOr": {"great": [1, 10]}}),
        ))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["pvp1"]);
    assert_eq!(views[0].best_rank, Some(3));
    let clean = views[0].clean_rankings.as_ref().expect("rankings evaluated");
    assert_eq!(clean["great"][0].rank, 3);
    let encoded = serde_json::to_value(&views[0]).expect("encodes");
    assert_eq!(encoded["bestRank"], 3);
    assert!(encoded.get("pvp_check").is_none());
}

#[tokio::test]
async fn callers_without_access_only_see_selected_species() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let none = Permissions::default();

    let views = service
        .get_all(&args(none.clone(), json!({"onlyIvOr": {"iv": [90, 100]}})))
        .await
        .expect("scan");
    assert!(views.is_empty());

    let views = service
        .get_all(&args(none, json!({"1-163": {}, "132-0": {}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["ditto", "hundo"]);
    let ditto = views.iter().find(|v| v.record.id == "ditto").expect("ditto");
    assert_eq!(ditto.record.ditto_form, Some(13));
    assert_eq!(ditto.record.form, Some(0));
    assert_eq!(ditto.record.seen_type.as_deref(), Some("nearby_stop"));
}

#[tokio::test]
async fn link_global_drops_unselected_species() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let views = service
        .get_all(&args(
            iv_only(),
            json!({"onlyIvOr": {"iv": [50, 100]}, "onlyLinkGlobal": true, "25-0": {}}),
        ))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["pvp1", "pvp2"]);
    assert!(views.iter().all(|v| v.record.pvp_rankings_great_league.is_none()));
}

#[tokio::test]
async fn area_restrictions_filter_rows_and_unknown_areas_hide_everything() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let restricted = Permissions {
        iv: true,
        pvp: false,
        area_restrictions: vec!["Downtown".into()],
    };
    let views = service
        .get_all(&args(restricted, json!({"onlyIvOr": {"iv": [1, 100]}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["hundo", "low", "pvp1"]);

    let views = service
        .get_all(&args(
            iv_only(),
            json!({"onlyIvOr": {"iv": [1, 100]}, "onlyAreas": ["Uptown"]}),
        ))
        .await
        .expect("scan");
    assert!(views.is_empty());
}

#[tokio::test]
async fn inverted_box_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let mut scan = args(iv_only(), json!({}));
    scan.bbox.min_lat = 41.5;
    let err = service.get_all(&scan).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidBounds(_)));
}

#[tokio::test]
async fn available_counts_live_species() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let available = service.available().await.expect("available");
    assert_eq!(
        available.available,
        ["1-163", "4-0", "7-0", "25-0", "132-13"]
    );
    assert_eq!(available.rarity["25-0"], 2);
    assert_eq!(available.rarity["1-163"], 1);
}

#[tokio::test]
async fn get_one_returns_position_or_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "");
    let position = service.get_one("pvp1").await.expect("found");
    assert_eq!((position.lat, position.lon), (40.51, -73.51));
    assert!(matches!(
        service.get_one("missing").await,
        Err(QueryError::NotFound(_))
    ));
}

#[tokio::test]
async fn search_orders_by_distance_and_hides_iv() {
    let dir = TempDir::new().expect("tempdir");
    let service = open_service(&dir, "[map]\ndistance_unit = \"km\"\n");
    let search = SearchArgs {
        species_ids: vec![25],
        lat: 40.51,
        lon: -73.51,
        only_areas: Vec::new(),
        ts: Some(TS),
    };
    let hits = service
        .search(&Permissions::default(), &search)
        .await
        .expect("search");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "pvp1");
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits[1].distance > 20.0 && hits[1].distance < 30.0);
    assert!(hits.iter().all(|hit| hit.iv.is_none()));

    let hits = service.search(&iv_only(), &search).await.expect("search");
    assert_eq!(hits[0].iv.as_deref(), Some("60.00"));
}

#[tokio::test]
async fn out_of_area_rows_do_not_use_up_the_limit() {
    let dir = TempDir::new().expect("tempdir");
    let conn = Connection::open(dir.path().join("map.db")).expect("open db");
    conn.execute_batch(SCHEMA).expect("schema");
    let placed = (0..5)
        .map(|n| (format!("far-{n}"), 40.8, -73.2))
        .chain((0..2).map(|n| (format!("near-{n}"), 40.45, -73.5)));
    for (id, lat, lon) in placed {
        conn.execute(
            "INSERT INTO pokemon (id, pokemon_id, form, lat, lon, expire_timestamp, iv)
             VALUES (?1, 1, 0, ?2, ?3, ?4, 90.0)",
            params![id, lat, lon, LIVE],
        )
        .expect("insert");
    }
    drop(conn);

    let service = open_service(&dir, "[limits]\npokemon = 5\n");
    let restricted = Permissions {
        iv: true,
        pvp: false,
        area_restrictions: vec!["Downtown".into()],
    };
    let views = service
        .get_all(&args(restricted, json!({"onlyIvOr": {"iv": [80, 100]}})))
        .await
        .expect("scan");
    assert_eq!(ids(&views), ["near-0", "near-1"]);
}
