#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use spawnfilter::config::Config;
use spawnfilter::exec::SECRET_HEADER;
use spawnfilter::model::Permissions;
use spawnfilter::service::{EntityService, ScanArgs, SearchArgs};
use spawnfilter::QueryError;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Captured {
    calls: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
}

impl Captured {
    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let secret = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        self.calls.lock().push((path.to_owned(), secret, body));
    }

    fn take(&self) -> Vec<(String, Option<String>, Value)> {
        std::mem::take(&mut *self.calls.lock())
    }
}

async fn scan(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured.record("/api/pokemon/scan", &headers, body);
    Json(json!([
        {"id": "stat", "pokemon_id": 4, "form": 0, "lat": 40.5, "lon": -73.5, "iv": 91.1},
        {"id": 77, "pokemon_id": 25, "form": 0, "lat": 40.6, "lon": -73.6, "cp": 1490,
         "pvp": {"great": [{"rank": 2, "cp": 1490}, {"rank": 40, "cp": 1500}]}},
        {"id": "disguised", "pokemon_id": 132, "form": 13, "lat": 40.7, "lon": -73.7,
         "spawn_id": null},
        {"id": "broken", "lat": "north"}
    ]))
}

async fn search(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    captured.record("/api/pokemon/search", &headers, body);
    Json(json!([
        {"id": "far", "pokemon_id": 25, "form": 0, "lat": 41.0, "lon": -73.5, "iv": 50.0},
        {"id": "near", "pokemon_id": 25, "form": 0, "lat": 40.5, "lon": -73.5, "iv": 75.5,
         "gender": 1}
    ]))
}

async fn available() -> Json<Value> {
    Json(json!([
        {"id": 25, "form": 0, "count": 3},
        {"id": 132, "form": null, "count": 1}
    ]))
}

async fn position(Path(id): Path<String>) -> Json<Value> {
    if id == "77" {
        Json(json!({"lat": 40.6, "lon": -73.6}))
    } else {
        Json(Value::Null)
    }
}

async fn slow_scan() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!([{"id": "late", "pokemon_id": 1, "lat": 40.5, "lon": -73.5}]))
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}")
}

async fn mock() -> (String, Captured) {
    let captured = Captured::default();
    let router = Router::new()
        .route("/api/pokemon/scan", post(scan))
        .route("/api/pokemon/search", post(search))
        .route("/api/pokemon/available", get(available))
        .route("/api/pokemon/id/:id", get(position))
        .with_state(captured.clone());
    (spawn(router).await, captured)
}

fn open_service(endpoint: &str) -> EntityService {
    let config = Config::from_toml(&format!(
        "[remote]\nenabled = true\nendpoint = \"{endpoint}/\"\nsecret = \"hunter2\"\ntimeout_ms = 300\n\
         [limits]\npokemon = 100\npokemon_pvp = 50\nsearch_results = 5\n"
    ))
    .expect("config");
    EntityService::from_config(config).expect("service")
}

fn args(filters: Value) -> ScanArgs {
    serde_json::from_value(json!({
        "permissions": Permissions::all(),
        "bbox": {"minLat": 40.0, "maxLat": 41.0, "minLon": -74.0, "maxLon": -73.0},
        "filters": filters,
    }))
    .expect("scan args")
}

#[tokio::test]
async fn scan_posts_payload_and_merges_rows() {
    let (endpoint, captured) = mock().await;
    let service = open_service(&endpoint);
    assert!(service.mode().remote);

    let views = service
        .get_all(&args(json!({
            "onlyIvOr": {"iv": [80, 100], "great": [1, 5]},
            "onlyZeroIv": true,
            "25-0": {}
        })))
        .await
        .expect("scan");

    let calls = captured.take();
    assert_eq!(calls.len(), 1, "remote scans never run a follow-up");
    let (path, secret, body) = &calls[0];
    assert_eq!(path, "/api/pokemon/scan");
    assert_eq!(secret.as_deref(), Some("hunter2"));
    assert_eq!(body["limit"], 150);
    assert_eq!(body["min"], json!({"latitude": 40.0, "longitude": -74.0}));
    assert_eq!(body["global"]["iv"], json!([80, 100]));
    assert_eq!(body["global"]["pvp"], json!({"great": [1, 5]}));
    assert_eq!(body["global"]["additional"]["include_zeroiv"], true);
    assert_eq!(body["filters"]["25-0"]["additional"]["include_everything"], true);

    let ids: Vec<&str> = views.iter().map(|v| v.record.id.as_str()).collect();
    assert_eq!(ids, ["stat", "disguised", "77"]);
    let ranked = &views[2];
    assert_eq!(ranked.best_rank, Some(2));
    let clean = ranked.clean_rankings.as_ref().expect("rankings evaluated");
    assert_eq!(clean["great"].len(), 1);
    let disguised = &views[1].record;
    assert_eq!((disguised.ditto_form, disguised.form), (Some(13), Some(0)));
    assert_eq!(disguised.seen_type.as_deref(), Some("nearby_cell"));
}

#[tokio::test]
async fn available_and_position_use_remote_endpoints() {
    let (endpoint, _captured) = mock().await;
    let service = open_service(&endpoint);

    let available = service.available().await.expect("available");
    assert_eq!(available.available, ["25-0", "132-0"]);
    assert_eq!(available.rarity["25-0"], 3);

    let position = service.get_one("77").await.expect("found");
    assert_eq!((position.lat, position.lon), (40.6, -73.6));
    assert!(matches!(
        service.get_one("missing").await,
        Err(QueryError::NotFound(_))
    ));
    assert!(matches!(
        service.get_one("77?extra=1").await,
        Err(QueryError::NotFound(_))
    ));
    assert!(matches!(
        service.get_one("77/../77").await,
        Err(QueryError::NotFound(_))
    ));
}

#[tokio::test]
async fn search_sends_candidates_request_and_sorts_locally() {
    let (endpoint, captured) = mock().await;
    let service = open_service(&endpoint);
    let hits = service
        .search(
            &Permissions::all(),
            &SearchArgs {
                species_ids: vec![25],
                lat: 40.5,
                lon: -73.5,
                only_areas: Vec::new(),
                ts: None,
            },
        )
        .await
        .expect("search");

    let calls = captured.take();
    assert_eq!(
        calls[0].2,
        json!({
            "center": {"latitude": 40.5, "longitude": -73.5},
            "limit": 20,
            "searchIds": [25],
            "global": {},
            "filters": {}
        })
    );
    let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, ["near", "far"]);
    assert_eq!(hits[0].iv.as_deref(), Some("75.50"));
    assert_eq!(hits[0].details.get("gender"), Some(&json!(1)));
    assert!((hits[1].distance - 55.6).abs() < 0.1, "{}", hits[1].distance);
}

#[tokio::test]
async fn unreachable_or_slow_aggregator_yields_empty_results() {
    let router = Router::new().route("/api/pokemon/scan", post(slow_scan));
    let endpoint = spawn(router).await;
    let service = open_service(&endpoint);
    let views = service
        .get_all(&args(json!({"onlyIvOr": {"iv": [80, 100]}})))
        .await
        .expect("timeouts degrade to empty");
    assert!(views.is_empty());

    let service = open_service("http://127.0.0.1:9");
    let available = service.available().await.expect("errors degrade to empty");
    assert!(available.available.is_empty());
}
