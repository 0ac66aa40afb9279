#![allow(missing_docs)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use spawnfilter::config::Config;
use spawnfilter::server::{backup_store_for, build_router, ServerState};
use spawnfilter::service::EntityService;
use tempfile::TempDir;
use tower::ServiceExt;

async fn app(dir: &TempDir, extra: &str) -> Router {
    let db = dir.path().join("map.db");
    let conn = Connection::open(&db).expect("open db");
    conn.execute_batch(
        "CREATE TABLE pokemon (
            id TEXT PRIMARY KEY, pokemon_id INTEGER, form INTEGER, lat REAL, lon REAL,
            expire_timestamp INTEGER, iv REAL, cp INTEGER,
            pvp_rankings_great_league TEXT, pvp_rankings_ultra_league TEXT
        );
        INSERT INTO pokemon VALUES ('a', 1, 0, 40.5, -73.5, 4000000000, 98.0, 900, NULL, NULL);",
    )
    .expect("seed");
    let config = Config::from_toml(&format!(
        "[store]\npath = {db:?}\n[server]\nallow_origins = [\"https://map.example\"]\n{extra}"
    ))
    .expect("config");
    let service = EntityService::from_config(config).expect("service");
    let backups = backup_store_for(&service).await.expect("backups");
    build_router(ServerState::new(service, backups))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

fn bbox() -> Value {
    json!({"minLat": 40.0, "maxLat": 41.0, "minLon": -74.0, "maxLon": -73.0})
}

#[tokio::test]
async fn health_reports_backend() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "").await;
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "remote": false}));
}

#[tokio::test]
async fn scan_returns_matching_entities() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "").await;
    let (status, body) = call(
        &app,
        "POST",
        "/api/pokemon/scan",
        Some(json!({
            "permissions": {"iv": true},
            "bbox": bbox(),
            "filters": {"onlyIvOr": {"iv": [90, 100]}}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["id"], "a");
    assert_eq!(body[0]["seen_type"], "encounter");
}

#[tokio::test]
async fn bad_requests_map_to_client_errors() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "").await;

    let inverted = json!({"minLat": 41.0, "maxLat": 40.0, "minLon": -74.0, "maxLon": -73.0});
    let (status, body) = call(
        &app,
        "POST",
        "/api/pokemon/scan",
        Some(json!({"permissions": {"iv": true}, "bbox": inverted})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("bounding box")));

    let (status, _) = call(
        &app,
        "POST",
        "/api/pokemon/scan",
        Some(json!({"bbox": bbox(), "filters": {"pika-chu": {}}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", "/api/pokemon/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn available_position_and_search_routes() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "").await;

    let (status, body) = call(&app, "GET", "/api/pokemon/available", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], json!(["1-0"]));

    let (status, body) = call(&app, "GET", "/api/pokemon/a", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"lat": 40.5, "lon": -73.5}));

    let (status, body) = call(
        &app,
        "POST",
        "/api/pokemon/search",
        Some(json!({"permissions": {"iv": true}, "speciesIds": [1], "lat": 40.5, "lon": -73.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "a");
    assert_eq!(body[0]["iv"], "98.00");
    assert_eq!(body[0]["distance"], 0.0);
}

#[tokio::test]
async fn backup_routes_cover_the_lifecycle() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "[backups]\nsize_limit = 200\ncount_limit = 1\n").await;
    let preset = json!({"name": "raids", "data": {"onlyIvOr": {"iv": [90, 100]}}});

    let (status, created) = call(&app, "POST", "/api/users/ash/backups", Some(preset.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_i64().expect("id");

    let (status, _) = call(&app, "POST", "/api/users/ash/backups", Some(preset)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let huge = json!({"name": "huge", "data": {"blob": "x".repeat(500)}});
    let uri = format!("/api/users/ash/backups/{id}");
    let (status, _) = call(&app, "PUT", &uri, Some(huge)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, listed) = call(&app, "GET", "/api/users/ash/backups", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["name"], "raids");

    let (status, _) = call(&app, "GET", &format!("/api/users/misty/backups/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let (status, _) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reload_rebuilds_reference_data() {
    let dir = TempDir::new().expect("tempdir");
    let app = app(&dir, "").await;
    let (status, body) = call(&app, "POST", "/api/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"areas": 0, "ranking_species": 0}));
}
