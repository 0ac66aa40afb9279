#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;

fn setup(name: &str, extra: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join(format!("{name}.db"));
    seed(&db);
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[store]\npath = {db:?}\n\n[[pvp.leagues]]\nname = \"great\"\nmin_cp = 1400\n\n{extra}"
        ),
    )
    .expect("write config");
    (dir, config)
}

fn seed(path: &Path) {
    let conn = Connection::open(path).expect("open db");
    conn.execute_batch(
        "CREATE TABLE pokemon (
            id TEXT PRIMARY KEY, pokemon_id INTEGER, form INTEGER, lat REAL, lon REAL,
            expire_timestamp INTEGER, iv REAL, cp INTEGER
        );
        INSERT INTO pokemon VALUES ('a', 1, 0, 40.5, -73.5, 4000000000, 100.0, 900);
        INSERT INTO pokemon VALUES ('b', 4, 0, 40.6, -73.6, 4000000000, 12.0, 300);",
    )
    .expect("seed");
}

#[test]
fn check_config_reports_backend_and_leagues() {
    let (_dir, config) = setup("check", "");
    let output = cargo_bin_cmd!("spawnfilter")
        .args(["--format", "json", "check-config", "--config"])
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(report["backend"], "local");
    assert_eq!(report["leagues"], json!(["great"]));
    assert_eq!(report["dimensions"], 10);
    assert_eq!(report["areas"], 0);
}

#[test]
fn check_config_text_output() {
    let (_dir, config) = setup("text", "");
    let output = cargo_bin_cmd!("spawnfilter")
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.starts_with("configuration ok"));
    assert!(text.contains("backend: local"));
}

#[test]
fn invalid_config_fails_with_message() {
    let (_dir, config) = setup("invalid", "[filters]\niv = [90, 10]\n");
    let output = cargo_bin_cmd!("spawnfilter")
        .args(["check-config", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.contains("iv window is inverted"), "{stderr}");
}

#[test]
fn scan_prints_entities_from_a_request_file() {
    let (dir, config) = setup("scan", "");
    let request = dir.path().join("request.json");
    fs::write(
        &request,
        json!({
            "permissions": {"iv": true},
            "bbox": {"minLat": 40.0, "maxLat": 41.0, "minLon": -74.0, "maxLon": -73.0},
            "filters": {"onlyIvOr": {"iv": [90, 100]}}
        })
        .to_string(),
    )
    .expect("write request");

    let output = cargo_bin_cmd!("spawnfilter")
        .args(["--format", "json", "scan", "--request"])
        .arg(&request)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let views: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(views.as_array().map(Vec::len), Some(1));
    assert_eq!(views[0]["id"], "a");

    let output = cargo_bin_cmd!("spawnfilter")
        .args(["scan", "--request"])
        .arg(&request)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("a species=1 form=0"), "{text}");
    assert!(text.trim_end().ends_with("1 entities"));
}
