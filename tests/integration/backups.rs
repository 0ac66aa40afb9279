#![allow(missing_docs)]

use std::time::Duration;

use serde_json::json;
use spawnfilter::backup::{BackupError, BackupInput, BackupStore};
use spawnfilter::config::{BackupLimits, Config};
use spawnfilter::exec::LocalStore;
use spawnfilter::server::backup_store_for;
use spawnfilter::service::EntityService;
use tempfile::TempDir;

fn preset(name: &str) -> BackupInput {
    BackupInput {
        name: name.into(),
        data: json!({
            "filters": {"onlyIvOr": {"iv": [90, 100]}, "25-0": {"great": [1, 10]}},
            "settings": {"darkMode": true}
        }),
    }
}

async fn open(path: &std::path::Path) -> BackupStore {
    let local = LocalStore::open(path, Duration::from_secs(5), false).expect("open store");
    BackupStore::open(local, BackupLimits::default())
        .await
        .expect("backup table")
}

#[tokio::test]
async fn backups_survive_reopening_the_store() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("map.db");

    let created = {
        let backups = open(&path).await;
        backups.create("ash", preset("evening")).await.expect("created")
    };
    assert!(created.created_at > 0);
    assert_eq!(created.created_at, created.updated_at);

    let backups = open(&path).await;
    let loaded = backups.get("ash", created.id).await.expect("still there");
    assert_eq!(loaded, created);
    assert_eq!(loaded.data["settings"]["darkMode"], true);

    let listed = backups.list("ash").await.expect("listed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "evening");
    let encoded = serde_json::to_value(&listed[0]).expect("encodes");
    assert!(encoded.get("createdAt").is_some());
    assert!(encoded.get("data").is_none());
}

#[tokio::test]
async fn listing_is_ordered_and_updates_refresh_the_document() {
    let dir = TempDir::new().expect("tempdir");
    let backups = open(&dir.path().join("map.db")).await;
    let first = backups.create("ash", preset("one")).await.expect("one");
    let second = backups.create("ash", preset("two")).await.expect("two");

    let ids: Vec<i64> = backups
        .list("ash")
        .await
        .expect("listed")
        .iter()
        .map(|summary| summary.id)
        .collect();
    assert_eq!(ids, [first.id, second.id]);

    let replaced = backups
        .update(
            "ash",
            first.id,
            BackupInput {
                name: "renamed".into(),
                data: json!({"filters": {}}),
            },
        )
        .await
        .expect("updated");
    assert_eq!(replaced.name, "renamed");
    assert_eq!(replaced.data, json!({"filters": {}}));
    assert!(matches!(
        backups.update("misty", first.id, preset("x")).await,
        Err(BackupError::NotFound)
    ));
}

#[tokio::test]
async fn remote_deployments_without_a_store_keep_backups_in_memory() {
    let config = Config::from_toml(
        "[remote]\nenabled = true\nendpoint = \"http://127.0.0.1:9\"\n",
    )
    .expect("config");
    let service = EntityService::from_config(config).expect("service");
    let backups = backup_store_for(&service).await.expect("in-memory backups");
    let created = backups.create("ash", preset("temp")).await.expect("created");
    assert_eq!(backups.get("ash", created.id).await.expect("found").name, "temp");
}
