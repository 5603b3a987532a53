//! Cache engine behavior over real backends.

use std::time::Duration;

use cairn_core::{Aggregation, Query, Record, DEFAULT_ID_LENGTH};
use cairn_storage::{CacheEngine, CacheRequest, ProviderSelector};
use cairn_test_utils::assertions::*;
use cairn_test_utils::fixtures::*;
use serde_json::json;
use tempfile::TempDir;

async fn lmdb_engine(dir: &TempDir) -> std::sync::Arc<CacheEngine> {
    let selector = ProviderSelector::new(temp_settings(dir)).expect("valid settings");
    selector
        .resolve(&[cairn_core::StorageTechnology::Lmdb])
        .await
        .expect("lmdb should resolve")
}

#[tokio::test]
async fn save_assigns_hex_id_and_keeps_given_id() {
    let engine = memory_engine();

    let first = engine.save("notes", note("a")).await.expect("save");
    assert_hex_id(first.id(), DEFAULT_ID_LENGTH);
    assert_eq!(first.get("_meta"), Some(&json!({ "local": true })));

    let second = engine
        .save("notes", keyed_note("given", "b"))
        .await
        .expect("save");
    assert_eq!(second.id(), Some("given"));
    assert!(!second.is_local());
}

#[tokio::test]
async fn save_symmetry() {
    let engine = memory_engine();
    let single: Record = engine.save("notes", note("a")).await.expect("save");
    assert!(single.id().is_some());

    let many: Vec<Record> = engine.save("notes", vec![note("b")]).await.expect("save");
    assert_eq!(many.len(), 1);
}

#[tokio::test]
async fn find_by_id_rejects_numeric_id() {
    let engine = memory_engine();
    assert_validation_error(&engine.find_by_id("notes", 123).await);
}

#[tokio::test]
async fn round_trip_on_lmdb() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let engine = lmdb_engine(&dir).await;

    let saved = engine.save("notes", note("persist me")).await.expect("save");
    let id = saved.id().expect("id").to_string();
    let found = engine.find_by_id("notes", id).await.expect("find_by_id");
    assert_eq!(found, Some(saved));
}

#[tokio::test]
async fn remove_ignores_window_on_lmdb() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let engine = lmdb_engine(&dir).await;
    engine
        .save("notes", vec![note("x"), note("x"), note("x"), note("y")])
        .await
        .expect("save");

    let query = Query::new().equal_to("text", "x").descending("text").limit(1);
    let removed = engine.remove("notes", Some(&query)).await.expect("remove");
    assert_eq!(removed.len(), 3);
    assert_eq!(engine.count("notes", None).await.expect("count").count, 1);
}

#[tokio::test]
async fn group_over_sqlite() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let selector = ProviderSelector::new(temp_settings(&dir)).expect("valid settings");
    let engine = selector
        .resolve(&[cairn_core::StorageTechnology::Sqlite])
        .await
        .expect("sqlite should resolve");

    engine
        .save(
            "sales",
            vec![
                note("a").with("region", "north").with("amount", 3),
                note("b").with("region", "south").with("amount", 4),
                note("c").with("region", "north").with("amount", 5),
            ],
        )
        .await
        .expect("save");

    let result = engine
        .group("sales", &Aggregation::sum("amount").by("region"))
        .await
        .expect("group")
        .expect("non-empty collection");
    assert_eq!(result[0]["region"], json!("north"));
    assert_eq!(result[0]["result"].as_f64(), Some(8.0));
    assert_eq!(result[1]["result"].as_f64(), Some(4.0));
}

#[tokio::test]
async fn backend_errors_propagate_unchanged() {
    let engine = failing_engine();
    assert_backend_error(&engine.find("notes", None).await);
    assert_backend_error(&engine.find_by_id("notes", "a").await);
    assert_backend_error(&engine.save("notes", note("a")).await);
    assert_backend_error(&engine.remove_by_id("notes", "a").await);
}

#[tokio::test]
async fn concurrent_writes_to_one_collection_are_serialized() {
    let engine = memory_engine();
    let key = engine.key("notes");

    // Hold the key so every save below queues behind it.
    let gate = engine.serializer().run(key.clone(), || async {
        tokio::time::sleep(Duration::from_millis(20)).await;
    });
    let saves = (0..5).map(|i| engine.save("notes", keyed_note(&i.to_string(), "n")));
    let saves = futures_util::future::join_all(saves);
    assert_eq!(engine.serializer().pending(&key), 1);

    let (_, results) = tokio::join!(gate, saves);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(engine.count("notes", None).await.expect("count").count, 5);
    assert!(engine.serializer().active_keys().is_empty());
}

#[tokio::test]
async fn request_router_over_local_file() {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let selector = ProviderSelector::new(temp_settings(&dir)).expect("valid settings");
    let engine = selector
        .resolve(&[cairn_core::StorageTechnology::LocalStorage])
        .await
        .expect("local storage should resolve");

    let saved = cairn_storage::execute(
        &engine,
        CacheRequest::post("notes").body(json!([{"_id": "n1", "text": "hi"}])),
    )
    .await
    .expect("post");
    assert_eq!(saved.status_code, 200);

    let counted = cairn_storage::execute(&engine, CacheRequest::get("notes").entity_id("_count"))
        .await
        .expect("count");
    assert_eq!(counted.data, json!({"count": 1}));
}
