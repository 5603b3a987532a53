//! The adapter contract every built-in backend must honor.

use std::sync::Arc;

use cairn_core::{CacheSettings, StorageTechnology};
use cairn_storage::backends;
use cairn_storage::StorageBackend;
use cairn_test_utils::fixtures::{keyed_note, temp_settings};
use tempfile::TempDir;

type Build = fn(&CacheSettings) -> cairn_core::CairnResult<Arc<dyn StorageBackend>>;

const BACKENDS: [(StorageTechnology, Build); 4] = [
    (StorageTechnology::Memory, backends::build_memory),
    (StorageTechnology::LocalStorage, backends::build_local_file),
    (StorageTechnology::Lmdb, backends::build_lmdb),
    (StorageTechnology::Sqlite, backends::build_sqlite),
];

async fn check_contract(technology: &StorageTechnology, backend: Arc<dyn StorageBackend>) {
    assert_eq!(&backend.technology(), technology);
    assert!(backend.is_supported().await, "{} unsupported", technology);

    let notes = backend.open("notes").await.expect("open");
    assert_eq!(notes.collection(), "notes");

    // Missing records are reported as not found, never as other errors.
    assert!(notes
        .find_by_id("missing")
        .await
        .expect_err("missing record")
        .is_not_found());
    assert!(notes
        .remove_by_id("missing")
        .await
        .expect_err("missing record")
        .is_not_found());
    match notes.find().await {
        Ok(records) => assert!(records.is_empty()),
        Err(e) => assert!(e.is_not_found(), "{}: {}", technology, e),
    }

    let saved = notes
        .save(vec![keyed_note("a", "first"), keyed_note("b", "second")])
        .await
        .expect("save");
    assert_eq!(saved.len(), 2);

    // Saving an existing id replaces the record.
    notes
        .save(vec![keyed_note("a", "replaced")])
        .await
        .expect("save");
    let mut all = notes.find().await.expect("find");
    all.sort_by(|x, y| x.id().cmp(&y.id()));
    assert_eq!(all, vec![keyed_note("a", "replaced"), keyed_note("b", "second")]);

    // Collections are isolated.
    let tasks = backend.open("tasks").await.expect("open");
    assert!(tasks
        .find_by_id("a")
        .await
        .expect_err("isolated")
        .is_not_found());

    // A record without an id never reaches storage.
    assert!(notes
        .save(vec![cairn_core::Record::new().with("text", "no id")])
        .await
        .is_err());

    let removed = notes.remove_by_id("b").await.expect("remove");
    assert_eq!(removed, keyed_note("b", "second"));
    assert_eq!(notes.find().await.expect("find").len(), 1);

    // Names some engines reserve for themselves are ordinary collections.
    let reserved_looking = backend.open("sqlite_notes").await.expect("open");
    match reserved_looking.find().await {
        Ok(records) => assert!(records.is_empty()),
        Err(e) => assert!(e.is_not_found(), "{}: {}", technology, e),
    }
    reserved_looking
        .save(vec![keyed_note("s", "kept")])
        .await
        .expect("save");
    assert_eq!(
        reserved_looking.find().await.expect("find"),
        vec![keyed_note("s", "kept")],
        "{}",
        technology
    );
}

#[tokio::test]
async fn every_builtin_backend_honors_the_contract() {
    for (technology, build) in BACKENDS {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = build(&temp_settings(&dir)).expect("build");
        check_contract(&technology, backend).await;
    }
}

#[tokio::test]
async fn on_disk_backends_persist_across_rebuilds() {
    for (technology, build) in &BACKENDS[1..] {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let settings = temp_settings(&dir);
        {
            let backend = build(&settings).expect("build");
            let notes = backend.open("notes").await.expect("open");
            notes.save(vec![keyed_note("kept", "x")]).await.expect("save");
        }

        let backend = build(&settings).expect("rebuild");
        let notes = backend.open("notes").await.expect("open");
        let found = notes.find_by_id("kept").await;
        assert_eq!(
            found.expect("record should survive a rebuild"),
            keyed_note("kept", "x"),
            "{} lost data",
            technology
        );
    }
}
