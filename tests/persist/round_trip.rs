use std::sync::Arc;

use serde_json::json;
use shelfdb::keys::CollectionMetadata;
use shelfdb::persist::{MemoryBackend, PersistOptions, PersistenceCoordinator};

use super::support::{auto_model, doc, fill, sorted_docs, store_with, RecordingBackend};

#[tokio::test]
async fn persist_then_restore_into_empty_store() {
    let backend = Arc::new(MemoryBackend::new());

    let original = store_with(vec![auto_model("coll_a"), auto_model("coll_b")]);
    fill(&original, "coll_a", "a", 5);
    fill(&original, "coll_b", "b", 2);
    PersistenceCoordinator::new(Arc::clone(&original), backend.clone())
        .persist()
        .await
        .unwrap();

    let fresh = store_with(vec![auto_model("coll_a"), auto_model("coll_b")]);
    let result = PersistenceCoordinator::new(Arc::clone(&fresh), backend.clone())
        .restore()
        .await
        .unwrap();

    assert!(result.is_success());
    assert!(result.skipped.is_empty());
    for name in ["coll_a", "coll_b"] {
        assert_eq!(sorted_docs(&fresh, name), sorted_docs(&original, name));
        assert!(!fresh.collection(name).unwrap().lock().is_dirty());
    }
    assert_eq!(fresh.keys().largest("coll_a", "id"), Some(5));
    assert_eq!(fresh.keys().largest("coll_b", "id"), Some(2));
}

#[tokio::test]
async fn restore_twice_is_idempotent() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 4);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend);
    coord.persist().await.unwrap();

    coord.restore().await.unwrap();
    let first = sorted_docs(&store, "coll_a");
    coord.restore().await.unwrap();
    let second = sorted_docs(&store, "coll_a");

    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[tokio::test]
async fn stored_key_maximum_survives_removal_of_newest_document() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 3);
    {
        let handle = store.collection("coll_a").unwrap();
        let mut coll = handle.lock();
        let newest = coll.lookup(&json!(3)).unwrap();
        coll.remove(&newest).unwrap();
    }
    PersistenceCoordinator::new(Arc::clone(&store), backend.clone())
        .persist()
        .await
        .unwrap();

    let fresh = store_with(vec![auto_model("coll_a")]);
    PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore()
        .await
        .unwrap();

    let handle = fresh.collection("coll_a").unwrap();
    let next = handle.lock().insert(doc(json!({"name": "next"}))).unwrap();
    assert_eq!(next["id"], 4);
}

#[tokio::test]
async fn observed_keys_win_over_stale_metadata() {
    let backend = RecordingBackend::new();
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 2);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    coord.persist().await.unwrap();

    // Rows written after the metadata snapshot, as after a crash between the two.
    coord
        .add_collection_records(
            "coll_a",
            vec![doc(json!({"id": 9, "name": "late"}))],
            &PersistOptions::default(),
        )
        .await
        .unwrap();

    let fresh = store_with(vec![auto_model("coll_a")]);
    PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore()
        .await
        .unwrap();
    assert_eq!(fresh.keys().largest("coll_a", "id"), Some(9));
}

#[tokio::test]
async fn unknown_tables_are_skipped() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("known"), auto_model("retired")]);
    fill(&store, "known", "k", 1);
    fill(&store, "retired", "r", 1);
    PersistenceCoordinator::new(Arc::clone(&store), backend.clone())
        .persist()
        .await
        .unwrap();

    let fresh = store_with(vec![auto_model("known")]);
    let result = PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore()
        .await
        .unwrap();

    assert_eq!(result.skipped, vec!["retired".to_string()]);
    assert_eq!(result.outcome("known").unwrap().rows, 1);
}

#[tokio::test]
async fn item_transforms_apply_on_save_and_load() {
    let backend = Arc::new(MemoryBackend::new());
    let options = PersistOptions::default()
        .with_save_transform(|mut d| {
            d.insert("savedBy".into(), json!("shelf"));
            d
        })
        .with_load_transform(|mut d| {
            d.remove("savedBy");
            d
        });

    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 2);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    coord.persist_with(&options, None).await.unwrap();

    let raw = coord
        .get_collection_records("coll_a", &PersistOptions::default())
        .await
        .unwrap();
    assert!(raw.iter().all(|d| d["savedBy"] == "shelf"));

    let fresh = store_with(vec![auto_model("coll_a")]);
    PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore_with(&options, None)
        .await
        .unwrap();
    assert_eq!(sorted_docs(&fresh, "coll_a"), sorted_docs(&store, "coll_a"));
}

#[tokio::test]
async fn restore_reads_each_table_once() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 7);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend);
    let options = PersistOptions::default().with_chunk_size(3);
    coord.persist_with(&options, None).await.unwrap();

    let result = coord.restore_with(&options, None).await.unwrap();
    let outcome = result.outcome("coll_a").unwrap();
    assert_eq!((outcome.rows, outcome.chunk_count), (7, 1));
}

#[tokio::test]
async fn persist_records_key_snapshot_in_metadata() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 3);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend);
    let result = coord.persist().await.unwrap();
    assert!(result.is_success());

    let meta = store.metadata().lock();
    let entry = meta.lookup(&json!("coll_a")).unwrap();
    let recorded = CollectionMetadata::from_document(&entry).unwrap();
    assert_eq!(recorded.largest("id"), Some(3));
    assert!(!meta.is_dirty());
}
