//! Single-collection storage operations.

use std::sync::Arc;

use serde_json::json;
use shelfdb::error::PersistError;
use shelfdb::persist::{MemoryBackend, PersistOptions, PersistenceCoordinator};
use shelfdb::ShelfError;

use super::support::{auto_model, doc, fill, store_with, RecordingBackend};

#[tokio::test]
async fn get_collection_records_reads_storage_not_memory() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 3);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend);
    coord.persist().await.unwrap();
    fill(&store, "coll_a", "extra", 1);

    let stored = coord
        .get_collection_records("coll_a", &PersistOptions::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 3);

    let missing = coord
        .get_collection_records("never_written", &PersistOptions::default())
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn add_collection_records_appends_in_chunks() {
    let backend = RecordingBackend::new();
    let store = store_with(vec![auto_model("coll_a")]);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());

    let docs: Vec<_> = (1..=5)
        .map(|i| doc(json!({"id": i, "name": format!("n{i}")})))
        .collect();
    let chunks = coord
        .add_collection_records("coll_a", docs, &PersistOptions::default().with_chunk_size(2))
        .await
        .unwrap();

    assert_eq!(chunks, 3);
    assert_eq!(backend.insert_sizes("coll_a"), vec![2, 2, 1]);
    assert_eq!(backend.inner.table_len("coll_a"), Some(5));
    assert!(store.collection("coll_a").unwrap().lock().is_empty());
}

#[tokio::test]
async fn add_collection_records_requires_registration() {
    let store = store_with(vec![]);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), Arc::new(MemoryBackend::new()));
    let err = coord
        .add_collection_records("ghost", vec![], &PersistOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ShelfError::Persist(PersistError::NotRegistered(ref name)) if name == "ghost"
    ));
}

#[tokio::test]
async fn clear_collections_drops_tables_and_marks_dirty() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("a"), auto_model("b")]);
    fill(&store, "a", "a", 1);
    fill(&store, "b", "b", 1);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    coord.persist().await.unwrap();

    coord.clear_collections(&["a"]).await.unwrap();
    assert!(!backend.has_table("a"));
    assert!(backend.has_table("b"));
    assert!(store.collection("a").unwrap().lock().is_dirty());
    assert!(!store.collection("b").unwrap().lock().is_dirty());

    coord.persist().await.unwrap();
    assert_eq!(backend.table_len("a"), Some(1));
}

#[tokio::test]
async fn clear_persistent_db_removes_everything() {
    let backend = Arc::new(MemoryBackend::new());
    let store = store_with(vec![auto_model("a"), auto_model("b")]);
    fill(&store, "a", "a", 2);
    fill(&store, "b", "b", 2);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    coord.persist().await.unwrap();
    assert!(backend.total_rows() > 0);

    coord.clear_persistent_db().await.unwrap();
    assert_eq!(backend.total_rows(), 0);
    assert!(!backend.has_table("a"));

    let result = coord.persist().await.unwrap();
    assert_eq!(result.total_rows(), backend.total_rows());
    assert_eq!(backend.table_len("b"), Some(2));
}
