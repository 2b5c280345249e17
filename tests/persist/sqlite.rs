//! Persist/restore against the relational backend.

use std::sync::Arc;

use serde_json::json;
use shelfdb::persist::{PersistOptions, PersistenceCoordinator, SqliteBackend, StorageBackend};

use super::support::{auto_model, doc, fill, sorted_docs, store_with};

#[tokio::test]
async fn round_trip_through_sqlite_with_custom_columns() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let options = PersistOptions::default()
        .with_columns("pk", "payload")
        .with_chunk_size(2);

    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 5);
    let result = PersistenceCoordinator::new(Arc::clone(&store), backend.clone())
        .persist_with(&options, None)
        .await
        .unwrap();
    assert_eq!(result.outcome("coll_a").unwrap().chunk_count, 3);

    let tables = backend.list_tables().await.unwrap();
    let coll = tables.iter().find(|t| t.name == "coll_a").unwrap();
    assert_eq!(coll.schema.key_column, "pk");
    assert_eq!(coll.schema.data_column, "payload");

    let fresh = store_with(vec![auto_model("coll_a")]);
    PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore_with(&options, None)
        .await
        .unwrap();
    assert_eq!(sorted_docs(&fresh, "coll_a"), sorted_docs(&store, "coll_a"));

    let handle = fresh.collection("coll_a").unwrap();
    let next = handle.lock().insert(doc(json!({"name": "next"}))).unwrap();
    assert_eq!(next["id"], 6);
}

#[tokio::test]
async fn repersist_replaces_previous_rows() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 3);
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend);
    coord.persist().await.unwrap();

    {
        let handle = store.collection("coll_a").unwrap();
        let mut coll = handle.lock();
        let first = coll.lookup(&json!(1)).unwrap();
        coll.remove(&first).unwrap();
    }
    coord.persist().await.unwrap();

    let stored = coord
        .get_collection_records("coll_a", &PersistOptions::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn restore_reads_with_stored_column_names() {
    let backend = Arc::new(SqliteBackend::open_in_memory().unwrap());
    let store = store_with(vec![auto_model("coll_a")]);
    fill(&store, "coll_a", "a", 3);
    PersistenceCoordinator::new(Arc::clone(&store), backend.clone())
        .persist_with(&PersistOptions::default().with_columns("pk", "payload"), None)
        .await
        .unwrap();

    let fresh = store_with(vec![auto_model("coll_a")]);
    let result = PersistenceCoordinator::new(Arc::clone(&fresh), backend)
        .restore()
        .await
        .unwrap();
    assert!(result.is_success());
    assert_eq!(sorted_docs(&fresh, "coll_a"), sorted_docs(&store, "coll_a"));
}
