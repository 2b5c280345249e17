use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use shelfdb::error::{PersistError, StorageError};
use shelfdb::persist::{MemoryBackend, PersistOptions, PersistenceCoordinator};
use shelfdb::ShelfError;

use super::support::{auto_model, doc, fill, store_with, RecordingBackend};

#[tokio::test]
async fn one_failing_collection_does_not_stop_the_others() {
    let store = store_with(vec![auto_model("bad"), auto_model("good")]);
    let backend = RecordingBackend::new();
    backend.fail_table("bad");
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "bad", "b", 2);
    fill(&store, "good", "g", 2);

    let reported = Arc::new(Mutex::new(Vec::new()));
    let options = {
        let reported = Arc::clone(&reported);
        PersistOptions::default().with_on_storage_error(move |name, _err| {
            reported.lock().push(name.to_string());
        })
    };
    let result = coord.persist_with(&options, None).await.unwrap();

    assert!(!result.is_success());
    let bad = result.outcome("bad").unwrap();
    assert!(matches!(
        bad.error,
        Some(PersistError::Storage(StorageError::Backend { .. }))
    ));
    assert!(result.outcome("good").unwrap().is_ok());
    assert_eq!(*reported.lock(), vec!["bad".to_string()]);

    assert!(store.collection("bad").unwrap().lock().is_dirty());
    assert!(!store.collection("good").unwrap().lock().is_dirty());

    backend.heal_table("bad");
    backend.take_calls();
    let retry = coord.persist().await.unwrap();
    assert!(retry.is_success());
    assert_eq!(retry.outcome("bad").unwrap().rows, 2);
    assert!(retry.outcome("good").unwrap().skipped);
    assert!(!store.collection("bad").unwrap().lock().is_dirty());
}

#[tokio::test]
async fn unreachable_backend_fails_the_whole_call() {
    let store = store_with(vec![auto_model("coll_a")]);
    let backend = RecordingBackend::new();
    *backend.unreachable.lock() = true;
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "coll_a", "a", 1);

    let err = coord.persist().await.unwrap_err();
    assert!(matches!(
        err,
        ShelfError::Storage(StorageError::Unreachable(_))
    ));
    assert!(backend.take_calls().is_empty());
    assert!(store.collection("coll_a").unwrap().lock().is_dirty());

    assert!(coord.restore().await.is_err());
}

#[tokio::test]
async fn overlapping_persist_on_one_collection_is_rejected() {
    let store = store_with(vec![auto_model("slow")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "slow", "s", 2);

    let (entered, release) = backend.gate_table("slow");
    let first = coord.persist();
    let second = async {
        entered.notified().await;
        let result = coord.persist().await;
        release.notify_one();
        result
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.unwrap().outcome("slow").unwrap().is_ok());
    let second = second.unwrap();
    assert!(matches!(
        second.outcome("slow").unwrap().error,
        Some(PersistError::ConcurrentOperation(ref name)) if name == "slow"
    ));
    assert_eq!(backend.insert_sizes("slow"), vec![2]);
}

#[tokio::test]
async fn write_during_persist_keeps_collection_dirty() {
    let store = store_with(vec![auto_model("live")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "live", "l", 1);

    let (entered, release) = backend.gate_table("live");
    let writer = async {
        entered.notified().await;
        let handle = store.collection("live").unwrap();
        handle.lock().insert(doc(json!({"name": "late"}))).unwrap();
        release.notify_one();
    };
    let (result, ()) = tokio::join!(coord.persist(), writer);

    assert_eq!(result.unwrap().outcome("live").unwrap().rows, 1);
    assert!(store.collection("live").unwrap().lock().is_dirty());

    let again = coord.persist().await.unwrap();
    assert_eq!(again.outcome("live").unwrap().rows, 2);
    assert!(!store.collection("live").unwrap().lock().is_dirty());
}

#[tokio::test]
async fn quota_exhaustion_is_a_storage_error() {
    let store = store_with(vec![auto_model("big")]);
    let backend = RecordingBackend::wrapping(MemoryBackend::with_row_quota(3));
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "big", "b", 5);

    let result = coord.persist().await.unwrap();
    assert!(matches!(
        result.outcome("big").unwrap().error,
        Some(PersistError::Storage(StorageError::QuotaExceeded { .. }))
    ));
    assert!(store.collection("big").unwrap().lock().is_dirty());
}

#[tokio::test]
async fn corrupt_stored_row_fails_only_its_collection() {
    use shelfdb::persist::{ColumnSpec, Row, StorageBackend};

    let backend = Arc::new(MemoryBackend::new());
    let cols = ColumnSpec::new("key", "data");
    backend.create_table_if_missing("broken", &cols).await.unwrap();
    backend
        .insert_rows("broken", &cols, &[Row::new("1", json!("not a document"))])
        .await
        .unwrap();
    backend.create_table_if_missing("fine", &cols).await.unwrap();
    backend
        .insert_rows("fine", &cols, &[Row::new("1", json!({"id": 1, "name": "ok"}))])
        .await
        .unwrap();

    let store = store_with(vec![auto_model("broken"), auto_model("fine")]);
    let result = PersistenceCoordinator::new(Arc::clone(&store), backend)
        .restore()
        .await
        .unwrap();

    assert!(matches!(
        result.outcome("broken").unwrap().error,
        Some(PersistError::Storage(StorageError::Corruption { .. }))
    ));
    assert_eq!(result.outcome("fine").unwrap().rows, 1);
    assert_eq!(store.keys().largest("fine", "id"), Some(1));
}
