use std::sync::Arc;

use shelfdb::persist::{CollectionOptionsFn, PersistOptions, PersistenceCoordinator};

use super::support::{auto_model, fill, store_with, RecordingBackend};

#[tokio::test]
async fn clean_collection_is_not_written_and_dirty_one_is_chunked() {
    let store = store_with(vec![auto_model("clean"), auto_model("dirty")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());

    fill(&store, "clean", "c", 2);
    coord.persist().await.unwrap();
    assert!(!store.collection("clean").unwrap().lock().is_dirty());
    backend.take_calls();

    fill(&store, "dirty", "d", 5);
    let options = PersistOptions::default().with_chunk_size(3);
    let result = coord.persist_with(&options, None).await.unwrap();

    assert!(!backend.touched("clean"));
    assert_eq!(backend.insert_sizes("dirty"), vec![3, 2]);

    let clean = result.outcome("clean").unwrap();
    assert!(clean.skipped);
    let dirty = result.outcome("dirty").unwrap();
    assert_eq!((dirty.rows, dirty.chunk_count), (5, 2));
    assert!(result.is_success());
}

#[tokio::test]
async fn one_past_chunk_size_issues_exactly_two_inserts() {
    let store = store_with(vec![auto_model("coll_a")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());

    let max = 4;
    fill(&store, "coll_a", "n", max + 1);
    coord
        .persist_with(&PersistOptions::default().with_chunk_size(max), None)
        .await
        .unwrap();

    assert_eq!(backend.insert_sizes("coll_a").len(), 2);
}

#[tokio::test]
async fn persist_clears_dirty_and_reports_row_count() {
    let store = store_with(vec![auto_model("a"), auto_model("b")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "a", "a", 7);
    fill(&store, "b", "b", 3);

    let result = coord.persist().await.unwrap();

    for (name, count) in [("a", 7), ("b", 3)] {
        let handle = store.collection(name).unwrap();
        assert!(!handle.lock().is_dirty());
        assert_eq!(result.outcome(name).unwrap().rows, count);
        assert_eq!(backend.inner.table_len(name), Some(count));
    }
}

#[tokio::test]
async fn each_chunk_is_preceded_by_create_table() {
    use super::support::Call;

    let store = store_with(vec![auto_model("t")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "t", "x", 3);

    coord
        .persist_with(&PersistOptions::default().with_chunk_size(2), None)
        .await
        .unwrap();

    let calls: Vec<Call> = backend
        .take_calls()
        .into_iter()
        .filter(|c| match c {
            Call::Create(t) | Call::Drop(t) | Call::Insert(t, _) | Call::Query(t) => t == "t",
        })
        .collect();
    assert_eq!(
        calls,
        vec![
            Call::Drop("t".into()),
            Call::Create("t".into()),
            Call::Insert("t".into(), 2),
            Call::Create("t".into()),
            Call::Insert("t".into(), 1),
        ]
    );
}

#[tokio::test]
async fn per_collection_options_override_defaults() {
    let store = store_with(vec![auto_model("small"), auto_model("large")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "small", "s", 4);
    fill(&store, "large", "l", 4);

    let per_collection: &CollectionOptionsFn = &|name, defaults| {
        if name == "small" {
            defaults.clone().with_chunk_size(1)
        } else {
            defaults.clone()
        }
    };
    coord
        .persist_with(&PersistOptions::default(), Some(per_collection))
        .await
        .unwrap();

    assert_eq!(backend.insert_sizes("small"), vec![1, 1, 1, 1]);
    assert_eq!(backend.insert_sizes("large"), vec![4]);
}

#[tokio::test]
async fn zero_chunk_size_writes_one_row_per_chunk() {
    let store = store_with(vec![auto_model("z")]);
    let backend = RecordingBackend::new();
    let coord = PersistenceCoordinator::new(Arc::clone(&store), backend.clone());
    fill(&store, "z", "z", 2);

    coord
        .persist_with(&PersistOptions::default().with_chunk_size(0), None)
        .await
        .unwrap();
    assert_eq!(backend.insert_sizes("z"), vec![1, 1]);
}
