//! Change notification as seen by collection listeners.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use shelfdb::model::{model, FieldDef};
use shelfdb::query::Filter;
use shelfdb::{ChangeKind, Document, Store, StoreConfig};

fn doc(v: Value) -> Document {
    v.as_object().cloned().expect("object literal")
}

fn store(capacity: usize) -> Store {
    let store = Store::new(StoreConfig {
        change_buffer_capacity: capacity,
        ..StoreConfig::default()
    });
    store
        .add_collection(
            model("notes")
                .field(FieldDef::integer("id").primary_key().auto_generate())
                .field(FieldDef::string("text"))
                .build()
                .unwrap(),
        )
        .unwrap();
    store
}

#[test]
fn listener_sees_each_kind_in_order() {
    let store = store(16);
    let handle = store.collection("notes").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        handle.lock().on_change(move |change| {
            for record in change.records() {
                seen.lock().push(record.kind);
            }
        });
    }

    let mut notes = handle.lock();
    let n = notes.insert(doc(json!({"text": "a"}))).unwrap();
    notes.update(doc(json!({"id": n["id"], "text": "b"}))).unwrap();
    notes.remove(&n).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![ChangeKind::Added, ChangeKind::Updated, ChangeKind::Removed]
    );
}

#[test]
fn batch_remove_is_one_compound_change() {
    let store = store(16);
    let handle = store.collection("notes").unwrap();
    let mut notes = handle.lock();
    for text in ["a", "b", "c"] {
        notes.insert(doc(json!({ "text": text }))).unwrap();
    }
    notes.tracker().drain();

    notes.remove_where(&Filter::gte("id", 2).into());
    let changes = notes.tracker().changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].len(), 2);
    assert!(changes[0]
        .records()
        .iter()
        .all(|r| r.kind == ChangeKind::Removed && r.after.is_none()));
}

#[test]
fn buffer_respects_configured_capacity() {
    let store = store(2);
    let handle = store.collection("notes").unwrap();
    let mut notes = handle.lock();
    for text in ["a", "b", "c"] {
        notes.insert(doc(json!({ "text": text }))).unwrap();
    }
    let texts: Vec<Value> = notes
        .tracker()
        .changes()
        .iter()
        .map(|c| c.records()[0].after.as_ref().unwrap()["text"].clone())
        .collect();
    assert_eq!(texts, vec![json!("b"), json!("c")]);
}

#[test]
fn panicking_listener_does_not_undo_insert() {
    let store = store(16);
    let handle = store.collection("notes").unwrap();
    handle.lock().on_change(|_| panic!("listener failure"));

    let mut notes = handle.lock();
    notes.insert(doc(json!({"text": "kept"}))).unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes.is_dirty());
}

#[test]
fn removing_collection_detaches_listeners() {
    let store = store(16);
    let handle = store.collection("notes").unwrap();
    handle.lock().on_change(|_| {});
    assert!(store.remove_collection("notes"));
    assert_eq!(handle.lock().tracker().listener_count(), 0);
    assert!(store.collection("notes").is_none());
}
