//! End-to-end collection behaviour through the store context.

use serde_json::{json, Value};
use shelfdb::error::CollectionError;
use shelfdb::model::{model, FieldDef};
use shelfdb::query::Filter;
use shelfdb::{CompiledQuery, Document, ShelfError, Store, StoreConfig};

fn doc(v: Value) -> Document {
    v.as_object().cloned().expect("object literal")
}

fn store_with_coll_a_and_b() -> Store {
    let store = Store::new(StoreConfig::default());
    store
        .add_collection(
            model("coll_a")
                .field(FieldDef::integer("id").primary_key().auto_generate())
                .field(FieldDef::string("name").required())
                .build()
                .unwrap(),
        )
        .unwrap();
    store
        .add_collection(
            model("coll_b")
                .field(FieldDef::integer("id").primary_key().auto_generate())
                .field(FieldDef::integer("userId").unique())
                .build()
                .unwrap(),
        )
        .unwrap();
    store
}

#[test]
fn auto_generated_ids_follow_insert_order() {
    let store = store_with_coll_a_and_b();
    let coll = store.collection("coll_a").unwrap();
    let mut coll = coll.lock();

    let ids: Vec<Value> = ["Alfred", "Billy", "Charlie"]
        .iter()
        .map(|name| coll.insert(doc(json!({ "name": name }))).unwrap()["id"].clone())
        .collect();

    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(store.keys().largest("coll_a", "id"), Some(3));
}

#[test]
fn duplicate_unique_value_leaves_size_unchanged() {
    let store = store_with_coll_a_and_b();
    let coll = store.collection("coll_b").unwrap();
    let mut coll = coll.lock();

    coll.insert(doc(json!({"userId": 42}))).unwrap();
    coll.insert(doc(json!({"userId": 43}))).unwrap();
    let err = coll.insert(doc(json!({"userId": 42}))).unwrap_err();

    match err {
        ShelfError::Collection(CollectionError::DuplicateKey { field, value, .. }) => {
            assert_eq!(field, "userId");
            assert_eq!(value, json!(42));
        }
        other => panic!("expected DuplicateKey, got {other}"),
    }
    assert_eq!(coll.len(), 2);
}

#[test]
fn remove_where_without_matches_then_strict_remove() {
    let store = store_with_coll_a_and_b();
    let coll = store.collection("coll_a").unwrap();
    let mut coll = coll.lock();

    let alfred = coll.insert(doc(json!({"name": "Alfred"}))).unwrap();
    coll.insert(doc(json!({"name": "Billy"}))).unwrap();

    let query = coll.compile(&json!({"id": 11})).unwrap();
    assert!(coll.remove_where(&query).is_empty());
    assert_eq!(coll.len(), 2);

    coll.remove(&alfred).unwrap();
    assert!(coll.remove(&alfred).unwrap_err().is_not_found());
    assert_eq!(coll.len(), 1);
}

#[test]
fn removed_keys_are_never_reissued() {
    let store = store_with_coll_a_and_b();
    let coll = store.collection("coll_a").unwrap();
    let mut coll = coll.lock();

    coll.insert(doc(json!({"name": "a"}))).unwrap();
    let b = coll.insert(doc(json!({"name": "b"}))).unwrap();
    coll.remove(&b).unwrap();
    let c = coll.insert(doc(json!({"name": "c"}))).unwrap();
    assert_eq!(c["id"], 3);
}

#[test]
fn json_queries_use_operators_and_composition() {
    let store = Store::default();
    let handle = store
        .add_collection(
            model("people")
                .field(FieldDef::integer("id").primary_key().auto_generate())
                .field(FieldDef::string("name").indexed())
                .field(FieldDef::integer("age"))
                .field(FieldDef::json("tags"))
                .build()
                .unwrap(),
        )
        .unwrap();
    let mut people = handle.lock();
    for (name, age, tags) in [
        ("Ann", 31, json!(["admin"])),
        ("Bob", 25, json!(["dev", "ops"])),
        ("Cid", 40, json!([])),
        ("Dee", 25, json!(["dev"])),
    ] {
        people
            .insert(doc(json!({"name": name, "age": age, "tags": tags})))
            .unwrap();
    }

    let names = |q: Value| -> Vec<String> {
        let q = people.compile(&q).unwrap();
        people
            .data(&q)
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect()
    };

    assert_eq!(names(json!({"age": 25})), vec!["Bob", "Dee"]);
    assert_eq!(names(json!({"age": {"$gt": 25, "$lte": 40}})), vec!["Ann", "Cid"]);
    assert_eq!(names(json!({"name": {"$in": ["Ann", "Dee"]}})), vec!["Ann", "Dee"]);
    assert_eq!(names(json!({"name": {"$regex": "^[BC]"}})), vec!["Bob", "Cid"]);
    assert_eq!(names(json!({"tags": "dev", "age": 25})), vec!["Bob", "Dee"]);
    assert_eq!(
        names(json!({"$or": [{"name": "Ann"}, {"age": {"$gte": 40}}]})),
        vec!["Ann", "Cid"]
    );
    assert_eq!(names(json!({"age": {"$ne": 25}})), vec!["Ann", "Cid"]);

    assert!(people.compile(&json!({"age": {"$near": 1}})).is_err());
}

#[test]
fn indexed_equality_matches_full_scan() {
    let store = Store::default();
    let handle = store
        .add_collection(
            model("items")
                .field(FieldDef::integer("id").primary_key().auto_generate())
                .field(FieldDef::string("kind").indexed())
                .build()
                .unwrap(),
        )
        .unwrap();
    let mut items = handle.lock();
    for i in 0..50 {
        let kind = ["a", "b", "c"][i % 3];
        items.insert(doc(json!({ "kind": kind }))).unwrap();
    }
    items.remove_where(&Filter::lt("id", 10).into());

    let indexed = items.data(&Filter::eq("kind", "b").into());
    let scanned: Vec<Document> = items
        .documents()
        .iter()
        .filter(|d| d["kind"] == "b")
        .cloned()
        .collect();
    assert_eq!(indexed, scanned);
    assert!(items.indices_consistent());
    assert_eq!(items.find(CompiledQuery::all()).count(), 41);
}
