//! Browser tests for the IndexedDB engine. Run with `wasm-pack test --headless --chrome`.

#![cfg(target_arch = "wasm32")]

use idbkit_core::{
    open, Cursor, Database, Engine, Error, Key, Mode, OpenOptions, Signal, Transaction,
};
use idbkit_indexeddb::convert::{document_from_js, document_to_js, key_from_js};
use idbkit_indexeddb::IndexedDbEngine;
use js_sys::{Object, Reflect, Uint8Array};
use serde_json::json;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, js_sys::Date::now() as u64 + (js_sys::Math::random() * 1e6) as u64)
}

fn options(name: &str) -> OpenOptions {
    OpenOptions::new(name, 1, "users", "id").index("by_email", "email", true)
}

#[wasm_bindgen_test]
async fn test_open_creates_table_and_index() {
    let engine = IndexedDbEngine::from_global().unwrap();
    let name = unique_name("open");

    let db = open(&engine, &options(&name)).await.unwrap();
    assert_eq!(db.name(), name);
    assert_eq!(db.version(), 1);
    assert_eq!(db.table_names(), vec!["users".to_string()]);

    db.close();
    engine.delete_database(&name).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_crud_round_trip() {
    let engine = IndexedDbEngine::from_global().unwrap();
    let name = unique_name("crud");
    let db = open(&engine, &options(&name)).await.unwrap();
    let users = db.table("users");

    let keys = users
        .insert(&[
            json!({"id": 2, "email": "b@x"}),
            json!({"id": 1, "email": "a@x"}),
        ])
        .await
        .unwrap();
    assert_eq!(keys, vec![Key::from(2), Key::from(1)]);

    assert_eq!(users.read(1).await.unwrap(), Some(json!({"id": 1, "email": "a@x"})));
    assert_eq!(users.read(9).await.unwrap(), None);

    let all = users.read_all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["id"], 1);

    users.update(&json!({"id": 1, "email": "new@x"})).await.unwrap();
    assert_eq!(
        users.find_by_index("by_email", "new@x").await.unwrap(),
        Some(json!({"id": 1, "email": "new@x"}))
    );

    users.remove(1).await.unwrap();
    users.remove(1).await.unwrap();
    assert_eq!(users.read(1).await.unwrap(), None);

    db.close();
    engine.delete_database(&name).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_duplicate_insert_rolls_back_batch() {
    let engine = IndexedDbEngine::from_global().unwrap();
    let name = unique_name("dup");
    let db = open(&engine, &options(&name)).await.unwrap();
    let users = db.table("users");

    users.insert(&[json!({"id": 1, "email": "a@x"})]).await.unwrap();

    let err = users
        .insert(&[json!({"id": 2, "email": "b@x"}), json!({"id": 1, "email": "c@x"})])
        .await
        .unwrap_err();
    match err {
        Error::Transaction { name, .. } => assert_eq!(name, "ConstraintError"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(users.read(2).await.unwrap(), None);

    db.close();
    engine.delete_database(&name).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_unknown_index_is_an_error() {
    let engine = IndexedDbEngine::from_global().unwrap();
    let name = unique_name("index");
    let db = open(&engine, &options(&name)).await.unwrap();

    let err = db.table("users").find_by_index("nope", "x").await.unwrap_err();
    assert_eq!(err.signal(), Some(Signal::Error));

    db.close();
    engine.delete_database(&name).await.unwrap();
}

#[wasm_bindgen_test]
async fn test_cursor_scan_matches_get_all() {
    let engine = IndexedDbEngine::from_global().unwrap();
    let name = unique_name("cursor");
    let db = open(&engine, &options(&name)).await.unwrap();
    db.table("users")
        .insert(&[
            json!({"id": 3, "email": "c@x"}),
            json!({"id": 1, "email": "a@x"}),
            json!({"id": 2, "email": "b@x"}),
        ])
        .await
        .unwrap();

    let tx = db.transaction("users", Mode::ReadOnly).unwrap();
    let done = tx.done();
    let mut cursor = tx.open_cursor().unwrap();
    let mut scanned = Vec::new();
    while let Some(doc) = cursor.next().await.unwrap() {
        scanned.push(doc);
    }
    assert_eq!(cursor.next().await.unwrap(), None);
    let bulk = tx.get_all().unwrap().await.unwrap();
    done.await.unwrap();

    assert_eq!(scanned.len(), 3);
    assert_eq!(scanned[0]["id"], 1);
    assert_eq!(scanned[2]["id"], 3);
    assert_eq!(scanned, bulk);

    db.close();
    engine.delete_database(&name).await.unwrap();
}

fn with_field(field: &str, value: &JsValue) -> JsValue {
    let doc = Object::new();
    Reflect::set(&doc, &"id".into(), &JsValue::from(1)).unwrap();
    Reflect::set(&doc, &field.into(), value).unwrap();
    doc.into()
}

#[wasm_bindgen_test]
fn test_non_json_values_are_rejected() {
    let bad = [
        with_field("at", &js_sys::Date::new_0().into()),
        with_field("bytes", &Uint8Array::new_with_length(4).into()),
        with_field("n", &JsValue::from_f64(f64::NAN)),
        with_field("n", &JsValue::from_f64(f64::INFINITY)),
        with_field("missing", &JsValue::UNDEFINED),
    ];
    for doc in bad {
        assert_eq!(document_from_js(doc).unwrap_err().name, "DataError");
    }

    assert_eq!(key_from_js(js_sys::Date::new_0().into()).unwrap_err().name, "DataError");
    assert_eq!(key_from_js(JsValue::from_f64(f64::INFINITY)).unwrap_err().name, "DataError");
}

#[wasm_bindgen_test]
fn test_plain_documents_convert_unchanged() {
    let doc = json!({"id": 1, "tags": ["a", "b"], "meta": {"score": 1.5, "ok": true, "none": null}});
    let js = document_to_js(&doc).unwrap();
    assert_eq!(document_from_js(js).unwrap(), doc);
    assert_eq!(key_from_js(JsValue::from(7)).unwrap(), Key::from(7));
}
