//! Conversion between JSON documents/keys and JS values
//!
//! Documents cross the boundary as plain JS objects so IndexedDB's structured
//! clone and key path extraction see ordinary properties. Maps are serialized as
//! objects, not `Map`, and integers as plain numbers.
//!
//! Incoming values must be JSON-shaped: plain objects, arrays, strings, finite
//! numbers, booleans and null. Anything else (`Date`, typed arrays, `Map`,
//! `undefined`, `NaN`, class instances) is rejected with `DataError` instead of
//! being stored in a lossy form.

use idbkit_core::{Document, EngineError, Key};
use js_sys::{Array, Object};
use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::{JsCast, JsValue};

const SERIALIZER: Serializer = Serializer::json_compatible();

fn data_error(e: serde_wasm_bindgen::Error) -> EngineError {
    EngineError::new("DataError", e.to_string())
}

fn not_json(path: &str, what: &str) -> EngineError {
    EngineError::new(
        "DataError",
        format!("{} at '{}' cannot be stored as JSON", what, path),
    )
}

/// Reject anything serde-wasm-bindgen would turn into a different JSON value.
fn check_json_shape(val: &JsValue, path: &str) -> Result<(), EngineError> {
    if val.is_null() || val.is_string() || val.as_bool().is_some() {
        return Ok(());
    }
    if let Some(n) = val.as_f64() {
        return if n.is_finite() {
            Ok(())
        } else {
            Err(not_json(path, "non-finite number"))
        };
    }
    if val.is_undefined() {
        return Err(not_json(path, "undefined"));
    }
    if Array::is_array(val) {
        for (i, item) in Array::from(val).iter().enumerate() {
            check_json_shape(&item, &format!("{}[{}]", path, i))?;
        }
        return Ok(());
    }

    if !val.is_object() || val.is_function() {
        return Err(not_json(path, "non-JSON value"));
    }
    let obj = val.unchecked_ref::<Object>();
    let proto = Object::get_prototype_of(obj);
    let plain = proto.is_null() || Object::is(&proto, &Object::get_prototype_of(&Object::new()));
    if !plain {
        return Err(not_json(path, "non-plain object"));
    }

    for entry in Object::entries(obj).iter() {
        let pair = Array::from(&entry);
        let field = pair.get(0).as_string().unwrap_or_default();
        check_json_shape(&pair.get(1), &format!("{}.{}", path, field))?;
    }
    Ok(())
}

fn json_from_js(val: JsValue) -> Result<serde_json::Value, EngineError> {
    check_json_shape(&val, "$")?;
    serde_wasm_bindgen::from_value(val).map_err(data_error)
}

pub fn document_to_js(doc: &Document) -> Result<JsValue, EngineError> {
    doc.serialize(&SERIALIZER).map_err(data_error)
}

pub fn document_from_js(val: JsValue) -> Result<Document, EngineError> {
    json_from_js(val)
}

/// `undefined` (no record) maps to `None`.
pub fn optional_document(val: JsValue) -> Result<Option<Document>, EngineError> {
    if val.is_undefined() || val.is_null() {
        return Ok(None);
    }
    document_from_js(val).map(Some)
}

pub fn documents_from_js(val: JsValue) -> Result<Vec<Document>, EngineError> {
    match json_from_js(val)? {
        serde_json::Value::Array(docs) => Ok(docs),
        other => Err(EngineError::new(
            "DataError",
            format!("expected an array of documents, got {}", other),
        )),
    }
}

pub fn key_to_js(key: &Key) -> Result<JsValue, EngineError> {
    key.to_value().serialize(&SERIALIZER).map_err(data_error)
}

pub fn key_from_js(val: JsValue) -> Result<Key, EngineError> {
    Key::from_value(&json_from_js(val)?)
}
