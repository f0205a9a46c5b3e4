//! Table operations exposed to JavaScript

use idbkit_core::{Error, Key, Table};
use idbkit_indexeddb::convert::{
    document_from_js, document_to_js, documents_from_js, key_from_js, key_to_js,
};
use idbkit_indexeddb::IdbConnection;
use js_sys::{Array, Promise};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::error::reject;

/// A connection bound to one table. Every method opens its own transaction and
/// returns a Promise settling on that transaction's outcome.
#[wasm_bindgen]
pub struct TableHandle {
    table: Table<IdbConnection>,
}

impl TableHandle {
    pub(crate) fn new(table: Table<IdbConnection>) -> Self {
        Self { table }
    }
}

#[wasm_bindgen]
impl TableHandle {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.table.name().to_string()
    }

    /// Add every document of `docs` (an array) in one transaction. Resolves with
    /// the added keys in input order.
    pub fn insert(&self, docs: JsValue) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let docs = documents_from_js(docs).map_err(|e| reject(Error::thrown(e)))?;
            let keys = table.insert(&docs).await.map_err(reject)?;
            keys_to_js(&keys)
        })
    }

    /// Resolves with the document stored under `key`, or `undefined`.
    pub fn read(&self, key: JsValue) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let key = key_from_js(key).map_err(|e| reject(Error::thrown(e)))?;
            let doc = table.read(key).await.map_err(reject)?;
            match doc {
                Some(doc) => document_to_js(&doc).map_err(|e| reject(Error::thrown(e))),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }

    #[wasm_bindgen(js_name = readAll)]
    pub fn read_all(&self) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let docs = table.read_all().await.map_err(reject)?;
            let out = Array::new();
            for doc in &docs {
                out.push(&document_to_js(doc).map_err(|e| reject(Error::thrown(e)))?);
            }
            Ok(out.into())
        })
    }

    /// Insert or replace `doc`. Resolves with its key.
    pub fn update(&self, doc: JsValue) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let doc = document_from_js(doc).map_err(|e| reject(Error::thrown(e)))?;
            let key = table.update(&doc).await.map_err(reject)?;
            key_to_js(&key).map_err(|e| reject(Error::thrown(e)))
        })
    }

    /// Delete the document under `key`. Resolves with `undefined`, also when
    /// nothing was stored there.
    pub fn remove(&self, key: JsValue) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let key = key_from_js(key).map_err(|e| reject(Error::thrown(e)))?;
            table.remove(key).await.map_err(reject)?;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Resolves with the first document whose `index` value equals `value`, or
    /// `undefined`.
    #[wasm_bindgen(js_name = findByIndex)]
    pub fn find_by_index(&self, index: String, value: JsValue) -> Promise {
        let table = self.table.clone();
        future_to_promise(async move {
            let value = key_from_js(value).map_err(|e| reject(Error::thrown(e)))?;
            let doc = table
                .find_by_index(&index, value)
                .await
                .map_err(reject)?;
            match doc {
                Some(doc) => document_to_js(&doc).map_err(|e| reject(Error::thrown(e))),
                None => Ok(JsValue::UNDEFINED),
            }
        })
    }
}

fn keys_to_js(keys: &[Key]) -> Result<JsValue, JsValue> {
    let out = Array::new();
    for key in keys {
        out.push(&key_to_js(key).map_err(|e| reject(Error::thrown(e)))?);
    }
    Ok(out.into())
}
