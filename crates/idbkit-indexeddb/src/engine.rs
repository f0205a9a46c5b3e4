//! [`Engine`] implementation over the browser's IndexedDB.

use idbkit_core::{
    Cursor, Database, Document, Engine, EngineError, Key, Mode, Pending, Signal, Transaction,
    UpgradeHook,
};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    IdbCursor, IdbCursorWithValue, IdbDatabase, IdbFactory, IdbObjectStore, IdbRequest,
    IdbTransaction, IdbTransactionMode,
};

use crate::convert::{
    document_from_js, document_to_js, documents_from_js, key_from_js, key_to_js,
    optional_document,
};
use crate::error::js_error;
use crate::idb::{self, request_pending};

/// IndexedDB engine bound to one `IDBFactory`.
#[derive(Debug, Clone)]
pub struct IndexedDbEngine {
    factory: IdbFactory,
}

impl IndexedDbEngine {
    pub fn new(factory: IdbFactory) -> Self {
        Self { factory }
    }

    /// Engine over the global `indexedDB` (window or worker scope).
    pub fn from_global() -> idbkit_core::Result<Self> {
        Ok(Self::new(idb::idb_factory()?))
    }
}

impl Engine for IndexedDbEngine {
    type Database = IdbConnection;

    fn open(&self, name: &str, version: u32, upgrade: UpgradeHook) -> Pending<IdbConnection> {
        idb::open_database(&self.factory, name, version, upgrade).map(|db| IdbConnection { db })
    }

    fn delete_database(&self, name: &str) -> Pending<()> {
        idb::delete_database(&self.factory, name)
    }
}

/// Open IndexedDB connection.
#[derive(Debug, Clone)]
pub struct IdbConnection {
    db: IdbDatabase,
}

impl IdbConnection {
    /// Close the connection. Transactions already started still finish;
    /// new ones fail with `InvalidStateError`.
    pub fn close(&self) {
        self.db.close();
    }
}

impl Database for IdbConnection {
    type Transaction = IdbTx;

    fn name(&self) -> String {
        self.db.name()
    }

    fn version(&self) -> u32 {
        self.db.version() as u32
    }

    fn table_names(&self) -> Vec<String> {
        let names = self.db.object_store_names();
        (0..names.length()).filter_map(|i| names.item(i)).collect()
    }

    fn transaction(&self, table: &str, mode: Mode) -> Result<IdbTx, EngineError> {
        let mode = match mode {
            Mode::ReadOnly => IdbTransactionMode::Readonly,
            Mode::ReadWrite => IdbTransactionMode::Readwrite,
        };
        let tx = self
            .db
            .transaction_with_str_and_mode(table, mode)
            .map_err(|e| js_error(&e))?;
        let store = tx.object_store(table).map_err(|e| js_error(&e))?;
        Ok(IdbTx { tx, store })
    }
}

/// Single-store IndexedDB transaction.
pub struct IdbTx {
    tx: IdbTransaction,
    store: IdbObjectStore,
}

impl IdbTx {
    fn write(
        &self,
        doc: &Document,
        issue: fn(&IdbObjectStore, &JsValue) -> Result<IdbRequest, JsValue>,
    ) -> Result<Pending<Key>, EngineError> {
        let val = document_to_js(doc)?;
        let req = issue(&self.store, &val).map_err(|e| js_error(&e))?;
        Ok(request_pending(&req, key_from_js))
    }
}

impl Transaction for IdbTx {
    type Cursor = IdbCursorScan;

    fn done(&self) -> Pending<()> {
        idb::transaction_pending(&self.tx)
    }

    fn abort(&self) {
        // Throws only if the transaction already finished.
        let _ = self.tx.abort();
    }

    fn add(&self, doc: &Document) -> Result<Pending<Key>, EngineError> {
        self.write(doc, |store, val| store.add(val))
    }

    fn put(&self, doc: &Document) -> Result<Pending<Key>, EngineError> {
        self.write(doc, |store, val| store.put(val))
    }

    fn get(&self, key: &Key) -> Result<Pending<Option<Document>>, EngineError> {
        let req = self
            .store
            .get(&key_to_js(key)?)
            .map_err(|e| js_error(&e))?;
        Ok(request_pending(&req, optional_document))
    }

    /// `getAll` is missing from some older engines.
    fn supports_get_all(&self) -> bool {
        js_sys::Reflect::get(&self.store, &"getAll".into())
            .map(|f| f.is_function())
            .unwrap_or(false)
    }

    fn get_all(&self) -> Result<Pending<Vec<Document>>, EngineError> {
        let req = self.store.get_all().map_err(|e| js_error(&e))?;
        Ok(request_pending(&req, documents_from_js))
    }

    fn open_cursor(&self) -> Result<IdbCursorScan, EngineError> {
        let request = self.store.open_cursor().map_err(|e| js_error(&e))?;
        Ok(IdbCursorScan {
            request,
            started: false,
        })
    }

    fn delete(&self, key: &Key) -> Result<Pending<()>, EngineError> {
        let req = self
            .store
            .delete(&key_to_js(key)?)
            .map_err(|e| js_error(&e))?;
        Ok(request_pending(&req, |_| Ok(())))
    }

    fn index_get(&self, index: &str, value: &Key) -> Result<Pending<Option<Document>>, EngineError> {
        let index = self.store.index(index).map_err(|e| js_error(&e))?;
        let req = index.get(&key_to_js(value)?).map_err(|e| js_error(&e))?;
        Ok(request_pending(&req, optional_document))
    }
}

/// Forward scan over an `IDBCursorWithValue` request.
///
/// The request fires `success` once per step; each [`Cursor::next`] advances the
/// cursor and listens for the following step.
pub struct IdbCursorScan {
    request: IdbRequest,
    started: bool,
}

impl Cursor for IdbCursorScan {
    fn next(&mut self) -> Pending<Option<Document>> {
        if self.started {
            match self.request.result() {
                Ok(val) => match val.dyn_into::<IdbCursor>() {
                    Ok(cursor) => {
                        if let Err(e) = cursor.continue_() {
                            return Pending::failed(Signal::Error, js_error(&e));
                        }
                    }
                    // Exhausted: the last step yielded null.
                    Err(_) => return Pending::ready(Ok(None)),
                },
                Err(e) => return Pending::failed(Signal::Error, js_error(&e)),
            }
        }
        self.started = true;
        request_pending(&self.request, cursor_value)
    }
}

fn cursor_value(val: JsValue) -> Result<Option<Document>, EngineError> {
    if val.is_null() || val.is_undefined() {
        return Ok(None);
    }
    let cursor = val
        .dyn_into::<IdbCursorWithValue>()
        .map_err(|_| EngineError::new("UnknownError", "result is not IDBCursorWithValue"))?;
    let value = cursor.value().map_err(|e| js_error(&e))?;
    document_from_js(value).map(Some)
}
