//! idbkit JS bindings
//!
//! Promise-based facade over the browser's IndexedDB. Open a database with a
//! single options object, then drive one table through linear promise chains
//! instead of request event handlers.
//!
//! ```javascript
//! import init, { open } from 'idbkit_wasm';
//!
//! await init();
//! const db = await open({
//!     name: 't',
//!     version: 1,
//!     table: 'items',
//!     keyPath: 'id',
//!     indexes: [['by_name', 'name', false]],
//! });
//! const items = db.table('items');
//!
//! await items.insert([{ id: 1, name: 'a' }]);
//! await items.read(1);                    // { id: 1, name: 'a' }
//! await items.findByIndex('by_name', 'a'); // { id: 1, name: 'a' }
//! await items.remove(1);
//! await items.readAll();                  // []
//! ```
//!
//! Rejections carry a JS `Error` with the native name and message, except for
//! quota exhaustion during `insert`, which rejects with the string
//! `"Reach maximum quota"`.

mod error;
mod table;

use idbkit_core::{Database, Error, OpenOptions};
use idbkit_indexeddb::{IdbConnection, IndexedDbEngine};
use js_sys::Array;
use wasm_bindgen::prelude::*;

pub use table::TableHandle;

use crate::error::reject;

/// Open (or create) a database. The table and its indexes are created when the
/// database is new or `options.version` is higher than the stored version.
#[wasm_bindgen]
pub async fn open(options: JsValue) -> Result<Connection, JsValue> {
    // Route Rust panics to console.error instead of "RuntimeError: unreachable"
    console_error_panic_hook::set_once();

    let options: OpenOptions = serde_wasm_bindgen::from_value(options)
        .map_err(|e| reject(Error::InvalidOptions(e.to_string())))?;

    let engine = IndexedDbEngine::from_global().map_err(reject)?;
    let db = idbkit_core::open(&engine, &options).await.map_err(reject)?;

    Ok(Connection { db })
}

/// Open database connection.
#[wasm_bindgen]
pub struct Connection {
    db: IdbConnection,
}

#[wasm_bindgen]
impl Connection {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.db.name()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u32 {
        self.db.version()
    }

    #[wasm_bindgen(getter, js_name = tableNames)]
    pub fn table_names(&self) -> Array {
        self.db
            .table_names()
            .into_iter()
            .map(JsValue::from)
            .collect()
    }

    /// Bind this connection to `name`. The table is not checked until the
    /// first operation.
    pub fn table(&self, name: &str) -> TableHandle {
        TableHandle::new(self.db.table(name))
    }
}
