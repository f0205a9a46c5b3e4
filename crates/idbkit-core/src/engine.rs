//! Engine boundary
//!
//! These traits describe the transactional object store the facade drives. An
//! engine offers versioned databases made of tables; each table is keyed by a key
//! path and may carry secondary indexes. All work happens inside a transaction
//! scoped to one table and a [`Mode`].
//!
//! Requests return a [`Pending`] that settles once, on the engine's own schedule.
//! Errors the engine raises synchronously while a request is being issued come
//! back as `Err` instead.
//!
//! Implementations exist for:
//!
//! - **Memory**: in-process engine for tests and development (`MemoryEngine`)
//! - **IndexedDB**: browser storage via web-sys (separate crate, WASM only)

use crate::error::EngineError;
use crate::facade::Table;
use crate::key::Key;
use crate::key_path::KeyPath;
use crate::schema::IndexSchema;
use crate::signal::Pending;
use crate::Document;

/// Transaction permission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ReadOnly => "readonly",
            Mode::ReadWrite => "readwrite",
        }
    }
}

/// Versions involved in an upgrade transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeEvent {
    /// Version persisted before this open; 0 for a brand new database
    pub old_version: u32,
    pub new_version: u32,
}

/// Callback run during an upgrade transition. Returning an error aborts the
/// upgrade and makes the open fail.
pub type UpgradeHook = Box<dyn FnOnce(&mut dyn Schema, UpgradeEvent) -> Result<(), EngineError>>;

/// Schema editing capability, only available inside an upgrade transition.
pub trait Schema {
    fn table_names(&self) -> Vec<String>;

    fn has_table(&self, name: &str) -> bool {
        self.table_names().iter().any(|t| t == name)
    }

    fn create_table(&mut self, name: &str, key_path: &KeyPath) -> Result<(), EngineError>;

    fn create_index(&mut self, table: &str, index: &IndexSchema) -> Result<(), EngineError>;
}

/// Entry point of an engine.
pub trait Engine {
    type Database: Database;

    /// Open `name` at `version`, running `upgrade` first if the persisted version
    /// is lower (or the database does not exist yet).
    fn open(&self, name: &str, version: u32, upgrade: UpgradeHook) -> Pending<Self::Database>;

    /// Delete a database and everything in it.
    fn delete_database(&self, name: &str) -> Pending<()>;
}

/// Open database connection.
///
/// Cheap to clone; clones share the same connection.
pub trait Database: Clone {
    type Transaction: Transaction;

    fn name(&self) -> String;

    fn version(&self) -> u32;

    fn table_names(&self) -> Vec<String>;

    fn transaction(&self, table: &str, mode: Mode) -> Result<Self::Transaction, EngineError>;

    /// Bind this connection to a table.
    fn table(&self, name: &str) -> Table<Self> {
        Table::new(self.clone(), name)
    }
}

/// A transaction over one table.
///
/// The transaction commits on its own once no further requests are issued.
pub trait Transaction {
    type Cursor: Cursor;

    /// Settles when the transaction completes, errors, aborts, or its
    /// connection closes. Call before issuing requests.
    fn done(&self) -> Pending<()>;

    /// Roll back everything issued so far. `done` then settles on abort.
    fn abort(&self);

    /// Insert a document; fails if its key already exists.
    fn add(&self, doc: &Document) -> Result<Pending<Key>, EngineError>;

    /// Insert or replace a document.
    fn put(&self, doc: &Document) -> Result<Pending<Key>, EngineError>;

    fn get(&self, key: &Key) -> Result<Pending<Option<Document>>, EngineError>;

    /// Whether [`Transaction::get_all`] is available.
    fn supports_get_all(&self) -> bool {
        true
    }

    /// Every document in key order.
    fn get_all(&self) -> Result<Pending<Vec<Document>>, EngineError>;

    /// Forward cursor over every document in key order.
    fn open_cursor(&self) -> Result<Self::Cursor, EngineError>;

    fn delete(&self, key: &Key) -> Result<Pending<()>, EngineError>;

    /// First document whose `index` value equals `value`.
    fn index_get(&self, index: &str, value: &Key) -> Result<Pending<Option<Document>>, EngineError>;
}

/// Forward cursor.
pub trait Cursor {
    /// Next document, or `None` once the scan is exhausted.
    fn next(&mut self) -> Pending<Option<Document>>;
}
