//! Storage facade: open a database, then drive a table through one-shot
//! transactions.
//!
//! Every operation opens its own transaction, issues the request(s), and settles
//! on the first terminal signal. Nothing is retried and no ordering is imposed
//! between operations beyond what the engine's transaction queue provides;
//! callers that need ordering await one operation before issuing the next.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::document::from_document;
use crate::engine::{Cursor, Database, Engine, Mode, Schema, Transaction, UpgradeHook};
use crate::error::{EngineError, Error, Failure, Result, Signal};
use crate::key::Key;
use crate::schema::{OpenOptions, TableSchema};
use crate::signal::Pending;
use crate::Document;

/// Open (or create) the database described by `options`.
///
/// When the database is new or `options.version` is higher than the persisted
/// version, the table and its indexes are created during the upgrade.
/// The returned handle is never closed by this crate; clone it freely.
pub async fn open<E: Engine>(engine: &E, options: &OpenOptions) -> Result<E::Database> {
    let table = options.validate()?;

    let db_name = options.name.clone();
    let upgrade: UpgradeHook = Box::new(move |schema, event| {
        debug!(
            db = %db_name,
            old_version = event.old_version,
            new_version = event.new_version,
            "upgrade needed"
        );
        create(schema, &table)
    });

    let db = engine
        .open(&options.name, options.version, upgrade)
        .await
        .map_err(|failure| Error::Open(failure.error))?;

    info!(db = %options.name, version = options.version, "database opened");
    Ok(db)
}

/// Ensure `table` and its indexes exist.
///
/// Does nothing if the table already exists. A [`Schema`] only exists inside an
/// upgrade transition, so this can only run from an upgrade hook.
pub fn create<S: Schema + ?Sized>(
    schema: &mut S,
    table: &TableSchema,
) -> std::result::Result<(), EngineError> {
    if schema.has_table(&table.name) {
        debug!(table = %table.name, "table exists, skipping creation");
        return Ok(());
    }

    schema.create_table(&table.name, &table.key_path)?;
    for index in &table.indexes {
        schema.create_index(&table.name, index)?;
    }

    info!(
        table = %table.name,
        key_path = %table.key_path,
        indexes = table.indexes.len(),
        "table created"
    );
    Ok(())
}

/// A database handle bound to one table.
///
/// Build once with [`Table::new`] or [`Database::table`] and reuse for any
/// number of operations.
#[derive(Debug, Clone)]
pub struct Table<D> {
    db: D,
    name: String,
}

impl<D: Database> Table<D> {
    pub fn new(db: D, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Add every document in one read-write transaction.
    ///
    /// Keys are not deduplicated: a document whose key already exists fails the
    /// transaction and nothing from the batch is kept. Returns the keys of the
    /// added documents in input order.
    pub async fn insert(&self, docs: &[Document]) -> Result<Vec<Key>> {
        let (tx, done) = self.begin(Mode::ReadWrite)?;

        let mut requests = Vec::with_capacity(docs.len());
        for doc in docs {
            match tx.add(doc) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    tx.abort();
                    return Err(self.insert_failure(Failure::new(Signal::Error, e)));
                }
            }
        }

        done.await.map_err(|f| self.insert_failure(f))?;

        let mut keys = Vec::with_capacity(requests.len());
        for request in requests {
            keys.push(request.await.map_err(|f| self.insert_failure(f))?);
        }

        debug!(table = %self.name, count = keys.len(), "documents inserted");
        Ok(keys)
    }

    /// Fetch the document stored under `key`.
    pub async fn read(&self, key: impl Into<Key>) -> Result<Option<Document>> {
        let key = key.into();
        let (tx, done) = self.begin(Mode::ReadOnly)?;
        let doc = tx.get(&key).map_err(Error::thrown)?.await?;
        done.await?;
        Ok(doc)
    }

    /// Every document in the table, in key order.
    ///
    /// Uses the engine's bulk fetch when available and a forward cursor scan
    /// otherwise.
    pub async fn read_all(&self) -> Result<Vec<Document>> {
        let (tx, done) = self.begin(Mode::ReadOnly)?;

        let docs = if tx.supports_get_all() {
            tx.get_all().map_err(Error::thrown)?.await?
        } else {
            let mut cursor = tx.open_cursor().map_err(Error::thrown)?;
            let mut docs = Vec::new();
            while let Some(doc) = cursor.next().await? {
                docs.push(doc);
            }
            docs
        };

        done.await?;
        Ok(docs)
    }

    /// Insert or replace `doc`, keyed by its key path value.
    pub async fn update(&self, doc: &Document) -> Result<Key> {
        let (tx, done) = self.begin(Mode::ReadWrite)?;
        let key = tx.put(doc).map_err(Error::thrown)?.await?;
        done.await?;
        Ok(key)
    }

    /// Delete the document stored under `key`. Deleting a missing key succeeds.
    pub async fn remove(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let (tx, done) = self.begin(Mode::ReadWrite)?;
        tx.delete(&key).map_err(Error::thrown)?.await?;
        done.await?;
        Ok(())
    }

    /// First document whose `index` value equals `value`.
    pub async fn find_by_index(
        &self,
        index: &str,
        value: impl Into<Key>,
    ) -> Result<Option<Document>> {
        let value = value.into();
        let (tx, done) = self.begin(Mode::ReadOnly)?;
        let doc = tx.index_get(index, &value).map_err(Error::thrown)?.await?;
        done.await?;
        Ok(doc)
    }

    /// [`Table::read`] decoded into a typed record.
    pub async fn read_as<T: DeserializeOwned>(&self, key: impl Into<Key>) -> Result<Option<T>> {
        self.read(key).await?.map(from_document).transpose()
    }

    /// [`Table::read_all`] decoded into typed records.
    pub async fn read_all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.read_all().await?.into_iter().map(from_document).collect()
    }

    /// Open a transaction and register for its completion before any request
    /// is issued.
    fn begin(&self, mode: Mode) -> Result<(D::Transaction, Pending<()>)> {
        let tx = self.db.transaction(&self.name, mode).map_err(Error::thrown)?;
        let done = tx.done();
        debug!(table = %self.name, mode = mode.as_str(), "transaction started");
        Ok((tx, done))
    }

    fn insert_failure(&self, failure: Failure) -> Error {
        if failure.error.is_quota_exceeded() {
            warn!(table = %self.name, "storage quota exceeded");
            Error::QuotaExceeded
        } else {
            failure.into()
        }
    }
}
