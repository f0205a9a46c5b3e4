//! In-memory engine
//!
//! A process-local engine with the same observable behaviour as IndexedDB for the
//! operations the facade uses. Useful for:
//! - Unit and integration testing
//! - Development/prototyping outside the browser
//!
//! Read-write transactions stage their writes and commit them atomically when
//! completion is awaited (or the transaction is dropped). Any failed request
//! rolls the whole transaction back.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::{Cursor, Database, Engine, Mode, Schema, Transaction, UpgradeEvent, UpgradeHook};
use crate::error::{EngineError, Failure, Signal, QUOTA_EXCEEDED};
use crate::key::Key;
use crate::key_path::KeyPath;
use crate::schema::IndexSchema;
use crate::signal::{Outcome, Pending};
use crate::Document;

#[derive(Debug, Clone)]
struct TableState {
    key_path: KeyPath,
    indexes: Vec<IndexSchema>,
    records: BTreeMap<Key, Document>,
}

impl TableState {
    fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    fn check_unique(&self, index: &IndexSchema) -> Result<(), EngineError> {
        if !index.unique {
            return Ok(());
        }
        let mut seen = BTreeSet::new();
        for doc in self.records.values() {
            if let Some(value) = index.key_path.extract(doc) {
                if !seen.insert(value.clone()) {
                    return Err(EngineError::new(
                        "ConstraintError",
                        format!("unique index '{}' already contains {}", index.name, value),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct DatabaseState {
    version: u32,
    tables: BTreeMap<String, TableState>,
}

impl DatabaseState {
    fn document_count(&self) -> usize {
        self.tables.values().map(|t| t.records.len()).sum()
    }
}

#[derive(Debug)]
struct State {
    databases: HashMap<String, DatabaseState>,
    faults: VecDeque<Failure>,
    quota: Option<usize>,
    get_all: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            databases: HashMap::new(),
            faults: VecDeque::new(),
            quota: None,
            get_all: true,
        }
    }
}

/// In-memory engine.
///
/// Clones share the same databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<State>>,
}

impl MemoryEngine {
    /// Create a new engine with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of documents a database may hold. Commits that would
    /// exceed it abort with `QuotaExceededError`.
    pub fn with_quota(self, max_documents: usize) -> Self {
        self.state.lock().quota = Some(max_documents);
        self
    }

    /// Pretend the engine has no bulk fetch, forcing cursor scans.
    pub fn without_get_all(self) -> Self {
        self.state.lock().get_all = false;
        self
    }

    /// Make the next transaction end on `signal` with `error`, discarding its
    /// writes.
    pub fn inject_fault(&self, signal: Signal, error: EngineError) {
        self.state.lock().faults.push_back(Failure::new(signal, error));
    }

    /// Persisted version of a database, if it exists.
    pub fn version_of(&self, name: &str) -> Option<u32> {
        self.state.lock().databases.get(name).map(|db| db.version)
    }

    /// Index names of a table, in creation order.
    pub fn index_names(&self, db: &str, table: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(db)
            .and_then(|db| db.tables.get(table))
            .map(|t| t.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Engine for MemoryEngine {
    type Database = MemoryDatabase;

    fn open(&self, name: &str, version: u32, upgrade: UpgradeHook) -> Pending<MemoryDatabase> {
        if version == 0 {
            return Pending::failed(
                Signal::Error,
                EngineError::new("TypeError", "version must be at least 1"),
            );
        }

        let existing = self.state.lock().databases.get(name).cloned();
        let old_version = existing.as_ref().map_or(0, |db| db.version);

        if version < old_version {
            return Pending::failed(
                Signal::Error,
                EngineError::new(
                    "VersionError",
                    format!(
                        "requested version ({}) is less than the existing version ({})",
                        version, old_version
                    ),
                ),
            );
        }

        if version > old_version {
            let mut staged = existing.unwrap_or_default();
            let event = UpgradeEvent {
                old_version,
                new_version: version,
            };

            if let Err(e) = upgrade(&mut MemorySchema(&mut staged.tables), event) {
                debug!(db = name, error = %e, "upgrade aborted");
                return Pending::failed(Signal::Error, e);
            }

            staged.version = version;
            self.state.lock().databases.insert(name.to_string(), staged);
        }

        Pending::ready(Ok(MemoryDatabase {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            version,
        }))
    }

    fn delete_database(&self, name: &str) -> Pending<()> {
        self.state.lock().databases.remove(name);
        Pending::ready(Ok(()))
    }
}

struct MemorySchema<'a>(&'a mut BTreeMap<String, TableState>);

impl Schema for MemorySchema<'_> {
    fn table_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    fn create_table(&mut self, name: &str, key_path: &KeyPath) -> Result<(), EngineError> {
        if self.0.contains_key(name) {
            return Err(EngineError::new(
                "ConstraintError",
                format!("object store '{}' already exists", name),
            ));
        }
        self.0.insert(
            name.to_string(),
            TableState {
                key_path: key_path.clone(),
                indexes: Vec::new(),
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn create_index(&mut self, table: &str, index: &IndexSchema) -> Result<(), EngineError> {
        let state = self.0.get_mut(table).ok_or_else(|| missing_table(table))?;
        if state.index(&index.name).is_some() {
            return Err(EngineError::new(
                "ConstraintError",
                format!("index '{}' already exists on '{}'", index.name, table),
            ));
        }
        state.check_unique(index)?;
        state.indexes.push(index.clone());
        Ok(())
    }
}

/// Connection to an in-memory database.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    name: String,
    version: u32,
}

impl Database for MemoryDatabase {
    type Transaction = MemoryTransaction;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn table_names(&self) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(&self.name)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transaction(&self, table: &str, mode: Mode) -> Result<MemoryTransaction, EngineError> {
        let mut state = self.state.lock();
        let db = state.databases.get(&self.name).ok_or_else(closed)?;
        if !db.tables.contains_key(table) {
            return Err(missing_table(table));
        }
        let fault = state.faults.pop_front();
        let get_all = state.get_all;

        Ok(MemoryTransaction {
            shared: Rc::new(Shared {
                state: Arc::clone(&self.state),
                db: self.name.clone(),
                table: table.to_string(),
                tx: RefCell::new(TxState {
                    writes: Vec::new(),
                    failure: fault,
                    outcome: None,
                }),
            }),
            mode,
            get_all,
        })
    }
}

#[derive(Debug)]
enum Write {
    Add(Key, Document),
    Put(Key, Document),
    Delete(Key),
}

#[derive(Debug)]
struct TxState {
    writes: Vec<Write>,
    failure: Option<Failure>,
    outcome: Option<Outcome<()>>,
}

#[derive(Debug)]
struct Shared {
    state: Arc<Mutex<State>>,
    db: String,
    table: String,
    tx: RefCell<TxState>,
}

impl Shared {
    fn with_table<R>(&self, f: impl FnOnce(&TableState) -> R) -> Result<R, EngineError> {
        let state = self.state.lock();
        let db = state.databases.get(&self.db).ok_or_else(closed)?;
        let table = db.tables.get(&self.table).ok_or_else(|| missing_table(&self.table))?;
        Ok(f(table))
    }

    /// Value of `key` as seen from inside this transaction.
    fn lookup(&self, key: &Key) -> Result<Option<Document>, EngineError> {
        let staged = self.tx.borrow().writes.iter().rev().find_map(|w| match w {
            Write::Add(k, doc) | Write::Put(k, doc) if k == key => Some(Some(doc.clone())),
            Write::Delete(k) if k == key => Some(None),
            _ => None,
        });
        match staged {
            Some(doc) => Ok(doc),
            None => self.with_table(|t| t.records.get(key).cloned()),
        }
    }

    /// Every record as seen from inside this transaction.
    fn view(&self) -> Result<BTreeMap<Key, Document>, EngineError> {
        let mut records = self.with_table(|t| t.records.clone())?;
        for write in &self.tx.borrow().writes {
            match write {
                Write::Add(k, doc) | Write::Put(k, doc) => {
                    records.insert(k.clone(), doc.clone());
                }
                Write::Delete(k) => {
                    records.remove(k);
                }
            }
        }
        Ok(records)
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if self.tx.borrow().outcome.is_some() {
            return Err(EngineError::new(
                "TransactionInactiveError",
                "transaction has already finished",
            ));
        }
        Ok(())
    }

    /// Fail a request; the transaction follows it.
    fn fail_request<T>(&self, error: EngineError) -> Pending<T> {
        let mut tx = self.tx.borrow_mut();
        if tx.failure.is_none() {
            tx.failure = Some(Failure::new(Signal::Error, error.clone()));
        }
        Pending::failed(Signal::Error, error)
    }

    /// Commit or roll back. The first call decides; later calls replay it.
    fn finish(&self) -> Outcome<()> {
        if let Some(outcome) = &self.tx.borrow().outcome {
            return outcome.clone();
        }
        let outcome = self.commit();
        self.tx.borrow_mut().outcome = Some(outcome.clone());
        outcome
    }

    fn commit(&self) -> Outcome<()> {
        let tx = self.tx.borrow();
        if let Some(failure) = &tx.failure {
            return Err(failure.clone());
        }
        if tx.writes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let quota = state.quota;
        let db = state
            .databases
            .get_mut(&self.db)
            .ok_or_else(|| Failure::new(Signal::Close, closed()))?;
        let current = db
            .tables
            .get(&self.table)
            .ok_or_else(|| Failure::new(Signal::Abort, missing_table(&self.table)))?;

        let mut next = current.clone();
        for write in &tx.writes {
            match write {
                Write::Add(k, doc) => {
                    if next.records.contains_key(k) {
                        return Err(Failure::new(Signal::Error, key_exists(k)));
                    }
                    next.records.insert(k.clone(), doc.clone());
                }
                Write::Put(k, doc) => {
                    next.records.insert(k.clone(), doc.clone());
                }
                Write::Delete(k) => {
                    next.records.remove(k);
                }
            }
        }

        for index in &next.indexes {
            next.check_unique(index)
                .map_err(|e| Failure::new(Signal::Error, e))?;
        }

        if let Some(limit) = quota {
            let total = db.document_count() - current.records.len() + next.records.len();
            if total > limit {
                return Err(Failure::new(
                    Signal::Abort,
                    EngineError::new(
                        QUOTA_EXCEEDED,
                        format!(
                            "database '{}' would hold {} documents, limit is {}",
                            self.db, total, limit
                        ),
                    ),
                ));
            }
        }

        debug!(db = %self.db, table = %self.table, writes = tx.writes.len(), "transaction committed");
        db.tables.insert(self.table.clone(), next);
        Ok(())
    }
}

/// Transaction over one in-memory table.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Rc<Shared>,
    mode: Mode,
    get_all: bool,
}

impl MemoryTransaction {
    fn ensure_writable(&self) -> Result<(), EngineError> {
        self.shared.ensure_active()?;
        if self.mode == Mode::ReadOnly {
            return Err(EngineError::new(
                "ReadOnlyError",
                "the transaction is read-only",
            ));
        }
        Ok(())
    }

    fn key_of(&self, doc: &Document) -> Result<Key, EngineError> {
        self.shared
            .with_table(|t| t.key_path.extract(doc).ok_or_else(|| missing_key(&t.key_path)))?
    }
}

impl Transaction for MemoryTransaction {
    type Cursor = MemoryCursor;

    fn done(&self) -> Pending<()> {
        let shared = Rc::clone(&self.shared);
        Pending::deferred(move || shared.finish())
    }

    fn abort(&self) {
        let mut tx = self.shared.tx.borrow_mut();
        if tx.outcome.is_none() && tx.failure.is_none() {
            tx.failure = Some(Failure::new(
                Signal::Abort,
                EngineError::new("AbortError", "the transaction was aborted"),
            ));
        }
    }

    fn add(&self, doc: &Document) -> Result<Pending<Key>, EngineError> {
        self.ensure_writable()?;
        let key = self.key_of(doc)?;
        if self.shared.lookup(&key)?.is_some() {
            return Ok(self.shared.fail_request(key_exists(&key)));
        }
        self.shared
            .tx
            .borrow_mut()
            .writes
            .push(Write::Add(key.clone(), doc.clone()));
        Ok(Pending::ready(Ok(key)))
    }

    fn put(&self, doc: &Document) -> Result<Pending<Key>, EngineError> {
        self.ensure_writable()?;
        let key = self.key_of(doc)?;
        self.shared
            .tx
            .borrow_mut()
            .writes
            .push(Write::Put(key.clone(), doc.clone()));
        Ok(Pending::ready(Ok(key)))
    }

    fn get(&self, key: &Key) -> Result<Pending<Option<Document>>, EngineError> {
        self.shared.ensure_active()?;
        Ok(Pending::ready(Ok(self.shared.lookup(key)?)))
    }

    fn supports_get_all(&self) -> bool {
        self.get_all
    }

    fn get_all(&self) -> Result<Pending<Vec<Document>>, EngineError> {
        self.shared.ensure_active()?;
        if !self.get_all {
            return Err(EngineError::new("NotSupportedError", "getAll is not available"));
        }
        let docs = self.shared.view()?.into_values().collect();
        Ok(Pending::ready(Ok(docs)))
    }

    fn open_cursor(&self) -> Result<MemoryCursor, EngineError> {
        self.shared.ensure_active()?;
        let docs = self.shared.view()?.into_values().collect();
        Ok(MemoryCursor { docs })
    }

    fn delete(&self, key: &Key) -> Result<Pending<()>, EngineError> {
        self.ensure_writable()?;
        self.shared
            .tx
            .borrow_mut()
            .writes
            .push(Write::Delete(key.clone()));
        Ok(Pending::ready(Ok(())))
    }

    fn index_get(&self, name: &str, value: &Key) -> Result<Pending<Option<Document>>, EngineError> {
        self.shared.ensure_active()?;
        let index = self
            .shared
            .with_table(|t| t.index(name).cloned())?
            .ok_or_else(|| {
                EngineError::new(
                    "NotFoundError",
                    format!("index '{}' not found on '{}'", name, self.shared.table),
                )
            })?;

        let found = self
            .shared
            .view()?
            .into_values()
            .find(|doc| index.key_path.extract(doc).as_ref() == Some(value));
        Ok(Pending::ready(Ok(found)))
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        // Auto-commit: a transaction nobody awaited still finishes.
        let _ = self.shared.finish();
    }
}

/// Forward cursor over a snapshot of a table.
#[derive(Debug)]
pub struct MemoryCursor {
    docs: VecDeque<Document>,
}

impl Cursor for MemoryCursor {
    fn next(&mut self) -> Pending<Option<Document>> {
        Pending::ready(Ok(self.docs.pop_front()))
    }
}

fn closed() -> EngineError {
    EngineError::new("InvalidStateError", "the database connection is closed")
}

fn missing_table(name: &str) -> EngineError {
    EngineError::new("NotFoundError", format!("object store '{}' not found", name))
}

fn missing_key(key_path: &KeyPath) -> EngineError {
    EngineError::new(
        "DataError",
        format!("evaluating the key path '{}' did not yield a valid key", key_path),
    )
}

fn key_exists(key: &Key) -> EngineError {
    EngineError::new("ConstraintError", format!("key {} already exists", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::create;
    use crate::schema::OpenOptions;
    use serde_json::json;

    fn items_hook() -> UpgradeHook {
        let schema = OpenOptions::new("t", 1, "items", "id")
            .index("by_email", "email", true)
            .validate()
            .unwrap();
        Box::new(move |db, _| create(db, &schema))
    }

    async fn open_items(engine: &MemoryEngine) -> MemoryDatabase {
        engine.open("t", 1, items_hook()).await.unwrap()
    }

    #[tokio::test]
    async fn test_upgrade_runs_once_per_version() {
        let engine = MemoryEngine::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        for version in [1, 1, 2] {
            let seen = calls.clone();
            let hook: UpgradeHook = Box::new(move |_, event| {
                seen.borrow_mut().push(event);
                Ok(())
            });
            engine.open("t", version, hook).await.unwrap();
        }

        assert_eq!(
            *calls.borrow(),
            vec![
                UpgradeEvent { old_version: 0, new_version: 1 },
                UpgradeEvent { old_version: 1, new_version: 2 },
            ]
        );
        assert_eq!(engine.version_of("t"), Some(2));
    }

    #[tokio::test]
    async fn test_downgrade_rejected() {
        let engine = MemoryEngine::new();
        open_items(&engine).await;
        let hook: UpgradeHook = Box::new(|_, _| Ok(()));
        engine.open("t", 2, hook).await.unwrap();

        let failure = engine.open("t", 1, items_hook()).await.unwrap_err();
        assert_eq!(failure.error.name, "VersionError");
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_nothing_behind() {
        let engine = MemoryEngine::new();
        let hook: UpgradeHook = Box::new(|db, _| {
            db.create_table("items", &KeyPath::parse("id").unwrap())?;
            Err(EngineError::new("AbortError", "stop"))
        });

        let failure = engine.open("t", 1, hook).await.unwrap_err();
        assert_eq!(failure.error.message, "stop");
        assert_eq!(engine.version_of("t"), None);
    }

    #[tokio::test]
    async fn test_staged_writes_visible_inside_transaction_only() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let tx = db.transaction("items", Mode::ReadWrite).unwrap();
        let done = tx.done();
        tx.add(&json!({"id": 1, "email": "a@x"})).unwrap().await.unwrap();
        assert!(tx.get(&Key::from(1)).unwrap().await.unwrap().is_some());

        let other = db.transaction("items", Mode::ReadOnly).unwrap();
        assert!(other.get(&Key::from(1)).unwrap().await.unwrap().is_none());

        done.await.unwrap();
        let after = db.transaction("items", Mode::ReadOnly).unwrap();
        assert!(after.get(&Key::from(1)).unwrap().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dropped_transaction_commits() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        {
            let tx = db.transaction("items", Mode::ReadWrite).unwrap();
            let _ = tx.put(&json!({"id": 5, "email": "e@x"})).unwrap();
        }

        let tx = db.transaction("items", Mode::ReadOnly).unwrap();
        assert!(tx.get(&Key::from(5)).unwrap().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let tx = db.transaction("items", Mode::ReadOnly).unwrap();
        let err = tx.put(&json!({"id": 1})).err().unwrap();
        assert_eq!(err.name, "ReadOnlyError");
    }

    #[tokio::test]
    async fn test_unique_index_enforced_at_commit() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let tx = db.transaction("items", Mode::ReadWrite).unwrap();
        let done = tx.done();
        let _ = tx.add(&json!({"id": 1, "email": "same@x"})).unwrap();
        let _ = tx.add(&json!({"id": 2, "email": "same@x"})).unwrap();

        let failure = done.await.unwrap_err();
        assert_eq!(failure.error.name, "ConstraintError");
        let tx = db.transaction("items", Mode::ReadOnly).unwrap();
        assert!(tx.get_all().unwrap().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_and_index() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        assert_eq!(
            db.transaction("nope", Mode::ReadOnly).err().unwrap().name,
            "NotFoundError"
        );

        let tx = db.transaction("items", Mode::ReadOnly).unwrap();
        assert_eq!(
            tx.index_get("by_nothing", &Key::from(1)).err().unwrap().name,
            "NotFoundError"
        );
    }

    #[tokio::test]
    async fn test_deleted_database_closes_connections() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;
        engine.delete_database("t").await.unwrap();

        assert_eq!(
            db.transaction("items", Mode::ReadOnly).err().unwrap().name,
            "InvalidStateError"
        );
        assert!(db.table_names().is_empty());
    }
}
