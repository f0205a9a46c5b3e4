//! idbkit core
//!
//! Future-based facade over transactional object stores shaped like the
//! browser's IndexedDB: versioned databases, tables keyed by a key path,
//! optional secondary indexes, and single-table transactions that report
//! completion through callbacks.
//!
//! The facade turns each create/read/update/delete intent into exactly one
//! engine transaction and adapts the engine's callbacks into a single awaited
//! result. Durability, consistency and concurrency stay with the engine.
//!
//! # Example
//!
//! ```rust
//! use idbkit_core::{open, Database, MemoryEngine, OpenOptions};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let engine = MemoryEngine::new();
//! let options = OpenOptions::new("t", 1, "items", "id").index("by_name", "name", false);
//!
//! let db = open(&engine, &options).await?;
//! let items = db.table("items");
//!
//! items.insert(&[json!({"id": 1, "name": "a"})]).await?;
//! assert_eq!(items.read(1).await?, Some(json!({"id": 1, "name": "a"})));
//! assert_eq!(items.find_by_index("by_name", "a").await?, Some(json!({"id": 1, "name": "a"})));
//!
//! items.remove(1).await?;
//! assert!(items.read(1).await?.is_none());
//! # Ok::<(), idbkit_core::Error>(())
//! # }).unwrap();
//! ```

pub mod document;
pub mod engine;
pub mod error;
pub mod facade;
pub mod key;
pub mod key_path;
pub mod memory;
pub mod schema;
pub mod signal;

// Re-export main types at crate root
pub use document::{from_document, to_document, Document};
pub use engine::{Cursor, Database, Engine, Mode, Schema, Transaction, UpgradeEvent, UpgradeHook};
pub use error::{EngineError, Error, Failure, Result, Signal};
pub use facade::{create, open, Table};
pub use key::Key;
pub use key_path::KeyPath;
pub use memory::MemoryEngine;
pub use schema::{IndexSchema, IndexSpec, OpenOptions, TableSchema};
pub use signal::{settle, Outcome, Pending, Settle};
