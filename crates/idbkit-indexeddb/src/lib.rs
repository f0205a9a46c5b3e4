//! IndexedDB engine for idbkit (browser WASM)
//!
//! Implements the `idbkit_core` engine traits over web-sys so the facade can
//! drive a real browser database. Every IndexedDB request, transaction and open
//! request is adapted into a `Pending` value that settles on the first of its
//! terminal events.
//!
//! # Example
//!
//! ```rust,ignore
//! use idbkit_core::{open, Database, OpenOptions};
//! use idbkit_indexeddb::IndexedDbEngine;
//!
//! let engine = IndexedDbEngine::from_global()?;
//! let options = OpenOptions::new("app", 1, "notes", "id").index("by_title", "title", false);
//! let notes = open(&engine, &options).await?.table("notes");
//!
//! notes.insert(&[serde_json::json!({"id": 1, "title": "hello"})]).await?;
//! let found = notes.find_by_index("by_title", "hello").await?;
//! ```

pub mod convert;
pub mod engine;
pub mod error;
pub mod idb;

pub use engine::{IdbConnection, IdbCursorScan, IdbTx, IndexedDbEngine};
pub use idb::idb_factory;
