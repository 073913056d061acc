//! # HybridStore
//!
//! An embeddable, multi-model data store unifying three storage tiers
//! behind one [`Database`](crate::database::Database) handle:
//!
//! - a **row/document** tier tuned for write-heavy workloads, with two
//!   interchangeable engines — a block-framed append-only file engine
//!   and a log-structured merge (LSM) engine;
//! - a **columnar** tier tuned for analytical aggregation;
//! - a **vector** tier tuned for nearest-neighbor similarity search.
//!
//! A [`sharding`] front additionally routes documents across peer nodes
//! by consistent hashing, behind a pluggable transport trait.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Database                              │
//! │  ┌───────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │  Row engine    │   │  Columnar    │   │  Vector          │  │
//! │  │  (Append|LSM)  │   │  store       │   │  store           │  │
//! │  └───────┬────────┘   └──────┬───────┘   └─────────┬────────┘  │
//! │          │                   │                      │          │
//! │   Table / Collection    ColumnarTable          VectorIndex      │
//! │      adapters            (per table)           (per index)     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`value`] | Self-describing `Value`/`Record` types and their wire codec |
//! | [`encoding`] | The deterministic `Encode`/`Decode` primitives the codec builds on |
//! | [`block`] | 16-byte framed block header used by the append-only file engine |
//! | [`file_manager`] | Single-file owner: header validation, append, read-at-offset |
//! | [`btree`] | In-memory B-tree secondary index |
//! | [`cache`] | Fixed-capacity LRU record cache |
//! | [`row`] | The [`row::RowEngine`] trait and its two implementations |
//! | [`adapters`] | Schema-bearing `Table` and schemaless `Collection` façades |
//! | [`columnar`] | Dense per-column arrays with vectorized aggregation |
//! | [`vector`] | Flat cosine-similarity vector index |
//! | [`sharding`] | Consistent-hash ring and distributed cluster client |
//! | [`database`] | The single handle composing all tiers |
//! | [`error`] | Crate-wide error type composed from every subsystem |
//!
//! ## Concurrency model
//!
//! Every engine in this crate assumes a single thread of control: no
//! background threads, no internal locking, no async scheduling. A
//! [`Database`](crate::database::Database) is not safe for concurrent
//! use — callers must serialize access themselves. Mutating operations
//! take `&mut self` throughout so this is enforced by the borrow checker
//! rather than documented and hoped for.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hybridstore::database::{Database, RowEngineKind};
//! use std::collections::BTreeMap;
//!
//! let mut db = Database::open("/tmp/my_db", RowEngineKind::Lsm).unwrap();
//!
//! let mut schema = BTreeMap::new();
//! schema.insert("name".to_string(), "string".to_string());
//! schema.insert("age".to_string(), "integer".to_string());
//! db.create_table("users", schema).unwrap();
//!
//! db.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod adapters;
pub mod block;
pub mod btree;
pub mod cache;
pub mod columnar;
pub mod database;
pub mod encoding;
pub mod error;
pub mod file_manager;
pub mod row;
pub mod sharding;
pub mod value;
pub mod vector;

pub use database::{Database, RowEngineKind};
pub use error::Error;
pub use value::{Record, Value};
