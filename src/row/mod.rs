//! Row/document tier: two interchangeable storage engines behind one
//! [`RowEngine`] trait.
//!
//! [`append_engine::AppendEngine`] is the block-framed append-only file
//! engine; [`lsm_engine::LsmEngine`] is the log-structured merge engine.
//! Both are driven by [`crate::adapters::Table`]/[`crate::adapters::Collection`]
//! and never directly by application code.

pub mod append_engine;
pub mod lsm_engine;
pub mod memtable;
pub mod sstable;
pub mod wal;

use crate::value::{Record, Value};

/// What kind of container a name refers to — decides schema validation
/// and id-generation strategy in the adapter layer, not storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Schema-validated rows with an auto-increment integer `id`.
    Table,
    /// Schemaless documents with a generated `_id`.
    Collection,
}

/// A container's directory entry: name, kind, and the field used as the
/// primary index key.
#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub kind: ContainerKind,
    pub key_field: String,
}

/// Operations common to both row engines. Implementations are free to
/// differ wildly in storage layout (append-only blocks vs. WAL +
/// memtable + SSTable runs) but present identical semantics to callers.
pub trait RowEngine {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Register a new container. A no-op (or error, at the
    /// implementation's discretion) if one by that name already exists.
    fn create_container(&mut self, container: &Container) -> Result<(), Self::Error>;

    /// Insert `record` into `container`, returning the assigned key.
    fn insert(&mut self, container: &str, key: Value, record: Record) -> Result<(), Self::Error>;

    /// Point lookup by primary key.
    fn read(&mut self, container: &str, key: &Value) -> Result<Option<Record>, Self::Error>;

    /// Replace the record at `key` entirely. Returns `false` if no such
    /// key exists.
    fn update(&mut self, container: &str, key: &Value, record: Record) -> Result<bool, Self::Error>;

    /// Remove the record at `key`. Returns `false` if no such key
    /// existed.
    fn delete(&mut self, container: &str, key: &Value) -> Result<bool, Self::Error>;

    /// Full container scan in engine-native order (ascending key order
    /// for both engines, since both index by key).
    fn scan(&mut self, container: &str) -> Result<Vec<(Value, Record)>, Self::Error>;

    /// Begin buffering writes for a transaction. Subsequent `insert`/
    /// `update`/`delete` calls are staged until [`RowEngine::commit`] or
    /// [`RowEngine::rollback`].
    fn begin(&mut self) -> Result<(), Self::Error>;

    /// Durably apply everything staged since [`RowEngine::begin`].
    fn commit(&mut self) -> Result<(), Self::Error>;

    /// Discard everything staged since [`RowEngine::begin`]. Engines
    /// are not required to undo already-durable writes made outside a
    /// transaction — only pending, uncommitted work.
    fn rollback(&mut self) -> Result<(), Self::Error>;

    /// Build a secondary index over `field` for `container`. The
    /// append engine builds an in-memory B-tree from a full scan and
    /// maintains it incrementally thereafter; the LSM engine has no
    /// secondary-index mechanism and treats this as a logged no-op
    /// rather than an error (matching the original's silent `pass`).
    fn create_index(&mut self, container: &str, field: &str) -> Result<(), Self::Error>;

    /// Engine-local counters (cache hits/misses, run counts, and
    /// similar) exposed through [`crate::database::Database::statistics`].
    fn statistics(&self) -> std::collections::BTreeMap<String, u64>;
}
