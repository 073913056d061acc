//! The single handle composing every storage tier.
//!
//! [`Database`] owns exactly one row engine (selected at
//! [`Database::open`] time between the block-framed
//! [`crate::row::append_engine::AppendEngine`] and the
//! [`crate::row::lsm_engine::LsmEngine`]), and lazily constructs the
//! columnar and vector stores on first use. [`crate::adapters::Table`]
//! and [`crate::adapters::Collection`] are non-owning views borrowed
//! from a `Database` — they never hold storage of their own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::adapters::{Collection, Table};
use crate::columnar::{ColumnType, ColumnarStore, ColumnarTable};
use crate::error::Error;
use crate::row::append_engine::AppendEngine;
use crate::row::lsm_engine::LsmEngine;
use crate::row::{Container, ContainerKind, RowEngine};
use crate::value::Value;
use crate::vector::{VectorIndex, VectorStore};

/// Which row-tier engine a [`Database`] is backed by. Chosen once at
/// [`Database::open`] — the two engines are not interchangeable on a
/// single directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEngineKind {
    /// Block-framed append-only file engine with a B-tree index and an
    /// LRU cache.
    Append,
    /// Log-structured merge engine (WAL + memtable + sorted runs).
    Lsm,
}

/// Dispatches [`RowEngine`] calls to whichever concrete engine this
/// `Database` opened, translating each engine's own error type into the
/// crate-wide [`Error`]. A trait object can't be used directly here —
/// [`AppendEngine`] and [`LsmEngine`] implement [`RowEngine`] with
/// different associated `Error` types — so this enum stands in for
/// `Box<dyn RowEngine<Error = Error>>`.
enum RowEngineHandle {
    Append(AppendEngine),
    Lsm(LsmEngine),
}

impl RowEngine for RowEngineHandle {
    type Error = Error;

    fn create_container(&mut self, container: &Container) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.create_container(container).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.create_container(container).map_err(Error::from),
        }
    }

    fn insert(&mut self, container: &str, key: Value, record: crate::value::Record) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.insert(container, key, record).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.insert(container, key, record).map_err(Error::from),
        }
    }

    fn read(&mut self, container: &str, key: &Value) -> Result<Option<crate::value::Record>, Error> {
        match self {
            RowEngineHandle::Append(e) => e.read(container, key).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.read(container, key).map_err(Error::from),
        }
    }

    fn update(&mut self, container: &str, key: &Value, record: crate::value::Record) -> Result<bool, Error> {
        match self {
            RowEngineHandle::Append(e) => e.update(container, key, record).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.update(container, key, record).map_err(Error::from),
        }
    }

    fn delete(&mut self, container: &str, key: &Value) -> Result<bool, Error> {
        match self {
            RowEngineHandle::Append(e) => e.delete(container, key).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.delete(container, key).map_err(Error::from),
        }
    }

    fn scan(&mut self, container: &str) -> Result<Vec<(Value, crate::value::Record)>, Error> {
        match self {
            RowEngineHandle::Append(e) => e.scan(container).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.scan(container).map_err(Error::from),
        }
    }

    fn begin(&mut self) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.begin().map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.begin().map_err(Error::from),
        }
    }

    fn commit(&mut self) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.commit().map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.commit().map_err(Error::from),
        }
    }

    fn rollback(&mut self) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.rollback().map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.rollback().map_err(Error::from),
        }
    }

    fn create_index(&mut self, container: &str, field: &str) -> Result<(), Error> {
        match self {
            RowEngineHandle::Append(e) => e.create_index(container, field).map_err(Error::from),
            RowEngineHandle::Lsm(e) => e.create_index(container, field).map_err(Error::from),
        }
    }

    fn statistics(&self) -> BTreeMap<String, u64> {
        match self {
            RowEngineHandle::Append(e) => e.statistics(),
            RowEngineHandle::Lsm(e) => e.statistics(),
        }
    }
}

/// Per-table bookkeeping the adapter layer needs but the row engine
/// doesn't track: the declared column schema and the auto-increment
/// high-water mark.
struct TableMeta {
    schema: BTreeMap<String, String>,
    next_id: i64,
}

/// The database handle. Owns one row engine and, lazily, a columnar
/// store and a vector store — both are only materialized (and only
/// create their `<db-dir>/analytics` or `<db-dir>/vectors`
/// subdirectories) once the caller asks for an analytics table or a
/// vector index.
pub struct Database {
    dir: PathBuf,
    row_engine: RowEngineHandle,
    tables: BTreeMap<String, TableMeta>,
    collections: BTreeMap<String, ()>,
    columnar: Option<ColumnarStore>,
    vector: Option<VectorStore>,
}

impl Database {
    /// Open (or create) a database rooted at `dir`, using the given
    /// row-tier engine. The append engine stores its single file at
    /// `<dir>/data.phdb`; the LSM engine owns `<dir>/rows` as its data
    /// directory (WAL + SSTable runs live there).
    pub fn open(dir: impl AsRef<Path>, kind: RowEngineKind) -> Result<Database, Error> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let row_engine = match kind {
            RowEngineKind::Append => RowEngineHandle::Append(AppendEngine::open(dir.join("data.phdb"))?),
            RowEngineKind::Lsm => RowEngineHandle::Lsm(LsmEngine::open(dir.join("rows"))?),
        };

        tracing::info!(dir = %dir.display(), kind = ?kind, "opened database");

        Ok(Database {
            dir,
            row_engine,
            tables: BTreeMap::new(),
            collections: BTreeMap::new(),
            columnar: None,
            vector: None,
        })
    }

    /// No storage is buffered at the `Database` level: the append
    /// engine persists its META block on every `create_table`/
    /// `create_collection`, and the LSM engine's WAL is fsynced on
    /// every write, so there is nothing deferred for `close` to flush.
    /// Kept as an explicit call (rather than relying solely on `Drop`)
    /// to match the row engines' own `open`/`close` symmetry.
    pub fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Declare a schema-bearing table and register it with the row
    /// engine, returning an adapter handle borrowing this database.
    /// `schema` maps field name to type tag (`int`/`integer`,
    /// `float`/`double`, `string`/`object`, `bool`/`boolean`).
    pub fn create_table(&mut self, name: &str, schema: BTreeMap<String, String>) -> Result<Table<'_>, Error> {
        let container = Container {
            name: name.to_string(),
            kind: ContainerKind::Table,
            key_field: "id".to_string(),
        };
        self.row_engine.create_container(&container)?;
        self.tables.insert(name.to_string(), TableMeta { schema, next_id: 1 });
        Ok(Table::new(self, name.to_string()))
    }

    /// Borrow an already-created table by name.
    pub fn table(&mut self, name: &str) -> Result<Table<'_>, Error> {
        if !self.tables.contains_key(name) {
            return Err(Error::NotFound(format!("table '{name}'")));
        }
        Ok(Table::new(self, name.to_string()))
    }

    /// Declare a schemaless collection and register it with the row
    /// engine, returning an adapter handle borrowing this database.
    pub fn create_collection(&mut self, name: &str) -> Result<Collection<'_>, Error> {
        let container = Container {
            name: name.to_string(),
            kind: ContainerKind::Collection,
            key_field: "_id".to_string(),
        };
        self.row_engine.create_container(&container)?;
        self.collections.insert(name.to_string(), ());
        Ok(Collection::new(self, name.to_string()))
    }

    /// Borrow an already-created collection by name.
    pub fn collection(&mut self, name: &str) -> Result<Collection<'_>, Error> {
        if !self.collections.contains_key(name) {
            return Err(Error::NotFound(format!("collection '{name}'")));
        }
        Ok(Collection::new(self, name.to_string()))
    }

    /// Create an analytics (columnar) table, materializing the
    /// columnar store's `<db-dir>/analytics` directory on first call.
    pub fn create_analytics_table(&mut self, name: &str, schema: Vec<(String, String)>) -> Result<&mut ColumnarTable, Error> {
        if self.columnar.is_none() {
            self.columnar = Some(ColumnarStore::open(&self.dir)?);
        }
        let typed_schema: Vec<(String, ColumnType)> = schema.into_iter().map(|(name, tag)| (name, ColumnType::parse(&tag))).collect();
        Ok(self.columnar.as_mut().unwrap().create_table(name, typed_schema)?)
    }

    /// Borrow an already-created analytics table by name.
    pub fn analytics_table(&self, name: &str) -> Result<&ColumnarTable, Error> {
        let store = self.columnar.as_ref().ok_or_else(|| Error::NotFound(format!("analytics table '{name}'")))?;
        Ok(store.table_or_err(name)?)
    }

    /// Mutably borrow an already-created analytics table by name.
    pub fn analytics_table_mut(&mut self, name: &str) -> Result<&mut ColumnarTable, Error> {
        let store = self.columnar.as_mut().ok_or_else(|| Error::NotFound(format!("analytics table '{name}'")))?;
        Ok(store.table_mut_or_err(name)?)
    }

    /// Create a fixed-dimension vector index, materializing the vector
    /// store's `<db-dir>/vectors` directory on first call.
    pub fn create_vector_index(&mut self, name: &str, dimension: usize) -> Result<&mut VectorIndex, Error> {
        if self.vector.is_none() {
            self.vector = Some(VectorStore::open(&self.dir)?);
        }
        Ok(self.vector.as_mut().unwrap().create_index(name, dimension)?)
    }

    /// Borrow an already-created vector index by name.
    pub fn vector_index(&self, name: &str) -> Result<&VectorIndex, Error> {
        let store = self.vector.as_ref().ok_or_else(|| Error::NotFound(format!("vector index '{name}'")))?;
        Ok(store.index_or_err(name)?)
    }

    /// Mutably borrow an already-created vector index by name.
    pub fn vector_index_mut(&mut self, name: &str) -> Result<&mut VectorIndex, Error> {
        let store = self.vector.as_mut().ok_or_else(|| Error::NotFound(format!("vector index '{name}'")))?;
        Ok(store.index_mut_or_err(name)?)
    }

    /// Aggregate counters across every active tier: the row engine's
    /// own counters (cache hits/misses or run counts, depending on
    /// which engine is active), plus table/collection/analytics-table/
    /// vector-index counts for whichever tiers have been touched.
    pub fn statistics(&self) -> BTreeMap<String, u64> {
        let mut out = self.row_engine.statistics();
        out.insert("tables".to_string(), self.tables.len() as u64);
        out.insert("collections".to_string(), self.collections.len() as u64);
        if let Some(store) = &self.columnar {
            out.insert("analytics_tables".to_string(), store.table_count() as u64);
        }
        if let Some(store) = &self.vector {
            out.insert("vector_indexes".to_string(), store.index_count() as u64);
        }
        out
    }

    pub(crate) fn row_engine_mut(&mut self) -> &mut dyn RowEngine<Error = Error> {
        &mut self.row_engine
    }

    pub(crate) fn table_schema(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.tables.get(name).map(|meta| &meta.schema)
    }

    pub(crate) fn next_table_id(&mut self, name: &str) -> i64 {
        let meta = self.tables.get_mut(name).expect("table registered before use");
        let id = meta.next_id;
        meta.next_id += 1;
        id
    }

    pub(crate) fn observe_table_id(&mut self, name: &str, id: i64) {
        if let Some(meta) = self.tables.get_mut(name) {
            meta.next_id = meta.next_id.max(id + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;
    use tempfile::tempdir;

    fn schema() -> BTreeMap<String, String> {
        let mut s = BTreeMap::new();
        s.insert("name".to_string(), "string".to_string());
        s.insert("age".to_string(), "integer".to_string());
        s
    }

    #[test]
    fn open_create_table_and_insert_roundtrips() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), RowEngineKind::Append).unwrap();
        let mut table = db.create_table("users", schema()).unwrap();
        let mut rec = Record::new();
        rec.set("name", Value::Str("Alice".to_string()));
        rec.set("age", Value::Int(30));
        let id = table.insert(rec).unwrap();
        assert_eq!(id, Value::Int(1));
    }

    #[test]
    fn statistics_report_tier_counts() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), RowEngineKind::Lsm).unwrap();
        db.create_table("users", schema()).unwrap();
        db.create_collection("posts").unwrap();
        let stats = db.statistics();
        assert_eq!(stats.get("tables"), Some(&1));
        assert_eq!(stats.get("collections"), Some(&1));
        assert!(stats.get("analytics_tables").is_none());
    }

    #[test]
    fn analytics_and_vector_tiers_lazy_create() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), RowEngineKind::Lsm).unwrap();
        db.create_analytics_table("metrics", vec![("count".to_string(), "int".to_string())]).unwrap();
        db.create_vector_index("embeddings", 4).unwrap();
        let stats = db.statistics();
        assert_eq!(stats.get("analytics_tables"), Some(&1));
        assert_eq!(stats.get("vector_indexes"), Some(&1));
    }

    #[test]
    fn unknown_table_lookup_errors() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), RowEngineKind::Append).unwrap();
        assert!(matches!(db.table("ghost"), Err(Error::NotFound(_))));
    }
}
