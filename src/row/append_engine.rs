//! Block-framed append-only row engine.
//!
//! The database file never has bytes rewritten in place except an
//! 8-byte root pointer living inside the file header — every container
//! directory change, record insert, update, delete, and transaction
//! marker is a new block appended to the tail. Secondary indexes (one
//! [`BTreeIndex`] per container, keyed on that container's key field)
//! and the [`LRUCache`] are pure in-memory structures rebuilt by a
//! sequential scan of the file on open.
//!
//! # Transactions
//!
//! [`RowEngine::begin`]/[`RowEngine::commit`]/[`RowEngine::rollback`]
//! are intentionally lightweight: writes are applied immediately (as
//! new DATA blocks) whether or not a transaction is open, and
//! `begin`/`commit` only bracket a TLOG marker block recording which
//! keys the transaction touched. `rollback` discards that pending
//! marker but **cannot undo DATA blocks already appended** — an
//! append-only file has no in-place undo. Real crash-atomicity for
//! multi-key transactions would need a staging area that defers DATA
//! writes until commit; this engine does not implement one, and that
//! gap is the known limitation carried over from the design notes
//! rather than a bug introduced here.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::block::{self, BlockError, BlockType};
use crate::btree::BTreeIndex;
use crate::cache::LRUCache;
use crate::encoding::{Decode, Encode, EncodingError};
use crate::file_manager::{FileManager, FileManagerError, HEADER_SIZE};
use crate::row::{Container, ContainerKind, RowEngine};
use crate::value::{Record, Value};

/// Offset within the fixed file header where the 8-byte root pointer
/// (the byte offset of the most recent META block) lives. The header
/// is 16 bytes total (magic + version); this sits in its reserved tail.
const ROOT_PTR_OFFSET: u64 = 8;
const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum AppendError {
    #[error("file manager error: {0}")]
    File(#[from] FileManagerError),

    #[error("block error: {0}")]
    Block(#[from] BlockError),

    #[error("record codec error: {0}")]
    Codec(#[from] EncodingError),

    #[error("container '{0}' already exists")]
    ContainerExists(String),

    #[error("unknown container '{0}'")]
    UnknownContainer(String),
}

pub struct AppendEngine {
    file: FileManager,
    containers: HashMap<String, Container>,
    indexes: HashMap<String, BTreeIndex>,
    secondary_indexes: HashMap<String, HashMap<String, BTreeIndex>>,
    cache: LRUCache,
    in_transaction: bool,
    pending_tlog: Vec<(String, Value)>,
}

impl AppendEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<AppendEngine, AppendError> {
        let path = path.as_ref();
        let mut file = if path.exists() {
            FileManager::open(path)?
        } else {
            FileManager::create(path)?
        };

        let root_ptr_bytes = file.read_at(ROOT_PTR_OFFSET, 8)?;
        let meta_offset = u64::from_le_bytes(root_ptr_bytes.try_into().unwrap());

        let containers = if meta_offset == 0 {
            HashMap::new()
        } else {
            let (_, payload) = read_block(&mut file, meta_offset)?;
            decode_containers(&payload)?
        };

        let mut indexes: HashMap<String, BTreeIndex> =
            containers.keys().map(|name| (name.clone(), BTreeIndex::new())).collect();

        let mut pos = HEADER_SIZE;
        let size = file.size()?;
        while pos < size {
            let (block_type, payload) = read_block(&mut file, pos)?;
            let block_len = block::BLOCK_HEADER_SIZE as u64 + payload.len() as u64;
            if block_type == BlockType::Data {
                let (container, key, record) = decode_data_payload(&payload)?;
                if let Some(index) = indexes.get_mut(&container) {
                    match record {
                        Some(_) => index.insert(key, pos),
                        None => {
                            index.delete(&key);
                        }
                    }
                }
            }
            pos += block_len;
        }

        tracing::info!(
            path = %file.path().display(),
            containers = containers.len(),
            "opened append-only row engine"
        );

        Ok(AppendEngine {
            file,
            containers,
            indexes,
            secondary_indexes: HashMap::new(),
            cache: LRUCache::new(DEFAULT_CACHE_CAPACITY),
            in_transaction: false,
            pending_tlog: Vec::new(),
        })
    }

    /// Update every registered secondary index for `container` after a
    /// write lands at `offset`. Deletes leave stale entries in place —
    /// a secondary index is rebuilt from a fresh scan, not maintained
    /// exactly, so a stale pointer is simply skipped by callers that
    /// re-check the primary index before trusting a hit.
    fn index_secondary(&mut self, container: &str, record: &Record, offset: u64) {
        let Some(fields) = self.secondary_indexes.get_mut(container) else {
            return;
        };
        for (field, index) in fields.iter_mut() {
            if let Some(value) = record.get(field) {
                index.insert(value.clone(), offset);
            }
        }
    }

    fn write_meta(&mut self) -> Result<(), AppendError> {
        let payload = encode_containers(&self.containers)?;
        let framed = block::frame(BlockType::Meta, &payload);
        let offset = self.file.append(&framed)?;
        self.file.write_at(ROOT_PTR_OFFSET, &offset.to_le_bytes())?;
        Ok(())
    }

    fn append_record_block(&mut self, container: &str, key: &Value, record: Option<&Record>) -> Result<u64, AppendError> {
        let payload = encode_data_payload(container, key, record)?;
        let framed = block::frame(BlockType::Data, &payload);
        Ok(self.file.append(&framed)?)
    }

    fn read_record_at(&mut self, container: &str, offset: u64) -> Result<Record, AppendError> {
        if let Some(record) = self.cache.get(container, offset) {
            return Ok(record);
        }
        let (_, payload) = read_block(&mut self.file, offset)?;
        let (_, _, record) = decode_data_payload(&payload)?;
        let record = record.expect("index only points at live records");
        self.cache.put(container, offset, record.clone());
        Ok(record)
    }

    fn container_or_err(&self, name: &str) -> Result<(), AppendError> {
        if self.containers.contains_key(name) {
            Ok(())
        } else {
            Err(AppendError::UnknownContainer(name.to_string()))
        }
    }

    /// Cache hit/miss counters, exposed for engine statistics.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }
}

fn read_block(file: &mut FileManager, offset: u64) -> Result<(BlockType, Vec<u8>), AppendError> {
    let header_bytes = file.read_at(offset, block::BLOCK_HEADER_SIZE)?;
    let header = block::parse_header(&header_bytes)?;
    let total = block::BLOCK_HEADER_SIZE + header.payload_len as usize;
    let full = file.read_at(offset, total)?;
    let (block_type, payload) = block::parse(&full, None)?;
    Ok((block_type, payload))
}

fn encode_data_payload(container: &str, key: &Value, record: Option<&Record>) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    container.to_string().encode_to(&mut buf)?;
    key.encode_to(&mut buf)?;
    match record {
        Some(r) => {
            buf.push(1u8);
            let fields: Vec<(String, Value)> = r.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            crate::encoding::encode_vec(&fields, &mut buf)?;
        }
        None => buf.push(0u8),
    }
    Ok(buf)
}

fn decode_data_payload(buf: &[u8]) -> Result<(String, Value, Option<Record>), EncodingError> {
    let (container, n1) = String::decode_from(buf)?;
    let (key, n2) = Value::decode_from(&buf[n1..])?;
    let mut pos = n1 + n2;
    let tombstone_flag = buf[pos];
    pos += 1;
    if tombstone_flag == 1 {
        let (fields, _) = crate::encoding::decode_vec::<(String, Value)>(&buf[pos..])?;
        Ok((container, key, Some(Record::from_fields(fields))))
    } else {
        Ok((container, key, None))
    }
}

fn encode_containers(containers: &HashMap<String, Container>) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    (containers.len() as u32).encode_to(&mut buf)?;
    for c in containers.values() {
        c.name.clone().encode_to(&mut buf)?;
        let kind_tag: u8 = match c.kind {
            ContainerKind::Table => 0,
            ContainerKind::Collection => 1,
        };
        kind_tag.encode_to(&mut buf)?;
        c.key_field.clone().encode_to(&mut buf)?;
    }
    Ok(buf)
}

fn decode_containers(buf: &[u8]) -> Result<HashMap<String, Container>, EncodingError> {
    let (count, mut pos) = u32::decode_from(buf)?;
    let mut out = HashMap::new();
    for _ in 0..count {
        let (name, n1) = String::decode_from(&buf[pos..])?;
        pos += n1;
        let (kind_tag, n2) = u8::decode_from(&buf[pos..])?;
        pos += n2;
        let (key_field, n3) = String::decode_from(&buf[pos..])?;
        pos += n3;
        let kind = if kind_tag == 0 {
            ContainerKind::Table
        } else {
            ContainerKind::Collection
        };
        out.insert(
            name.clone(),
            Container {
                name,
                kind,
                key_field,
            },
        );
    }
    Ok(out)
}

impl RowEngine for AppendEngine {
    type Error = AppendError;

    fn create_container(&mut self, container: &Container) -> Result<(), AppendError> {
        if self.containers.contains_key(&container.name) {
            return Err(AppendError::ContainerExists(container.name.clone()));
        }
        self.containers.insert(container.name.clone(), container.clone());
        self.indexes.insert(container.name.clone(), BTreeIndex::new());
        self.secondary_indexes.insert(container.name.clone(), HashMap::new());
        self.write_meta()?;
        tracing::info!(container = %container.name, "created container");
        Ok(())
    }

    fn insert(&mut self, container: &str, key: Value, record: Record) -> Result<(), AppendError> {
        self.container_or_err(container)?;
        let offset = self.append_record_block(container, &key, Some(&record))?;
        self.indexes.get_mut(container).unwrap().insert(key.clone(), offset);
        self.index_secondary(container, &record, offset);
        self.cache.put(container, offset, record);
        if self.in_transaction {
            self.pending_tlog.push((container.to_string(), key));
        }
        Ok(())
    }

    fn read(&mut self, container: &str, key: &Value) -> Result<Option<Record>, AppendError> {
        self.container_or_err(container)?;
        let offset = self.indexes.get(container).unwrap().search(key);
        match offset {
            Some(offset) => Ok(Some(self.read_record_at(container, offset)?)),
            None => Ok(None),
        }
    }

    fn update(&mut self, container: &str, key: &Value, record: Record) -> Result<bool, AppendError> {
        self.container_or_err(container)?;
        if self.indexes.get(container).unwrap().search(key).is_none() {
            return Ok(false);
        }
        let offset = self.append_record_block(container, key, Some(&record))?;
        self.indexes.get_mut(container).unwrap().insert(key.clone(), offset);
        self.index_secondary(container, &record, offset);
        self.cache.put(container, offset, record);
        if self.in_transaction {
            self.pending_tlog.push((container.to_string(), key.clone()));
        }
        Ok(true)
    }

    fn delete(&mut self, container: &str, key: &Value) -> Result<bool, AppendError> {
        self.container_or_err(container)?;
        let Some(old_offset) = self.indexes.get(container).unwrap().search(key) else {
            return Ok(false);
        };
        self.append_record_block(container, key, None)?;
        self.indexes.get_mut(container).unwrap().delete(key);
        self.cache.invalidate(container, old_offset);
        if self.in_transaction {
            self.pending_tlog.push((container.to_string(), key.clone()));
        }
        Ok(true)
    }

    fn scan(&mut self, container: &str) -> Result<Vec<(Value, Record)>, AppendError> {
        self.container_or_err(container)?;
        let entries = self.indexes.get(container).unwrap().range_search(None, None);
        let mut out = Vec::with_capacity(entries.len());
        for (key, offset) in entries {
            let record = self.read_record_at(container, offset)?;
            out.push((key, record));
        }
        Ok(out)
    }

    fn begin(&mut self) -> Result<(), AppendError> {
        self.in_transaction = true;
        self.pending_tlog.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), AppendError> {
        if !self.pending_tlog.is_empty() {
            let mut payload = Vec::new();
            (self.pending_tlog.len() as u32).encode_to(&mut payload)?;
            for (container, key) in &self.pending_tlog {
                container.clone().encode_to(&mut payload)?;
                key.encode_to(&mut payload)?;
            }
            let framed = block::frame(BlockType::Tlog, &payload);
            self.file.append(&framed)?;
        }
        self.in_transaction = false;
        self.pending_tlog.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), AppendError> {
        // Deliberately does not undo the DATA blocks already appended
        // while the transaction was open — see module docs.
        self.in_transaction = false;
        self.pending_tlog.clear();
        Ok(())
    }

    fn create_index(&mut self, container: &str, field: &str) -> Result<(), AppendError> {
        self.container_or_err(container)?;
        let entries = self.indexes.get(container).unwrap().range_search(None, None);
        let mut built = BTreeIndex::new();
        for (_, offset) in &entries {
            let record = self.read_record_at(container, *offset)?;
            if let Some(value) = record.get(field) {
                built.insert(value.clone(), *offset);
            }
        }
        self.secondary_indexes
            .entry(container.to_string())
            .or_default()
            .insert(field.to_string(), built);
        tracing::info!(container, field, "built secondary index");
        Ok(())
    }

    fn statistics(&self) -> std::collections::BTreeMap<String, u64> {
        let (hits, misses) = self.cache.stats();
        let mut out = std::collections::BTreeMap::new();
        out.insert("containers".to_string(), self.containers.len() as u64);
        out.insert("cache_hits".to_string(), hits);
        out.insert("cache_misses".to_string(), misses);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table() -> Container {
        Container {
            name: "users".to_string(),
            kind: ContainerKind::Table,
            key_field: "id".to_string(),
        }
    }

    fn rec(id: i64, name: &str) -> Record {
        let mut r = Record::new();
        r.set("id", Value::Int(id));
        r.set("name", Value::Str(name.to_string()));
        r
    }

    #[test]
    fn insert_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        let got = engine.read("users", &Value::Int(1)).unwrap().unwrap();
        assert_eq!(got.get("name"), Some(&Value::Str("Alice".into())));
    }

    #[test]
    fn update_points_index_at_new_block() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        assert!(engine.update("users", &Value::Int(1), rec(1, "Alicia")).unwrap());
        let got = engine.read("users", &Value::Int(1)).unwrap().unwrap();
        assert_eq!(got.get("name"), Some(&Value::Str("Alicia".into())));
    }

    #[test]
    fn delete_then_read_returns_none() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        assert!(engine.delete("users", &Value::Int(1)).unwrap());
        assert_eq!(engine.read("users", &Value::Int(1)).unwrap(), None);
    }

    #[test]
    fn reopen_rebuilds_index_and_directory_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.phdb");
        {
            let mut engine = AppendEngine::open(&path).unwrap();
            engine.create_container(&table()).unwrap();
            engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
            engine.insert("users", Value::Int(2), rec(2, "Bob")).unwrap();
            engine.delete("users", &Value::Int(2)).unwrap();
        }
        let mut engine = AppendEngine::open(&path).unwrap();
        assert!(engine.read("users", &Value::Int(1)).unwrap().is_some());
        assert_eq!(engine.read("users", &Value::Int(2)).unwrap(), None);
    }

    #[test]
    fn rollback_does_not_undo_already_appended_data_blocks() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.begin().unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        engine.rollback().unwrap();
        // Documented limitation: the insert already landed on disk.
        assert!(engine.read("users", &Value::Int(1)).unwrap().is_some());
    }

    #[test]
    fn scan_returns_ascending_key_order() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        for (id, name) in [(3, "Carol"), (1, "Alice"), (2, "Bob")] {
            engine.insert("users", Value::Int(id), rec(id, name)).unwrap();
        }
        let rows = engine.scan("users").unwrap();
        let ids: Vec<i64> = rows
            .iter()
            .map(|(k, _)| match k {
                Value::Int(n) => *n,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn secondary_index_is_built_from_existing_rows() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        engine.insert("users", Value::Int(2), rec(2, "Bob")).unwrap();
        engine.create_index("users", "name").unwrap();
        assert!(engine.secondary_indexes.get("users").unwrap().contains_key("name"));

        // Rows inserted after create_index are indexed incrementally too.
        engine.insert("users", Value::Int(3), rec(3, "Carol")).unwrap();
        let offset = engine.secondary_indexes["users"]["name"]
            .search(&Value::Str("Carol".to_string()))
            .unwrap();
        assert!(offset > 0);
    }

    #[test]
    fn statistics_reports_container_and_cache_counts() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        engine.insert("users", Value::Int(1), rec(1, "Alice")).unwrap();
        engine.read("users", &Value::Int(1)).unwrap();
        let stats = engine.statistics();
        assert_eq!(stats["containers"], 1);
    }

    #[test]
    fn create_container_twice_errors() {
        let dir = tempdir().unwrap();
        let mut engine = AppendEngine::open(dir.path().join("db.phdb")).unwrap();
        engine.create_container(&table()).unwrap();
        assert!(matches!(
            engine.create_container(&table()),
            Err(AppendError::ContainerExists(_))
        ));
    }
}
