//! On-disk sorted run produced by flushing a full memtable.
//!
//! Deliberately not a sparse/Bloom-filter design: the run builds a
//! dense in-memory index (every key's byte offset) by scanning the file
//! once on open. That is the pragmatic MVP tradeoff this engine makes —
//! correct and simple at the data sizes an embedded store targets, with
//! sparse indexing left as a documented future evolution once run sizes
//! outgrow an in-memory index.
//!
//! # On-disk format
//!
//! Entries are stored in ascending key order, back to back:
//!
//! ```text
//! u32 keylen | key bytes | u32 vallen | value bytes
//! ```
//!
//! A tombstone is a `vallen == u32::MAX` marker with no value bytes,
//! matching the memtable's and WAL's sentinel.

use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const TOMBSTONE_MARKER: u32 = u32::MAX;

#[derive(Debug, Error)]
pub enum SSTableError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a run has recorded for a key: a live value, or an explicit
/// tombstone (so callers can distinguish "deleted here" from "never
/// written to this run").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Value(Vec<u8>),
    Tombstone,
}

/// One immutable sorted run on disk, with its key index loaded in
/// memory.
pub struct SSTableRun {
    path: PathBuf,
    file: File,
    /// key -> byte offset of its entry, built by a full scan on open.
    index: BTreeMap<String, u64>,
    tombstones: HashSet<String>,
    sequence: u64,
}

impl SSTableRun {
    /// Write a new run from an ascending-ordered iterator of entries.
    /// `sequence` orders runs newest-to-oldest for point lookups.
    pub fn create<'a>(
        path: impl AsRef<Path>,
        sequence: u64,
        entries: impl Iterator<Item = (&'a str, Option<&'a [u8]>)>,
    ) -> Result<SSTableRun, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut index = BTreeMap::new();
        let mut tombstones = HashSet::new();
        let mut offset = 0u64;

        for (key, value) in entries {
            let key_bytes = key.as_bytes();
            file.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
            file.write_all(key_bytes)?;
            match value {
                Some(v) => {
                    file.write_all(&(v.len() as u32).to_le_bytes())?;
                    file.write_all(v)?;
                }
                None => {
                    file.write_all(&TOMBSTONE_MARKER.to_le_bytes())?;
                    tombstones.insert(key.to_string());
                }
            }
            index.insert(key.to_string(), offset);
            offset = file.stream_position()?;
        }
        file.sync_all()?;

        tracing::debug!(path = %path.display(), entries = index.len(), "flushed SSTable run");
        Ok(SSTableRun {
            path,
            file,
            index,
            tombstones,
            sequence,
        })
    }

    /// Reopen an existing run, rebuilding its index by a sequential
    /// scan — the same cost as creation, paid once per process
    /// lifetime per run.
    pub fn open(path: impl AsRef<Path>, sequence: u64) -> Result<SSTableRun, SSTableError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut index = BTreeMap::new();
        let mut tombstones = HashSet::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let entry_start = pos as u64;
            let keylen = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            let key = String::from_utf8_lossy(&bytes[pos..pos + keylen]).into_owned();
            pos += keylen;
            let vallen_raw = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            pos += 4;
            if vallen_raw == TOMBSTONE_MARKER {
                tombstones.insert(key.clone());
            } else {
                pos += vallen_raw as usize;
            }
            index.insert(key, entry_start);
        }

        Ok(SSTableRun {
            path,
            file,
            index,
            tombstones,
            sequence,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Binary-search-equivalent point lookup via the in-memory index —
    /// one seek plus one read, no scanning.
    pub fn get(&mut self, key: &str) -> Result<Option<Lookup>, SSTableError> {
        let Some(&offset) = self.index.get(key) else {
            return Ok(None);
        };
        if self.tombstones.contains(key) {
            return Ok(Some(Lookup::Tombstone));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut keylen_buf = [0u8; 4];
        self.file.read_exact(&mut keylen_buf)?;
        let keylen = u32::from_le_bytes(keylen_buf) as usize;
        self.file.seek(SeekFrom::Current(keylen as i64))?;
        let mut vallen_buf = [0u8; 4];
        self.file.read_exact(&mut vallen_buf)?;
        let vallen = u32::from_le_bytes(vallen_buf) as usize;
        let mut value = vec![0u8; vallen];
        self.file.read_exact(&mut value)?;
        Ok(Some(Lookup::Value(value)))
    }

    /// All keys with the given prefix, in ascending order, resolved to
    /// their current `Lookup` (value or tombstone) in this run.
    pub fn scan_prefix(&mut self, prefix: &str) -> Result<Vec<(String, Lookup)>, SSTableError> {
        let keys: Vec<String> = self
            .index
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(lookup) = self.get(&key)? {
                out.push((key, lookup));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_get_roundtrips_values_and_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-0.sst");
        let entries = vec![
            ("t:1", Some(b"alice".as_slice())),
            ("t:2", None),
            ("t:3", Some(b"carol".as_slice())),
        ];
        let mut run = SSTableRun::create(&path, 0, entries.into_iter()).unwrap();

        assert_eq!(run.get("t:1").unwrap(), Some(Lookup::Value(b"alice".to_vec())));
        assert_eq!(run.get("t:2").unwrap(), Some(Lookup::Tombstone));
        assert_eq!(run.get("t:3").unwrap(), Some(Lookup::Value(b"carol".to_vec())));
        assert_eq!(run.get("t:4").unwrap(), None);
    }

    #[test]
    fn reopen_rebuilds_index_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-0.sst");
        {
            let entries = vec![("a:1", Some(b"x".as_slice())), ("a:2", Some(b"y".as_slice()))];
            SSTableRun::create(&path, 5, entries.into_iter()).unwrap();
        }
        let mut reopened = SSTableRun::open(&path, 5).unwrap();
        assert_eq!(reopened.sequence(), 5);
        assert_eq!(reopened.get("a:1").unwrap(), Some(Lookup::Value(b"x".to_vec())));
        assert_eq!(reopened.get("a:2").unwrap(), Some(Lookup::Value(b"y".to_vec())));
    }

    #[test]
    fn scan_prefix_isolates_one_container_in_ascending_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run-0.sst");
        let entries = vec![
            ("orders:1", Some(b"a".as_slice())),
            ("orders:2", Some(b"b".as_slice())),
            ("users:1", Some(b"c".as_slice())),
        ];
        let mut run = SSTableRun::create(&path, 0, entries.into_iter()).unwrap();
        let scanned = run.scan_prefix("orders:").unwrap();
        let keys: Vec<&str> = scanned.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["orders:1", "orders:2"]);
    }
}
