//! Write-ahead log for the LSM row engine.
//!
//! Every mutation is appended here before it touches the memtable, so a
//! crash between the two can be repaired by replaying the log on
//! reopen. Deliberately simplified relative to a production WAL: no LSN,
//! no group commit, no segment rotation — one file, fsync'd on every
//! append, truncated on flush.
//!
//! # Record format
//!
//! ```text
//! u32 keylen | u32 vallen | key bytes | value bytes
//! ```
//!
//! A tombstone (delete) is recorded with `vallen == u32::MAX` and no
//! value bytes, mirroring the memtable's null-sentinel tombstone.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const TOMBSTONE_MARKER: u32 = u32::MAX;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded WAL entry, as returned by [`Wal::recover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalEntry {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

pub struct Wal {
    path: PathBuf,
    file: File,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>) -> Result<Wal, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Wal { path, file })
    }

    pub fn append_put(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&(key.len() as u32).to_le_bytes())?;
        self.file.write_all(&(value.len() as u32).to_le_bytes())?;
        self.file.write_all(key)?;
        self.file.write_all(value)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn append_delete(&mut self, key: &[u8]) -> Result<(), WalError> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&(key.len() as u32).to_le_bytes())?;
        self.file.write_all(&TOMBSTONE_MARKER.to_le_bytes())?;
        self.file.write_all(key)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncate the log to empty — called right after a successful
    /// memtable flush, once its contents are durable in an SSTable run.
    pub fn clear(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Replay every complete record in the log. A truncated trailing
    /// record (the log file ends mid-write, e.g. after a crash) is
    /// discarded rather than treated as corruption.
    pub fn recover(&mut self) -> Result<Vec<WalEntry>, WalError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes)?;

        let mut entries = Vec::new();
        let mut pos = 0usize;
        loop {
            if pos + 8 > bytes.len() {
                break;
            }
            let keylen = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
            let vallen_raw = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().unwrap());
            let header_end = pos + 8;

            if vallen_raw == TOMBSTONE_MARKER {
                if header_end + keylen > bytes.len() {
                    break;
                }
                let key = bytes[header_end..header_end + keylen].to_vec();
                entries.push(WalEntry::Delete { key });
                pos = header_end + keylen;
            } else {
                let vallen = vallen_raw as usize;
                let total_end = header_end + keylen + vallen;
                if total_end > bytes.len() {
                    break;
                }
                let key = bytes[header_end..header_end + keylen].to_vec();
                let value = bytes[header_end + keylen..total_end].to_vec();
                entries.push(WalEntry::Put { key, value });
                pos = total_end;
            }
        }

        tracing::debug!(path = %self.path.display(), entries = entries.len(), "recovered WAL entries");
        Ok(entries)
    }
}
