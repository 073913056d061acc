//! Single-file owner for the append-only row engine.
//!
//! `FileManager` knows nothing about blocks or records — it exposes
//! exactly four primitives: create-with-header, append bytes (returning
//! the offset written at), read bytes at an offset, and query file size.
//! Block framing lives in [`crate::block`]; the B-tree, cache, and
//! container directory live above that in
//! [`crate::row::append_engine`].

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// `"PHDB"` + 4-byte format version, padded to [`HEADER_SIZE`] bytes.
pub const MAGIC: &[u8; 4] = b"PHDB";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: u64 = 16;

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic: expected {MAGIC:?}, found {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
}

/// Owns the single on-disk database file for the append-only engine.
pub struct FileManager {
    path: PathBuf,
    file: File,
}

impl FileManager {
    /// Create a new database file with a fresh header. Fails if the
    /// file already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<FileManager, FileManagerError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        header.resize(HEADER_SIZE as usize, 0);
        file.write_all(&header)?;
        file.sync_all()?;
        tracing::debug!(path = %path.display(), "created database file");
        Ok(FileManager { path, file })
    }

    /// Open an existing database file, validating its header.
    pub fn open(path: impl AsRef<Path>) -> Result<FileManager, FileManagerError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        if &magic != MAGIC {
            return Err(FileManagerError::BadMagic(magic));
        }
        let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(FileManagerError::UnsupportedVersion(version));
        }
        tracing::debug!(path = %path.display(), "opened database file");
        Ok(FileManager { path, file })
    }

    /// Append raw bytes at the end of the file, returning the absolute
    /// offset at which they were written.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64, FileManagerError> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()?;
        Ok(offset)
    }

    /// Write `bytes` at a fixed, already-allocated offset (used only for
    /// the META block, the one non-append write in the file).
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), FileManagerError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, FileManagerError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn size(&mut self) -> Result<u64, FileManagerError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
