//! Crate-wide error type.
//!
//! Each subsystem defines its own `thiserror`-derived error enum
//! (`block::BlockError`, `btree` has none — key ordering failures are
//! absorbed silently per spec — `row::append_engine::AppendError`,
//! `row::lsm_engine::LsmError`, `columnar::ColumnarError`,
//! `vector::VectorError`, `sharding::ShardingError`). This module
//! composes them into one [`Error`] at the crate boundary, the way the
//! teacher composes `EngineError` from `ManifestError`/`MemtableError`/
//! `SSTableError`.

use thiserror::Error;

use crate::columnar::ColumnarError;
use crate::row::append_engine::AppendError;
use crate::row::lsm_engine::LsmError;
use crate::sharding::ShardingError;
use crate::vector::VectorError;

/// Top-level error type returned by [`crate::database::Database`] and the
/// [`crate::adapters`] façades.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the block-framed append-only row engine.
    #[error("append engine error: {0}")]
    Append(#[from] AppendError),

    /// Error from the log-structured merge row engine.
    #[error("LSM engine error: {0}")]
    Lsm(#[from] LsmError),

    /// Error from the columnar tier.
    #[error("columnar error: {0}")]
    Columnar(#[from] ColumnarError),

    /// Error from the vector tier.
    #[error("vector error: {0}")]
    Vector(#[from] VectorError),

    /// Error from the sharding front.
    #[error("sharding error: {0}")]
    Sharding(#[from] ShardingError),

    /// A record failed schema validation at the adapter boundary.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A requested record, container, or index was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested operation is not supported by the active engine.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Underlying filesystem I/O error not already wrapped by a subsystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
