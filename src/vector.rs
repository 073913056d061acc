//! Vector tier: a flat, brute-force cosine-similarity index over
//! fixed-dimension `f32` vectors.
//!
//! Grounded on the original `VectorIndex`/`VectorStorageEngine` pair:
//! two parallel arrays (`ids`, `vecs`), append-only, persisted as two
//! typed blobs per index under `<db-dir>/vectors/<index>/`. There is
//! no approximate index structure (no IVF, no HNSW) — every `search`
//! computes a dot product against every stored row, exactly as the
//! original's numpy implementation does.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::encoding::{Decode, Encode, EncodingError};

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob codec error: {0}")]
    Codec(#[from] EncodingError),

    #[error("vector has {got} components, index dimension is {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unknown vector index '{0}'")]
    UnknownIndex(String),

    #[error("vector index '{0}' already exists")]
    IndexExists(String),
}

/// A single `(id, score)` hit returned by [`VectorIndex::search`],
/// ordered by descending cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub score: f32,
}

/// Append-only flat vector index: `ids[i]` and `vecs[i]` describe the
/// same row. Dimension is fixed at creation; every `add` is validated
/// against it.
pub struct VectorIndex {
    name: String,
    dir: PathBuf,
    dimension: usize,
    ids: Vec<String>,
    vecs: Vec<f32>,
    next_auto_id: u64,
}

impl VectorIndex {
    fn create(name: &str, dir: PathBuf, dimension: usize) -> Result<VectorIndex, VectorError> {
        fs::create_dir_all(&dir)?;
        let (ids, vecs) = load_arrays(&dir)?;
        Ok(VectorIndex {
            name: name.to_string(),
            dir,
            dimension,
            next_auto_id: ids.len() as u64,
            ids,
            vecs,
        })
    }

    fn open(name: &str, dir: PathBuf) -> Result<Option<VectorIndex>, VectorError> {
        let meta_path = dir.join("dimension.blob");
        if !meta_path.exists() {
            return Ok(None);
        }
        let (dimension, _) = u32::decode_from(&fs::read(meta_path)?)?;
        Ok(Some(VectorIndex::create(name, dir, dimension as usize)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append a vector, generating an id if none is supplied. Rejects a
    /// vector whose length does not equal [`VectorIndex::dimension`].
    pub fn add(&mut self, vector: &[f32], id: Option<String>) -> Result<String, VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let id = id.unwrap_or_else(|| {
            let generated = format!("vec-{}", self.next_auto_id);
            self.next_auto_id += 1;
            generated
        });
        self.ids.push(id.clone());
        self.vecs.extend_from_slice(vector);
        self.save()?;
        Ok(id)
    }

    fn save(&self) -> Result<(), VectorError> {
        let mut ids_buf = Vec::new();
        crate::encoding::encode_vec(&self.ids, &mut ids_buf)?;
        fs::write(self.dir.join("ids.blob"), ids_buf)?;

        let mut vecs_buf = Vec::new();
        let bits: Vec<u32> = self.vecs.iter().map(|f| f.to_bits()).collect();
        crate::encoding::encode_vec(&bits, &mut vecs_buf)?;
        fs::write(self.dir.join("vectors.blob"), vecs_buf)?;

        fs::write(self.dir.join("dimension.blob"), (self.dimension as u32).to_le_bytes())?;
        Ok(())
    }

    fn row(&self, index: usize) -> &[f32] {
        &self.vecs[index * self.dimension..(index + 1) * self.dimension]
    }

    /// Cosine top-k search. A zero-length query vector returns an empty
    /// result (no direction to compare against). Rows with zero norm
    /// are treated as norm `1` to avoid division by zero, matching the
    /// original's `norms[norms == 0] = 1`. Ties are broken by ascending
    /// row index; the result is at most `min(k, len())` entries, sorted
    /// by descending score.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        let query_norm = l2_norm(query);
        if query_norm == 0.0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }
        let normalized_query: Vec<f32> = query.iter().map(|v| v / query_norm).collect();

        let mut scored: Vec<(usize, f32)> = (0..self.ids.len())
            .map(|i| {
                let row = self.row(i);
                let norm = l2_norm(row);
                let norm = if norm == 0.0 { 1.0 } else { norm };
                let score: f32 = row.iter().zip(&normalized_query).map(|(a, b)| (a / norm) * b).sum();
                (i, score)
            })
            .collect();

        scored.sort_by(|(ia, sa), (ib, sb)| sb.partial_cmp(sa).unwrap_or(std::cmp::Ordering::Equal).then(ia.cmp(ib)));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(i, score)| Hit { id: self.ids[i].clone(), score }).collect())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn load_arrays(dir: &Path) -> Result<(Vec<String>, Vec<f32>), VectorError> {
    let ids_path = dir.join("ids.blob");
    let vecs_path = dir.join("vectors.blob");
    if !ids_path.exists() || !vecs_path.exists() {
        return Ok((Vec::new(), Vec::new()));
    }
    let (ids, _) = crate::encoding::decode_vec::<String>(&fs::read(ids_path)?)?;
    let (bits, _) = crate::encoding::decode_vec::<u32>(&fs::read(vecs_path)?)?;
    let vecs = bits.into_iter().map(f32::from_bits).collect();
    Ok((ids, vecs))
}

/// Owns every vector index under `<db-dir>/vectors/`, mirroring the
/// original's `VectorStorageEngine` registry.
pub struct VectorStore {
    base_dir: PathBuf,
    indexes: std::collections::BTreeMap<String, VectorIndex>,
}

impl VectorStore {
    pub fn open(db_dir: impl AsRef<Path>) -> Result<VectorStore, VectorError> {
        let base_dir = db_dir.as_ref().join("vectors");
        fs::create_dir_all(&base_dir)?;
        let mut indexes = std::collections::BTreeMap::new();
        if let Ok(entries) = fs::read_dir(&base_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                if !entry.path().is_dir() {
                    continue;
                }
                let name = entry.file_name().into_string().unwrap_or_default();
                if let Some(index) = VectorIndex::open(&name, entry.path())? {
                    indexes.insert(name, index);
                }
            }
        }
        Ok(VectorStore { base_dir, indexes })
    }

    pub fn create_index(&mut self, name: &str, dimension: usize) -> Result<&mut VectorIndex, VectorError> {
        if self.indexes.contains_key(name) {
            return Err(VectorError::IndexExists(name.to_string()));
        }
        let index = VectorIndex::create(name, self.base_dir.join(name), dimension)?;
        self.indexes.insert(name.to_string(), index);
        Ok(self.indexes.get_mut(name).unwrap())
    }

    pub fn index(&self, name: &str) -> Option<&VectorIndex> {
        self.indexes.get(name)
    }

    pub fn index_mut(&mut self, name: &str) -> Option<&mut VectorIndex> {
        self.indexes.get_mut(name)
    }

    pub fn index_or_err(&self, name: &str) -> Result<&VectorIndex, VectorError> {
        self.indexes.get(name).ok_or_else(|| VectorError::UnknownIndex(name.to_string()))
    }

    pub fn index_mut_or_err(&mut self, name: &str) -> Result<&mut VectorIndex, VectorError> {
        self.indexes.get_mut(name).ok_or_else(|| VectorError::UnknownIndex(name.to_string()))
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(|s| s.as_str())
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }
}
