use crate::checksum::Fnv1a;
use crate::error::{Result, VectorStoreError};
use crate::paths::IndexPaths;
use crate::types::{ChunkRecord, EmbeddedChunk, SearchHit};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const VECTORS_MAGIC: &[u8; 4] = b"RLVX";
const VECTORS_VERSION: u32 = 2;
const METADATA_SCHEMA_VERSION: u32 = 2;
// magic + version + dim + count + checksum
const VECTORS_HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8;

#[derive(Serialize, Deserialize)]
struct PersistedMetadata {
    schema_version: u32,
    embedding_dim: usize,
    #[serde(default)]
    model_id: Option<String>,
    /// Must equal the checksum in the `vectors.bin` header
    checksum: u64,
    chunks: Vec<ChunkRecord>,
}

struct VectorTable {
    dimension: usize,
    checksum: u64,
    vectors: Vec<f32>,
}

/// Exact inner-product index over unit-length vectors.
///
/// Vectors are stored row-major in insertion order; position `i` of the
/// vector table and of the metadata table always describe the same chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    model_id: Option<String>,
    vectors: Vec<f32>,
    records: Vec<ChunkRecord>,
}

impl VectorIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: None,
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Tag the index with the embedding model that produced its vectors
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    #[must_use]
    pub const fn embedding_dim(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Append chunks in order.
    ///
    /// The whole batch is checked before anything is stored, so a dimension
    /// mismatch leaves the index untouched.
    pub fn add(&mut self, items: Vec<EmbeddedChunk>) -> Result<()> {
        if let Some(bad) = items
            .iter()
            .find(|item| item.embedding.len() != self.dimension)
        {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.embedding.len(),
            });
        }

        self.vectors.reserve(items.len() * self.dimension);
        self.records.reserve(items.len());
        for item in items {
            self.vectors.extend_from_slice(&item.embedding);
            self.records.push(ChunkRecord::from(item.chunk));
        }
        Ok(())
    }

    /// Top `top_k` entries by inner product with `query`, highest first.
    ///
    /// Equal scores keep insertion order. Returns fewer than `top_k` hits when
    /// the index is smaller. `top_k == 0` or an empty index yields nothing
    /// without looking at the query, so the query dimension is only checked
    /// when there is something to score.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 || self.is_empty() {
            return Ok(vec![]);
        }
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let matrix = ArrayView2::from_shape((self.len(), self.dimension), &self.vectors)
            .map_err(|e| VectorStoreError::corrupt(format!("vector table shape: {e}")))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| compare_scores(scores[a], scores[b]));

        Ok(order
            .into_iter()
            .take(top_k)
            .map(|position| SearchHit {
                record: self.records[position].clone(),
                score: scores[position],
                position,
            })
            .collect())
    }

    /// Persist both artifacts.
    ///
    /// Each file is written to a temporary sibling first and renamed into
    /// place, so readers never observe a partially written file. Both files
    /// carry the same content checksum; `load` refuses a pair whose
    /// checksums differ, which is what a reader racing two saves would see.
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        for path in [&paths.vectors, &paths.metadata] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let vectors_tmp = tmp_path(&paths.vectors);
        let metadata_tmp = tmp_path(&paths.metadata);

        let checksum = self.content_checksum();
        let written = self
            .write_vectors(&vectors_tmp, checksum)
            .and_then(|()| self.write_metadata(&metadata_tmp, checksum))
            .and_then(|()| {
                fs::rename(&vectors_tmp, &paths.vectors)?;
                fs::rename(&metadata_tmp, &paths.metadata)?;
                Ok(())
            });

        if let Err(err) = written {
            let _ = fs::remove_file(&vectors_tmp);
            let _ = fs::remove_file(&metadata_tmp);
            return Err(err);
        }

        log::debug!(
            "Saved index with {} vectors (dim {}) to {}",
            self.len(),
            self.dimension,
            paths.vectors.display()
        );
        Ok(())
    }

    /// Load a previously saved index, requiring vectors of `expected_dim`
    pub fn load(paths: &IndexPaths, expected_dim: usize) -> Result<Self> {
        if let Some(missing) = paths.first_missing() {
            return Err(VectorStoreError::IndexNotFound {
                path: missing.to_path_buf(),
            });
        }

        let VectorTable {
            dimension,
            checksum,
            vectors,
        } = read_vectors(&paths.vectors)?;
        let metadata = read_metadata(&paths.metadata)?;

        if metadata.embedding_dim != dimension {
            return Err(VectorStoreError::corrupt(format!(
                "metadata dimension {} does not match vector table dimension {dimension}",
                metadata.embedding_dim
            )));
        }
        let count = if dimension == 0 {
            0
        } else {
            vectors.len() / dimension
        };
        if metadata.chunks.len() != count {
            return Err(VectorStoreError::corrupt(format!(
                "{} metadata records for {count} vectors",
                metadata.chunks.len()
            )));
        }
        if metadata.checksum != checksum {
            return Err(VectorStoreError::corrupt(format!(
                "{} and {} come from different saves (checksum {checksum:016x} vs {:016x})",
                paths.vectors.display(),
                paths.metadata.display(),
                metadata.checksum
            )));
        }

        let index = Self {
            dimension,
            model_id: metadata.model_id,
            vectors,
            records: metadata.chunks,
        };
        if index.content_checksum() != checksum {
            return Err(VectorStoreError::corrupt(format!(
                "content of {} does not match its checksum",
                paths.vectors.display()
            )));
        }
        if dimension != expected_dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: expected_dim,
                actual: dimension,
            });
        }

        log::debug!(
            "Loaded index with {count} vectors (dim {dimension}) from {}",
            paths.vectors.display()
        );

        Ok(index)
    }

    /// FNV-1a over the vector table and every record, in position order
    fn content_checksum(&self) -> u64 {
        let mut hasher = Fnv1a::default();
        hasher.write(&(self.dimension as u64).to_le_bytes());
        hasher.write(&(self.len() as u64).to_le_bytes());
        for value in &self.vectors {
            hasher.write(&value.to_le_bytes());
        }
        for record in &self.records {
            hasher.write(&(record.file_path.len() as u64).to_le_bytes());
            hasher.write(record.file_path.as_bytes());
            hasher.write(&(record.chunk_id as u64).to_le_bytes());
            hasher.write(&(record.content.len() as u64).to_le_bytes());
            hasher.write(record.content.as_bytes());
        }
        hasher.finish()
    }

    fn write_vectors(&self, path: &Path, checksum: u64) -> Result<()> {
        let dim = u32::try_from(self.dimension)
            .map_err(|_| VectorStoreError::corrupt("dimension does not fit in u32"))?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(VECTORS_MAGIC)?;
        writer.write_all(&VECTORS_VERSION.to_le_bytes())?;
        writer.write_all(&dim.to_le_bytes())?;
        writer.write_all(&(self.len() as u64).to_le_bytes())?;
        writer.write_all(&checksum.to_le_bytes())?;
        for value in &self.vectors {
            writer.write_all(&value.to_le_bytes())?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    fn write_metadata(&self, path: &Path, checksum: u64) -> Result<()> {
        let metadata = PersistedMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            embedding_dim: self.dimension,
            model_id: self.model_id.clone(),
            checksum,
            chunks: self.records.clone(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &metadata)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

/// Descending by score; non-finite scores sink to the end
fn compare_scores(a: f32, b: f32) -> Ordering {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => Ordering::Equal,
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn read_vectors(path: &Path) -> Result<VectorTable> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

    if bytes.len() < VECTORS_HEADER_LEN {
        return Err(VectorStoreError::corrupt(format!(
            "{} is truncated ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }
    if &bytes[0..4] != VECTORS_MAGIC {
        return Err(VectorStoreError::corrupt(format!(
            "{} is not a vector table",
            path.display()
        )));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != VECTORS_VERSION {
        return Err(VectorStoreError::corrupt(format!(
            "unsupported vector table version {version}"
        )));
    }
    let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let count = usize::try_from(read_u64_le(&bytes[12..20]))
        .map_err(|_| VectorStoreError::corrupt("vector count overflows usize"))?;
    let checksum = read_u64_le(&bytes[20..VECTORS_HEADER_LEN]);

    let body = &bytes[VECTORS_HEADER_LEN..];
    let expected_len = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| VectorStoreError::corrupt("vector table size overflows"))?;
    if body.len() != expected_len {
        return Err(VectorStoreError::corrupt(format!(
            "vector table holds {} bytes, header promises {expected_len}",
            body.len()
        )));
    }

    let vectors = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(VectorTable {
        dimension,
        checksum,
        vectors,
    })
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_metadata(path: &Path) -> Result<PersistedMetadata> {
    let bytes = fs::read(path)?;
    let metadata: PersistedMetadata = serde_json::from_slice(&bytes).map_err(|e| {
        VectorStoreError::corrupt(format!("unreadable metadata {}: {e}", path.display()))
    })?;
    if metadata.schema_version != METADATA_SCHEMA_VERSION {
        return Err(VectorStoreError::corrupt(format!(
            "unsupported metadata schema version {}",
            metadata.schema_version
        )));
    }
    Ok(metadata)
}
