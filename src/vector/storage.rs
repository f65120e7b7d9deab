//! On-disk snapshots of a [`VectorIndex`].
//!
//! # Storage Format
//!
//! An index directory holds three files:
//! - `vectors.bin`: header (20 bytes: magic, version, dimension, row count)
//!   followed by the row-major matrix as little-endian f32 values
//! - `ids.bin`: header (16 bytes: magic, version, count) followed by the
//!   product ids as little-endian u64 values, aligned 1:1 with matrix rows
//! - `metadata.json`: dimension, count and SHA-256 checksums of both blobs
//!
//! Every file is written to a temporary file in the same directory, synced,
//! and renamed into place. `metadata.json` is renamed last and acts as the
//! commit record: a crash between renames leaves blobs whose checksums do not
//! match it, which `load` reports as `CorruptIndex`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::vector::index::VectorIndex;
use crate::vector::types::{ProductId, VectorDimension, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Magic bytes of the embedding matrix file.
const VECTORS_MAGIC: &[u8; 4] = b"SMVX";

/// Magic bytes of the product id file.
const IDS_MAGIC: &[u8; 4] = b"SMID";

/// Size of the matrix header in bytes.
const VECTORS_HEADER_SIZE: usize = 20;

/// Size of the id list header in bytes.
const IDS_HEADER_SIZE: usize = 16;

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per product id (u64).
const BYTES_PER_ID: usize = 8;

const VECTORS_FILE: &str = "vectors.bin";
const IDS_FILE: &str = "ids.bin";
const METADATA_FILE: &str = "metadata.json";

/// Embedding model recorded when none is configured.
pub const DEFAULT_MODEL_NAME: &str = "ClipVitB32";

/// Metadata written alongside the index blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of the storage format
    pub version: u32,

    /// Name of the embedding model that produced the vectors
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of indexed products
    pub count: usize,

    /// SHA-256 of `vectors.bin`
    pub vectors_sha256: String,

    /// SHA-256 of `ids.bin`
    pub ids_sha256: String,

    /// Unix timestamp when the index was first saved
    pub created_at: u64,

    /// Unix timestamp of the latest save
    pub updated_at: u64,
}

impl IndexMetadata {
    /// Load metadata from an index directory.
    pub fn load(base_path: &Path) -> Result<Self, VectorError> {
        let json = std::fs::read_to_string(base_path.join(METADATA_FILE))?;
        serde_json::from_str(&json)
            .map_err(|e| VectorError::Serialization(format!("Failed to parse metadata: {e}")))
    }
}

/// Reads and writes index snapshots in a directory.
#[derive(Debug, Clone)]
pub struct IndexStorage {
    base_path: PathBuf,
    model_name: String,
}

impl IndexStorage {
    /// Creates storage rooted at `base_path`. Nothing is touched on disk.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
        }
    }

    /// Records `model_name` in saved metadata.
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Directory holding the snapshot.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Checks whether a committed snapshot exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.base_path.join(METADATA_FILE).exists()
    }

    /// Reads the metadata of the committed snapshot.
    pub fn metadata(&self) -> Result<IndexMetadata, VectorError> {
        IndexMetadata::load(&self.base_path)
    }

    /// Combined size of the snapshot files in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        let mut total = 0;
        for name in [VECTORS_FILE, IDS_FILE, METADATA_FILE] {
            total += std::fs::metadata(self.base_path.join(name))?.len();
        }
        Ok(total)
    }

    /// Durably writes `index` as the current snapshot.
    ///
    /// All files are staged before any is renamed, so a failed write leaves
    /// the previous snapshot in place.
    pub fn save(&self, index: &VectorIndex) -> Result<(), VectorError> {
        std::fs::create_dir_all(&self.base_path)?;

        let (staged_vectors, vectors_sha256) = self.stage(|w| write_vectors(w, index))?;
        let (staged_ids, ids_sha256) = self.stage(|w| write_ids(w, index))?;

        let now = get_utc_timestamp();
        let created_at = match IndexMetadata::load(&self.base_path) {
            Ok(previous) => previous.created_at,
            Err(_) => now,
        };
        let metadata = IndexMetadata {
            version: STORAGE_VERSION,
            model_name: self.model_name.clone(),
            dimension: index.dimension().get(),
            count: index.len(),
            vectors_sha256,
            ids_sha256,
            created_at,
            updated_at: now,
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| VectorError::Serialization(format!("Failed to serialize metadata: {e}")))?;
        let (staged_metadata, _) = self.stage(|w| w.write_all(&json))?;

        self.commit(staged_vectors, VECTORS_FILE)?;
        self.commit(staged_ids, IDS_FILE)?;
        self.commit(staged_metadata, METADATA_FILE)?;
        self.sync_dir()?;

        info!(
            "Saved vector index with {} products to {}",
            index.len(),
            self.base_path.display()
        );
        Ok(())
    }

    /// Reads the committed snapshot.
    ///
    /// # Errors
    /// - `Storage` if a file is missing or unreadable
    /// - `VersionMismatch` if the snapshot was written by another format version
    /// - `CorruptIndex` on any structural or checksum disagreement
    pub fn load(&self) -> Result<VectorIndex, VectorError> {
        let metadata = IndexMetadata::load(&self.base_path)?;
        if metadata.version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: metadata.version,
            });
        }
        if metadata.model_name != self.model_name {
            warn!(
                "Index was built with model '{}' but '{}' is configured",
                metadata.model_name, self.model_name
            );
        }

        let vectors = map_file(&self.base_path.join(VECTORS_FILE))?;
        let ids = map_file(&self.base_path.join(IDS_FILE))?;

        let (dimension, rows) = read_vectors_header(&vectors)?;
        let count = read_ids_header(&ids)?;

        if sha256_hex(&vectors) != metadata.vectors_sha256 {
            return Err(VectorError::corrupt(
                "vectors.bin checksum does not match metadata",
            ));
        }
        if sha256_hex(&ids) != metadata.ids_sha256 {
            return Err(VectorError::corrupt(
                "ids.bin checksum does not match metadata",
            ));
        }
        if dimension.get() != metadata.dimension {
            return Err(VectorError::corrupt(format!(
                "matrix width {} disagrees with stored dimension {}",
                dimension, metadata.dimension
            )));
        }
        if count != rows {
            return Err(VectorError::corrupt(format!(
                "id list holds {count} entries but matrix has {rows} rows"
            )));
        }
        if rows != metadata.count {
            return Err(VectorError::corrupt(format!(
                "matrix has {rows} rows but metadata records {}",
                metadata.count
            )));
        }

        let expected_vectors = rows
            .checked_mul(dimension.get())
            .and_then(|n| n.checked_mul(BYTES_PER_F32))
            .and_then(|n| n.checked_add(VECTORS_HEADER_SIZE))
            .ok_or_else(|| VectorError::corrupt("matrix size overflows"))?;
        if vectors.len() != expected_vectors {
            return Err(VectorError::corrupt(format!(
                "vectors.bin is {} bytes, expected {expected_vectors}",
                vectors.len()
            )));
        }
        if ids.len() != IDS_HEADER_SIZE + count * BYTES_PER_ID {
            return Err(VectorError::corrupt(format!(
                "ids.bin is {} bytes, expected {}",
                ids.len(),
                IDS_HEADER_SIZE + count * BYTES_PER_ID
            )));
        }

        let data: Vec<f32> = vectors[VECTORS_HEADER_SIZE..]
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let product_ids: Vec<ProductId> = ids[IDS_HEADER_SIZE..]
            .chunks_exact(BYTES_PER_ID)
            .map(|b| {
                let mut bytes = [0u8; BYTES_PER_ID];
                bytes.copy_from_slice(b);
                ProductId::from_bytes(bytes)
            })
            .collect();

        debug!(
            "Loaded {} rows of dimension {} from {}",
            rows,
            dimension,
            self.base_path.display()
        );
        VectorIndex::from_parts(dimension, product_ids, data)
    }

    /// Loads the snapshot, or returns a fresh empty index on any failure.
    ///
    /// A snapshot with a different dimension than `dimension` is also
    /// discarded.
    pub fn load_or_empty(&self, dimension: VectorDimension) -> VectorIndex {
        if !self.exists() {
            info!(
                "No vector index at {}, created new empty index",
                self.base_path.display()
            );
            return VectorIndex::new(dimension);
        }

        match self.load() {
            Ok(index) if index.dimension() == dimension => {
                info!("Loaded vector index with {} products", index.len());
                index
            }
            Ok(index) => {
                warn!(
                    "Stored index has dimension {} but {} is configured, starting empty",
                    index.dimension(),
                    dimension
                );
                VectorIndex::new(dimension)
            }
            Err(e) => {
                warn!("Error loading vector index, starting empty: {e}");
                VectorIndex::new(dimension)
            }
        }
    }

    fn stage<F>(&self, write: F) -> Result<(NamedTempFile, String), VectorError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let mut staged = NamedTempFile::new_in(&self.base_path)?;
        let digest = {
            let mut writer = HashingWriter::new(BufWriter::new(staged.as_file_mut()));
            write(&mut writer)?;
            writer.flush()?;
            writer.finish()
        };
        staged.as_file().sync_all()?;
        Ok((staged, digest))
    }

    /// Flushes the directory entries so the renames survive a power loss.
    #[cfg(unix)]
    fn sync_dir(&self) -> Result<(), VectorError> {
        File::open(&self.base_path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<(), VectorError> {
        Ok(())
    }

    fn commit(&self, staged: NamedTempFile, name: &str) -> Result<(), VectorError> {
        staged
            .persist(self.base_path.join(name))
            .map_err(|e| VectorError::Storage(e.error))?;
        Ok(())
    }
}

/// Forwards writes and hashes everything that passes through.
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_vectors(w: &mut dyn Write, index: &VectorIndex) -> io::Result<()> {
    w.write_all(VECTORS_MAGIC)?;
    w.write_all(&STORAGE_VERSION.to_le_bytes())?;
    w.write_all(&(index.dimension().get() as u32).to_le_bytes())?;
    w.write_all(&(index.len() as u64).to_le_bytes())?;
    for value in index.as_matrix() {
        w.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

fn write_ids(w: &mut dyn Write, index: &VectorIndex) -> io::Result<()> {
    w.write_all(IDS_MAGIC)?;
    w.write_all(&STORAGE_VERSION.to_le_bytes())?;
    w.write_all(&(index.len() as u64).to_le_bytes())?;
    for id in index.ids() {
        w.write_all(&id.to_bytes())?;
    }
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap, VectorError> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Err(VectorError::corrupt(format!(
            "{} is empty",
            path.display()
        )));
    }
    // The snapshot files are only replaced by rename, never modified in place.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn check_version(bytes: &[u8]) -> Result<(), VectorError> {
    let version = read_u32(bytes, 4);
    if version != STORAGE_VERSION {
        return Err(VectorError::VersionMismatch {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }
    Ok(())
}

fn read_vectors_header(bytes: &[u8]) -> Result<(VectorDimension, usize), VectorError> {
    if bytes.len() < VECTORS_HEADER_SIZE {
        return Err(VectorError::corrupt(
            "vectors.bin is too small to contain a header",
        ));
    }
    if &bytes[0..4] != VECTORS_MAGIC {
        return Err(VectorError::corrupt("vectors.bin has invalid magic bytes"));
    }
    check_version(bytes)?;

    let dimension = VectorDimension::new(read_u32(bytes, 8) as usize)
        .map_err(|_| VectorError::corrupt("vectors.bin records a zero dimension"))?;
    let rows = usize::try_from(read_u64(bytes, 12))
        .map_err(|_| VectorError::corrupt("row count does not fit in memory"))?;
    Ok((dimension, rows))
}

fn read_ids_header(bytes: &[u8]) -> Result<usize, VectorError> {
    if bytes.len() < IDS_HEADER_SIZE {
        return Err(VectorError::corrupt(
            "ids.bin is too small to contain a header",
        ));
    }
    if &bytes[0..4] != IDS_MAGIC {
        return Err(VectorError::corrupt("ids.bin has invalid magic bytes"));
    }
    check_version(bytes)?;

    usize::try_from(read_u64(bytes, 8))
        .map_err(|_| VectorError::corrupt("id count does not fit in memory"))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn get_utc_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
