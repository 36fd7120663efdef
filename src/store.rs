//! The vector index and its metadata table, kept as one matched pair.
//!
//! Both halves are written together: the metadata file records the SHA-256 of
//! the index file it was written with, and `load` refuses any pair whose row
//! counts, dimensions or checksum disagree.

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Number;
use crate::embedder::{EmbedError, Embedder};
use crate::error::{RagError, Result};
use crate::index::{FlatIndex, SearchHit};
use crate::metadata::MetadataEntry;

const METADATA_VERSION: u32 = 1;

#[derive(Deserialize, Serialize)]
struct MetadataFile {
    version: u32,
    rows: u64,
    dimension: u32,
    index_checksum: String,
    entries: Vec<MetadataEntry>,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    index: FlatIndex,
    metadata: Vec<MetadataEntry>,
}

impl IndexStore {
    /// Embeds every chunk and indexes it. Row `i` of the result corresponds to
    /// `chunks[i]`. Batches are embedded in parallel; order is preserved.
    pub fn build(
        embedder: &dyn Embedder,
        chunks: Vec<(String, MetadataEntry)>,
        batch_size: usize,
    ) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let (texts, metadata): (Vec<String>, Vec<MetadataEntry>) = chunks.into_iter().unzip();
        info!("Embedding {} text chunks", texts.len());

        let start = Instant::now();
        let batches = texts
            .par_chunks(batch_size)
            .map(|batch| embedder.encode(batch).map(|vectors| (batch.len(), vectors)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Embedded {} batches in {:?}", batches.len(), start.elapsed());

        let mut index: Option<FlatIndex> = None;
        let mut row = 0;
        for (expected, vectors) in batches {
            if vectors.len() != expected {
                return Err(RagError::EmbeddingCountMismatch {
                    expected,
                    actual: vectors.len(),
                });
            }

            for vector in vectors {
                if vector.is_empty() {
                    return Err(EmbedError::InvalidResponse(format!(
                        "empty embedding vector for row {}",
                        row
                    ))
                    .into());
                }
                let index = index
                    .get_or_insert_with(|| FlatIndex::with_capacity(vector.len(), texts.len()));
                if vector.len() != index.dimension() {
                    return Err(RagError::EmbeddingDimensionMismatch {
                        row,
                        expected: index.dimension(),
                        actual: vector.len(),
                    });
                }
                index.add(&vector)?;
                row += 1;
            }
        }

        let index = index.unwrap_or_else(|| FlatIndex::new(0));
        info!(
            "Built index with {} rows of dimension {}",
            index.len(),
            index.dimension()
        );

        Ok(Self { index, metadata })
    }

    pub fn from_parts(index: FlatIndex, metadata: Vec<MetadataEntry>) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(RagError::corrupt(
                "<memory>",
                format!(
                    "index has {} rows but metadata has {} rows",
                    index.len(),
                    metadata.len()
                ),
            ));
        }
        Ok(Self { index, metadata })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    pub fn entry(&self, row: usize) -> Option<&MetadataEntry> {
        self.metadata.get(row)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<SearchHit>> {
        self.index.search(query, k)
    }

    /// Writes both files through temporary siblings and renames them into
    /// place only after both were written and synced.
    ///
    /// Both paths must share a parent directory, so the two renames stay
    /// within one directory. Nothing is written when they do not.
    pub fn persist(&self, index_path: impl AsRef<Path>, metadata_path: impl AsRef<Path>) -> Result<()> {
        let index_path = index_path.as_ref();
        let metadata_path = metadata_path.as_ref();

        let parent = parent_dir(index_path);
        if parent != parent_dir(metadata_path) {
            return Err(RagError::persistence(
                metadata_path,
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "metadata file must live next to the index in {}",
                        parent.display()
                    ),
                ),
            ));
        }
        fs::create_dir_all(parent).map_err(|e| RagError::persistence(parent, e))?;

        let index_bytes = self.index.to_bytes();
        let metadata_file = MetadataFile {
            version: METADATA_VERSION,
            rows: self.metadata.len() as u64,
            dimension: self.index.dimension() as u32,
            index_checksum: checksum(&index_bytes),
            entries: self.metadata.clone(),
        };
        let metadata_bytes = bincode::serialize(&metadata_file).map_err(|e| {
            RagError::persistence(metadata_path, std::io::Error::new(ErrorKind::InvalidData, e))
        })?;

        let index_tmp = tmp_path(index_path);
        let metadata_tmp = tmp_path(metadata_path);

        let written = write_synced(&index_tmp, &index_bytes)
            .and_then(|_| write_synced(&metadata_tmp, &metadata_bytes))
            .and_then(|_| rename(&index_tmp, index_path))
            .and_then(|_| rename(&metadata_tmp, metadata_path));

        if let Err(e) = written {
            for tmp in [&index_tmp, &metadata_tmp] {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }

        info!(
            "Index saved to {} ({} rows), metadata saved to {}",
            index_path.display(),
            self.index.len(),
            metadata_path.display()
        );
        Ok(())
    }

    pub fn load(index_path: impl AsRef<Path>, metadata_path: impl AsRef<Path>) -> Result<Self> {
        let index_path = index_path.as_ref();
        let metadata_path = metadata_path.as_ref();

        for path in [index_path, metadata_path] {
            if !path.exists() {
                return Err(RagError::IndexNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let (index, index_checksum) = read_index(index_path)?;

        let metadata_bytes = fs::read(metadata_path).map_err(|source| RagError::Io {
            path: metadata_path.to_path_buf(),
            source,
        })?;
        let metadata_file: MetadataFile = bincode::deserialize(&metadata_bytes)
            .map_err(|e| RagError::corrupt(metadata_path, format!("undecodable metadata: {}", e)))?;

        if metadata_file.version != METADATA_VERSION {
            return Err(RagError::corrupt(
                metadata_path,
                format!("unsupported metadata version {}", metadata_file.version),
            ));
        }
        if metadata_file.rows as usize != metadata_file.entries.len() {
            return Err(RagError::corrupt(
                metadata_path,
                format!(
                    "metadata declares {} rows but holds {} entries",
                    metadata_file.rows,
                    metadata_file.entries.len()
                ),
            ));
        }
        if index.len() != metadata_file.entries.len() {
            return Err(RagError::corrupt(
                index_path,
                format!(
                    "index has {} rows but metadata has {} rows",
                    index.len(),
                    metadata_file.entries.len()
                ),
            ));
        }
        if metadata_file.dimension as usize != index.dimension() {
            return Err(RagError::corrupt(
                index_path,
                format!(
                    "index has dimension {} but metadata expects {}",
                    index.dimension(),
                    metadata_file.dimension
                ),
            ));
        }
        if metadata_file.index_checksum != index_checksum {
            warn!(
                "Checksum mismatch between {} and {}",
                index_path.display(),
                metadata_path.display()
            );
            return Err(RagError::corrupt(
                index_path,
                format!(
                    "index checksum {} does not match {} recorded in {}",
                    index_checksum,
                    metadata_file.index_checksum,
                    metadata_path.display()
                ),
            ));
        }

        info!(
            "Loaded index from {} ({} rows, dimension {})",
            index_path.display(),
            index.len(),
            index.dimension()
        );
        Ok(Self {
            index,
            metadata: metadata_file.entries,
        })
    }
}

fn read_index(path: &Path) -> Result<(FlatIndex, String)> {
    let io_err = |source| RagError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len == 0 {
        return Err(RagError::corrupt(path, "index file is empty"));
    }

    // Safety: the file is opened read-only and only read while the map lives.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_err)?;
    let index = FlatIndex::from_bytes(&mmap, path)?;
    Ok((index, checksum(&mmap)))
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| RagError::persistence(path, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| RagError::persistence(path, e))
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|e| RagError::persistence(to, e))
}
