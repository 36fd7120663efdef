//! Error types for ingestion, index persistence and retrieval.

use std::path::PathBuf;
use thiserror::Error;

use crate::embedder::EmbedError;
use crate::generator::GenerateError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    /// A corpus line could not be turned into a record.
    #[error("Malformed corpus line {line} in {path}: {reason}")]
    Ingestion {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The embedder returned vectors of inconsistent length while building.
    #[error("Embedding dimension mismatch at row {row}: expected {expected}D, got {actual}D")]
    EmbeddingDimensionMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The embedder returned a different number of vectors than it was given texts.
    #[error("Embedder returned {actual} vectors for {expected} texts")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    /// A query vector does not match the dimension of the index.
    #[error("Dimension mismatch: index holds {expected}D vectors, query has {actual}D")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index file not found: {path}")]
    IndexNotFound { path: PathBuf },

    #[error("Corrupt index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Retrieval unavailable: no index has been loaded or built")]
    RetrievalUnavailable,

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerateError),
}

impl RagError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Persistence {
            path: path.into(),
            source,
        }
    }
}
