//! Retrieval over vulnerability reports: chunk, embed, index, search, and
//! assemble prompts for a downstream language model.

pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod prompt;
pub mod record;
pub mod retrieval;
pub mod store;
pub mod text;
pub mod vector_ops;

pub use config::Settings;
pub use embedder::{Embedder, HashEmbedder, HttpEmbedder};
pub use error::{RagError, Result};
pub use generator::{Generator, HttpGenerator};
pub use index::{FlatIndex, SearchHit};
pub use metadata::MetadataEntry;
pub use record::VulnerabilityRecord;
pub use retrieval::{Answer, RetrievedChunk, Retriever};
pub use store::IndexStore;
