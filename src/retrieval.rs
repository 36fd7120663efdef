use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{Number, Settings};
use crate::embedder::{self, Embedder};
use crate::error::{RagError, Result};
use crate::generator::Generator;
use crate::prompt::build_prompt;
use crate::store::IndexStore;

/// A ranked chunk together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub record_id: String,
    pub severity: String,
    pub published: String,
    pub source: String,
    pub distance: Number,
}

impl RetrievedChunk {
    pub fn source_line(&self) -> String {
        format!("{} ({}) - {}", self.record_id, self.severity, self.published)
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
    pub chunks: Vec<RetrievedChunk>,
}

pub struct Retriever {
    embedder: Box<dyn Embedder>,
    store: Option<Arc<IndexStore>>,
    max_tokens: usize,
    stop_sequences: Vec<String>,
}

impl Retriever {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        let defaults = Settings::default();
        Self {
            embedder,
            store: None,
            max_tokens: defaults.max_tokens,
            stop_sequences: defaults.stop_sequences,
        }
    }

    /// Builds the configured embedder. The index still has to be loaded.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = embedder::from_settings(settings)?;
        Ok(Self::new(embedder).with_generation(settings.max_tokens, settings.stop_sequences.clone()))
    }

    pub fn with_generation(mut self, max_tokens: usize, stop_sequences: Vec<String>) -> Self {
        self.max_tokens = max_tokens;
        self.stop_sequences = stop_sequences;
        self
    }

    pub fn with_store(mut self, store: impl Into<Arc<IndexStore>>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn load(&mut self, index_path: impl AsRef<Path>, metadata_path: impl AsRef<Path>) -> Result<()> {
        let store = IndexStore::load(index_path, metadata_path)?;
        self.store = Some(Arc::new(store));
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&Arc<IndexStore>> {
        self.store.as_ref()
    }

    /// Embeds `query`, searches the loaded index and resolves each hit to its
    /// provenance. Results are nearest first.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let store = self.store.as_ref().ok_or(RagError::RetrievalUnavailable)?;

        let start = Instant::now();
        let mut vectors = self.embedder.encode(&[query.to_string()])?;
        if vectors.len() != 1 {
            return Err(RagError::EmbeddingCountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        let query_vector = vectors.remove(0);

        let hits = store.search(&query_vector, k)?;
        debug!("Search returned {} hits in {:?}", hits.len(), start.elapsed());

        hits.into_iter()
            .map(|hit| {
                let entry = store.entry(hit.row).ok_or_else(|| {
                    RagError::corrupt(
                        "<memory>",
                        format!("row {} has no metadata entry", hit.row),
                    )
                })?;
                Ok(RetrievedChunk {
                    text: entry.chunk_text.clone(),
                    record_id: entry.record_id.clone(),
                    severity: entry.severity.clone(),
                    published: entry.published.clone(),
                    source: entry.source.clone(),
                    distance: hit.distance,
                })
            })
            .collect()
    }

    /// Retrieves context for `query`, assembles the prompt and asks `generator`.
    pub fn answer(&self, query: &str, k: usize, generator: &dyn Generator) -> Result<Answer> {
        let chunks = self.retrieve(query, k)?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let prompt = build_prompt(query, &texts);

        info!("Generating answer from {} chunks", chunks.len());
        let completion = generator.complete(&prompt, self.max_tokens, &self.stop_sequences)?;

        Ok(Answer {
            text: completion.trim().to_string(),
            sources: chunks.iter().map(RetrievedChunk::source_line).collect(),
            chunks,
        })
    }
}
