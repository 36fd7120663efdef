use tracing::info;

use crate::config::Settings;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::record::load_corpus;
use crate::store::IndexStore;
use crate::text::prepare_chunks;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub records: usize,
    pub rejected_lines: usize,
    pub chunks: usize,
    pub dimension: usize,
}

/// Corpus → normalized chunks → embeddings → persisted index pair.
pub fn build_from_corpus(settings: &Settings, embedder: &dyn Embedder) -> Result<BuildSummary> {
    info!("Loading corpus from {}", settings.corpus_path.display());
    let report = load_corpus(&settings.corpus_path)?;

    let chunks = prepare_chunks(&report.records, settings.chunk_size);
    let chunk_count = chunks.len();

    let store = IndexStore::build(embedder, chunks, settings.embed_batch_size)?;
    store.persist(&settings.index_path, &settings.metadata_path)?;

    Ok(BuildSummary {
        records: report.records.len(),
        rejected_lines: report.rejected.len(),
        chunks: chunk_count,
        dimension: store.dimension(),
    })
}
