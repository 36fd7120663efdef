use serde::{Deserialize, Serialize};

use crate::record::VulnerabilityRecord;

/// Provenance for one indexed chunk. Entry `i` of a metadata table
/// describes row `i` of the vector index it was built with.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub record_id: String,
    pub severity: String,
    pub published: String,
    pub source: String,
    pub chunk_text: String,
}

impl MetadataEntry {
    pub fn for_chunk(record: &VulnerabilityRecord, chunk_text: &str) -> Self {
        Self {
            record_id: record.id.clone(),
            severity: record.severity.clone(),
            published: record.published.clone(),
            source: record.source.clone(),
            chunk_text: chunk_text.to_string(),
        }
    }
}
