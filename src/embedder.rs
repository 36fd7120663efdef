//! Text → vector collaborators.
//!
//! The index only depends on the [`Embedder`] trait, so the model can be an
//! in-process hasher, a remote embeddings service, or a fixed table in tests.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{EmbeddingBackend, Number, Settings};
use crate::vector_ops::normalize_vector;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("HTTP request to embedding service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Maps a batch of texts to one vector per text, in input order.
pub trait Embedder: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError>;
}

pub fn from_settings(settings: &Settings) -> Result<Box<dyn Embedder>, EmbedError> {
    match settings.embedding_backend {
        EmbeddingBackend::Hash => Ok(Box::new(HashEmbedder::new(settings.embedding_dimension))),
        EmbeddingBackend::Http => Ok(Box::new(HttpEmbedder::new(
            &settings.embedding_url,
            &settings.embedding_model,
            Duration::from_secs(settings.request_timeout_secs),
        )?)),
    }
}

/// Feature-hashing embedder: each lower-cased word adds ±1 to a bucket chosen
/// by its SHA-256 digest, and the result is L2-normalized. Texts that share
/// words land close together.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> Vec<Number> {
        let mut vector = vec![0.0; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_vector(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<Number>,
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model_name: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model_name: &str, timeout: Duration) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Embedding client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Embedder for HttpEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<Number>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model_name,
            input: texts,
        };

        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/v1/embeddings", self.endpoint))
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;

        debug!("Embedding service returned {} vectors", response.data.len());
        order_by_index(response.data, texts.len())
    }
}

fn order_by_index(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<Number>>, EmbedError> {
    if data.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    let mut slots: Vec<Option<Vec<Number>>> = vec![None; expected];
    for item in data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            EmbedError::InvalidResponse(format!("embedding index {} out of range", item.index))
        })?;
        if slot.is_some() {
            return Err(EmbedError::InvalidResponse(format!(
                "duplicate embedding index {}",
                item.index
            )));
        }
        *slot = Some(item.embedding);
    }

    // Every slot is filled: counts match and no index repeats.
    Ok(slots.into_iter().flatten().collect())
}
