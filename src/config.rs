use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub type Number = f32;

pub const EPSILON: f32 = 1e-6;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_TOP_K: usize = 5;

/// Raw options as found in `cverag_config.*` or `CVERAG_*` variables.
/// Anything missing falls back to the matching field of `Settings::default()`.
#[derive(Deserialize, Default)]
pub struct RagConfig {
    pub corpus_path: Option<String>,
    pub index_path: Option<String>,
    pub metadata_path: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_backend: Option<String>,
    pub embedding_dimension: Option<usize>,
    pub embedding_url: Option<String>,
    pub embed_batch_size: Option<usize>,
    pub chunk_size: Option<usize>,
    pub top_k: Option<usize>,
    pub generator_url: Option<String>,
    pub generator_model: Option<String>,
    pub max_tokens: Option<usize>,
    pub stop_sequences: Option<Vec<String>>,
    pub request_timeout_secs: Option<u64>,
}

impl RagConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(RagConfig {
            corpus_path: config.get("corpus_path").ok(),
            index_path: config.get("index_path").ok(),
            metadata_path: config.get("metadata_path").ok(),
            embedding_model: config.get("embedding_model").ok(),
            embedding_backend: config.get("embedding_backend").ok(),
            embedding_dimension: config.get("embedding_dimension").ok(),
            embedding_url: config.get("embedding_url").ok(),
            embed_batch_size: config.get("embed_batch_size").ok(),
            chunk_size: config.get("chunk_size").ok(),
            top_k: config.get("top_k").ok(),
            generator_url: config.get("generator_url").ok(),
            generator_model: config.get("generator_model").ok(),
            max_tokens: config.get("max_tokens").ok(),
            stop_sequences: config.get("stop_sequences").ok(),
            request_timeout_secs: config.get("request_timeout_secs").ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// In-process hashing embedder, no model server required.
    Hash,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    Http,
}

impl EmbeddingBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "http" => Ok(Self::Http),
            other => anyhow::bail!("Unknown embedding backend: {}", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Http => "http",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub corpus_path: PathBuf,
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub embedding_model: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_dimension: usize,
    pub embedding_url: String,
    pub embed_batch_size: usize,
    pub chunk_size: usize,
    pub top_k: usize,
    pub generator_url: String,
    pub generator_model: String,
    pub max_tokens: usize,
    pub stop_sequences: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/cve/cve_data.jsonl"),
            index_path: PathBuf::from("index/cve.index"),
            metadata_path: PathBuf::from("index/cve_metadata.bin"),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_backend: EmbeddingBackend::Hash,
            embedding_dimension: 384,
            embedding_url: "http://localhost:8080".to_string(),
            embed_batch_size: 64,
            chunk_size: DEFAULT_CHUNK_SIZE,
            top_k: DEFAULT_TOP_K,
            generator_url: "http://localhost:8081".to_string(),
            generator_model: "mistral-7b-instruct-v0.1".to_string(),
            max_tokens: 300,
            stop_sequences: vec![
                "\n".to_string(),
                "Question:".to_string(),
                "Context:".to_string(),
            ],
            request_timeout_secs: 120,
        }
    }
}

impl Settings {
    /// Reads `cverag_config.{toml,json,yaml}` (optional) and `CVERAG_*` variables.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("cverag_config").required(false))
            .add_source(Environment::with_prefix("CVERAG"))
            .build()
            .context("Failed to read configuration")?;

        let rag_config = RagConfig::try_from(&config)?;
        Self::from_rag_config(rag_config)
    }

    pub fn from_rag_config(rag_config: RagConfig) -> Result<Self> {
        let defaults = Settings::default();

        let embedding_backend = match rag_config.embedding_backend {
            Some(value) => EmbeddingBackend::parse(&value)?,
            None => defaults.embedding_backend,
        };

        let settings = Self {
            corpus_path: rag_config
                .corpus_path
                .map(PathBuf::from)
                .unwrap_or(defaults.corpus_path),
            index_path: rag_config
                .index_path
                .map(PathBuf::from)
                .unwrap_or(defaults.index_path),
            metadata_path: rag_config
                .metadata_path
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_path),
            embedding_model: rag_config.embedding_model.unwrap_or(defaults.embedding_model),
            embedding_backend,
            embedding_dimension: rag_config
                .embedding_dimension
                .unwrap_or(defaults.embedding_dimension),
            embedding_url: rag_config.embedding_url.unwrap_or(defaults.embedding_url),
            embed_batch_size: rag_config.embed_batch_size.unwrap_or(defaults.embed_batch_size),
            chunk_size: rag_config.chunk_size.unwrap_or(defaults.chunk_size),
            top_k: rag_config.top_k.unwrap_or(defaults.top_k),
            generator_url: rag_config.generator_url.unwrap_or(defaults.generator_url),
            generator_model: rag_config.generator_model.unwrap_or(defaults.generator_model),
            max_tokens: rag_config.max_tokens.unwrap_or(defaults.max_tokens),
            stop_sequences: rag_config.stop_sequences.unwrap_or(defaults.stop_sequences),
            request_timeout_secs: rag_config
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("CVERAG_CHUNK_SIZE must be greater than 0.");
        }
        if self.top_k == 0 {
            anyhow::bail!("CVERAG_TOP_K must be greater than 0.");
        }
        if self.embed_batch_size == 0 {
            anyhow::bail!("CVERAG_EMBED_BATCH_SIZE must be greater than 0.");
        }
        if self.embedding_dimension == 0 {
            anyhow::bail!("CVERAG_EMBEDDING_DIMENSION must be greater than 0.");
        }
        if self.index_path == self.metadata_path {
            anyhow::bail!(
                "Index and metadata paths must differ (both are '{}').",
                self.index_path.display()
            );
        }
        let directory = |path: &Path| {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf()
        };
        if directory(&self.index_path) != directory(&self.metadata_path) {
            anyhow::bail!(
                "Index and metadata files must share a directory ('{}' vs '{}').",
                self.index_path.display(),
                self.metadata_path.display()
            );
        }
        Ok(())
    }

    pub fn print_config(&self) {
        println!("corpus_path={}", self.corpus_path.display());
        println!("index_path={}", self.index_path.display());
        println!("metadata_path={}", self.metadata_path.display());
        println!("embedding_model={}", self.embedding_model);
        println!("embedding_backend={}", self.embedding_backend.as_str());
        println!("embedding_dimension={}", self.embedding_dimension);
        println!("embedding_url={}", self.embedding_url);
        println!("embed_batch_size={}", self.embed_batch_size);
        println!("chunk_size={}", self.chunk_size);
        println!("top_k={}", self.top_k);
        println!("generator_url={}", self.generator_url);
        println!("generator_model={}", self.generator_model);
        println!("max_tokens={}", self.max_tokens);
        println!("stop_sequences={:?}", self.stop_sequences);
        println!("request_timeout_secs={}", self.request_timeout_secs);
    }
}
