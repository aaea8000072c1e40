//! Settings shared by the ingestion and chat binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;
use tracing::info;

use crate::chunker::ChunkingConfig;
use crate::ids::IdScheme;
use crate::retry::RetryPolicy;

/// Environment keys that must be set before any pipeline runs, in check order.
pub const REQUIRED_KEYS: [&str; 5] = [
    "GOOGLE_API_KEY",
    "DATABASE_URL",
    "PG_VECTOR_COLLECTION_NAME",
    "GOOGLE_EMBEDDING_MODEL",
    "GOOGLE_CHAT_MODEL",
];

/// Default Generative Language API root.
pub const DEFAULT_GOOGLE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 10;

/// Configuration problems detected before any I/O happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent or blank.
    #[error("required environment variable {0} is not defined")]
    MissingKey(&'static str),
    /// Overlap must be strictly smaller than a non-zero window.
    #[error("invalid chunking parameters: overlap {overlap} must be smaller than chunk size {size}")]
    InvalidChunking {
        /// Requested window size.
        size: usize,
        /// Requested overlap.
        overlap: usize,
    },
    /// `.env` exists but could not be parsed.
    #[error("failed to load .env file: {0}")]
    DotEnv(String),
}

/// Checks every key of [`REQUIRED_KEYS`] through `lookup`, failing on the first missing one.
pub fn validate_required<F>(lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    info!("checking required environment variables");
    for key in REQUIRED_KEYS {
        let present = lookup(key).is_some_and(|value| !value.trim().is_empty());
        if !present {
            return Err(ConfigError::MissingKey(key));
        }
    }
    info!("required environment variables present");
    Ok(())
}

/// Loads `.env` from the working directory; the process environment wins.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::DotEnv(err.to_string())),
    }
}

/// Command-line interface shared by binaries; every flag falls back to the environment.
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// Google API key used for embeddings and chat
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Collection that groups the stored chunks
    #[arg(long, env = "PG_VECTOR_COLLECTION_NAME")]
    pub collection_name: Option<String>,

    /// Embedding model identifier (e.g. models/text-embedding-004)
    #[arg(long, env = "GOOGLE_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Chat model identifier (e.g. gemini-2.0-flash)
    #[arg(long, env = "GOOGLE_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// PDF document to ingest
    #[arg(long, env = "PDF_PATH")]
    pub pdf_path: Option<PathBuf>,

    /// Base URL of the Generative Language API
    #[arg(long, env = "PDFRAG_GOOGLE_BASE", default_value = DEFAULT_GOOGLE_BASE)]
    pub google_base_url: String,

    /// Postgres schema holding the collection and embedding tables
    #[arg(long, env = "PDFRAG_PG_SCHEMA", default_value = "public")]
    pub pg_schema: String,

    /// Maximum characters per chunk
    #[arg(long, env = "PDFRAG_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "PDFRAG_CHUNK_OVERLAP", default_value_t = 150)]
    pub chunk_overlap: usize,

    /// Identifier scheme for stored chunks
    #[arg(long, env = "PDFRAG_ID_SCHEME", value_enum, default_value_t = IdScheme::Content)]
    pub id_scheme: IdScheme,

    /// Number of chunks retrieved per question
    #[arg(long, env = "PDFRAG_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Max texts per embedding request
    #[arg(long, env = "PDFRAG_EMBED_BATCH", default_value_t = 100)]
    pub embed_batch_size: usize,

    /// Rows written per upsert transaction
    #[arg(long, env = "PDFRAG_INSERT_BATCH", default_value_t = 128)]
    pub insert_batch_size: usize,

    /// Seconds before a Google API request times out
    #[arg(long, env = "PDFRAG_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Retries after the first attempt of an external call (rate limits, 5xx, dropped connections)
    #[arg(long, env = "PDFRAG_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,

    /// Base backoff in milliseconds, doubled on every retry
    #[arg(long, env = "PDFRAG_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Drop the collection (and its entries) before ingesting
    #[arg(long, env = "PDFRAG_PRE_DELETE_COLLECTION", default_value_t = false)]
    pub pre_delete_collection: bool,
}

impl SettingsArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        let value = match key {
            "GOOGLE_API_KEY" => &self.google_api_key,
            "DATABASE_URL" => &self.database_url,
            "PG_VECTOR_COLLECTION_NAME" => &self.collection_name,
            "GOOGLE_EMBEDDING_MODEL" => &self.embedding_model,
            "GOOGLE_CHAT_MODEL" => &self.chat_model,
            _ => return None,
        };
        value.clone()
    }

    /// Validates required keys and builds the single [`Settings`] object.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        validate_required(|key| self.lookup(key))?;
        let chunking = ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        };
        chunking.validate()?;
        Ok(Settings {
            google_api_key: required(self.google_api_key, REQUIRED_KEYS[0])?,
            database_url: required(self.database_url, REQUIRED_KEYS[1])?,
            collection_name: required(self.collection_name, REQUIRED_KEYS[2])?,
            embedding_model: required(self.embedding_model, REQUIRED_KEYS[3])?,
            chat_model: required(self.chat_model, REQUIRED_KEYS[4])?,
            pdf_path: self.pdf_path,
            google_base_url: self.google_base_url,
            pg_schema: self.pg_schema,
            chunking,
            id_scheme: self.id_scheme,
            top_k: self.top_k.max(1),
            embed_batch_size: self.embed_batch_size.max(1),
            insert_batch_size: self.insert_batch_size.max(1),
            request_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retry: RetryPolicy::new(
                self.max_retries.saturating_add(1),
                Duration::from_millis(self.retry_base_ms),
            ),
            pre_delete_collection: self.pre_delete_collection,
        })
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingKey(key))
}

/// Validated configuration, built once and handed to every component.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Google API credential.
    pub google_api_key: String,
    /// Postgres connection string.
    pub database_url: String,
    /// pgvector collection name.
    pub collection_name: String,
    /// Embedding model identifier.
    pub embedding_model: String,
    /// Chat model identifier.
    pub chat_model: String,
    /// PDF to ingest (ingestion only).
    pub pdf_path: Option<PathBuf>,
    /// Generative Language API root.
    pub google_base_url: String,
    /// Postgres schema for the store tables.
    pub pg_schema: String,
    /// Splitter window and overlap.
    pub chunking: ChunkingConfig,
    /// Identifier scheme used at ingestion.
    pub id_scheme: IdScheme,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Rows per upsert transaction.
    pub insert_batch_size: usize,
    /// HTTP request timeout.
    pub request_timeout: Duration,
    /// Retry policy for external calls.
    pub retry: RetryPolicy,
    /// Whether to drop the collection before ingesting.
    pub pre_delete_collection: bool,
}
