#![warn(missing_docs)]
//! Core library for the pdfrag ingestion and question-answering pipeline.

pub mod chain;
pub mod chat;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embedder;
pub mod ids;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod retry;
pub mod sanitize;
pub mod vector_store;

pub use chain::{build_chain, QaChain, REFUSAL};
pub use chunker::{ChunkingConfig, RecursiveSplitter};
pub use config::{ConfigError, Settings, SettingsArgs};
pub use document::{Chunk, ContentRecord, Metadata, PageRecord, ScoredEntry, StoredEntry};
pub use embedder::Embedder;
pub use ids::IdScheme;
pub use ingest::{IngestError, IngestReport};
pub use llm::ChatModel;
pub use loader::DocumentError;
pub use retry::RetryPolicy;
pub use vector_store::{PgVectorStore, TableName, VectorStore};
