//! One-shot ingestion: PDF → pages → chunks → records → ids → vector store.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::info;

use crate::chunker::RecursiveSplitter;
use crate::document::{preview, ContentRecord, PageRecord};
use crate::ids::{generate_ids, IdScheme};
use crate::loader::{load_pdf, DocumentError};
use crate::sanitize::sanitize;
use crate::vector_store::VectorStore;

const PREVIEW_CHUNKS: usize = 5;
const PREVIEW_CHARS: usize = 80;

/// Failures that stop ingestion before anything is written.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The source PDF could not be opened or parsed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// The document yielded no text to store.
    #[error("no chunks were produced from '{}'; the PDF may contain no extractable text", path.display())]
    NoChunks {
        /// Source document path.
        path: PathBuf,
    },
}

/// Records ready to hand to a store, paired with their identifiers.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Sanitized records in chunk order.
    pub records: Vec<ContentRecord>,
    /// One identifier per record.
    pub ids: Vec<String>,
}

/// Summary printed at the end of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Pages read from the document.
    pub pages: usize,
    /// Chunks produced by the splitter.
    pub chunks: usize,
    /// Rows written to the store.
    pub stored: usize,
}

/// Splits, sanitizes and assigns ids to `pages`.
pub fn prepare_pages(
    pages: &[PageRecord],
    splitter: &RecursiveSplitter,
    scheme: IdScheme,
) -> PreparedBatch {
    let chunks = splitter.split_pages(pages);
    info!(chunks = chunks.len(), "document split into chunks");
    for (idx, chunk) in chunks.iter().take(PREVIEW_CHUNKS).enumerate() {
        info!(
            chunk = idx + 1,
            start_index = chunk.start_index,
            preview = %preview(&chunk.text, PREVIEW_CHARS),
            "chunk preview"
        );
    }
    let records = sanitize(chunks);
    let ids = generate_ids(&records, scheme);
    PreparedBatch { records, ids }
}

/// Ingests already-loaded pages; `open_store` is only called when there is something to write.
pub fn ingest_pages<S, F>(
    source: &Path,
    pages: &[PageRecord],
    splitter: &RecursiveSplitter,
    scheme: IdScheme,
    open_store: F,
) -> Result<IngestReport>
where
    S: VectorStore,
    F: FnOnce() -> Result<S>,
{
    let batch = prepare_pages(pages, splitter, scheme);
    if batch.records.is_empty() {
        return Err(IngestError::NoChunks {
            path: source.to_path_buf(),
        }
        .into());
    }

    let mut store = open_store()?;
    let stored = store.add_documents(&batch.records, &batch.ids)?;
    Ok(IngestReport {
        pages: pages.len(),
        chunks: batch.records.len(),
        stored,
    })
}

/// Loads `path` and ingests it.
pub fn ingest_pdf<S, F>(
    path: &Path,
    splitter: &RecursiveSplitter,
    scheme: IdScheme,
    open_store: F,
) -> Result<IngestReport>
where
    S: VectorStore,
    F: FnOnce() -> Result<S>,
{
    let pages = load_pdf(path).map_err(IngestError::from)?;
    ingest_pages(path, &pages, splitter, scheme, open_store)
}
