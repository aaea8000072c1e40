//! Turns raw chunks into storage-ready content records.

use serde_json::Value;
use tracing::info;

use crate::document::{Chunk, ContentRecord, Metadata};

/// Drops null and empty-string metadata values and trims chunk text.
pub fn sanitize(chunks: Vec<Chunk>) -> Vec<ContentRecord> {
    info!("cleaning metadata and structuring records");
    let records: Vec<ContentRecord> = chunks
        .into_iter()
        .map(|chunk| ContentRecord {
            text: chunk.text.trim().to_string(),
            metadata: clean_metadata(chunk.metadata),
            start_index: chunk.start_index,
        })
        .collect();
    info!(records = records.len(), "records ready for storage");
    records
}

/// Keeps only values that are neither null nor an empty string.
pub fn clean_metadata(metadata: Metadata) -> Metadata {
    metadata
        .into_iter()
        .filter(|(_, value)| !is_blank(value))
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}
