//! Shared document records passed between pipeline stages.

use std::collections::BTreeMap;

use serde_json::Value;

/// Metadata attached to pages, chunks and stored entries.
///
/// A `BTreeMap` keeps key order stable so serialized metadata and content ids
/// do not depend on insertion order.
pub type Metadata = BTreeMap<String, Value>;

/// Text of a single PDF page plus page-level metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    /// Raw extracted page text.
    pub text: String,
    /// Page metadata (`source`, `page`, document info fields, ...).
    pub metadata: Metadata,
}

/// Window of page text emitted by the splitter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk body.
    pub text: String,
    /// Copy of the owning page's metadata.
    pub metadata: Metadata,
    /// Byte offset of the chunk inside the page text.
    pub start_index: usize,
}

/// Chunk with sanitized metadata, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    /// Trimmed chunk body submitted to the embedding model.
    pub text: String,
    /// Metadata without null or empty-string values.
    pub metadata: Metadata,
    /// Byte offset of the chunk inside the page text.
    pub start_index: usize,
}

/// Durable row held by the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Entry identifier (upsert key).
    pub id: String,
    /// Stored chunk text.
    pub content: String,
    /// Stored metadata.
    pub metadata: Metadata,
}

/// Stored entry returned by a similarity query together with its distance.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    /// Matched entry.
    pub entry: StoredEntry,
    /// Cosine distance to the query vector (lower is closer).
    pub distance: f64,
}

/// Single-line preview of `text`, truncated to `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars()
        .take(max_chars)
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_newlines_and_truncates() {
        assert_eq!(preview("first\nsecond line", 10), "first seco");
        assert_eq!(preview("ação", 2), "aç");
        assert_eq!(preview("", 5), "");
    }
}
