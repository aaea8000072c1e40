//! Recursive character splitter producing overlapping text windows.
//!
//! Text is cut at the coarsest separator present (paragraph, line, word, then
//! single characters). Pieces are merged back into windows of at most
//! `chunk_size` characters; when a window fills up, its tail of at most
//! `chunk_overlap` characters is carried into the next one.

use std::collections::VecDeque;

use tracing::debug;

use crate::config::ConfigError;
use crate::document::{Chunk, PageRecord};

/// Separators tried from coarsest to finest; the empty separator splits characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Window size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried over between consecutive chunks.
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    /// Rejects a zero window or an overlap that is not smaller than the window.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunking {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
        }
    }
}

/// Stateless splitter; the same input always yields the same chunks.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Builds a splitter using [`DEFAULT_SEPARATORS`].
    pub fn new(config: ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Splits every page, copying page metadata onto its chunks.
    pub fn split_pages(&self, pages: &[PageRecord]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for (start_index, text) in self.split_with_offsets(&page.text) {
                chunks.push(Chunk {
                    text,
                    metadata: page.metadata.clone(),
                    start_index,
                });
            }
        }
        debug!(pages = pages.len(), chunks = chunks.len(), "split pages");
        chunks
    }

    /// Splits a single text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with_offsets(text)
            .into_iter()
            .map(|(_, chunk)| chunk)
            .collect()
    }

    /// Chunks of `text` paired with the byte offset where each one starts.
    pub fn split_with_offsets(&self, text: &str) -> Vec<(usize, String)> {
        self.split_recursive(text, text, &self.separators)
    }

    // Every piece is a sub-slice of `root`, so offsets come from slice positions.
    fn split_recursive(
        &self,
        root: &str,
        text: &str,
        separators: &[String],
    ) -> Vec<(usize, String)> {
        let (separator, finer) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut buffered: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                buffered.push(piece);
                continue;
            }
            if !buffered.is_empty() {
                chunks.extend(self.merge(root, &buffered));
                buffered.clear();
            }
            if finer.is_empty() {
                chunks.push((offset_in(root, piece), piece.to_string()));
            } else {
                chunks.extend(self.split_recursive(root, piece, finer));
            }
        }
        if !buffered.is_empty() {
            chunks.extend(self.merge(root, &buffered));
        }
        chunks
    }

    // `pieces` are adjacent slices, so a window joins to one contiguous span of `root`.
    fn merge(&self, root: &str, pieces: &[&str]) -> Vec<(usize, String)> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if total + len > size && !window.is_empty() {
                push_joined(root, &mut merged, &window);
                while total > overlap || (total + len > size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(root, &mut merged, &window);
        merged
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    let mut separator = separators.last().map(String::as_str).unwrap_or("");
    let mut finer: &[String] = &[];
    for (idx, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = "";
            break;
        }
        if text.contains(candidate.as_str()) {
            separator = candidate;
            finer = &separators[idx + 1..];
            break;
        }
    }
    (separator, finer)
}

// Each separator occurrence starts a new piece; empty pieces are dropped.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_joined(root: &str, out: &mut Vec<(usize, String)>, window: &VecDeque<&str>) {
    let Some(first) = window.front() else {
        return;
    };
    let joined: String = window.iter().copied().collect();
    let unindented = joined.trim_start();
    let leading = joined.len() - unindented.len();
    let trimmed = unindented.trim_end();
    if !trimmed.is_empty() {
        out.push((offset_in(root, first) + leading, trimmed.to_string()));
    }
}

fn offset_in(root: &str, piece: &str) -> usize {
    piece.as_ptr() as usize - root.as_ptr() as usize
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
