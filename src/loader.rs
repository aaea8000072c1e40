//! PDF loading: one page record per page, in page order.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::document::{preview, Metadata, PageRecord};

// Document info entries copied onto every page, keyed the way pypdf reports them.
const INFO_FIELDS: [(&str, &[u8]); 8] = [
    ("producer", b"Producer"),
    ("creator", b"Creator"),
    ("creationdate", b"CreationDate"),
    ("moddate", b"ModDate"),
    ("author", b"Author"),
    ("title", b"Title"),
    ("subject", b"Subject"),
    ("keywords", b"Keywords"),
];

const PREVIEW_CHARS: usize = 120;

/// Errors raised before or while parsing the source document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Path is empty, missing, or not a regular file.
    #[error("PDF path '{}' is invalid or does not exist", path.display())]
    NotFound {
        /// Offending path.
        path: PathBuf,
    },
    /// The file exists but could not be parsed as a PDF.
    #[error("failed to parse PDF '{}': {message}", path.display())]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Parser error message.
        message: String,
    },
}

/// Reads `path` and returns its pages; parsing is all-or-nothing.
pub fn load_pdf(path: &Path) -> Result<Vec<PageRecord>, DocumentError> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(DocumentError::NotFound {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), "loading PDF document");
    let parse_error = |err: lopdf::Error| DocumentError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let document = Document::load(path).map_err(parse_error)?;
    let info = info_metadata(&document);
    let pages = document.get_pages();
    let total_pages = pages.len();
    let source = path.display().to_string();

    let mut records = Vec::with_capacity(total_pages);
    for (index, page_number) in pages.keys().enumerate() {
        let text = document.extract_text(&[*page_number]).map_err(parse_error)?;
        let mut metadata = info.clone();
        metadata.insert("source".into(), Value::from(source.as_str()));
        metadata.insert("total_pages".into(), Value::from(total_pages));
        metadata.insert("page".into(), Value::from(index));
        metadata.insert("page_label".into(), Value::from(page_number.to_string()));
        debug!(
            page = index + 1,
            chars = text.chars().count(),
            preview = %preview(&text, PREVIEW_CHARS),
            "extracted page"
        );
        records.push(PageRecord { text, metadata });
    }
    info!(pages = records.len(), "pages loaded");
    Ok(records)
}

fn info_metadata(document: &Document) -> Metadata {
    let info = info_dictionary(document);
    INFO_FIELDS
        .iter()
        .map(|(key, pdf_key)| {
            let value = info
                .and_then(|dict| dict.get(pdf_key).ok())
                .and_then(|object| object.as_str().ok())
                .map(|bytes| Value::from(decode_pdf_string(bytes)))
                .unwrap_or(Value::Null);
            (key.to_string(), value)
        })
        .collect()
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

// Text strings are either UTF-16BE with a byte-order mark or single-byte encoded.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF][..]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    String::from_utf8_lossy(bytes).into_owned()
}
