//! Identifier assignment for content records.

use clap::ValueEnum;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::document::ContentRecord;

/// How stored entry identifiers are derived.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum IdScheme {
    /// `doc-<hash>` over metadata, offset and text; stable under reordering.
    #[default]
    Content,
    /// `doc-<index>` by position, matching collections written by earlier tooling.
    Sequential,
}

/// Returns one identifier per record, in record order.
pub fn generate_ids(records: &[ContentRecord], scheme: IdScheme) -> Vec<String> {
    let ids: Vec<String> = match scheme {
        IdScheme::Sequential => (0..records.len()).map(|idx| format!("doc-{idx}")).collect(),
        IdScheme::Content => records.iter().map(content_id).collect(),
    };
    info!(count = ids.len(), ?scheme, "generated record identifiers");
    ids
}

/// Content-addressed identifier for a single record.
pub fn content_id(record: &ContentRecord) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in &record.metadata {
        hasher.update(key.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.to_string().as_bytes());
        hasher.update([0x1e]);
    }
    hasher.update((record.start_index as u64).to_le_bytes());
    hasher.update(record.text.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(16).map(|byte| format!("{byte:02x}")).collect();
    format!("doc-{hex}")
}
