//! Document assembler.
//!
//! Joins a package's normalized fragments, in spine order, into the single
//! [`DocumentRecord`] that the store persists.

use bookcorpus_markdown::collapse_blank_lines;
use bookcorpus_shared::{BookCorpusError, BookMetadata, DocumentRecord, Result};
use tracing::{debug, instrument};

/// Separator placed between consecutive fragments.
const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Assemble `fragments` into a record for `key`.
///
/// Empty fragments are dropped; the rest are joined with a blank line and
/// blank-line runs are collapsed once more across the joins. If nothing is
/// left the whole package fails with [`BookCorpusError::NoExtractableContent`]
/// so that no empty-text record is ever produced.
#[instrument(skip_all, fields(key = %key, fragments = fragments.len()))]
pub fn assemble<S: AsRef<str>>(
    key: &str,
    metadata: BookMetadata,
    fragments: &[S],
) -> Result<DocumentRecord> {
    let kept: Vec<&str> = fragments
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty())
        .collect();

    if kept.is_empty() {
        return Err(BookCorpusError::NoExtractableContent {
            package: key.to_string(),
        });
    }

    let text = collapse_blank_lines(&kept.join(FRAGMENT_SEPARATOR))
        .trim()
        .to_string();

    debug!(kept = kept.len(), text_len = text.len(), "package assembled");
    Ok(DocumentRecord::new(key, metadata, text))
}
