//! Boilerplate exclusion for package content files.
//!
//! Front and back matter (title pages, colophons, licenses, ...) is dropped
//! before normalization. The decision is a replaceable predicate, see
//! [`ContentFilter`]; [`HeuristicFilter`] is the default.

use std::path::{Path, PathBuf};

use bookcorpus_opf::SpineEntry;
use bookcorpus_shared::DEFAULT_BOILERPLATE_KEYWORDS;
use tracing::debug;

/// Decides whether a content file is boilerplate.
pub trait ContentFilter {
    /// Name-only check, applied before the file is read.
    fn excludes_name(&self, path: &Path) -> bool;

    /// Check on the raw (un-normalized) file text.
    fn excludes_content(&self, content: &str) -> bool;

    /// Whether the file should be excluded on either ground.
    fn is_boilerplate(&self, path: &Path, content: &str) -> bool {
        self.excludes_name(path) || self.excludes_content(content)
    }
}

// ---------------------------------------------------------------------------
// Heuristic filter
// ---------------------------------------------------------------------------

/// Keyword-on-file-name plus copyright-notice heuristic.
///
/// Content exclusion fires when the text contains both "copyright" and
/// "all rights reserved", in any case. A body chapter quoting such a notice is
/// also dropped.
#[derive(Debug, Clone)]
pub struct HeuristicFilter {
    keywords: Vec<String>,
}

impl HeuristicFilter {
    /// Build a filter from file-name keywords. Matching is case-insensitive.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl Default for HeuristicFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BOILERPLATE_KEYWORDS)
    }
}

impl ContentFilter for HeuristicFilter {
    fn excludes_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy().to_lowercase();

        if self.keywords.iter().any(|k| name.contains(k.as_str())) {
            return true;
        }

        // Conventional navigation document.
        path.file_stem()
            .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case("toc"))
    }

    fn excludes_content(&self, content: &str) -> bool {
        let lower = content.to_lowercase();
        lower.contains("copyright") && lower.contains("all rights reserved")
    }
}

// ---------------------------------------------------------------------------
// Candidate selection
// ---------------------------------------------------------------------------

/// Apply the name pre-filter to spine entries, then cap to the first
/// `max_files` survivors. Spine order is never changed.
pub fn select_candidates(
    entries: &[SpineEntry],
    filter: &dyn ContentFilter,
    max_files: Option<usize>,
) -> Vec<PathBuf> {
    let survivors = entries.iter().filter(|entry| {
        let excluded = filter.excludes_name(&entry.path);
        if excluded {
            debug!(path = %entry.path.display(), "excluded by name");
        }
        !excluded
    });

    match max_files {
        Some(cap) => survivors.take(cap).map(|e| e.path.clone()).collect(),
        None => survivors.map(|e| e.path.clone()).collect(),
    }
}
