//! Manifest resolution for EPUB-style packages.
//!
//! Loads a package's OPF document and turns its spine into an ordered list of
//! content-file paths, going through the manifest table for each entry.

mod parser;

use std::path::{Path, PathBuf};

use bookcorpus_shared::{BookCorpusError, Result};
use tracing::{debug, instrument, warn};

pub use parser::{ManifestItem, PackageManifest};

/// One resolved spine entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineEntry {
    /// The spine `idref` this path was resolved from.
    pub idref: String,
    /// Content-file path joined onto the manifest's directory. Not checked for existence.
    pub path: PathBuf,
}

/// Load and parse the OPF manifest at `path`.
///
/// A missing file yields [`BookCorpusError::ManifestMissing`]; undecodable or
/// malformed content yields [`BookCorpusError::ManifestInvalid`]. Nothing is
/// returned for a manifest that failed to parse.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_manifest(path: &Path) -> Result<PackageManifest> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BookCorpusError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(BookCorpusError::io(path, e)),
    };

    let xml = String::from_utf8(bytes)
        .map_err(|e| BookCorpusError::manifest_invalid(path, format!("not UTF-8: {e}")))?;

    parser::parse_opf(&xml, path)
}

impl PackageManifest {
    /// Resolve the spine to content-file paths under `base_dir`, in reading order.
    ///
    /// Spine entries whose id is absent from the manifest table are skipped
    /// with a warning; the rest of the package is still usable.
    pub fn resolve_spine(&self, base_dir: &Path) -> Vec<SpineEntry> {
        let mut entries = Vec::with_capacity(self.spine.len());

        for idref in &self.spine {
            let Some(item) = self.items.get(idref) else {
                warn!(%idref, "spine entry has no manifest item, skipping");
                continue;
            };

            let href = strip_fragment(&item.href);
            if href.is_empty() {
                warn!(%idref, "manifest item has an empty href, skipping");
                continue;
            }

            entries.push(SpineEntry {
                idref: idref.clone(),
                path: base_dir.join(href),
            });
        }

        debug!(resolved = entries.len(), spine = self.spine.len(), "spine resolved");
        entries
    }
}

/// `text/ch1.xhtml#start` → `text/ch1.xhtml`.
fn strip_fragment(href: &str) -> &str {
    href.split_once('#').map_or(href, |(file, _)| file)
}
