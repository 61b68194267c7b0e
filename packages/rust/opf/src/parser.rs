//! OPF package document parser.
//!
//! Reads the three parts of an OPF file the pipeline needs:
//! - `<metadata>`: `dc:title`, `dc:creator`, `dc:language`
//! - `<manifest>`: `<item id=".." href=".."/>`
//! - `<spine>`: `<itemref idref=".."/>` in reading order

use std::collections::HashMap;
use std::path::Path;

use bookcorpus_shared::{BookCorpusError, BookMetadata, Result};
use roxmltree::{Document, Node, ParsingOptions};
use tracing::debug;

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One `<item>` of the manifest table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Path relative to the OPF file, as written in the manifest.
    pub href: String,
}

/// Parsed representation of an OPF package document.
#[derive(Debug, Clone, Default)]
pub struct PackageManifest {
    /// Scalar book metadata; missing fields are empty strings.
    pub metadata: BookMetadata,
    /// Manifest table keyed by item id.
    pub items: HashMap<String, ManifestItem>,
    /// Spine item ids in reading order.
    pub spine: Vec<String>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse OPF XML text. `path` is only used for error context.
pub(crate) fn parse_opf(xml: &str, path: &Path) -> Result<PackageManifest> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| BookCorpusError::manifest_invalid(path, e.to_string()))?;

    let root = doc.root_element();
    if root.tag_name().name() != "package" {
        return Err(BookCorpusError::manifest_invalid(
            path,
            format!("root element is <{}>, expected <package>", root.tag_name().name()),
        ));
    }

    let metadata = BookMetadata {
        title: first_dc_text(root, "title"),
        author: first_dc_text(root, "creator"),
        language: first_dc_text(root, "language"),
    };

    let mut items = HashMap::new();
    for node in root.descendants().filter(|n| n.has_tag_name((OPF_NS, "item"))) {
        let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) else {
            debug!(path = %path.display(), "manifest item without id or href, ignoring");
            continue;
        };
        items.insert(
            id.to_string(),
            ManifestItem {
                id: id.to_string(),
                href: href.to_string(),
            },
        );
    }

    let spine: Vec<String> = root
        .descendants()
        .filter(|n| n.has_tag_name((OPF_NS, "itemref")))
        .filter_map(|n| n.attribute("idref"))
        .map(str::to_string)
        .collect();

    debug!(
        path = %path.display(),
        items = items.len(),
        spine = spine.len(),
        title = %metadata.title,
        "parsed OPF"
    );

    Ok(PackageManifest {
        metadata,
        items,
        spine,
    })
}

/// Trimmed text of the first `dc:<name>` element, or `""`.
fn first_dc_text(root: Node<'_, '_>, name: &str) -> String {
    root.descendants()
        .find(|n| n.has_tag_name((DC_NS, name)))
        .map(|n| {
            n.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}
