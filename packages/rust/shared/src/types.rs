//! Core domain types shared by the extraction pipeline and the store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BookMetadata
// ---------------------------------------------------------------------------

/// Scalar metadata read from a package manifest.
///
/// Missing manifest fields are empty strings, never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
}

// ---------------------------------------------------------------------------
// DocumentRecord
// ---------------------------------------------------------------------------

/// One row of the corpus store: a fully assembled package.
///
/// `key` is the only identity field; upserts replace by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique, run-stable identifier (usually the package's canonical URL).
    pub key: String,
    pub title: String,
    pub author: String,
    /// The assembled lightweight-markup text of the whole package.
    pub text: String,
    pub language: String,
}

impl DocumentRecord {
    /// Build a record from a key, manifest metadata, and assembled text.
    pub fn new(key: impl Into<String>, metadata: BookMetadata, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: metadata.title,
            author: metadata.author,
            text: text.into(),
            language: metadata.language,
        }
    }
}

// ---------------------------------------------------------------------------
// PackageDescriptor
// ---------------------------------------------------------------------------

/// A package handed to the pipeline by the acquisition step.
///
/// Catalog files are JSON arrays of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Short human-readable name (e.g. the source repository name).
    pub name: String,
    /// Store key for the resulting record.
    pub key: String,
    /// Opaque version marker used by the progress ledger (e.g. an upstream
    /// `updated_at` timestamp).
    #[serde(default)]
    pub version: String,
    /// Local directory tree holding the package.
    pub path: PathBuf,
}
