//! Error types for bookcorpus.
//!
//! Library crates use [`BookCorpusError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all bookcorpus operations.
#[derive(Debug, thiserror::Error)]
pub enum BookCorpusError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The package manifest does not exist at the expected location.
    #[error("manifest not found at {path:?}")]
    ManifestMissing { path: PathBuf },

    /// The package manifest exists but could not be read as an OPF document.
    #[error("invalid manifest {path:?}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    /// Every candidate content file was filtered out or normalized to nothing.
    #[error("no extractable content in package {package}")]
    NoExtractableContent { package: String },

    /// The store could not be published. The previously committed file is intact.
    #[error("store write failed at {path:?}: {message}")]
    StoreWrite { path: PathBuf, message: String },

    /// The store file exists but could not be decoded.
    #[error("store read failed at {path:?}: {message}")]
    StoreRead { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad catalog entry, malformed ledger, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BookCorpusError>;

impl BookCorpusError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a manifest-invalid error for the manifest at `path`.
    pub fn manifest_invalid(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a store-write error for the store at `path`.
    pub fn store_write(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::StoreWrite {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a store-read error for the store at `path`.
    pub fn store_read(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::StoreRead {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is scoped to a single package (the driver moves on to
    /// the next package) rather than to the store or the environment.
    pub fn is_package_error(&self) -> bool {
        matches!(
            self,
            Self::ManifestMissing { .. }
                | Self::ManifestInvalid { .. }
                | Self::NoExtractableContent { .. }
        )
    }
}
