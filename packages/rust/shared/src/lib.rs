//! Shared types, error model, and configuration for bookcorpus.
//!
//! This crate is the foundation depended on by all other bookcorpus crates.
//! It provides:
//! - [`BookCorpusError`], the unified error type
//! - Domain types ([`DocumentRecord`], [`BookMetadata`], [`PackageDescriptor`])
//! - Configuration ([`AppConfig`], [`ExtractConfig`], config loading)
//! - Atomic file publishing ([`write_atomic`], [`write_bytes_atomic`])

pub mod config;
pub mod error;
pub mod publish;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_BOILERPLATE_KEYWORDS, DefaultsConfig, ExtractConfig, FilterConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{BookCorpusError, Result};
pub use publish::{write_atomic, write_bytes_atomic};
pub use types::{BookMetadata, DocumentRecord, PackageDescriptor};
