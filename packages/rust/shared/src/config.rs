//! Application configuration for bookcorpus.
//!
//! User config lives at `~/.bookcorpus/bookcorpus.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BookCorpusError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "bookcorpus.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".bookcorpus";

/// File-name keywords that mark a content file as front/back matter.
pub const DEFAULT_BOILERPLATE_KEYWORDS: &[&str] = &[
    "imprint",
    "colophon",
    "uncopyright",
    "titlepage",
    "dedication",
    "acknowledgments",
    "foreword",
    "preface",
    "epigraph",
    "afterword",
    "appendix",
    "glossary",
    "index",
    "bibliography",
    "table-of-contents",
    "cover",
    "license",
];

// ---------------------------------------------------------------------------
// Config structs (matching bookcorpus.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Boilerplate filter settings.
    #[serde(default)]
    pub filter: FilterConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Arrow IPC file holding the corpus.
    #[serde(default = "default_store_path")]
    pub store_path: String,

    /// JSON ledger of processed package versions.
    #[serde(default = "default_progress_path")]
    pub progress_path: String,

    /// Manifest location relative to a package root.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Only the first `max_files` content files surviving the name filter are read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            progress_path: default_progress_path(),
            manifest_path: default_manifest_path(),
            max_files: None,
        }
    }
}

fn default_store_path() -> String {
    "books_dataset.arrow".into()
}
fn default_progress_path() -> String {
    "books_list.json".into()
}
fn default_manifest_path() -> String {
    "src/epub/content.opf".into()
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Case-insensitive file-name keywords excluded before reading.
    #[serde(default = "default_keywords")]
    pub boilerplate_keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            boilerplate_keywords: default_keywords(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    DEFAULT_BOILERPLATE_KEYWORDS
        .iter()
        .map(|k| (*k).to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Extract config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime extraction configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Manifest location relative to the package root.
    pub manifest_path: PathBuf,
    /// Cap on content files read per package.
    pub max_files: Option<usize>,
    /// File-name keywords for the boilerplate pre-filter.
    pub boilerplate_keywords: Vec<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExtractConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            manifest_path: PathBuf::from(&config.defaults.manifest_path),
            max_files: config.defaults.max_files,
            boilerplate_keywords: config.filter.boilerplate_keywords.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.bookcorpus/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BookCorpusError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.bookcorpus/bookcorpus.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BookCorpusError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BookCorpusError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BookCorpusError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BookCorpusError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BookCorpusError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
