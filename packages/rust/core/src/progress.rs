//! Progress/resume ledger.
//!
//! Records which packages made it into the store and at which version marker,
//! so a later run only reprocesses new or changed packages. Persisted as a JSON
//! list next to the store and published atomically after each upsert.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bookcorpus_shared::{
    BookCorpusError, DocumentRecord, PackageDescriptor, Result, write_bytes_atomic,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// One successfully stored package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default, alias = "link")]
    pub key: String,
    #[serde(default)]
    pub name: String,
    /// Version marker the package had when it was stored. Compared for
    /// equality only.
    #[serde(default, alias = "updated_at")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the stored text.
    #[serde(default)]
    pub text_sha256: String,
}

/// On-disk shapes accepted when loading.
#[derive(Deserialize)]
#[serde(untagged)]
enum LedgerFile {
    List(Vec<LedgerEntry>),
    /// Legacy form: an object keyed by package key.
    Map(BTreeMap<String, LedgerEntry>),
}

/// In-memory ledger bound to its file.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
}

impl ProgressLedger {
    /// An empty ledger that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the ledger at `path`; an absent file is an empty ledger.
    ///
    /// A file that is neither a list of entries nor a map keyed by package key
    /// is rejected rather than silently replaced on the next save.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no progress ledger yet");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(BookCorpusError::io(path, e)),
        };

        let file: LedgerFile = serde_json::from_str(&content).map_err(|e| {
            BookCorpusError::validation(format!("malformed ledger {}: {e}", path.display()))
        })?;

        let entries = match file {
            LedgerFile::List(entries) => entries,
            LedgerFile::Map(map) => map
                .into_iter()
                .map(|(key, mut entry)| {
                    if entry.key.is_empty() {
                        entry.key = key;
                    }
                    entry
                })
                .collect(),
        };

        debug!(entries = entries.len(), "ledger loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Whether `package` has to be (re)processed.
    ///
    /// True when it has no entry, when its version marker differs from the
    /// recorded one, or when `force` is set.
    pub fn needs_processing(&self, package: &PackageDescriptor, force: bool) -> bool {
        if force {
            return true;
        }
        match self.get(&package.key) {
            Some(entry) => entry.version != package.version,
            None => true,
        }
    }

    /// Record that `record` was stored for `package`. Replaces any previous
    /// entry with the same key.
    pub fn mark_processed(&mut self, package: &PackageDescriptor, record: &DocumentRecord) {
        let entry = LedgerEntry {
            key: package.key.clone(),
            name: package.name.clone(),
            version: package.version.clone(),
            processed_at: Some(Utc::now()),
            text_sha256: text_sha256(&record.text),
        };

        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Atomically publish the ledger as a pretty-printed JSON list.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| BookCorpusError::validation(format!("ledger serialization: {e}")))?;
        write_bytes_atomic(&self.path, json.as_bytes())?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "ledger saved");
        Ok(())
    }
}

/// Hex SHA-256 digest of `text`.
pub fn text_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
