//! Keyed document store backed by a single Arrow IPC file.
//!
//! The [`ArrowStore`] holds one row per package key. Every upsert rewrites the
//! whole file through an atomic publish, so the file on disk is always either
//! the previous committed state or the complete new one.
//!
//! **Access rules:**
//! - The pipeline driver is the sole writer
//! - Any Arrow reader can open the file without an external schema

mod schema;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::DataType;
use bookcorpus_shared::{BookCorpusError, DocumentRecord, Result, write_atomic};
use tracing::{debug, info, instrument};

pub use schema::{COLUMNS, store_schema};

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row had this key before.
    Inserted,
    /// An existing row with this key was replaced.
    Replaced,
}

/// Handle to a store file. Cheap to construct; nothing is opened until used.
#[derive(Debug, Clone)]
pub struct ArrowStore {
    path: PathBuf,
    /// Per-column byte limit for one record batch.
    max_batch_bytes: usize,
}

impl ArrowStore {
    /// Create a handle for the store at `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_batch_bytes: schema::MAX_BATCH_BYTES,
        }
    }

    #[cfg(test)]
    fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a committed store file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read every row in file order. A store that was never written is empty.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn read_all(&self) -> Result<Vec<DocumentRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store file absent, treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(BookCorpusError::io(&self.path, e)),
        };

        let reader = FileReader::try_new(BufReader::new(file), None)
            .map_err(|e| BookCorpusError::store_read(&self.path, e.to_string()))?;
        self.check_schema(&reader.schema())?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| BookCorpusError::store_read(&self.path, e.to_string()))?;
            schema::from_batch(&batch, &self.path, &mut records)?;
        }

        debug!(rows = records.len(), "store read");
        Ok(records)
    }

    /// Look up a single record by key.
    pub fn get(&self, key: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.read_all()?.into_iter().find(|r| r.key == key))
    }

    /// Number of committed rows.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_all()?.len())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert `record`, or replace the row that has the same key.
    ///
    /// The next state is every existing row with a different key, in its
    /// current order, followed by `record`. It is encoded to a scratch file
    /// and renamed over the live file. On failure the previous file is left
    /// untouched and [`BookCorpusError::StoreWrite`] is returned.
    #[instrument(skip_all, fields(path = %self.path.display(), key = %record.key))]
    pub fn upsert(&self, record: &DocumentRecord) -> Result<UpsertOutcome> {
        let existing = self.read_all()?;
        let before = existing.len();

        let mut next: Vec<DocumentRecord> =
            existing.into_iter().filter(|r| r.key != record.key).collect();
        let outcome = if next.len() == before {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Replaced
        };
        next.push(record.clone());

        self.write_rows(&next)?;

        info!(rows = next.len(), ?outcome, "store updated");
        Ok(outcome)
    }

    fn write_rows(&self, rows: &[DocumentRecord]) -> Result<()> {
        let batches = schema::to_batches(rows, &self.path, self.max_batch_bytes)?;
        let schema = store_schema();

        write_atomic(&self.path, |out| {
            let mut writer = FileWriter::try_new(out, &schema)
                .map_err(|e| BookCorpusError::store_write(&self.path, e.to_string()))?;
            for batch in &batches {
                writer
                    .write(batch)
                    .map_err(|e| BookCorpusError::store_write(&self.path, e.to_string()))?;
            }
            writer
                .finish()
                .map_err(|e| BookCorpusError::store_write(&self.path, e.to_string()))
        })
        .map_err(|e| match e {
            BookCorpusError::StoreWrite { .. } => e,
            other => BookCorpusError::store_write(&self.path, other.to_string()),
        })
    }

    fn check_schema(&self, schema: &arrow_schema::Schema) -> Result<()> {
        for name in COLUMNS {
            let field = schema.field_with_name(name).map_err(|_| {
                BookCorpusError::store_read(&self.path, format!("missing column `{name}`"))
            })?;
            if field.data_type() != &DataType::Utf8 {
                return Err(BookCorpusError::store_read(
                    &self.path,
                    format!("column `{name}` is {}, expected Utf8", field.data_type()),
                ));
            }
        }
        Ok(())
    }
}
