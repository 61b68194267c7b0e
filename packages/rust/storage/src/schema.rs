//! Column layout of the store file and conversion between record batches and
//! [`DocumentRecord`]s.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use bookcorpus_shared::{BookCorpusError, DocumentRecord, Result};

/// Column names, in file order.
pub const COLUMNS: [&str; 5] = ["key", "title", "author", "text", "language"];

static SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ))
});

/// The fixed five-column, all-UTF-8, non-nullable schema.
pub fn store_schema() -> SchemaRef {
    SCHEMA.clone()
}

/// Largest byte total any one column of a batch may hold. `Utf8` offsets are
/// `i32`, so a column past this size cannot be encoded.
pub(crate) const MAX_BATCH_BYTES: usize = i32::MAX as usize;

/// Encode records into batches, preserving order.
///
/// A new batch starts whenever adding the next row would push any column of
/// the current batch past `max_bytes`. A single row that exceeds `max_bytes`
/// on its own is a [`BookCorpusError::StoreWrite`]. No records still yield
/// one empty batch.
pub(crate) fn to_batches(
    records: &[DocumentRecord],
    path: &Path,
    max_bytes: usize,
) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut totals = [0usize; 5];

    for (i, record) in records.iter().enumerate() {
        let sizes = column_values(record).map(str::len);
        if let Some(col) = sizes.iter().position(|&len| len > max_bytes) {
            return Err(BookCorpusError::store_write(
                path,
                format!(
                    "record `{}`: column `{}` is {} bytes, limit is {max_bytes}",
                    record.key, COLUMNS[col], sizes[col]
                ),
            ));
        }

        let overflows = totals.iter().zip(sizes).any(|(total, len)| total + len > max_bytes);
        if overflows && i > start {
            batches.push(to_batch(&records[start..i], path)?);
            start = i;
            totals = [0; 5];
        }
        for (total, len) in totals.iter_mut().zip(sizes) {
            *total += len;
        }
    }

    if start < records.len() || batches.is_empty() {
        batches.push(to_batch(&records[start..], path)?);
    }
    Ok(batches)
}

fn to_batch(records: &[DocumentRecord], path: &Path) -> Result<RecordBatch> {
    let columns = (0..COLUMNS.len())
        .map(|col| -> ArrayRef {
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| column_values(r)[col]),
            ))
        })
        .collect::<Vec<_>>();

    RecordBatch::try_new(store_schema(), columns)
        .map_err(|e| BookCorpusError::store_write(path, e.to_string()))
}

/// A record's values in [`COLUMNS`] order.
fn column_values(record: &DocumentRecord) -> [&str; 5] {
    [
        record.key.as_str(),
        record.title.as_str(),
        record.author.as_str(),
        record.text.as_str(),
        record.language.as_str(),
    ]
}

/// Decode one batch, appending its rows to `out`.
///
/// Columns are looked up by name, so extra columns or a different column order
/// are tolerated. A missing or non-string column is rejected.
pub(crate) fn from_batch(
    batch: &RecordBatch,
    path: &Path,
    out: &mut Vec<DocumentRecord>,
) -> Result<()> {
    let [key, title, author, text, language] = COLUMNS.map(|name| string_column(batch, name, path));
    let (key, title, author, text, language) = (key?, title?, author?, text?, language?);

    for row in 0..batch.num_rows() {
        let value = |col: &StringArray| -> String {
            if col.is_null(row) {
                String::new()
            } else {
                col.value(row).to_string()
            }
        };
        out.push(DocumentRecord {
            key: value(key),
            title: value(title),
            author: value(author),
            text: value(text),
            language: value(language),
        });
    }

    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str, path: &Path) -> Result<&'a StringArray> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| BookCorpusError::store_read(path, format!("missing column `{name}`")))?;

    column.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
        BookCorpusError::store_read(
            path,
            format!("column `{name}` is {}, expected Utf8", column.data_type()),
        )
    })
}
