//! Atomic whole-file publish: write a scratch file next to the target, sync it,
//! then rename it over the target in one step.
//!
//! Readers see either the previous file or the complete new one. A failure at
//! any point removes the scratch file and leaves the target untouched.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{BookCorpusError, Result};

/// Replace `path` with whatever `write` produces, atomically.
///
/// The scratch file lives in the target's directory so the final rename never
/// crosses a filesystem boundary.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir).map_err(|e| BookCorpusError::io(&dir, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| {
            BookCorpusError::validation(format!("{} has no file name", path.display()))
        })?
        .to_string_lossy();
    let scratch = dir.join(format!(".{file_name}.{}.tmp", Uuid::now_v7()));

    let result = write_scratch(&scratch, write).and_then(|()| {
        std::fs::rename(&scratch, path).map_err(|e| BookCorpusError::io(path, e))
    });

    if let Err(e) = result {
        // Best effort; the scratch file may never have been created.
        let _ = std::fs::remove_file(&scratch);
        return Err(e);
    }

    sync_dir(&dir);
    debug!(path = %path.display(), "published file");
    Ok(())
}

/// Atomically replace `path` with `bytes`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(bytes).map_err(|e| BookCorpusError::io(path, e))
    })
}

fn write_scratch<F>(scratch: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(scratch)
        .map_err(|e| BookCorpusError::io(scratch, e))?;

    let mut out = BufWriter::new(file);
    write(&mut out)?;

    let file = out
        .into_inner()
        .map_err(|e| BookCorpusError::io(scratch, e.into_error()))?;
    file.sync_all().map_err(|e| BookCorpusError::io(scratch, e))?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Persist the rename itself. Not available on every platform; failures only
/// weaken durability, never consistency.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "directory sync failed");
    }
    #[cfg(not(unix))]
    let _ = dir;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bc-publish-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn leftover_scratch_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with('.'))
            .collect()
    }

    #[test]
    fn write_creates_and_replaces() {
        let tmp = temp_dir();
        let target = tmp.join("ledger.json");

        write_bytes_atomic(&target, b"first").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        write_bytes_atomic(&target, b"second").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(leftover_scratch_files(&tmp).is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let tmp = temp_dir();
        let target = tmp.join("store.bin");
        write_bytes_atomic(&target, b"committed").unwrap();

        let result = write_atomic(&target, |out| {
            out.write_all(b"partial").unwrap();
            Err(BookCorpusError::validation("encoder failed"))
        });

        assert!(result.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"committed");
        assert!(leftover_scratch_files(&tmp).is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_creates_missing_parent_dirs() {
        let tmp = temp_dir();
        let target = tmp.join("nested/dir/out.txt");

        write_bytes_atomic(&target, b"ok").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "ok");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
