//! End-to-end pipeline: package → manifest → filter → normalize → assemble → store.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use bookcorpus_opf::load_manifest;
use bookcorpus_shared::{
    BookCorpusError, DocumentRecord, ExtractConfig, PackageDescriptor, Result,
};
use bookcorpus_storage::{ArrowStore, UpsertOutcome};

use crate::assembler::assemble;
use crate::filter::{ContentFilter, select_candidates};
use crate::progress::ProgressLedger;

// ---------------------------------------------------------------------------
// Options, outcomes, progress
// ---------------------------------------------------------------------------

/// Options for [`run_catalog`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Per-package extraction settings.
    pub extract: ExtractConfig,
    /// Reprocess packages even when the ledger says they are current.
    pub force: bool,
}

/// What happened to one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// Extracted and upserted.
    Stored(UpsertOutcome),
    /// Ledger says the stored version is current.
    Skipped,
    /// Extraction failed; the ledger entry was not advanced.
    Failed(String),
}

/// Totals for one [`run_catalog`] call.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The run stopped early on a cancellation request.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Number of packages the run looked at.
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a package is looked at.
    fn package_started(&self, name: &str, current: usize, total: usize);
    /// Called once a package has an outcome.
    fn package_finished(&self, name: &str, outcome: &PackageOutcome);
    /// Called when the run completes (or is cancelled).
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn package_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn package_finished(&self, _name: &str, _outcome: &PackageOutcome) {}
    fn done(&self, _summary: &RunSummary) {}
}

// ---------------------------------------------------------------------------
// Single package
// ---------------------------------------------------------------------------

/// Extract one package directory into a record for `key`.
///
/// 1. Load the manifest at `config.manifest_path` under `dir`
/// 2. Resolve the spine relative to the manifest's directory
/// 3. Drop boilerplate by name, cap to `config.max_files`
/// 4. Read each file, drop boilerplate by content, normalize
/// 5. Assemble the non-empty fragments in spine order
///
/// Content files listed in the spine but absent on disk are skipped.
#[instrument(skip_all, fields(dir = %dir.display(), key = %key))]
pub fn extract_package(
    dir: &Path,
    key: &str,
    config: &ExtractConfig,
    filter: &dyn ContentFilter,
) -> Result<DocumentRecord> {
    let manifest_path = dir.join(&config.manifest_path);
    let manifest = load_manifest(&manifest_path)?;
    let base_dir = manifest_path.parent().unwrap_or(dir);

    let spine = manifest.resolve_spine(base_dir);
    let candidates = select_candidates(&spine, filter, config.max_files);
    debug!(spine = spine.len(), candidates = candidates.len(), "candidates selected");

    let mut fragments = Vec::with_capacity(candidates.len());
    for path in &candidates {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "content file missing, skipping");
                continue;
            }
            Err(e) => return Err(BookCorpusError::io(path, e)),
        };
        let content = String::from_utf8_lossy(&bytes);

        if filter.excludes_content(&content) {
            debug!(path = %path.display(), "excluded by content");
            continue;
        }

        let fragment = bookcorpus_markdown::normalize(&content);
        if fragment.is_empty() {
            debug!(path = %path.display(), "no text after normalization");
            continue;
        }
        fragments.push(fragment);
    }

    let record = assemble(key, manifest.metadata, &fragments)?;
    info!(
        fragments = fragments.len(),
        words = bookcorpus_markdown::count_words(&record.text),
        title = %record.title,
        "package extracted"
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// Catalog driver
// ---------------------------------------------------------------------------

/// Process `packages` one at a time into `store`.
///
/// Packages the ledger reports as current are skipped. A package whose
/// extraction or upsert fails is logged and counted, and the run moves on;
/// its ledger entry is not advanced. After each successful upsert the ledger
/// is advanced and saved. `cancel` is checked between packages, so the store
/// always holds whole upserts.
#[instrument(skip_all, fields(packages = packages.len(), store = %store.path().display()))]
pub fn run_catalog(
    packages: &[PackageDescriptor],
    store: &ArrowStore,
    ledger: &mut ProgressLedger,
    filter: &dyn ContentFilter,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
    cancel: &AtomicBool,
) -> RunSummary {
    let start = Instant::now();
    let mut summary = RunSummary::default();
    let total = packages.len();

    progress.phase("Processing packages");
    info!(total, force = options.force, "starting catalog run");

    for (i, package) in packages.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!(remaining = total - i, "cancellation requested, stopping");
            summary.cancelled = true;
            break;
        }

        progress.package_started(&package.name, i + 1, total);

        if !ledger.needs_processing(package, options.force) {
            debug!(name = %package.name, version = %package.version, "up to date, skipping");
            summary.skipped += 1;
            progress.package_finished(&package.name, &PackageOutcome::Skipped);
            continue;
        }

        let record = match extract_package(&package.path, &package.key, &options.extract, filter) {
            Ok(record) => record,
            Err(e) => {
                if e.is_package_error() {
                    warn!(name = %package.name, error = %e, "package skipped");
                } else {
                    error!(name = %package.name, error = %e, "package failed");
                }
                summary.failed += 1;
                progress.package_finished(&package.name, &PackageOutcome::Failed(e.to_string()));
                continue;
            }
        };

        let outcome = match store.upsert(&record) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(name = %package.name, error = %e, "upsert failed, store unchanged");
                summary.failed += 1;
                progress.package_finished(&package.name, &PackageOutcome::Failed(e.to_string()));
                continue;
            }
        };

        ledger.mark_processed(package, &record);
        if let Err(e) = ledger.save() {
            // The entry stays in memory and goes out with the next save.
            warn!(name = %package.name, error = %e, "progress ledger not saved");
        }

        summary.processed += 1;
        progress.package_finished(&package.name, &PackageOutcome::Stored(outcome));
    }

    summary.elapsed = start.elapsed();
    progress.done(&summary);

    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        elapsed_ms = summary.elapsed.as_millis(),
        "catalog run complete"
    );

    summary
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::filter::HeuristicFilter;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bc-pipeline-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn xhtml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Ignored head title</title></head>
<body>{body}</body>
</html>"#
        )
    }

    /// Write a package under `root/name` with the given spine files
    /// (`(file name, body markup)`, in order). Returns the package dir.
    fn write_package(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = root.join(name);
        let epub = dir.join("src/epub");
        std::fs::create_dir_all(epub.join("text")).unwrap();

        let mut manifest = String::new();
        let mut spine = String::new();
        for (file, body) in files {
            manifest.push_str(&format!(
                r#"<item id="{file}" href="text/{file}" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="{file}"/>"#));
            std::fs::write(epub.join("text").join(file), xhtml(body)).unwrap();
        }

        let opf = format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{name} title</dc:title>
    <dc:creator>James Joyce</dc:creator>
    <dc:language>en-GB</dc:language>
  </metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#
        );
        std::fs::write(epub.join("content.opf"), opf).unwrap();
        dir
    }

    fn descriptor(dir: &Path, name: &str, version: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: name.into(),
            key: format!("https://example.org/{name}"),
            version: version.into(),
            path: dir.to_path_buf(),
        }
    }

    /// Records the outcomes it is told about.
    #[derive(Default)]
    struct RecordingProgress {
        outcomes: Mutex<Vec<(String, PackageOutcome)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}
        fn package_started(&self, _name: &str, _current: usize, _total: usize) {}
        fn package_finished(&self, name: &str, outcome: &PackageOutcome) {
            self.outcomes
                .lock()
                .unwrap()
                .push((name.to_string(), outcome.clone()));
        }
        fn done(&self, _summary: &RunSummary) {}
    }

    #[test]
    fn extract_preserves_spine_order() {
        let tmp = temp_dir();
        let dir = write_package(
            &tmp,
            "dubliners",
            &[
                ("a.xhtml", "<p>Alpha</p>"),
                ("b.xhtml", "<p>Beta</p>"),
                ("c.xhtml", "<p>Gamma</p>"),
            ],
        );

        let record = extract_package(
            &dir,
            "k",
            &ExtractConfig::default(),
            &HeuristicFilter::default(),
        )
        .unwrap();

        assert_eq!(record.text, "Alpha\n\nBeta\n\nGamma");
        assert_eq!(record.title, "dubliners title");
        assert_eq!(record.author, "James Joyce");
        assert_eq!(record.language, "en-GB");
        assert!(!record.text.contains("Ignored head title"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extract_drops_boilerplate_by_name_and_content() {
        let tmp = temp_dir();
        let dir = write_package(
            &tmp,
            "dubliners",
            &[
                ("titlepage.xhtml", "<h1>Dubliners</h1>"),
                ("the-sisters.xhtml", "<h2>The Sisters</h2><p>There was no hope.</p>"),
                ("rights.xhtml", "<p>Copyright 1914. ALL RIGHTS RESERVED.</p>"),
                ("colophon.xhtml", "<p>Set in Garamond.</p>"),
            ],
        );

        let record = extract_package(
            &dir,
            "k",
            &ExtractConfig::default(),
            &HeuristicFilter::default(),
        )
        .unwrap();

        assert_eq!(record.text, "## The Sisters\n\nThere was no hope.");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extract_respects_max_files() {
        let tmp = temp_dir();
        let dir = write_package(
            &tmp,
            "capped",
            &[
                ("titlepage.xhtml", "<p>Title</p>"),
                ("a.xhtml", "<p>One</p>"),
                ("b.xhtml", "<p>Two</p>"),
                ("c.xhtml", "<p>Three</p>"),
            ],
        );
        let config = ExtractConfig {
            max_files: Some(2),
            ..ExtractConfig::default()
        };

        let record =
            extract_package(&dir, "k", &config, &HeuristicFilter::default()).unwrap();
        assert_eq!(record.text, "One\n\nTwo");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extract_skips_missing_content_files() {
        let tmp = temp_dir();
        let dir = write_package(
            &tmp,
            "holey",
            &[("a.xhtml", "<p>One</p>"), ("b.xhtml", "<p>Two</p>")],
        );
        std::fs::remove_file(dir.join("src/epub/text/a.xhtml")).unwrap();

        let record = extract_package(
            &dir,
            "k",
            &ExtractConfig::default(),
            &HeuristicFilter::default(),
        )
        .unwrap();
        assert_eq!(record.text, "Two");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extract_all_filtered_is_no_extractable_content() {
        let tmp = temp_dir();
        let dir = write_package(
            &tmp,
            "front-matter-only",
            &[
                ("titlepage.xhtml", "<h1>Title</h1>"),
                ("imprint.xhtml", "<p>Imprint</p>"),
                ("empty.xhtml", "<p>  </p>"),
            ],
        );

        let err = extract_package(
            &dir,
            "front-matter-only",
            &ExtractConfig::default(),
            &HeuristicFilter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BookCorpusError::NoExtractableContent { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn extract_without_manifest_is_manifest_missing() {
        let tmp = temp_dir();
        let err = extract_package(
            &tmp,
            "k",
            &ExtractConfig::default(),
            &HeuristicFilter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BookCorpusError::ManifestMissing { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn run_catalog_stores_skips_and_isolates_failures() {
        let tmp = temp_dir();
        let good = write_package(&tmp, "good", &[("ch1.xhtml", "<p>Good book.</p>")]);
        let empty = write_package(&tmp, "empty", &[("titlepage.xhtml", "<p>Only a title</p>")]);
        let other = write_package(&tmp, "other", &[("ch1.xhtml", "<p>Other book.</p>")]);

        let packages = vec![
            descriptor(&good, "good", "v1"),
            descriptor(&empty, "empty", "v1"),
            descriptor(&tmp.join("nowhere"), "missing", "v1"),
            descriptor(&other, "other", "v1"),
        ];

        let store = ArrowStore::new(tmp.join("books.arrow"));
        let ledger_path = tmp.join("books_list.json");
        let mut ledger = ProgressLedger::load(&ledger_path).unwrap();
        let cancel = AtomicBool::new(false);
        let progress = RecordingProgress::default();

        let summary = run_catalog(
            &packages,
            &store,
            &mut ledger,
            &HeuristicFilter::default(),
            &RunOptions::default(),
            &progress,
            &cancel,
        );

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 0);
        assert!(!summary.cancelled);

        let rows = store.read_all().unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["https://example.org/good", "https://example.org/other"]);

        // Failed packages are not recorded, so the next run retries them.
        let saved = ProgressLedger::load(&ledger_path).unwrap();
        assert_eq!(saved.entries().len(), 2);
        assert!(saved.get("https://example.org/empty").is_none());

        let outcomes = progress.outcomes.lock().unwrap();
        assert_eq!(outcomes[0].1, PackageOutcome::Stored(UpsertOutcome::Inserted));
        assert!(matches!(outcomes[1].1, PackageOutcome::Failed(_)));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn run_catalog_resumes_from_ledger() {
        let tmp = temp_dir();
        let dir = write_package(&tmp, "book", &[("ch1.xhtml", "<p>First edition.</p>")]);
        let store = ArrowStore::new(tmp.join("books.arrow"));
        let ledger_path = tmp.join("books_list.json");
        let cancel = AtomicBool::new(false);

        let run = |version: &str, force: bool| {
            let mut ledger = ProgressLedger::load(&ledger_path).unwrap();
            run_catalog(
                &[descriptor(&dir, "book", version)],
                &store,
                &mut ledger,
                &HeuristicFilter::default(),
                &RunOptions {
                    force,
                    ..RunOptions::default()
                },
                &SilentProgress,
                &cancel,
            )
        };

        assert_eq!(run("v1", false).processed, 1);
        assert_eq!(run("v1", false).skipped, 1);

        // A new version marker replaces the row instead of adding one.
        std::fs::write(
            dir.join("src/epub/text/ch1.xhtml"),
            xhtml("<p>Second edition.</p>"),
        )
        .unwrap();
        assert_eq!(run("v2", false).processed, 1);
        assert_eq!(run("v2", true).processed, 1);

        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "Second edition.");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn run_catalog_continues_after_store_failure() {
        let tmp = temp_dir();
        let first = write_package(&tmp, "first", &[("ch1.xhtml", "<p>One.</p>")]);
        let second = write_package(&tmp, "second", &[("ch1.xhtml", "<p>Two.</p>")]);

        // The store's parent directory is a regular file, so every upsert fails.
        let blocker = tmp.join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = ArrowStore::new(blocker.join("books.arrow"));
        let mut ledger = ProgressLedger::new(tmp.join("books_list.json"));
        let cancel = AtomicBool::new(false);

        let summary = run_catalog(
            &[descriptor(&first, "first", "v1"), descriptor(&second, "second", "v1")],
            &store,
            &mut ledger,
            &HeuristicFilter::default(),
            &RunOptions::default(),
            &SilentProgress,
            &cancel,
        );

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.processed, 0);
        assert!(ledger.entries().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn run_catalog_stops_when_cancelled() {
        let tmp = temp_dir();
        let dir = write_package(&tmp, "book", &[("ch1.xhtml", "<p>Text.</p>")]);
        let store = ArrowStore::new(tmp.join("books.arrow"));
        let mut ledger = ProgressLedger::new(tmp.join("books_list.json"));
        let cancel = AtomicBool::new(true);

        let summary = run_catalog(
            &[descriptor(&dir, "book", "v1")],
            &store,
            &mut ledger,
            &HeuristicFilter::default(),
            &RunOptions::default(),
            &SilentProgress,
            &cancel,
        );

        assert!(summary.cancelled);
        assert_eq!(summary.total(), 0);
        assert!(!store.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
