//! Progress Store: durable page → blocks mapping that makes runs resumable.
//!
//! The record lives beside the source PDF as `<name>.pdf.ocr_progress.json`:
//!
//! ```json
//! {
//!   "filename": "report.pdf",
//!   "pages": {
//!     "1": [ { "bbox": [..], "category": "Title", "text": "..." } ],
//!     "2": [ ... ]
//!   }
//! }
//! ```
//!
//! The whole record is rewritten after every recognized page. Writes go to a
//! sibling temp file that is then renamed over the real one, so a crash at
//! any point leaves either the previous record or the new one on disk, never
//! a torn file.
//!
//! Storage is behind [`ProgressBackend`]: [`JsonFileBackend`] for real runs,
//! [`MemoryBackend`] for tests and embedders that persist elsewhere.

use crate::block::PageResult;
use crate::error::ProgressError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Suffix appended to the PDF's file name to name its progress file.
pub const PROGRESS_SUFFIX: &str = ".ocr_progress.json";

/// The persisted record. Both fields are required; a file missing either is
/// treated as no progress at all. See [`ProgressRecord::from_json`] for how
/// individual bad pages are handled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressRecord {
    /// File name (not path) of the source PDF.
    pub filename: String,
    /// Recognized pages keyed by 1-based page number. Serialised with string
    /// keys in ascending numeric order.
    pub pages: BTreeMap<usize, PageResult>,
}

impl ProgressRecord {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            pages: BTreeMap::new(),
        }
    }

    /// Parse a stored record.
    ///
    /// Fails only if `filename` is not a string or `pages` is not an object.
    /// A page whose key is not a page number, or whose blocks do not decode,
    /// is dropped with a warning and will be recognized again.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let stored: StoredRecord = serde_json::from_str(raw)?;

        let mut pages = BTreeMap::new();
        for (key, value) in stored.pages {
            let Ok(page_num) = key.parse::<usize>() else {
                warn!("Dropping progress entry '{}': not a page number", key);
                continue;
            };
            match serde_json::from_value::<PageResult>(value) {
                Ok(blocks) => {
                    pages.insert(page_num, blocks);
                }
                Err(e) => warn!("Dropping stored page {}: {}", page_num, e),
            }
        }

        Ok(Self {
            filename: stored.filename,
            pages,
        })
    }
}

/// Top-level shape of the file; pages stay raw until decoded one by one.
#[derive(Deserialize)]
struct StoredRecord {
    filename: String,
    pages: Map<String, Value>,
}

/// Where a [`ProgressRecord`] is kept between runs.
pub trait ProgressBackend: Send + Sync {
    /// Read the stored record. Anything unreadable or structurally invalid
    /// yields `None`; loading never fails the run. Pages that cannot be
    /// decoded are left out rather than discarding the whole record.
    fn load(&self) -> Option<ProgressRecord>;

    /// Replace the stored record with `record`.
    fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}

// ── JSON file ────────────────────────────────────────────────────────────

/// Progress kept in a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional location next to `pdf_path`.
    pub fn beside(pdf_path: &Path) -> Self {
        Self::new(progress_path_for(pdf_path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// `<dir>/<file name>.ocr_progress.json` for a PDF at `<dir>/<file name>`.
pub fn progress_path_for(pdf_path: &Path) -> PathBuf {
    let mut name = pdf_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PROGRESS_SUFFIX);
    pdf_path.with_file_name(name)
}

impl ProgressBackend for JsonFileBackend {
    fn load(&self) -> Option<ProgressRecord> {
        if !self.path.exists() {
            info!("No progress file found, starting fresh");
            return None;
        }

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Failed to read progress file '{}': {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match ProgressRecord::from_json(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    "Ignoring invalid progress file '{}': {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.tmp_path();

        let io_err = |source| ProgressError::Io {
            path: self.path.clone(),
            source,
        };

        std::fs::write(&tmp, json.as_bytes()).map_err(io_err)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

// ── In memory ────────────────────────────────────────────────────────────

/// Progress kept in memory. Clones share the same slot, so a test can keep
/// one handle and inspect what the pipeline saved through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<ProgressRecord>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `record`.
    pub fn with_record(record: ProgressRecord) -> Self {
        let backend = Self::new();
        *backend.lock() = Some(record);
        backend
    }

    /// The last saved record.
    pub fn snapshot(&self) -> Option<ProgressRecord> {
        self.lock().clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ProgressRecord>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressBackend for MemoryBackend {
    fn load(&self) -> Option<ProgressRecord> {
        self.lock().clone()
    }

    fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        *self.lock() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// In-memory view of the progress record plus its backend.
///
/// Pages are only ever added. [`ProgressStore::put`] refuses to replace an
/// existing page, so a resumed run can never rewrite earlier results.
pub struct ProgressStore<B: ProgressBackend> {
    backend: B,
    record: ProgressRecord,
}

impl<B: ProgressBackend> ProgressStore<B> {
    /// An empty store for the PDF named `filename`.
    pub fn new(backend: B, filename: impl Into<String>) -> Self {
        Self {
            backend,
            record: ProgressRecord::new(filename),
        }
    }

    /// Load pages from the backend, replacing nothing already in memory.
    /// Returns the number of pages now known.
    pub fn load(&mut self) -> usize {
        let Some(loaded) = self.backend.load() else {
            return self.record.pages.len();
        };

        if loaded.filename != self.record.filename {
            warn!(
                "Progress file '{}' was written for '{}', not '{}'; using it anyway",
                self.backend.location(),
                loaded.filename,
                self.record.filename
            );
        }

        for (page, blocks) in loaded.pages {
            self.record.pages.entry(page).or_insert(blocks);
        }

        info!(
            "Loaded progress: {} pages already recognized",
            self.record.pages.len()
        );
        self.record.pages.len()
    }

    pub fn get(&self, page_num: usize) -> Option<&PageResult> {
        self.record.pages.get(&page_num)
    }

    /// Record `blocks` for `page_num`. Returns `false` (and keeps the old
    /// result) if the page is already present.
    pub fn put(&mut self, page_num: usize, blocks: PageResult) -> bool {
        if self.record.pages.contains_key(&page_num) {
            debug!("Page {} already recorded, keeping earlier result", page_num);
            return false;
        }
        self.record.pages.insert(page_num, blocks);
        true
    }

    pub fn contains(&self, page_num: usize) -> bool {
        self.record.pages.contains_key(&page_num)
    }

    pub fn len(&self) -> usize {
        self.record.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.pages.is_empty()
    }

    /// Recognized pages in ascending order.
    pub fn pages(&self) -> &BTreeMap<usize, PageResult> {
        &self.record.pages
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist the full record. A store with no pages is not written.
    pub fn save(&self) -> Result<(), ProgressError> {
        if self.record.pages.is_empty() {
            debug!("No recognized pages yet, progress not saved");
            return Ok(());
        }
        self.backend.save(&self.record)?;
        debug!(
            "Progress saved: {} pages → {}",
            self.record.pages.len(),
            self.backend.location()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Category};

    fn page(text: &str) -> PageResult {
        vec![Block::new(Category::Text, text)]
    }

    #[test]
    fn progress_file_sits_beside_pdf() {
        assert_eq!(
            progress_path_for(Path::new("/data/in/report.pdf")),
            PathBuf::from("/data/in/report.pdf.ocr_progress.json")
        );
    }

    #[test]
    fn file_round_trip_keeps_numeric_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("doc.pdf");
        let mut store = ProgressStore::new(JsonFileBackend::beside(&pdf), "doc.pdf");
        for n in [10, 2, 1] {
            assert!(store.put(n, page(&format!("p{n}"))));
        }
        store.save().unwrap();

        let raw = std::fs::read_to_string(progress_path_for(&pdf)).unwrap();
        let k1 = raw.find("\"1\"").unwrap();
        let k2 = raw.find("\"2\"").unwrap();
        let k10 = raw.find("\"10\"").unwrap();
        assert!(k1 < k2 && k2 < k10, "keys out of order:\n{raw}");
        assert!(raw.contains("\n  \"filename\": \"doc.pdf\""), "2-space indent");
        assert!(!dir.path().join("doc.pdf.ocr_progress.json.tmp").exists());

        let mut fresh = ProgressStore::new(JsonFileBackend::beside(&pdf), "doc.pdf");
        assert_eq!(fresh.load(), 3);
        assert_eq!(fresh.get(10), Some(&page("p10")));
        assert_eq!(fresh.pages().keys().copied().collect::<Vec<_>>(), vec![1, 2, 10]);
    }

    #[test]
    fn non_ascii_text_is_written_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("p.json"));
        let mut store = ProgressStore::new(backend.clone(), "x.pdf");
        store.put(1, page("Überblick — 概要"));
        store.save().unwrap();
        let raw = std::fs::read_to_string(backend.path()).unwrap();
        assert!(raw.contains("Überblick — 概要"));
    }

    #[test]
    fn missing_pages_key_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, r#"{"filename": "doc.pdf"}"#).unwrap();
        assert_eq!(JsonFileBackend::new(&path).load(), None);

        let mut store = ProgressStore::new(JsonFileBackend::new(&path), "doc.pdf");
        assert_eq!(store.load(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn garbage_and_wrong_shapes_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");

        for raw in [
            "{ truncated",
            r#"{"filename":"a.pdf","pages":[]}"#,
            r#"{"filename":7,"pages":{}}"#,
        ] {
            std::fs::write(&path, raw).unwrap();
            assert_eq!(JsonFileBackend::new(&path).load(), None, "{raw}");
        }
    }

    #[test]
    fn non_numeric_page_key_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"filename":"a.pdf","pages":{"one":[],"2":[{"category":"Text","text":"b"}]}}"#,
        )
        .unwrap();

        let rec = JsonFileBackend::new(&path).load().unwrap();
        assert_eq!(rec.filename, "a.pdf");
        assert_eq!(rec.pages.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn undecodable_page_is_dropped_and_others_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf.ocr_progress.json");
        let raw = r#"{
          "filename": "doc.pdf",
          "pages": {
            "1": [{"bbox": [0, 0, 10, 10], "category": "Title", "text": "One"}],
            "2": [{"category": "Text", "text": "Two"}],
            "3": [{"bbox": [0, 0, 5, 5], "text": "no category"}]
          }
        }"#;
        std::fs::write(&path, raw).unwrap();

        let mut store = ProgressStore::new(JsonFileBackend::new(&path), "doc.pdf");
        assert_eq!(store.load(), 2);
        assert_eq!(store.get(2), Some(&page("Two")));
        assert!(store.contains(1));
        assert!(!store.contains(3));
    }

    #[test]
    fn missing_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(JsonFileBackend::new(dir.path().join("none.json")).load(), None);
    }

    #[test]
    fn empty_store_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("p.json"));
        let store = ProgressStore::new(backend.clone(), "doc.pdf");
        store.save().unwrap();
        assert!(!backend.path().exists());
    }

    #[test]
    fn save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("missing_dir").join("p.json"));
        let mut store = ProgressStore::new(backend, "doc.pdf");
        store.put(1, page("x"));
        assert!(matches!(store.save(), Err(ProgressError::Io { .. })));
        assert_eq!(store.len(), 1, "in-memory state survives a failed save");
    }

    #[test]
    fn put_never_replaces_a_page() {
        let mut store = ProgressStore::new(MemoryBackend::new(), "doc.pdf");
        assert!(store.put(1, page("first")));
        assert!(!store.put(1, page("second")));
        assert_eq!(store.get(1), Some(&page("first")));
    }

    #[test]
    fn filename_mismatch_still_loads() {
        let mut rec = ProgressRecord::new("other.pdf");
        rec.pages.insert(1, page("a"));
        let mut store = ProgressStore::new(MemoryBackend::with_record(rec), "doc.pdf");
        assert_eq!(store.load(), 1);
        assert_eq!(store.record().filename, "doc.pdf");
    }

    #[test]
    fn memory_backend_clones_share_state() {
        let backend = MemoryBackend::new();
        let mut store = ProgressStore::new(backend.clone(), "doc.pdf");
        store.put(3, page("c"));
        store.save().unwrap();
        assert_eq!(backend.save_count(), 1);
        assert_eq!(backend.snapshot().unwrap().pages.len(), 1);
    }
}
