//! Error types for the pdfocr library.
//!
//! Four error types mirror the four ways a run can go wrong, ordered by how
//! much damage they do:
//!
//! * [`PdfOcrError`]: **Fatal**: the run cannot start or cannot finish
//!   (bad input file, OCR service not ready, markdown cannot be written).
//!   Returned as `Err(PdfOcrError)` from the top-level `convert*` functions.
//!
//! * [`PageError`]: **Recoverable**: one page could not be recognized.
//!   The page is left out of the progress record and the loop moves on; the
//!   next run retries it.
//!
//! * [`ProgressError`]: **Recoverable**: the progress file could not be
//!   written. The run continues in memory; only resumability suffers.
//!
//! * [`ExtractError`]: **Recoverable**: one figure crop could not be
//!   produced. The remaining crops are still attempted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfocr library.
///
/// Only input problems and an unavailable OCR service stop a run before page
/// work begins; everything page-scoped uses [`PageError`] instead.
#[derive(Debug, Error)]
pub enum PdfOcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file name does not carry a `.pdf` extension.
    #[error("File must be a PDF: '{path}'")]
    NotPdfExtension { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── Service errors ────────────────────────────────────────────────────
    /// The health probe failed or the service reported no model loaded.
    #[error("OCR service at '{url}' is not ready: {reason}\nStart the OCR server first.")]
    ServiceUnavailable { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the markdown file.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or install libpdfium where the\n\
system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable failure to recognize a single page.
///
/// The page stays absent from the progress record, so a later run picks it
/// up again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Resizing or PNG-encoding the raster failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The OCR endpoint answered with a non-200 status.
    #[error("Page {page}: OCR request failed with HTTP {status}")]
    HttpStatus { page: usize, status: u16 },

    /// The request could not be sent or the connection dropped.
    #[error("Page {page}: transport error: {detail}")]
    Transport { page: usize, detail: String },

    /// The request exceeded the per-page timeout.
    #[error("Page {page}: OCR request timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// Neither the cleaner nor a direct JSON parse produced a block list.
    #[error("Page {page}: unusable OCR output ({chars} chars): {detail}")]
    Unparseable {
        page: usize,
        chars: usize,
        detail: String,
    },

    /// The output parsed, but contained no blocks.
    #[error("Page {page}: OCR output contained no blocks")]
    NoBlocks { page: usize },
}

impl PageError {
    /// The 1-based page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::HttpStatus { page, .. }
            | PageError::Transport { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::Unparseable { page, .. }
            | PageError::NoBlocks { page } => *page,
        }
    }
}

/// The progress file could not be written.
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Failed to write progress file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialise progress record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One figure crop could not be produced.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{filename}: page {page} could not be rasterised: {detail}")]
    RenderFailed {
        filename: String,
        page: usize,
        detail: String,
    },

    #[error("{filename}: bbox {bbox} does not cover any pixels of a {width}x{height} raster")]
    EmptyRegion {
        filename: String,
        bbox: String,
        width: u32,
        height: u32,
    },

    #[error("{filename}: failed to save '{path}': {source}")]
    SaveFailed {
        filename: String,
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
