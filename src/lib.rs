//! # pdfocr
//!
//! Resumable PDF → markdown conversion through a layout-OCR service.
//!
//! Each page is rasterised, resized to the model's patch grid, and sent to
//! an OCR service that streams back a JSON list of typed layout blocks
//! (title, text, picture, caption, footnote, header, …). Recognized pages are
//! saved beside the PDF after every page, so an interrupted or partially
//! failed run picks up where it left off. Once recognition ends, the blocks
//! are reassembled into markdown and figure regions are cropped into PNGs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Health     GET /health, model must be loaded (fatal otherwise)
//!  ├─ 2. Resume     load <name>.pdf.ocr_progress.json
//!  ├─ 3. Render     rasterise each missing page via pdfium (spawn_blocking)
//!  ├─ 4. Geometry   sides → multiples of 28, area within pixel bounds
//!  ├─ 5. Recognize  POST /ocr, stream NDJSON, clean into blocks
//!  ├─ 6. Persist    rewrite the progress file after every page
//!  ├─ 7. Assemble   blocks → markdown + crop list
//!  └─ 8. Extract    crop figures → <stem>_page_<N>_<x1>_<x2>_<y1>_<y2>.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfocr::{convert, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .api_base("http://localhost:5123")
//!         .build()?;
//!     let report = convert("paper.pdf", "paper_md/", &config).await?;
//!     if !report.success() {
//!         eprintln!("incomplete: {} pages missing", report.missing_pages());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfocr = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod block;
pub mod config;
pub mod convert;
pub mod error;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use block::{BBox, Block, Category, PageResult};
pub use config::{OcrConfig, OcrConfigBuilder, LAYOUT_PROMPT_TYPE};
pub use convert::{convert, convert_sync, convert_until, Pipeline};
pub use error::{ExtractError, PageError, PdfOcrError, ProgressError};
pub use observer::{NoopObserver, PipelineObserver};
pub use output::{FailedPage, RunReport, RunState};
pub use pipeline::assemble::{assemble, AssembledDocument, CropRequest};
pub use pipeline::clean::{LayoutOutputCleaner, OutputCleaner};
pub use pipeline::geometry::{normalize, GeometryBounds};
pub use pipeline::recognize::{HttpOcrService, OcrRequest, OcrService, Recognizer};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{JsonFileBackend, MemoryBackend, ProgressBackend, ProgressRecord, ProgressStore};
