//! Pipeline stages for PDF-to-markdown OCR.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; [`crate::convert`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ geometry ──▶ encode ──▶ recognize ──▶ (progress)
//!             │                                   │
//!             └──▶ stage                          clean
//!
//! (progress) ──▶ assemble ──▶ extract
//! ```
//!
//! 1. [`input`]     validate the source path and PDF magic
//! 2. [`render`]    rasterise one page via pdfium; blocking, run in
//!    `spawn_blocking`
//! 3. [`stage`]     keep this run's rasters in a temp dir for the extractor
//! 4. [`geometry`]  pick the factor-aligned OCR input size
//! 5. [`encode`]    resize and base64-PNG the raster
//! 6. [`recognize`] streamed OCR call, with [`clean`] turning text into blocks
//! 7. [`assemble`]  recognized pages → markdown + crop list
//! 8. [`extract`]   crop figures and write them as PNG

pub mod assemble;
pub mod clean;
pub mod encode;
pub mod extract;
pub mod geometry;
pub mod input;
pub mod recognize;
pub mod render;
pub mod stage;
