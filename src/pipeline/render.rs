//! PDF rasterisation: render one page to a `DynamicImage` via pdfium.
//!
//! The orchestrator needs rasters twice per page (OCR input, figure crops)
//! and its tests need them without a pdfium library on the machine.
//! [`PageRasterizer`] is that seam: [`PdfiumRasterizer`] renders real pages,
//! tests plug in synthetic images.
//!
//! ## Threading
//!
//! pdfium keeps thread-local state and is not safe to share across the
//! blocking pool's threads. Each call binds, opens, renders and drops inside
//! one `spawn_blocking` closure.
//!
//! ## Oversized pages
//!
//! A poster page at 200 DPI can exceed 10 000 px per side. When either side
//! of the DPI render exceeds `max_dimension`, the page is rendered again at
//! 72 DPI. The rule depends only on the page and the DPI, so both call sites
//! get identical rasters.

use crate::error::{PageError, PdfOcrError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Renders single pages of one document. Must be deterministic for a fixed
/// page and DPI.
pub trait PageRasterizer: Send + Sync + 'static {
    /// Number of pages in the document.
    fn page_count(&self) -> Result<usize, PdfOcrError>;

    /// Render 1-based `page_num` at `dpi` as an RGB image.
    fn rasterize(&self, page_num: usize, dpi: u32) -> Result<DynamicImage, PageError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    path: PathBuf,
    password: Option<String>,
    max_dimension: u32,
}

impl PdfiumRasterizer {
    pub fn new(path: impl Into<PathBuf>, password: Option<String>, max_dimension: u32) -> Self {
        Self {
            path: path.into(),
            password,
            max_dimension,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The password is borrowed for as long as the document is open.
    fn open<'a>(&'a self, pdfium: &'a Pdfium) -> Result<PdfDocument<'a>, PdfOcrError> {
        pdfium
            .load_pdf_from_file(&self.path, self.password.as_deref())
            .map_err(|e| classify_load_error(&self.path, self.password.is_some(), format!("{:?}", e)))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn page_count(&self) -> Result<usize, PdfOcrError> {
        let pdfium = bind_pdfium()?;
        let document = self.open(&pdfium)?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);
        Ok(total)
    }

    fn rasterize(&self, page_num: usize, dpi: u32) -> Result<DynamicImage, PageError> {
        let render_err = |detail: String| PageError::RenderFailed {
            page: page_num,
            detail,
        };

        let pdfium = bind_pdfium().map_err(|e| render_err(e.to_string()))?;
        let document = self.open(&pdfium).map_err(|e| render_err(e.to_string()))?;
        let pages = document.pages();
        let total = pages.len() as usize;
        if page_num == 0 || page_num > total {
            return Err(render_err(format!("page out of range (document has {total})")));
        }

        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let mut image =
            render_at_scale(&page, raster_scale(dpi)).map_err(|e| render_err(format!("{:?}", e)))?;

        if image.width() > self.max_dimension || image.height() > self.max_dimension {
            warn!(
                "Page {}: {}x{} px at {} DPI exceeds {} px, rendering at 72 DPI",
                page_num,
                image.width(),
                image.height(),
                dpi,
                self.max_dimension
            );
            image = render_at_scale(&page, 1.0).map_err(|e| render_err(format!("{:?}", e)))?;
        }

        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );

        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }
}

/// pdfium renders at 72 points per inch.
pub fn raster_scale(dpi: u32) -> f32 {
    dpi as f32 / 72.0
}

fn render_at_scale(page: &PdfPage, scale: f32) -> Result<DynamicImage, PdfiumError> {
    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page.render_with_config(&config)?;
    Ok(bitmap.as_image())
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then a library next to the
/// working directory, then the system loader.
pub fn bind_pdfium() -> Result<Pdfium, PdfOcrError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            return Pdfium::bind_to_library(&path)
                .map(Pdfium::new)
                .map_err(|e| PdfOcrError::PdfiumBindingFailed(format!("'{}': {}", path, e)));
        }
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| PdfOcrError::PdfiumBindingFailed(e.to_string()))
}

/// Map a pdfium load failure onto the fatal error a user can act on.
fn classify_load_error(path: &Path, had_password: bool, detail: String) -> PdfOcrError {
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            PdfOcrError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            PdfOcrError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        PdfOcrError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}
