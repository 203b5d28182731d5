//! Image extraction: cut figure regions out of page rasters and save them.
//!
//! Each [`CropRequest`] is handled on its own; a page that will not render or
//! a bbox that covers no pixels fails that crop only. Requests arrive grouped
//! by page, so the last page raster is kept and reused for consecutive crops.
//! A raised cancel flag stops the loop before the next crop.

use crate::error::ExtractError;
use crate::pipeline::assemble::CropRequest;
use crate::pipeline::render::PageRasterizer;
use crate::pipeline::stage::RasterStage;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What extraction produced.
#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ExtractError>,
}

/// Crop and save every request under `out_dir`.
///
/// Pages come from `stage` when this run already rendered them, otherwise
/// from `rasterizer` at `dpi`. Existing files with the same name are
/// overwritten. Once `cancel` is set, the remaining crops are not attempted.
pub fn extract_images<R: PageRasterizer + ?Sized>(
    rasterizer: &R,
    stage: Option<&RasterStage>,
    crops: &[CropRequest],
    out_dir: &Path,
    dpi: u32,
    cancel: &AtomicBool,
) -> ExtractSummary {
    let mut summary = ExtractSummary::default();
    if crops.is_empty() {
        return summary;
    }
    info!("Extracting {} images", crops.len());

    let mut current: Option<(usize, Result<DynamicImage, String>)> = None;

    for (done, crop) in crops.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!(
                "Image extraction cancelled, {} of {} not attempted",
                crops.len() - done,
                crops.len()
            );
            break;
        }

        let cached = matches!(&current, Some((page, _)) if *page == crop.page_num);
        if !cached {
            let raster = stage
                .and_then(|s| s.get(crop.page_num))
                .map(Ok)
                .unwrap_or_else(|| {
                    rasterizer
                        .rasterize(crop.page_num, dpi)
                        .map_err(|e| e.to_string())
                });
            current = Some((crop.page_num, raster));
        }

        let result = match &current {
            Some((_, Ok(page))) => save_crop(page, crop, out_dir),
            Some((_, Err(detail))) => Err(ExtractError::RenderFailed {
                filename: crop.filename.clone(),
                page: crop.page_num,
                detail: detail.clone(),
            }),
            None => continue,
        };

        match result {
            Ok(path) => {
                debug!("Extracted {}", crop.filename);
                summary.written.push(path);
            }
            Err(e) => {
                warn!("Failed to extract image: {}", e);
                summary.failures.push(e);
            }
        }
    }

    info!(
        "Image extraction: {} written, {} failed",
        summary.written.len(),
        summary.failures.len()
    );
    summary
}

fn save_crop(
    page: &DynamicImage,
    crop: &CropRequest,
    out_dir: &Path,
) -> Result<PathBuf, ExtractError> {
    let (width, height) = (page.width(), page.height());
    let (x, y, w, h) = crop
        .bbox
        .clip_to(width, height)
        .ok_or_else(|| ExtractError::EmptyRegion {
            filename: crop.filename.clone(),
            bbox: crop.bbox.to_string(),
            width,
            height,
        })?;

    let path = out_dir.join(&crop.filename);
    page.crop_imm(x, y, w, h)
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|source| ExtractError::SaveFailed {
            filename: crop.filename.clone(),
            path: path.clone(),
            source,
        })?;
    Ok(path)
}
