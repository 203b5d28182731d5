//! Transient raster staging area.
//!
//! Every page rendered for OCR is also written here as a lossless PNG, and the
//! image extractor looks here before rendering a page again. The directory is
//! a [`TempDir`], so it disappears when the run ends, on every exit path
//! including panics. Nothing reads from it for correctness: a missing or
//! unreadable entry just means the page is rendered again.

use image::{DynamicImage, ImageFormat};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::{debug, warn};

pub struct RasterStage {
    dir: TempDir,
}

impl RasterStage {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("pdfocr_").tempdir()?;
        debug!("Raster staging area: {}", dir.path().display());
        Ok(Self { dir })
    }

    fn page_path(&self, page_num: usize) -> PathBuf {
        self.dir.path().join(format!("page_{page_num}.png"))
    }

    /// Stage the raster for `page_num`. Failures are logged and ignored.
    pub fn put(&self, page_num: usize, image: &DynamicImage) {
        let path = self.page_path(page_num);
        if let Err(e) = image.save_with_format(&path, ImageFormat::Png) {
            warn!("Could not stage page {}: {}", page_num, e);
        }
    }

    /// The staged raster for `page_num`, if one was written this run.
    pub fn get(&self, page_num: usize) -> Option<DynamicImage> {
        let path = self.page_path(page_num);
        if !path.exists() {
            return None;
        }
        match image::open(&path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("Ignoring unreadable staged page {}: {}", page_num, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn staged_raster_reads_back_identically() {
        let stage = RasterStage::new().unwrap();
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(12, 7, |x, y| {
            Rgb([x as u8 * 20, y as u8 * 30, 99])
        }));

        assert!(stage.get(3).is_none());
        stage.put(3, &img);
        let back = stage.get(3).expect("page 3 staged");
        assert_eq!(back.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let stage = RasterStage::new().unwrap();
        let dir = stage.dir.path().to_path_buf();
        assert!(dir.exists());
        drop(stage);
        assert!(!dir.exists());
    }
}
