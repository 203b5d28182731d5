//! Geometry normalisation: pick the OCR input size for a rendered page.
//!
//! The vision encoder behind the OCR service cuts images into
//! `factor` × `factor` patches and has a fixed patch budget. Its input must
//! therefore have both sides divisible by `factor` and a total pixel count
//! within `[min_pixels, max_pixels]`. Within those constraints we keep the
//! page's aspect ratio as close as the grid allows, so text is not stretched.
//!
//! This module is pure arithmetic with no I/O.

use crate::error::PdfOcrError;

/// Validated `factor` / pixel-count bounds.
///
/// Validation guarantees [`GeometryBounds::normalize`] always lands inside
/// the bounds: a `factor × factor` image must fit under `max_pixels`, and
/// `max_pixels` must leave room for one `factor` step above `min_pixels`
/// (`max_pixels ≥ 2 · min_pixels`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBounds {
    factor: u32,
    min_pixels: u64,
    max_pixels: u64,
}

impl GeometryBounds {
    pub fn new(factor: u32, min_pixels: u64, max_pixels: u64) -> Result<Self, PdfOcrError> {
        if factor == 0 {
            return Err(PdfOcrError::InvalidConfig("factor must be ≥ 1".into()));
        }
        let cell = u64::from(factor) * u64::from(factor);
        if max_pixels < cell {
            return Err(PdfOcrError::InvalidConfig(format!(
                "max_pixels ({max_pixels}) must be at least factor² ({cell})"
            )));
        }
        if max_pixels < min_pixels.saturating_mul(2) {
            return Err(PdfOcrError::InvalidConfig(format!(
                "max_pixels ({max_pixels}) must be at least twice min_pixels ({min_pixels})"
            )));
        }
        Ok(Self {
            factor,
            min_pixels,
            max_pixels,
        })
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn min_pixels(&self) -> u64 {
        self.min_pixels
    }

    pub fn max_pixels(&self) -> u64 {
        self.max_pixels
    }

    /// Compute `(target_height, target_width)` for a `height` × `width` raster.
    ///
    /// 1. Round each side to the nearest multiple of `factor`.
    /// 2. If the area is out of bounds, scale both sides uniformly onto the
    ///    violated bound first (flooring when shrinking, ceiling when growing).
    /// 3. Step the sides by whole `factor`s until the rounded area is back in
    ///    bounds; rounding can push it out by up to one grid step.
    pub fn normalize(&self, height: u32, width: u32) -> (u32, u32) {
        let f = f64::from(self.factor);
        let h = f64::from(height.max(1));
        let w = f64::from(width.max(1));
        let max = self.max_pixels as f64;
        let min = self.min_pixels as f64;

        let round_by = |v: f64| ((v / f).round() * f).max(f);
        let floor_by = |v: f64| ((v / f).floor() * f).max(f);
        let ceil_by = |v: f64| ((v / f).ceil() * f).max(f);

        let (mut hb, mut wb) = (round_by(h), round_by(w));
        if hb * wb > max {
            let beta = (h * w / max).sqrt();
            hb = floor_by(h / beta);
            wb = floor_by(w / beta);
        } else if hb * wb < min {
            let beta = (min / (h * w)).sqrt();
            hb = ceil_by(h * beta);
            wb = ceil_by(w * beta);
        }

        let step = u64::from(self.factor);
        let (mut hb, mut wb) = (hb as u64, wb as u64);

        // Shrink the longer side onto max_pixels.
        while hb * wb > self.max_pixels {
            if hb >= wb {
                hb = (self.max_pixels / wb / step * step).clamp(step, hb - step);
            } else {
                wb = (self.max_pixels / hb / step * step).clamp(step, wb - step);
            }
        }
        // Grow the shorter side onto min_pixels; one step adds at most the
        // current area, so this never crosses max_pixels.
        while hb * wb < self.min_pixels {
            if hb <= wb {
                hb += step;
            } else {
                wb += step;
            }
        }

        (to_u32(hb), to_u32(wb))
    }
}

impl Default for GeometryBounds {
    fn default() -> Self {
        Self {
            factor: 28,
            min_pixels: 3136,
            max_pixels: 11_289_600,
        }
    }
}

fn to_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

/// Free-function form of [`GeometryBounds::normalize`].
///
/// Returns `(target_height, target_width)`, or `InvalidConfig` when the bounds
/// cannot be satisfied.
pub fn normalize(
    height: u32,
    width: u32,
    factor: u32,
    min_pixels: u64,
    max_pixels: u64,
) -> Result<(u32, u32), PdfOcrError> {
    Ok(GeometryBounds::new(factor, min_pixels, max_pixels)?.normalize(height, width))
}
