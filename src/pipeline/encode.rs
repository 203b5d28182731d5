//! Image encoding: `DynamicImage` → resized, base64-encoded PNG payload.
//!
//! The OCR service takes the page as a base64 PNG inside the JSON request
//! body. PNG is lossless, which matters more than size: JPEG artefacts around
//! glyph edges cost recognition accuracy on small print.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Resize `img` to exactly `target_width` × `target_height` and encode it as
/// base64 PNG.
///
/// The bbox coordinates the service returns live in this resized space.
pub fn encode_for_ocr(
    img: &DynamicImage,
    target_height: u32,
    target_width: u32,
) -> Result<String, image::ImageError> {
    let resized = if img.width() == target_width && img.height() == target_height {
        img.clone()
    } else {
        img.resize_exact(target_width, target_height, FilterType::CatmullRom)
    };
    encode_png_base64(&resized)
}

/// Encode an image as base64 PNG without resizing.
pub fn encode_png_base64(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn decode(b64: &str) -> DynamicImage {
        let bytes = STANDARD.decode(b64).expect("valid base64");
        image::load_from_memory(&bytes).expect("valid PNG")
    }

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0])));
        let b64 = encode_png_base64(&img).expect("encode should succeed");
        assert!(!b64.is_empty());
        // PNG magic bytes survive the round trip.
        let bytes = STANDARD.decode(&b64).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn resizes_to_target() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 150, Rgb([0, 0, 0])));
        let b64 = encode_for_ocr(&img, 168, 112).unwrap();
        let out = decode(&b64);
        assert_eq!((out.width(), out.height()), (112, 168));
    }

    #[test]
    fn target_equal_to_source_keeps_pixels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(56, 28, |x, y| {
            Rgb([x as u8, y as u8, 7])
        }));
        let out = decode(&encode_for_ocr(&img, 28, 56).unwrap());
        assert_eq!(out.to_rgb8(), img.to_rgb8());
    }
}
