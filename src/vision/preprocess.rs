//! Upload preprocessing for the recognition service
//!
//! Brings a captured photo within the upload budget (byte size and longest
//! edge) before it is sent for recognition. Re-encoding runs a fixed ladder
//! of at most four steps and never accepts a step that grows the output.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::capture::CapturedImage;

/// Default byte budget for uploads (950 KiB)
pub const DEFAULT_MAX_BYTES: usize = 950 * 1024;
/// Default longest-edge budget in pixels
pub const DEFAULT_MAX_SIDE: u32 = 2200;

/// Encoding used when a photo has to be re-encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Lossy JPEG, quality-controlled
    #[default]
    Jpeg,
    /// WebP (lossless encoder)
    WebP,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }
}

/// Preprocessing budget and encoder settings
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    /// Maximum encoded size in bytes
    pub max_bytes: usize,
    /// Maximum length of the longer edge in pixels
    pub max_side: u32,
    /// Primary output encoding
    pub format: OutputFormat,
    /// Quality for the first encoding attempt (1-100)
    pub initial_quality: u8,
    /// Quality for the fallback attempts (1-100)
    pub min_quality: u8,
    /// Raster scale applied when the minimum quality is still over budget
    pub shrink_factor: f32,
    /// Try an alternate encoding and keep it when strictly smaller
    pub allow_alternate_format: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_side: DEFAULT_MAX_SIDE,
            format: OutputFormat::Jpeg,
            initial_quality: 85,
            min_quality: 32,
            shrink_factor: 0.8,
            allow_alternate_format: true,
        }
    }
}

/// A photo that satisfies the upload budget
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Encoded bytes ready for upload
    pub data: Vec<u8>,
    /// Mime type of `data`
    pub mime: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// False when the original bytes were passed through untouched
    pub reencoded: bool,
}

impl PreparedImage {
    fn passthrough(image: &CapturedImage) -> Self {
        Self {
            data: image.data.clone(),
            mime: image.mime.clone(),
            width: image.width,
            height: image.height,
            reencoded: false,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Preprocessing failure; fatal for the scan, raised before any upload
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("unsupported mime type for re-encoding: {0}")]
    NotAnImage(String),
    #[error("failed to decode image")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image")]
    Encode(#[source] image::ImageError),
    #[error("prepared image is {size} bytes, over the {max_bytes} byte budget")]
    OverBudget { size: usize, max_bytes: usize },
}

/// Bring `image` within the budget described by `options`.
///
/// An image already inside both bounds is returned byte-for-byte. Otherwise:
/// fit the long edge, encode at the initial quality, then at the minimum
/// quality, then shrink the raster and encode at the minimum quality, then
/// optionally try the alternate format. Each step only replaces the current
/// result when it is smaller. A result still over budget is an error.
pub fn prepare(image: &CapturedImage, options: &PrepareOptions) -> Result<PreparedImage, PreprocessError> {
    if image.size() <= options.max_bytes && image.longest_side() <= options.max_side {
        debug!(
            "Image within budget ({} bytes, {}x{}), passing through",
            image.size(),
            image.width,
            image.height
        );
        return Ok(PreparedImage::passthrough(image));
    }

    if !image.is_image() {
        return Err(PreprocessError::NotAnImage(image.mime.clone()));
    }

    let decoded = image::load_from_memory(&image.data).map_err(PreprocessError::Decode)?;
    let mut raster = fit_within(decoded, options.max_side);

    // Step 1: fitted raster at the initial quality
    let mut best = encode(&raster, options.format, options.initial_quality)?;
    debug!(step = 1, size = best.size(), "Encoded at initial quality {}", options.initial_quality);

    // Step 2: minimum quality
    if best.size() > options.max_bytes {
        let candidate = encode(&raster, options.format, options.min_quality)?;
        debug!(step = 2, size = candidate.size(), "Encoded at minimum quality {}", options.min_quality);
        best = smaller(best, candidate);
    }

    // Step 3: shrink the raster, minimum quality
    if best.size() > options.max_bytes {
        raster = shrink(&raster, options.shrink_factor);
        let candidate = encode(&raster, options.format, options.min_quality)?;
        debug!(
            step = 3,
            size = candidate.size(),
            "Encoded shrunk raster {}x{}",
            candidate.width,
            candidate.height
        );
        best = smaller(best, candidate);
    }

    // Step 4: alternate encoding, kept only when strictly smaller
    if options.allow_alternate_format && best.size() > options.max_bytes {
        let alternate = alternate_format(options.format);
        let candidate = encode(&raster, alternate, options.min_quality)?;
        debug!(step = 4, size = candidate.size(), "Encoded alternate format {:?}", alternate);
        best = smaller(best, candidate);
    }

    if best.size() > options.max_bytes {
        return Err(PreprocessError::OverBudget {
            size: best.size(),
            max_bytes: options.max_bytes,
        });
    }

    info!(
        "Prepared image {} -> {} bytes, {}x{} -> {}x{}",
        image.size(),
        best.size(),
        image.width,
        image.height,
        best.width,
        best.height
    );

    Ok(best)
}

/// Uniformly downscale so the longer edge is at most `max_side`
fn fit_within(image: DynamicImage, max_side: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_side {
        return image;
    }
    image.resize(max_side, max_side, FilterType::Triangle)
}

fn shrink(image: &DynamicImage, factor: f32) -> DynamicImage {
    let factor = factor.clamp(0.1, 1.0);
    let width = ((image.width() as f32 * factor).round() as u32).max(1);
    let height = ((image.height() as f32 * factor).round() as u32).max(1);
    image.resize_exact(width, height, FilterType::Triangle)
}

fn alternate_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Jpeg => OutputFormat::WebP,
        OutputFormat::WebP => OutputFormat::Jpeg,
    }
}

/// Keep `current` unless `candidate` is strictly smaller
fn smaller(current: PreparedImage, candidate: PreparedImage) -> PreparedImage {
    if candidate.size() < current.size() {
        candidate
    } else {
        current
    }
}

fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<PreparedImage, PreprocessError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(PreprocessError::Encode)?;
        }
        OutputFormat::WebP => {
            WebPEncoder::new_lossless(&mut data)
                .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                .map_err(PreprocessError::Encode)?;
        }
    }

    Ok(PreparedImage {
        data,
        mime: format.mime_type().to_string(),
        width,
        height,
        reencoded: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    /// Smooth gradient with low-amplitude deterministic noise
    fn textured(width: u32, height: u32, amplitude: u32) -> DynamicImage {
        let mut state: u32 = 0x2545_f491;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let noise = (state >> 16) % (2 * amplitude + 1);
            let base = ((x + y) % 200) + 20;
            let v = (base + noise) as u8;
            image::Rgb([v, v.wrapping_add(10), v.wrapping_add(20)])
        }))
    }

    fn captured_png(img: &DynamicImage) -> CapturedImage {
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png).unwrap();
        CapturedImage::new(buffer, "image/png", img.width(), img.height())
    }

    #[test]
    fn test_within_budget_passes_through() {
        let captured = captured_png(&textured(64, 48, 2));
        let prepared = prepare(&captured, &PrepareOptions::default()).unwrap();

        assert!(!prepared.reencoded);
        assert_eq!(prepared.data, captured.data);
        assert_eq!(prepared.mime, "image/png");
    }

    #[test]
    fn test_oversized_edge_is_refitted() {
        // Few bytes, but the long edge breaks the geometry budget
        let captured = captured_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            3000,
            100,
            image::Rgb([255, 255, 255]),
        )));
        assert!(captured.size() <= DEFAULT_MAX_BYTES);

        let prepared = prepare(&captured, &PrepareOptions::default()).unwrap();
        assert!(prepared.reencoded);
        assert_eq!(prepared.longest_side(), DEFAULT_MAX_SIDE);
        assert!(prepared.size() <= DEFAULT_MAX_BYTES);
    }

    #[test]
    fn test_unreachable_budget_is_an_error() {
        let captured = captured_png(&textured(300, 300, 40));
        let options = PrepareOptions {
            max_bytes: 200,
            ..Default::default()
        };

        match prepare(&captured, &options) {
            Err(PreprocessError::OverBudget { size, max_bytes }) => {
                assert_eq!(max_bytes, 200);
                assert!(size > 200);
            }
            other => panic!("expected OverBudget, got {:?}", other.map(|p| p.size())),
        }
    }

    #[test]
    fn test_non_image_is_rejected_when_over_budget() {
        let captured = CapturedImage::new(vec![0u8; 2048], "application/pdf", 0, 0);
        let options = PrepareOptions {
            max_bytes: 1024,
            ..Default::default()
        };
        assert!(matches!(prepare(&captured, &options), Err(PreprocessError::NotAnImage(_))));
    }

    #[test]
    fn test_corrupt_bytes_fail_decoding() {
        let captured = CapturedImage::new(vec![7u8; 4096], "image/jpeg", 5000, 5000);
        assert!(matches!(
            prepare(&captured, &PrepareOptions::default()),
            Err(PreprocessError::Decode(_))
        ));
    }

    #[test]
    fn test_shrink_keeps_aspect() {
        let shrunk = shrink(&textured(100, 50, 1), 0.8);
        assert_eq!((shrunk.width(), shrunk.height()), (80, 40));
    }

    #[test]
    fn test_smaller_prefers_strictly_smaller() {
        let a = PreparedImage {
            data: vec![0; 10],
            mime: "image/jpeg".into(),
            width: 1,
            height: 1,
            reencoded: true,
        };
        let mut b = a.clone();
        b.mime = "image/webp".into();

        // Equal size keeps the current result
        assert_eq!(smaller(a.clone(), b.clone()).mime, "image/jpeg");

        b.data.truncate(5);
        assert_eq!(smaller(a, b).mime, "image/webp");
    }
}
