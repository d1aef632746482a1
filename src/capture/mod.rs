//! Photo Capture Layer
//!
//! Loads equipment label photos into memory together with their declared
//! mime type and pixel dimensions. Capture UIs hand their bytes over here.

pub mod frame;

pub use frame::CapturedImage;

use anyhow::{Context, Result};
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Build a captured image from encoded bytes, probing format and dimensions
pub fn from_bytes(data: Vec<u8>) -> Result<CapturedImage> {
    let reader = image::ImageReader::new(Cursor::new(&data))
        .with_guessed_format()
        .context("Failed to detect image format")?;

    let mime = reader
        .format()
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let (width, height) = reader
        .into_dimensions()
        .context("Failed to read image dimensions")?;

    debug!("Captured {} image {}x{} ({} bytes)", mime, width, height, data.len());

    Ok(CapturedImage::new(data, mime, width, height))
}

/// Load a captured image from a file on disk
pub fn load_from_path(path: &Path) -> Result<CapturedImage> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read image {:?}", path))?;
    from_bytes(data)
}

/// File extension for an upload of the given mime type
pub fn extension_for_mime(mime: &str) -> &'static str {
    ImageFormat::from_mime_type(mime)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}
