//! Captured photo data structures

/// A photographed equipment label as received from the capturing device
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Encoded image bytes (JPEG, PNG, ...)
    pub data: Vec<u8>,
    /// Declared mime type of `data`
    pub mime: String,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl CapturedImage {
    /// Create a new captured image
    pub fn new(data: Vec<u8>, mime: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            data,
            mime: mime.into(),
            width,
            height,
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get image dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Length of the longer edge in pixels
    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Whether the declared mime type is an image type
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_image_geometry() {
        let image = CapturedImage::new(vec![0u8; 42], "image/jpeg", 4000, 3000);
        assert_eq!(image.size(), 42);
        assert_eq!(image.dimensions(), (4000, 3000));
        assert_eq!(image.longest_side(), 4000);
        assert!(image.is_image());
    }

    #[test]
    fn test_non_image_mime() {
        let image = CapturedImage::new(vec![], "application/pdf", 0, 0);
        assert!(!image.is_image());
    }
}
