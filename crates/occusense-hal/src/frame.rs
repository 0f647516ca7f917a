//! Frame decoding and normalization.
//!
//! Every incoming frame is decoded from its encoded form (JPEG, PNG, …) and
//! resized so that it fits inside a `max_dimension × max_dimension` box while
//! keeping its aspect ratio. Small frames are scaled *up* to the same bound,
//! so every detector sees frames at a comparable scale.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use occusense_types::OccuError;

/// Default bound on the longest side of a normalized frame (pixels).
pub const DEFAULT_MAX_DIMENSION: u32 = 400;

/// A decoded, resized frame handed to every detector.
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    rgb: RgbImage,
    gray: GrayImage,
    scale: f32,
}

impl NormalizedFrame {
    /// Build a frame from an already-decoded image.
    pub fn from_image(image: DynamicImage, scale: f32) -> Self {
        let rgb = image.to_rgb8();
        let gray = image.to_luma8();
        Self { rgb, gray, scale }
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    /// Factor applied to the source frame to produce this one.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// RGB24 pixel plane.
    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// 8-bit luminance plane.
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }
}

/// Decodes and resizes raw frame bytes.
#[derive(Debug, Clone, Copy)]
pub struct FrameNormalizer {
    max_dimension: u32,
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl FrameNormalizer {
    /// Create a normalizer bounding frames to `max_dimension` pixels per side.
    /// A bound of zero is raised to one pixel.
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Decode `bytes` and resize the result.
    ///
    /// # Errors
    ///
    /// Returns [`OccuError::Decode`] when the bytes are empty, are not a
    /// supported image format, or decode to an image with a zero dimension.
    pub fn normalize(&self, bytes: &[u8]) -> Result<NormalizedFrame, OccuError> {
        if bytes.is_empty() {
            return Err(OccuError::Decode("no frame data received".to_string()));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| OccuError::Decode(format!("failed to decode image: {e}")))?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(OccuError::Decode(format!(
                "decoded image has zero dimension ({width}x{height})"
            )));
        }

        let bound = self.max_dimension as f32;
        let scale = (bound / width as f32).min(bound / height as f32);
        let target_w = ((width as f32 * scale).round() as u32).max(1);
        let target_h = ((height as f32 * scale).round() as u32).max(1);

        let resized = if (target_w, target_h) == (width, height) {
            decoded
        } else {
            decoded.resize_exact(target_w, target_h, FilterType::Triangle)
        };
        Ok(NormalizedFrame::from_image(resized, scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 80, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn landscape_frame_fits_width_bound() {
        let frame = FrameNormalizer::default()
            .normalize(&encode_png(800, 600))
            .unwrap();
        assert_eq!(frame.dimensions(), (400, 300));
        assert!((frame.scale() - 0.5).abs() < 1e-6);
        assert_eq!(frame.gray().dimensions(), (400, 300));
    }

    #[test]
    fn portrait_frame_fits_height_bound() {
        let frame = FrameNormalizer::new(100).normalize(&encode_png(50, 200)).unwrap();
        assert_eq!(frame.dimensions(), (25, 100));
        assert!((frame.scale() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn small_frame_is_scaled_up() {
        let frame = FrameNormalizer::new(40).normalize(&encode_png(20, 10)).unwrap();
        assert_eq!(frame.dimensions(), (40, 20));
        assert!((frame.scale() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn empty_bytes_are_a_decode_error() {
        let err = FrameNormalizer::default().normalize(&[]).unwrap_err();
        assert!(matches!(err, OccuError::Decode(_)));
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = FrameNormalizer::default()
            .normalize(b"definitely not a jpeg")
            .unwrap_err();
        assert!(matches!(err, OccuError::Decode(_)));
    }

    #[test]
    fn zero_bound_is_raised_to_one() {
        assert_eq!(FrameNormalizer::new(0).max_dimension(), 1);
    }
}
