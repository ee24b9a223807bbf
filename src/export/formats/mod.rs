//! Output encoders.

mod jpeg;
mod png;

use image::{ImageFormat, RgbaImage};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
        }
    }

    /// Name used in template files.
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }
}

/// JPEG quality, always within 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Encode `image` in `format`. PNG ignores `quality`.
pub fn encode<W: Write>(
    image: &RgbaImage,
    format: OutputFormat,
    quality: Quality,
    writer: W,
) -> Result<(), image::ImageError> {
    match format {
        OutputFormat::Jpeg => jpeg::encode(image, quality.value(), writer),
        OutputFormat::Png => png::encode(image, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::io::Cursor;

    fn sample() -> RgbaImage {
        ImageBuffer::from_fn(32, 16, |x, y| Rgba([(x * 8) as u8, (y * 16) as u8, 128, 255]))
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(250).value(), 100);
        assert_eq!(Quality::new(-3).value(), 1);
        assert_eq!(Quality::default().value(), 95);
    }

    #[test]
    fn test_format_labels() {
        assert_eq!(OutputFormat::parse("JPEG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse("jpg"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::parse(" png "), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::parse("webp"), None);
        assert_eq!(OutputFormat::Png.label(), "PNG");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
    }

    #[test]
    fn test_encoded_bytes_decode_in_requested_format() {
        for format in [OutputFormat::Jpeg, OutputFormat::Png] {
            let mut buffer = Vec::new();
            encode(&sample(), format, Quality::default(), &mut buffer).unwrap();
            assert_eq!(
                image::guess_format(&buffer).unwrap(),
                format.image_format(),
                "{:?} output has the wrong signature",
                format
            );
            let decoded = image::load(Cursor::new(&buffer), format.image_format()).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (32, 16));
        }
    }

    #[test]
    fn test_png_is_lossless() {
        let mut buffer = Vec::new();
        encode(&sample(), OutputFormat::Png, Quality::new(1), &mut buffer).unwrap();
        let decoded = image::load_from_memory(&buffer).unwrap().to_rgba8();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_jpeg_quality_changes_size() {
        let noisy: RgbaImage = ImageBuffer::from_fn(64, 64, |x, y| {
            Rgba([((x * 31 + y * 17) % 256) as u8, ((x * y) % 256) as u8, ((x ^ y) * 4) as u8, 255])
        });
        let mut low = Vec::new();
        let mut high = Vec::new();
        encode(&noisy, OutputFormat::Jpeg, Quality::new(10), &mut low).unwrap();
        encode(&noisy, OutputFormat::Jpeg, Quality::new(100), &mut high).unwrap();
        assert!(low.len() < high.len());
    }
}
