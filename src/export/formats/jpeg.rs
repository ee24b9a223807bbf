use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use std::io::Write;

/// JPEG has no alpha channel, so the image is reduced to RGB first.
pub fn encode<W: Write>(image: &RgbaImage, quality: u8, writer: W) -> Result<(), image::ImageError> {
    let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let encoder = JpegEncoder::new_with_quality(writer, quality);
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )
}
