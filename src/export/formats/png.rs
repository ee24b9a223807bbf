use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use std::io::Write;

pub fn encode<W: Write>(image: &RgbaImage, writer: W) -> Result<(), image::ImageError> {
    let encoder = PngEncoder::new(writer);
    encoder.write_image(
        image,
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgba8,
    )
}
