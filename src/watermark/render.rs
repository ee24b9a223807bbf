//! Watermark compositing.
//!
//! [`prepare`] builds the watermark as its own RGBA layer at a given render
//! scale, [`render`] blends a layer onto a copy of a base image, and
//! [`compose`] does both with the placement resolved from the layer's final
//! (rotated) extent.

use ab_glyph::{Font, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Pixel, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::morphology::dilate;
use imageproc::rect::Rect;
use tracing::trace;

use super::assets::WatermarkAssets;
use super::error::AssetError;
use super::font::ResolvedFont;
use super::position::{PositionSpec, resolve};
use super::spec::{ImageWatermark, TextWatermark, WatermarkSpec};

/// Space between the text and the edge of its background box.
pub const BOX_PADDING: f32 = 6.0;

/// A fully drawn watermark, ready to be pasted.
#[derive(Debug, Clone)]
pub struct WatermarkLayer {
    image: RgbaImage,
}

impl WatermarkLayer {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Draw the watermark layer. `render_scale` is 1.0 for export and the
/// preview downscale factor for preview.
pub fn prepare(
    spec: &WatermarkSpec,
    assets: &WatermarkAssets,
    render_scale: f32,
) -> Result<WatermarkLayer, AssetError> {
    let render_scale = if render_scale.is_finite() && render_scale > 0.0 {
        render_scale
    } else {
        1.0
    };

    let layer = match (spec, assets) {
        (WatermarkSpec::Text(text), WatermarkAssets::Font(font)) => {
            draw_text_layer(text, font, render_scale)
        }
        (WatermarkSpec::Image(image), WatermarkAssets::Image(source)) => {
            scale_image_layer(image, source, render_scale)
        }
        (WatermarkSpec::Text(_), other) => {
            return Err(AssetError::Mismatch {
                loaded: other.kind(),
                requested: "text",
            });
        }
        (WatermarkSpec::Image(_), other) => {
            return Err(AssetError::Mismatch {
                loaded: other.kind(),
                requested: "image",
            });
        }
    };

    let layer = apply_opacity(layer, spec.opacity());
    let image = rotate_expanded(layer, spec.rotation_degrees());
    trace!(
        "Prepared watermark layer {}x{} at scale {:.3}",
        image.width(),
        image.height(),
        render_scale
    );
    Ok(WatermarkLayer { image })
}

/// Blend `layer` onto a copy of `base` with its top-left corner at `(x, y)`.
pub fn render(base: &RgbaImage, layer: &WatermarkLayer, x: u32, y: u32) -> RgbaImage {
    let mut composed = base.clone();
    imageops::overlay(&mut composed, &layer.image, x as i64, y as i64);
    composed
}

/// Prepare, place and render in one step.
pub fn compose(
    base: &RgbaImage,
    spec: &WatermarkSpec,
    assets: &WatermarkAssets,
    position: &PositionSpec,
    render_scale: f32,
) -> Result<RgbaImage, AssetError> {
    let layer = prepare(spec, assets, render_scale)?;
    let (x, y) = resolve(
        position,
        base.width(),
        base.height(),
        layer.width(),
        layer.height(),
    );
    Ok(render(base, &layer, x, y))
}

fn scaled_px(value: f32, render_scale: f32) -> u32 {
    (value * render_scale).round().max(0.0) as u32
}

fn scaled_offset(value: i32, render_scale: f32) -> i32 {
    (value as f32 * render_scale).round() as i32
}

fn draw_text_layer(text: &TextWatermark, font: &ResolvedFont, render_scale: f32) -> RgbaImage {
    let font = font.font.as_ref();
    let scale = PxScale::from((text.font_size() * render_scale).max(1.0));
    let content = text.content();

    let (text_w, measured_h) = text_size(scale, font, content);
    let line_h = font.as_scaled(scale).height().ceil().max(0.0) as u32;
    let text_h = measured_h.max(line_h);

    let padding = if text.background().is_some() {
        scaled_px(BOX_PADDING, render_scale)
    } else {
        0
    };
    let stroke = text.stroke().map(|stroke| {
        let width = scaled_px(stroke.width as f32, render_scale).clamp(1, u8::MAX as u32);
        (width, stroke.color)
    });
    let stroke_w = stroke.map(|(width, _)| width).unwrap_or(0);
    let shadow = text.shadow().map(|shadow| {
        (
            scaled_offset(shadow.dx, render_scale),
            scaled_offset(shadow.dy, render_scale),
            shadow.color,
        )
    });
    let (shadow_dx, shadow_dy) = shadow.map(|(dx, dy, _)| (dx, dy)).unwrap_or((0, 0));

    // Effects grow the layer on whichever side they spill over
    let left = padding + stroke_w + (-shadow_dx).max(0) as u32;
    let right = padding + stroke_w + shadow_dx.max(0) as u32;
    let top = padding + stroke_w + (-shadow_dy).max(0) as u32;
    let bottom = padding + stroke_w + shadow_dy.max(0) as u32;
    let width = (left + text_w + right).max(1);
    let height = (top + text_h + bottom).max(1);

    let mut layer = RgbaImage::new(width, height);
    if let Some(color) = text.background() {
        draw_filled_rect_mut(&mut layer, Rect::at(0, 0).of_size(width, height), color);
    }

    let mut mask = GrayImage::new(width, height);
    draw_text_mut(
        &mut mask,
        Luma([255u8]),
        left as i32,
        top as i32,
        scale,
        font,
        content,
    );

    if let Some((dx, dy, color)) = shadow {
        paint_mask(&mut layer, &mask, color, dx, dy);
    }
    if let Some((width, color)) = stroke {
        let outline = dilate(&mask, Norm::LInf, width as u8);
        paint_mask(&mut layer, &outline, color, 0, 0);
    }
    paint_mask(&mut layer, &mask, text.color(), 0, 0);
    layer
}

/// Blend `color` into `layer` wherever `mask` has coverage, shifted by
/// `(dx, dy)`. Coverage scales the color's alpha.
fn paint_mask(layer: &mut RgbaImage, mask: &GrayImage, color: Rgba<u8>, dx: i32, dy: i32) {
    let (width, height) = layer.dimensions();
    for (mx, my, coverage) in mask.enumerate_pixels() {
        let coverage = coverage[0];
        if coverage == 0 {
            continue;
        }
        let x = mx as i64 + dx as i64;
        let y = my as i64 + dy as i64;
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            continue;
        }
        let alpha = (color[3] as u32 * coverage as u32 + 127) / 255;
        let source = Rgba([color[0], color[1], color[2], alpha as u8]);
        layer.get_pixel_mut(x as u32, y as u32).blend(&source);
    }
}

fn scale_image_layer(image: &ImageWatermark, source: &RgbaImage, render_scale: f32) -> RgbaImage {
    let factor = image.scale_percent() / 100.0 * render_scale;
    let width = ((source.width() as f32 * factor).round() as u32).max(1);
    let height = ((source.height() as f32 * factor).round() as u32).max(1);
    if (width, height) == source.dimensions() {
        return source.clone();
    }
    imageops::resize(source, width, height, FilterType::Lanczos3)
}

fn apply_opacity(mut layer: RgbaImage, opacity: f32) -> RgbaImage {
    if opacity >= 1.0 {
        return layer;
    }
    let opacity = opacity.max(0.0);
    for pixel in layer.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
    layer
}

/// Rotate counter-clockwise about the center, growing the canvas so the
/// rotated content is never clipped.
fn rotate_expanded(layer: RgbaImage, degrees: f32) -> RgbaImage {
    let degrees = degrees.rem_euclid(360.0);
    if degrees == 0.0 || !degrees.is_finite() {
        return layer;
    }

    let (width, height) = layer.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    // Small tolerance so float noise at right angles does not add a pixel
    let rotated_w = ((width as f32 * cos + height as f32 * sin - 1e-3).ceil() as u32).max(1);
    let rotated_h = ((width as f32 * sin + height as f32 * cos - 1e-3).ceil() as u32).max(1);

    // Work on a canvas big enough for both the original and rotated extents
    let work_w = width.max(rotated_w);
    let work_h = height.max(rotated_h);
    let mut work = RgbaImage::new(work_w, work_h);
    imageops::replace(
        &mut work,
        &layer,
        ((work_w - width) / 2) as i64,
        ((work_h - height) / 2) as i64,
    );

    // rotate_about_center turns clockwise for positive angles
    let rotated = rotate_about_center(&work, -theta, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    imageops::crop_imm(
        &rotated,
        (work_w - rotated_w) / 2,
        (work_h - rotated_h) / 2,
        rotated_w,
        rotated_h,
    )
    .to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::font::{FontCatalog, FontFamily};
    use crate::watermark::position::Anchor;
    use crate::watermark::spec::{Shadow, Stroke};
    use image::ImageBuffer;

    fn system_font() -> Option<ResolvedFont> {
        FontCatalog::discover(&[])
            .resolve(&FontFamily::Auto, &["DejaVuSans".to_string()])
            .ok()
    }

    fn image_assets(width: u32, height: u32, color: Rgba<u8>) -> WatermarkAssets {
        WatermarkAssets::Image(ImageBuffer::from_pixel(width, height, color))
    }

    fn gray_base() -> RgbaImage {
        ImageBuffer::from_pixel(200, 100, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn test_image_layer_scales_by_percent_and_render_scale() {
        let assets = image_assets(40, 20, Rgba([255, 0, 0, 255]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_scale_percent(50.0));

        let layer = prepare(&spec, &assets, 1.0).unwrap();
        assert_eq!(layer.dimensions(), (20, 10));

        let preview_layer = prepare(&spec, &assets, 0.5).unwrap();
        assert_eq!(preview_layer.dimensions(), (10, 5));
    }

    #[test]
    fn test_image_opacity_is_per_pixel() {
        let assets = image_assets(4, 4, Rgba([255, 0, 0, 200]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(0.5));
        let layer = prepare(&spec, &assets, 1.0).unwrap();
        assert!(layer.image().pixels().all(|p| p[3] == 100));
    }

    #[test]
    fn test_render_does_not_mutate_base() {
        let base = gray_base();
        let assets = image_assets(10, 10, Rgba([255, 0, 0, 255]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(1.0));
        let layer = prepare(&spec, &assets, 1.0).unwrap();

        let composed = render(&base, &layer, 5, 5);
        assert_eq!(*base.get_pixel(6, 6), Rgba([128, 128, 128, 255]));
        assert_eq!(*composed.get_pixel(6, 6), Rgba([255, 0, 0, 255]));
        assert_eq!(*composed.get_pixel(50, 50), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_render_blends_instead_of_overwriting() {
        let base = gray_base();
        let assets = image_assets(10, 10, Rgba([255, 255, 255, 255]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(0.5));
        let layer = prepare(&spec, &assets, 1.0).unwrap();

        let composed = render(&base, &layer, 0, 0);
        let pixel = composed.get_pixel(3, 3);
        assert!(
            pixel[0] > 150 && pixel[0] < 230,
            "half-opaque white over gray should land in between, got {:?}",
            pixel
        );
        assert_eq!(pixel[3], 255, "blending must keep the base opaque");
    }

    #[test]
    fn test_zero_opacity_leaves_base_unchanged() {
        let base = gray_base();
        let assets = image_assets(30, 30, Rgba([0, 255, 0, 255]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(0.0));
        let composed = compose(
            &base,
            &spec,
            &assets,
            &PositionSpec::Preset(Anchor::Center),
            1.0,
        )
        .unwrap();
        assert_eq!(composed, base);
    }

    #[test]
    fn test_rotation_expands_layer() {
        let assets = image_assets(100, 20, Rgba([255, 0, 0, 255]));
        let flat = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(1.0));
        let quarter = WatermarkSpec::Image(
            ImageWatermark::new("logo.png")
                .with_opacity(1.0)
                .with_rotation(90.0),
        );
        let diagonal = WatermarkSpec::Image(
            ImageWatermark::new("logo.png")
                .with_opacity(1.0)
                .with_rotation(45.0),
        );

        assert_eq!(prepare(&flat, &assets, 1.0).unwrap().dimensions(), (100, 20));
        let (w, h) = prepare(&quarter, &assets, 1.0).unwrap().dimensions();
        assert!((19..=21).contains(&w) && (99..=101).contains(&h), "got {}x{}", w, h);
        let (w, h) = prepare(&diagonal, &assets, 1.0).unwrap().dimensions();
        assert!(w > 80 && h > 80, "45 degree layer should be roughly square, got {}x{}", w, h);
    }

    #[test]
    fn test_rotation_is_counter_clockwise() {
        // Left half red, right half blue; after +90 the red half must be at the bottom
        let mut source = RgbaImage::new(40, 20);
        for (x, _, pixel) in source.enumerate_pixels_mut() {
            *pixel = if x < 20 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            };
        }
        let spec = WatermarkSpec::Image(
            ImageWatermark::new("logo.png")
                .with_opacity(1.0)
                .with_rotation(90.0),
        );
        let layer = prepare(&spec, &WatermarkAssets::Image(source), 1.0).unwrap();
        let (w, h) = layer.dimensions();
        let bottom = layer.image().get_pixel(w / 2, h - 5);
        let top = layer.image().get_pixel(w / 2, 4);
        assert!(bottom[0] > 200 && bottom[2] < 50, "bottom was {:?}", bottom);
        assert!(top[2] > 200 && top[0] < 50, "top was {:?}", top);
    }

    #[test]
    fn test_compose_places_with_final_extent() {
        let base = gray_base();
        let assets = image_assets(20, 10, Rgba([0, 0, 255, 255]));
        let spec = WatermarkSpec::Image(ImageWatermark::new("logo.png").with_opacity(1.0));
        let composed = compose(
            &base,
            &spec,
            &assets,
            &PositionSpec::Preset(Anchor::BottomRight),
            1.0,
        )
        .unwrap();
        // Layer occupies x 170..190, y 80..90
        assert_eq!(*composed.get_pixel(170, 80), Rgba([0, 0, 255, 255]));
        assert_eq!(*composed.get_pixel(189, 89), Rgba([0, 0, 255, 255]));
        assert_eq!(*composed.get_pixel(190, 89), Rgba([128, 128, 128, 255]));
        assert_eq!(*composed.get_pixel(169, 80), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_mismatched_assets_are_rejected() {
        let assets = image_assets(4, 4, Rgba([0, 0, 0, 255]));
        let result = prepare(&WatermarkSpec::default(), &assets, 1.0);
        assert!(matches!(
            result,
            Err(AssetError::Mismatch {
                loaded: "image",
                requested: "text"
            })
        ));
    }

    #[test]
    fn test_text_layer_includes_box_and_effects() {
        let Some(font) = system_font() else {
            println!("No system font available, skipping text layer test");
            return;
        };
        let assets = WatermarkAssets::Font(font);
        let plain = TextWatermark::new("Sample").with_background(None).with_opacity(1.0);
        let boxed = plain.clone().with_background(Some(Rgba([0, 0, 0, 150])));
        let effects = boxed
            .clone()
            .with_stroke(Some(Stroke::default()))
            .with_shadow(Some(Shadow::default()));

        let plain_layer = prepare(&WatermarkSpec::Text(plain), &assets, 1.0).unwrap();
        let boxed_layer = prepare(&WatermarkSpec::Text(boxed), &assets, 1.0).unwrap();
        let effects_layer = prepare(&WatermarkSpec::Text(effects), &assets, 1.0).unwrap();

        assert_eq!(boxed_layer.width(), plain_layer.width() + 12);
        assert_eq!(boxed_layer.height(), plain_layer.height() + 12);
        // Stroke 2 on both sides, shadow 2 on the right/bottom
        assert_eq!(effects_layer.width(), boxed_layer.width() + 6);
        assert_eq!(effects_layer.height(), boxed_layer.height() + 6);

        // Box corner is the semi-opaque box color
        assert_eq!(boxed_layer.image().get_pixel(0, 0)[3], 150);
        // Some fill pixels must be white
        assert!(
            plain_layer
                .image()
                .pixels()
                .any(|p| p[0] == 255 && p[1] == 255 && p[2] == 255 && p[3] == 255)
        );
    }

    #[test]
    fn test_text_layer_scales_with_render_scale() {
        let Some(font) = system_font() else {
            println!("No system font available, skipping text scale test");
            return;
        };
        let assets = WatermarkAssets::Font(font);
        let spec = WatermarkSpec::Text(TextWatermark::new("Scale me").with_font_size(40.0));
        let full = prepare(&spec, &assets, 1.0).unwrap();
        let half = prepare(&spec, &assets, 0.5).unwrap();
        let ratio = half.width() as f32 / full.width() as f32;
        assert!(
            (0.4..=0.6).contains(&ratio),
            "half-scale layer should be about half as wide, ratio {}",
            ratio
        );
    }
}
