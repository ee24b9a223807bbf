//! Interactive preview of one source image.
//!
//! The preview works on a downscaled copy of what export would produce. The
//! watermark is drawn at the same downscale factor and placed by the same
//! resolver, so a relative position chosen here lands on the same spot of
//! the full-size output.

use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::export::resize::resample;
use crate::export::{ExportError, ResizePolicy, decode, target_dimensions};
use crate::watermark::{
    AssetError, DragSession, PositionSpec, WatermarkAssets, WatermarkLayer, WatermarkSpec,
    compose, prepare,
};

#[derive(Debug, Clone)]
pub struct Preview {
    source: PathBuf,
    canvas: RgbaImage,
    export_size: (u32, u32),
    factor: f32,
}

impl Preview {
    /// Decode `source` and build a preview of its export at `resize`, with
    /// the longest edge at most `max_edge` pixels.
    pub fn open(source: &Path, resize: ResizePolicy, max_edge: u32) -> Result<Self, ExportError> {
        let decoded = decode(source)?;
        Self::from_image(source, decoded, resize, max_edge)
    }

    pub fn from_image(
        source: &Path,
        image: DynamicImage,
        resize: ResizePolicy,
        max_edge: u32,
    ) -> Result<Self, ExportError> {
        let export_size = target_dimensions(resize, image.width(), image.height())?;
        let (preview_size, factor) = fit_within(export_size, max_edge);
        let canvas = resample(image, preview_size).to_rgba8();
        debug!(
            "Preview of {:?}: export {}x{}, preview {}x{} (factor {:.4})",
            source, export_size.0, export_size.1, preview_size.0, preview_size.1, factor
        );
        Ok(Self {
            source: source.to_path_buf(),
            canvas,
            export_size,
            factor,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The downscaled canvas, without watermark.
    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Size of the image export would write for the same resize policy.
    pub fn export_size(&self) -> (u32, u32) {
        self.export_size
    }

    /// Preview pixels per export pixel, at most 1.
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// The watermark layer as drawn on this preview.
    pub fn layer(
        &self,
        spec: &WatermarkSpec,
        assets: &WatermarkAssets,
    ) -> Result<WatermarkLayer, AssetError> {
        prepare(spec, assets, self.factor)
    }

    /// The preview canvas with the watermark composited at `position`.
    pub fn render(
        &self,
        spec: &WatermarkSpec,
        position: &PositionSpec,
        assets: &WatermarkAssets,
    ) -> Result<RgbaImage, AssetError> {
        compose(&self.canvas, spec, assets, position, self.factor)
    }

    /// A drag session over this preview's canvas, sized to the watermark
    /// as currently drawn.
    pub fn drag_session(
        &self,
        spec: &WatermarkSpec,
        position: PositionSpec,
        assets: &WatermarkAssets,
    ) -> Result<DragSession, AssetError> {
        let layer = self.layer(spec, assets)?;
        Ok(DragSession::new(
            position,
            self.canvas.dimensions(),
            layer.dimensions(),
        ))
    }
}

/// Largest size with the same aspect ratio whose longest edge is at most
/// `max_edge`. Images already small enough are left at factor 1.
fn fit_within(size: (u32, u32), max_edge: u32) -> ((u32, u32), f32) {
    let (width, height) = size;
    let longest = width.max(height);
    if max_edge == 0 || longest <= max_edge {
        return (size, 1.0);
    }
    let factor = max_edge as f64 / longest as f64;
    let side = |value: u32| ((value as f64 * factor).round() as u32).max(1);
    ((side(width), side(height)), factor as f32)
}
