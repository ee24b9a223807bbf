use image::RgbaImage;
use std::path::PathBuf;
use tracing::{debug, info};

use super::error::{AssetError, FontResolutionError};
use super::font::{FontCatalog, ResolvedFont};
use super::spec::WatermarkSpec;

/// Everything a watermark needs from disk, loaded once and shared by all
/// renders of a batch or preview.
#[derive(Debug, Clone)]
pub enum WatermarkAssets {
    Font(ResolvedFont),
    Image(RgbaImage),
}

impl WatermarkAssets {
    pub fn load(
        spec: &WatermarkSpec,
        catalog: &FontCatalog,
        preferred: &[String],
    ) -> Result<Self, AssetError> {
        match spec {
            WatermarkSpec::Text(text) => {
                let font = catalog.resolve(text.font_family(), preferred)?;
                info!("Using font '{}' for text watermark", font.name);
                Ok(WatermarkAssets::Font(font))
            }
            WatermarkSpec::Image(image) => {
                let path = image.source_path();
                let decoded = image::open(path).map_err(|source| AssetError::WatermarkImage {
                    path: PathBuf::from(path),
                    source,
                })?;
                debug!(
                    "Loaded watermark image {:?} ({}x{})",
                    path,
                    decoded.width(),
                    decoded.height()
                );
                Ok(WatermarkAssets::Image(decoded.to_rgba8()))
            }
        }
    }

    pub fn font_warning(&self) -> Option<&FontResolutionError> {
        match self {
            WatermarkAssets::Font(font) => font.warning.as_ref(),
            WatermarkAssets::Image(_) => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            WatermarkAssets::Font(_) => "font",
            WatermarkAssets::Image(_) => "image",
        }
    }
}
