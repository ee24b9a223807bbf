use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("No usable font found in {searched} font directories")]
    NoFontAvailable { searched: usize },

    #[error("Watermark image {path:?} could not be loaded: {source}")]
    WatermarkImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Loaded {loaded} assets cannot draw a {requested} watermark")]
    Mismatch {
        loaded: &'static str,
        requested: &'static str,
    },
}

/// The requested font family could not be used. Rendering continues with
/// `fallback`, so this is reported as a warning.
#[derive(Debug, Clone, Error)]
#[error("Font '{requested}' is unavailable, using '{fallback}' instead")]
pub struct FontResolutionError {
    pub requested: String,
    pub fallback: String,
}
