use std::path::PathBuf;
use thiserror::Error;

use crate::watermark::AssetError;

/// Per-file export failure. None of these stop a batch.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Cannot decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid resize parameter: {0}")]
    InvalidResizeParameter(String),

    #[error("Cannot write {path:?}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output {path:?} collides with {reason}")]
    OutputCollision { path: PathBuf, reason: String },

    #[error("Watermark error: {0}")]
    Watermark(#[from] AssetError),
}

/// Coarse failure category reported in batch summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportErrorKind {
    DecodeError,
    InvalidResizeParameter,
    OutputWriteError,
    WatermarkError,
}

impl ExportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportErrorKind::DecodeError => "DecodeError",
            ExportErrorKind::InvalidResizeParameter => "InvalidResizeParameter",
            ExportErrorKind::OutputWriteError => "OutputWriteError",
            ExportErrorKind::WatermarkError => "WatermarkError",
        }
    }
}

impl std::fmt::Display for ExportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExportError {
    pub fn kind(&self) -> ExportErrorKind {
        match self {
            ExportError::Decode { .. } => ExportErrorKind::DecodeError,
            ExportError::InvalidResizeParameter(_) => ExportErrorKind::InvalidResizeParameter,
            ExportError::OutputWrite { .. } | ExportError::OutputCollision { .. } => {
                ExportErrorKind::OutputWriteError
            }
            ExportError::Watermark(_) => ExportErrorKind::WatermarkError,
        }
    }
}
