use std::path::PathBuf;
use thiserror::Error;

use crate::watermark::AssetError;

/// Conditions that stop a batch before any file is touched.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No supported images found in the given inputs")]
    EmptyJob,

    #[error("Output directory {path:?} is not writable: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watermark assets unavailable: {0}")]
    Assets(#[from] AssetError),
}
