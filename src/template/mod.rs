//! Persisted watermark and export settings.

mod error;
mod record;
mod session;
mod store;

pub use error::TemplateError;
pub use record::TemplateRecord;
pub use session::Session;
pub use store::{LoadedTemplate, TemplateStore, sanitize_name};

use crate::export::{OutputFormat, Quality, RenameRule, ResizePolicy};
use crate::watermark::{PositionSpec, WatermarkSpec};

/// Everything needed to watermark and export a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub watermark: WatermarkSpec,
    pub position: PositionSpec,
    pub resize: ResizePolicy,
    pub format: OutputFormat,
    pub jpeg_quality: Quality,
    pub rename: RenameRule,
}

impl Default for Template {
    /// Capture-date text in a semi-opaque box at the bottom right, exported
    /// as full-size JPEG under the source name.
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            watermark: WatermarkSpec::default(),
            position: PositionSpec::default(),
            resize: ResizePolicy::None,
            format: OutputFormat::Jpeg,
            jpeg_quality: Quality::default(),
            rename: RenameRule::Keep,
        }
    }
}
