// Export module - resize, encode and write one watermarked image
mod error;
pub mod formats;
pub mod naming;
mod pipeline;
pub mod resize;

pub use error::{ExportError, ExportErrorKind};
pub use formats::{OutputFormat, Quality};
pub use naming::{OutputNamer, RenameRule, output_file_name};
pub(crate) use pipeline::decode;
pub use pipeline::{ExportedFile, Exporter, effective_watermark};
pub use resize::{ResizePolicy, target_dimensions};
