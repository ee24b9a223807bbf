// Watermark module - model, positioning, fonts and compositing
mod assets;
pub mod drag;
mod error;
pub mod font;
pub mod position;
pub mod render;
pub mod spec;

pub use assets::WatermarkAssets;
pub use drag::{DragSession, DragState};
pub use error::{AssetError, FontResolutionError};
pub use font::{FontCatalog, FontFamily, ResolvedFont};
pub use position::{Anchor, PRESET_MARGIN, PositionSpec, WatermarkRect, capture_drag, resolve};
pub use render::{WatermarkLayer, compose, prepare, render};
pub use spec::{ImageWatermark, Shadow, Stroke, TextWatermark, WatermarkSpec, parse_color};
