use image::DynamicImage;
use image::imageops::FilterType;
use tracing::debug;

use super::error::ExportError;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResizePolicy {
    #[default]
    None,
    /// Fixed output width, height follows the aspect ratio.
    Width(u32),
    /// Fixed output height, width follows the aspect ratio.
    Height(u32),
    Percent(f32),
}

/// Output dimensions for a `width` x `height` source. Computed sides are
/// never smaller than one pixel.
pub fn target_dimensions(
    policy: ResizePolicy,
    width: u32,
    height: u32,
) -> Result<(u32, u32), ExportError> {
    if width == 0 || height == 0 {
        return Err(ExportError::InvalidResizeParameter(format!(
            "source has no pixels ({}x{})",
            width, height
        )));
    }
    let (w, h) = (width as f64, height as f64);
    let side = |value: f64| (value.round() as u32).max(1);

    match policy {
        ResizePolicy::None => Ok((width, height)),
        ResizePolicy::Width(0) => Err(ExportError::InvalidResizeParameter(
            "width must be positive".to_string(),
        )),
        ResizePolicy::Height(0) => Err(ExportError::InvalidResizeParameter(
            "height must be positive".to_string(),
        )),
        ResizePolicy::Width(target) => Ok((target, side(h * target as f64 / w))),
        ResizePolicy::Height(target) => Ok((side(w * target as f64 / h), target)),
        ResizePolicy::Percent(percent) => {
            if !(percent.is_finite() && percent > 0.0) {
                return Err(ExportError::InvalidResizeParameter(format!(
                    "percent must be positive, got {}",
                    percent
                )));
            }
            let factor = percent as f64 / 100.0;
            Ok((side(w * factor), side(h * factor)))
        }
    }
}

/// Resample to `target` with Lanczos3; returns the image untouched when the
/// size already matches.
pub fn resample(image: DynamicImage, target: (u32, u32)) -> DynamicImage {
    if image.width() == target.0 && image.height() == target.1 {
        return image;
    }
    debug!(
        "Resizing {}x{} -> {}x{}",
        image.width(),
        image.height(),
        target.0,
        target.1
    );
    image.resize_exact(target.0, target.1, FilterType::Lanczos3)
}
