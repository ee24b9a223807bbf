//! Watermark descriptions.
//!
//! A [`WatermarkSpec`] is a closed sum type: either a text watermark with its
//! full visual style, or an image watermark. Values are immutable; every
//! `with_*` call consumes the spec and returns a new one.

use image::Rgba;
use std::path::{Path, PathBuf};

use super::font::FontFamily;

const MIN_FONT_SIZE: f32 = 1.0;
const MIN_SCALE_PERCENT: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkSpec {
    Text(TextWatermark),
    Image(ImageWatermark),
}

impl WatermarkSpec {
    pub fn rotation_degrees(&self) -> f32 {
        match self {
            WatermarkSpec::Text(text) => text.rotation_degrees,
            WatermarkSpec::Image(image) => image.rotation_degrees,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            WatermarkSpec::Text(text) => text.opacity,
            WatermarkSpec::Image(image) => image.opacity,
        }
    }
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        WatermarkSpec::Text(TextWatermark::default())
    }
}

/// Outline drawn around the glyphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub width: u32,
    pub color: Rgba<u8>,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            width: 2,
            color: Rgba([0, 0, 0, 255]),
        }
    }
}

/// Offset copy of the glyphs drawn underneath the fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub dx: i32,
    pub dy: i32,
    pub color: Rgba<u8>,
}

impl Default for Shadow {
    fn default() -> Self {
        Self {
            dx: 2,
            dy: 2,
            color: Rgba([0, 0, 0, 128]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextWatermark {
    content: String,
    font_family: FontFamily,
    font_size: f32,
    color: Rgba<u8>,
    rotation_degrees: f32,
    opacity: f32,
    stroke: Option<Stroke>,
    shadow: Option<Shadow>,
    background: Option<Rgba<u8>>,
}

impl TextWatermark {
    /// An empty `content` stands for the capture date of each source image.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn font_family(&self) -> &FontFamily {
        &self.font_family
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn stroke(&self) -> Option<Stroke> {
        self.stroke
    }

    pub fn shadow(&self) -> Option<Shadow> {
        self.shadow
    }

    pub fn background(&self) -> Option<Rgba<u8>> {
        self.background
    }

    /// True when the text is taken from each file's capture date.
    pub fn uses_capture_date(&self) -> bool {
        self.content.trim().is_empty()
    }

    pub fn with_content(self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self
        }
    }

    pub fn with_font_family(self, font_family: FontFamily) -> Self {
        Self {
            font_family,
            ..self
        }
    }

    pub fn with_font_size(self, font_size: f32) -> Self {
        Self {
            font_size: sanitize_positive(font_size, MIN_FONT_SIZE),
            ..self
        }
    }

    pub fn with_color(self, color: Rgba<u8>) -> Self {
        Self { color, ..self }
    }

    pub fn with_rotation(self, rotation_degrees: f32) -> Self {
        Self {
            rotation_degrees: normalize_degrees(rotation_degrees),
            ..self
        }
    }

    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            opacity: clamp_unit(opacity),
            ..self
        }
    }

    pub fn with_stroke(self, stroke: Option<Stroke>) -> Self {
        Self { stroke, ..self }
    }

    pub fn with_shadow(self, shadow: Option<Shadow>) -> Self {
        Self { shadow, ..self }
    }

    pub fn with_background(self, background: Option<Rgba<u8>>) -> Self {
        Self { background, ..self }
    }
}

impl Default for TextWatermark {
    fn default() -> Self {
        Self {
            content: String::new(),
            font_family: FontFamily::Auto,
            font_size: 32.0,
            color: Rgba([255, 255, 255, 255]),
            rotation_degrees: 0.0,
            opacity: 0.7,
            stroke: None,
            shadow: None,
            background: Some(default_background()),
        }
    }
}

/// Semi-opaque black box behind the text.
pub fn default_background() -> Rgba<u8> {
    Rgba([0, 0, 0, 150])
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageWatermark {
    source_path: PathBuf,
    scale_percent: f32,
    rotation_degrees: f32,
    opacity: f32,
}

impl ImageWatermark {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            scale_percent: 100.0,
            rotation_degrees: 0.0,
            opacity: 0.8,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn scale_percent(&self) -> f32 {
        self.scale_percent
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn with_scale_percent(self, scale_percent: f32) -> Self {
        Self {
            scale_percent: sanitize_positive(scale_percent, MIN_SCALE_PERCENT),
            ..self
        }
    }

    pub fn with_rotation(self, rotation_degrees: f32) -> Self {
        Self {
            rotation_degrees: normalize_degrees(rotation_degrees),
            ..self
        }
    }

    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            opacity: clamp_unit(opacity),
            ..self
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        1.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn sanitize_positive(value: f32, min: f32) -> f32 {
    if value.is_finite() { value.max(min) } else { min }
}

/// Map any angle into `[0, 360)`.
fn normalize_degrees(degrees: f32) -> f32 {
    if degrees.is_finite() {
        degrees.rem_euclid(360.0)
    } else {
        0.0
    }
}

/// Parse a color string.
///
/// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa` and a handful of names. Returns
/// `None` for anything else so callers can pick their own fallback.
pub fn parse_color(input: &str) -> Option<Rgba<u8>> {
    let s = input.trim();
    if let Some(hex) = s.strip_prefix('#') {
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
        return match hex.len() {
            3 => {
                let expand = |i: usize| {
                    let digit = u8::from_str_radix(hex.get(i..i + 1)?, 16).ok()?;
                    Some(digit * 17)
                };
                Some(Rgba([expand(0)?, expand(1)?, expand(2)?, 255]))
            }
            6 => Some(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255])),
            8 => Some(Rgba([
                channel(0..2)?,
                channel(2..4)?,
                channel(4..6)?,
                channel(6..8)?,
            ])),
            _ => None,
        };
    }

    match s.to_lowercase().as_str() {
        "white" => Some(Rgba([255, 255, 255, 255])),
        "black" => Some(Rgba([0, 0, 0, 255])),
        "red" => Some(Rgba([255, 0, 0, 255])),
        "green" => Some(Rgba([0, 128, 0, 255])),
        "blue" => Some(Rgba([0, 0, 255, 255])),
        "yellow" => Some(Rgba([255, 255, 0, 255])),
        "gray" | "grey" => Some(Rgba([128, 128, 128, 255])),
        _ => None,
    }
}

/// Inverse of [`parse_color`]: `#rrggbb`, or `#rrggbbaa` when not opaque.
pub fn format_color(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}
