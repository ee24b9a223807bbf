//! On-disk template format.
//!
//! Reading is lenient: unknown fields are ignored, every field may be
//! missing, numbers may be strings and flags may be booleans or 0/1. A value
//! of the wrong shape is treated as missing. Writing always produces numbers
//! and 0/1 flags.

use image::Rgba;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::Template;
use crate::export::{OutputFormat, Quality, RenameRule, ResizePolicy};
use crate::watermark::spec::{default_background, format_color};
use crate::watermark::{
    Anchor, FontFamily, ImageWatermark, PositionSpec, Shadow, Stroke, TextWatermark,
    WatermarkSpec, parse_color,
};

const DEFAULT_PREFIX: &str = "wm_";
const DEFAULT_SUFFIX: &str = "_wm";
const DEFAULT_RESIZE_WIDTH: f64 = 1920.0;
const DEFAULT_RESIZE_HEIGHT: f64 = 1080.0;
const DEFAULT_RESIZE_PERCENT: f64 = 100.0;

/// Labels meaning a custom position, old and new.
const CUSTOM_LABELS: [&str; 2] = ["custom", "自定义"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRecord {
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub wm_type: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(deserialize_with = "lenient_pair", skip_serializing_if = "Option::is_none")]
    pub custom_pos_rel: Option<[f64; 2]>,
    #[serde(
        deserialize_with = "lenient_flag",
        serialize_with = "flag_as_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_pos_span: Option<bool>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(
        rename = "box",
        deserialize_with = "lenient_flag",
        serialize_with = "flag_as_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_box: Option<bool>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub box_color: Option<String>,
    #[serde(
        deserialize_with = "lenient_flag",
        serialize_with = "flag_as_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub stroke_enable: Option<bool>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(
        deserialize_with = "lenient_flag",
        serialize_with = "flag_as_int",
        skip_serializing_if = "Option::is_none"
    )]
    pub shadow_enable: Option<bool>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub shadow_dx: Option<f64>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub shadow_dy: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub shadow_color: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_wm_path: Option<String>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub image_scale: Option<f64>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub image_opacity: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub naming: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub resize_mode: Option<String>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub resize_width: Option<f64>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub resize_height: Option<f64>,
    #[serde(deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub resize_percent: Option<f64>,
}

impl TemplateRecord {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_template(template: &Template) -> Self {
        let mut record = TemplateRecord {
            name: Some(template.name.clone()),
            rotation: Some(template.watermark.rotation_degrees() as f64),
            format: Some(template.format.label().to_string()),
            quality: Some(template.jpeg_quality.value() as f64),
            ..Default::default()
        };

        match &template.watermark {
            WatermarkSpec::Text(text) => {
                record.wm_type = Some("text".to_string());
                record.text = Some(text.content().to_string());
                record.font_size = Some(text.font_size() as f64);
                record.font_family = Some(text.font_family().label().to_string());
                record.color = Some(format_color(text.color()));
                record.opacity = Some(text.opacity() as f64);
                record.background_box = Some(text.background().is_some());
                record.box_color = text.background().map(format_color);
                record.stroke_enable = Some(text.stroke().is_some());
                if let Some(stroke) = text.stroke() {
                    record.stroke_width = Some(stroke.width as f64);
                    record.stroke_color = Some(format_color(stroke.color));
                }
                record.shadow_enable = Some(text.shadow().is_some());
                if let Some(shadow) = text.shadow() {
                    record.shadow_dx = Some(shadow.dx as f64);
                    record.shadow_dy = Some(shadow.dy as f64);
                    record.shadow_color = Some(format_color(shadow.color));
                }
            }
            WatermarkSpec::Image(image) => {
                record.wm_type = Some("image".to_string());
                record.image_wm_path = Some(image.source_path().to_string_lossy().into_owned());
                record.image_scale = Some(image.scale_percent() as f64);
                record.image_opacity = Some(image.opacity() as f64);
            }
        }

        match template.position {
            PositionSpec::Preset(anchor) => {
                record.pos = Some(anchor.as_str().to_string());
            }
            PositionSpec::Custom {
                rel_x,
                rel_y,
                span_normalized,
            } => {
                record.pos = Some("custom".to_string());
                record.custom_pos_rel = Some([rel_x, rel_y]);
                record.custom_pos_span = Some(span_normalized);
            }
        }

        match &template.rename {
            RenameRule::Keep => record.naming = Some("keep".to_string()),
            RenameRule::Prefix(prefix) => {
                record.naming = Some("prefix".to_string());
                record.prefix = Some(prefix.clone());
            }
            RenameRule::Suffix(suffix) => {
                record.naming = Some("suffix".to_string());
                record.suffix = Some(suffix.clone());
            }
        }

        let (mode, width, height, percent) = match template.resize {
            ResizePolicy::None => ("none", None, None, None),
            ResizePolicy::Width(w) => ("width", Some(w as f64), None, None),
            ResizePolicy::Height(h) => ("height", None, Some(h as f64), None),
            ResizePolicy::Percent(p) => ("percent", None, None, Some(p as f64)),
        };
        record.resize_mode = Some(mode.to_string());
        record.resize_width = width;
        record.resize_height = height;
        record.resize_percent = percent;

        record
    }

    /// Build a template, filling every missing or unusable field with its
    /// default.
    pub fn into_template(self) -> Template {
        let defaults = Template::default();
        let rotation = self.rotation.unwrap_or(0.0) as f32;

        let is_image = self
            .wm_type
            .as_deref()
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("image"));
        let watermark = if is_image {
            let mut image = ImageWatermark::new(self.image_wm_path.clone().unwrap_or_default())
                .with_rotation(rotation);
            if let Some(scale) = self.image_scale {
                image = image.with_scale_percent(scale as f32);
            }
            if let Some(opacity) = self.image_opacity {
                image = image.with_opacity(opacity as f32);
            }
            WatermarkSpec::Image(image)
        } else {
            WatermarkSpec::Text(self.text_watermark(rotation))
        };

        Template {
            name: self.name.clone().unwrap_or(defaults.name),
            watermark,
            position: self.position().unwrap_or(defaults.position),
            resize: self.resize_policy(),
            format: self
                .format
                .as_deref()
                .and_then(OutputFormat::parse)
                .unwrap_or(defaults.format),
            jpeg_quality: self
                .quality
                .map(|q| Quality::new(q.round() as i64))
                .unwrap_or(defaults.jpeg_quality),
            rename: self.rename_rule(),
        }
    }

    fn text_watermark(&self, rotation: f32) -> TextWatermark {
        let mut text = TextWatermark::new(self.text.clone().unwrap_or_default()).with_rotation(rotation);
        if let Some(family) = &self.font_family {
            text = text.with_font_family(FontFamily::parse(family));
        }
        if let Some(size) = self.font_size {
            text = text.with_font_size(size as f32);
        }
        if let Some(color) = self.color.as_deref().and_then(parse_color) {
            text = text.with_color(color);
        }
        if let Some(opacity) = self.opacity {
            text = text.with_opacity(opacity as f32);
        }

        let background = if self.background_box.unwrap_or(true) {
            Some(
                self.box_color
                    .as_deref()
                    .and_then(parse_color)
                    .unwrap_or_else(default_background),
            )
        } else {
            None
        };

        let stroke = self.stroke_enable.unwrap_or(false).then(|| {
            let default = Stroke::default();
            Stroke {
                width: self
                    .stroke_width
                    .map(|w| w.round().max(1.0) as u32)
                    .unwrap_or(default.width),
                color: color_or(self.stroke_color.as_deref(), default.color),
            }
        });

        let shadow = self.shadow_enable.unwrap_or(false).then(|| {
            let default = Shadow::default();
            Shadow {
                dx: self.shadow_dx.map(|d| d.round() as i32).unwrap_or(default.dx),
                dy: self.shadow_dy.map(|d| d.round() as i32).unwrap_or(default.dy),
                color: color_or(self.shadow_color.as_deref(), default.color),
            }
        });

        text.with_background(background)
            .with_stroke(stroke)
            .with_shadow(shadow)
    }

    /// `None` when the record names no usable position.
    fn position(&self) -> Option<PositionSpec> {
        let label = self.pos.as_deref()?.trim();
        if CUSTOM_LABELS.contains(&label.to_lowercase().as_str()) {
            let [rel_x, rel_y] = self.custom_pos_rel?;
            // Records written before span normalization have no flag
            let span = self.custom_pos_span.unwrap_or(false);
            return Some(PositionSpec::custom(rel_x, rel_y, span));
        }
        Anchor::parse(label).map(PositionSpec::Preset)
    }

    fn resize_policy(&self) -> ResizePolicy {
        let mode = self.resize_mode.as_deref().unwrap_or("none").trim().to_lowercase();
        match mode.as_str() {
            "width" => ResizePolicy::Width(to_pixels(
                self.resize_width.unwrap_or(DEFAULT_RESIZE_WIDTH),
            )),
            "height" => ResizePolicy::Height(to_pixels(
                self.resize_height.unwrap_or(DEFAULT_RESIZE_HEIGHT),
            )),
            "percent" => ResizePolicy::Percent(
                self.resize_percent.unwrap_or(DEFAULT_RESIZE_PERCENT) as f32,
            ),
            _ => ResizePolicy::None,
        }
    }

    fn rename_rule(&self) -> RenameRule {
        let naming = self.naming.as_deref().unwrap_or("keep").trim().to_lowercase();
        match naming.as_str() {
            "prefix" => RenameRule::Prefix(
                self.prefix.clone().unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            ),
            "suffix" => RenameRule::Suffix(
                self.suffix.clone().unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
            ),
            _ => RenameRule::Keep,
        }
    }
}

fn color_or(value: Option<&str>, fallback: Rgba<u8>) -> Rgba<u8> {
    value.and_then(parse_color).unwrap_or(fallback)
}

/// Non-positive values map to 0 so export reports them as invalid.
fn to_pixels(value: f64) -> u32 {
    if value.is_finite() {
        value.round().clamp(0.0, u32::MAX as f64) as u32
    } else {
        0
    }
}

fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_number))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_pair<'de, D>(deserializer: D) -> Result<Option<[f64; 2]>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) if items.len() == 2 => {
            match (value_as_number(&items[0]), value_as_number(&items[1])) {
                (Some(x), Some(y)) => Some([x, y]),
                _ => None,
            }
        }
        _ => None,
    })
}

fn flag_as_int<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(flag) => serializer.serialize_u8(u8::from(*flag)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record_is_default_template() {
        let template = TemplateRecord::from_json("{}").unwrap().into_template();
        assert_eq!(template, Template::default());
    }

    #[test]
    fn test_lenient_values() {
        let record = TemplateRecord::from_json(
            r#"{
                "font_size": "48",
                "opacity": "0.5",
                "box": 0,
                "stroke_enable": "1",
                "stroke_width": 3,
                "shadow_enable": true,
                "quality": "80",
                "rotation": null,
                "unknown_field": {"nested": [1, 2, 3]},
                "color": 12
            }"#,
        )
        .unwrap();
        let template = record.into_template();
        let WatermarkSpec::Text(text) = &template.watermark else {
            panic!("expected a text watermark");
        };
        assert_eq!(text.font_size(), 48.0);
        assert_eq!(text.opacity(), 0.5);
        assert!(text.background().is_none());
        assert_eq!(text.stroke().map(|s| s.width), Some(3));
        assert_eq!(text.shadow(), Some(Shadow::default()));
        // "12" is not a color, so the default stays
        assert_eq!(text.color(), Rgba([255, 255, 255, 255]));
        assert_eq!(template.jpeg_quality.value(), 80);
    }

    #[test]
    fn test_wrong_shapes_are_treated_as_missing() {
        let template = TemplateRecord::from_json(
            r#"{"font_size": [1], "custom_pos_rel": "0.5,0.5", "pos": "custom", "quality": "high"}"#,
        )
        .unwrap()
        .into_template();
        // custom without coordinates falls back to the default anchor
        assert_eq!(template.position, PositionSpec::default());
        assert_eq!(template.jpeg_quality, Quality::default());
    }

    #[test]
    fn test_legacy_localized_record() {
        let template = TemplateRecord::from_json(
            r#"{
                "text": "© 2024",
                "font_family": "(自动)",
                "pos": "自定义",
                "custom_pos_rel": [0.25, 0.75],
                "naming": "prefix",
                "format": "PNG",
                "resize_mode": "percent",
                "resize_percent": "50"
            }"#,
        )
        .unwrap()
        .into_template();

        assert_eq!(
            template.position,
            PositionSpec::Custom {
                rel_x: 0.25,
                rel_y: 0.75,
                span_normalized: false
            }
        );
        assert_eq!(template.rename, RenameRule::Prefix("wm_".to_string()));
        assert_eq!(template.format, OutputFormat::Png);
        assert_eq!(template.resize, ResizePolicy::Percent(50.0));
        let WatermarkSpec::Text(text) = &template.watermark else {
            panic!("expected a text watermark");
        };
        assert_eq!(text.font_family(), &FontFamily::Auto);
        assert_eq!(text.content(), "© 2024");
    }

    #[test]
    fn test_localized_preset_label() {
        let template = TemplateRecord::from_json(r#"{"pos": "左上"}"#)
            .unwrap()
            .into_template();
        assert_eq!(template.position, PositionSpec::Preset(Anchor::TopLeft));
    }

    #[test]
    fn test_image_record() {
        let template = TemplateRecord::from_json(
            r#"{"wm_type": "image", "image_wm_path": "/logos/mark.png", "image_scale": 40, "image_opacity": 0.3, "rotation": 15}"#,
        )
        .unwrap()
        .into_template();
        let WatermarkSpec::Image(image) = &template.watermark else {
            panic!("expected an image watermark");
        };
        assert_eq!(image.source_path().to_str(), Some("/logos/mark.png"));
        assert_eq!(image.scale_percent(), 40.0);
        assert_eq!(image.opacity(), 0.3);
        assert_eq!(image.rotation_degrees(), 15.0);
    }

    #[test]
    fn test_negative_resize_width_stays_invalid() {
        let template = TemplateRecord::from_json(r#"{"resize_mode": "width", "resize_width": -5}"#)
            .unwrap()
            .into_template();
        assert_eq!(template.resize, ResizePolicy::Width(0));
    }

    #[test]
    fn test_flags_written_as_integers() {
        let template = Template {
            position: PositionSpec::custom(0.1, 0.9, true),
            ..Template::default()
        };
        let json = TemplateRecord::from_template(&template).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["box"], Value::from(1));
        assert_eq!(value["stroke_enable"], Value::from(0));
        assert_eq!(value["custom_pos_span"], Value::from(1));
        assert_eq!(value["pos"], Value::from("custom"));
    }

    #[test]
    fn test_template_survives_write_and_read() {
        let template = Template {
            name: "studio".to_string(),
            watermark: WatermarkSpec::Text(
                TextWatermark::new("Studio")
                    .with_font_family(FontFamily::Named("DejaVuSans".into()))
                    .with_font_size(20.0)
                    .with_color(Rgba([10, 20, 30, 200]))
                    .with_opacity(0.5)
                    .with_rotation(30.0)
                    .with_stroke(Some(Stroke {
                        width: 4,
                        color: Rgba([255, 0, 0, 255]),
                    }))
                    .with_shadow(Some(Shadow {
                        dx: -3,
                        dy: 5,
                        color: Rgba([0, 0, 0, 100]),
                    })),
            ),
            position: PositionSpec::Preset(Anchor::TopCenter),
            resize: ResizePolicy::Height(720),
            format: OutputFormat::Png,
            jpeg_quality: Quality::new(70),
            rename: RenameRule::Suffix("_final".to_string()),
        };
        let json = TemplateRecord::from_template(&template).to_json().unwrap();
        let restored = TemplateRecord::from_json(&json).unwrap().into_template();
        assert_eq!(restored, template);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(TemplateRecord::from_json("{ not json").is_err());
        assert!(TemplateRecord::from_json("\"just a string\"").is_err());
    }
}
