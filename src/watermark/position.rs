//! Watermark placement.
//!
//! [`resolve`] turns a [`PositionSpec`] into the top-left pixel offset of the
//! watermark layer on a canvas. Preview and export call it the same way,
//! each with its own canvas and layer extents, which is what keeps a
//! placement chosen on a downscaled preview stable at full resolution.

/// Gap between a preset-anchored watermark and the canvas edge.
pub const PRESET_MARGIN: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Start,
    Middle,
    End,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::CenterLeft,
        Anchor::Center,
        Anchor::CenterRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::TopLeft => "top-left",
            Anchor::TopCenter => "top-center",
            Anchor::TopRight => "top-right",
            Anchor::CenterLeft => "center-left",
            Anchor::Center => "center",
            Anchor::CenterRight => "center-right",
            Anchor::BottomLeft => "bottom-left",
            Anchor::BottomCenter => "bottom-center",
            Anchor::BottomRight => "bottom-right",
        }
    }

    /// Parse an anchor name. Also accepts the localized labels written by
    /// older template files.
    pub fn parse(label: &str) -> Option<Anchor> {
        let label = label.trim();
        let anchor = match label.to_lowercase().replace('_', "-").as_str() {
            "top-left" | "左上" => Anchor::TopLeft,
            "top-center" | "top" | "中上" => Anchor::TopCenter,
            "top-right" | "右上" => Anchor::TopRight,
            "center-left" | "middle-left" | "left" | "左中" => Anchor::CenterLeft,
            "center" | "middle" | "middle-center" | "居中" => Anchor::Center,
            "center-right" | "middle-right" | "right" | "右中" => Anchor::CenterRight,
            "bottom-left" | "左下" => Anchor::BottomLeft,
            "bottom-center" | "bottom" | "中下" => Anchor::BottomCenter,
            "bottom-right" | "右下" => Anchor::BottomRight,
            _ => return None,
        };
        Some(anchor)
    }

    fn alignment(&self) -> (Align, Align) {
        match self {
            Anchor::TopLeft => (Align::Start, Align::Start),
            Anchor::TopCenter => (Align::Middle, Align::Start),
            Anchor::TopRight => (Align::End, Align::Start),
            Anchor::CenterLeft => (Align::Start, Align::Middle),
            Anchor::Center => (Align::Middle, Align::Middle),
            Anchor::CenterRight => (Align::End, Align::Middle),
            Anchor::BottomLeft => (Align::Start, Align::End),
            Anchor::BottomCenter => (Align::Middle, Align::End),
            Anchor::BottomRight => (Align::End, Align::End),
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionSpec {
    Preset(Anchor),
    /// Fractional placement. With `span_normalized` the fractions are of the
    /// travel range (canvas minus watermark); without it they are of the
    /// whole canvas, which is how older templates stored them.
    Custom {
        rel_x: f64,
        rel_y: f64,
        span_normalized: bool,
    },
}

impl Default for PositionSpec {
    fn default() -> Self {
        PositionSpec::Preset(Anchor::BottomRight)
    }
}

impl PositionSpec {
    /// Custom position with both fractions clamped to `[0, 1]`.
    pub fn custom(rel_x: f64, rel_y: f64, span_normalized: bool) -> Self {
        PositionSpec::Custom {
            rel_x: clamp_fraction(rel_x),
            rel_y: clamp_fraction(rel_y),
            span_normalized,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            PositionSpec::Custom {
                span_normalized: false,
                ..
            }
        )
    }

    /// Re-express a legacy custom position in span form.
    ///
    /// The pixel offset the legacy formula produces on the reference canvas
    /// is kept; only its encoding changes. Every other position is returned
    /// unchanged.
    pub fn migrate_legacy(
        &self,
        canvas_w: u32,
        canvas_h: u32,
        watermark_w: u32,
        watermark_h: u32,
    ) -> PositionSpec {
        if !self.is_legacy() {
            return *self;
        }
        let (x, y) = resolve(self, canvas_w, canvas_h, watermark_w, watermark_h);
        let fraction = |offset: u32, canvas: u32, watermark: u32| {
            let travel = canvas as f64 - watermark as f64;
            if travel <= 0.0 {
                0.0
            } else {
                offset as f64 / travel
            }
        };
        PositionSpec::custom(
            fraction(x, canvas_w, watermark_w),
            fraction(y, canvas_h, watermark_h),
            true,
        )
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Top-left pixel offset of a `watermark_w` x `watermark_h` layer on a
/// `canvas_w` x `canvas_h` canvas.
///
/// The result is clamped to `[0, canvas - watermark]` on each axis, or 0
/// when the watermark is larger than the canvas.
pub fn resolve(
    position: &PositionSpec,
    canvas_w: u32,
    canvas_h: u32,
    watermark_w: u32,
    watermark_h: u32,
) -> (u32, u32) {
    let (canvas_w, canvas_h) = (canvas_w as i64, canvas_h as i64);
    let (watermark_w, watermark_h) = (watermark_w as i64, watermark_h as i64);

    let (x, y) = match *position {
        PositionSpec::Preset(anchor) => {
            let (horizontal, vertical) = anchor.alignment();
            (
                preset_offset(horizontal, canvas_w, watermark_w),
                preset_offset(vertical, canvas_h, watermark_h),
            )
        }
        PositionSpec::Custom {
            rel_x,
            rel_y,
            span_normalized: true,
        } => (
            scaled(rel_x, canvas_w - watermark_w),
            scaled(rel_y, canvas_h - watermark_h),
        ),
        PositionSpec::Custom {
            rel_x,
            rel_y,
            span_normalized: false,
        } => (scaled(rel_x, canvas_w), scaled(rel_y, canvas_h)),
    };

    (
        clamp_offset(x, canvas_w - watermark_w),
        clamp_offset(y, canvas_h - watermark_h),
    )
}

fn preset_offset(align: Align, canvas: i64, watermark: i64) -> i64 {
    match align {
        Align::Start => PRESET_MARGIN,
        Align::Middle => (canvas - watermark) / 2,
        Align::End => canvas - watermark - PRESET_MARGIN,
    }
}

fn scaled(fraction: f64, extent: i64) -> i64 {
    (clamp_fraction(fraction) * extent as f64).round() as i64
}

fn clamp_offset(offset: i64, travel: i64) -> u32 {
    offset.clamp(0, travel.max(0)) as u32
}

/// Turn a pointer location into a span-normalized custom position.
///
/// The pointer is taken as the watermark center. This is the inverse of the
/// span branch of [`resolve`]: resolving the result against the same extents
/// puts the watermark center back under the pointer, within a pixel.
pub fn capture_drag(
    pointer_x: f64,
    pointer_y: f64,
    canvas_w: u32,
    canvas_h: u32,
    watermark_w: u32,
    watermark_h: u32,
) -> PositionSpec {
    PositionSpec::custom(
        drag_fraction(pointer_x, canvas_w, watermark_w),
        drag_fraction(pointer_y, canvas_h, watermark_h),
        true,
    )
}

fn drag_fraction(pointer: f64, canvas: u32, watermark: u32) -> f64 {
    let travel = canvas as f64 - watermark as f64;
    if travel <= 0.0 {
        return 0.0;
    }
    (pointer - watermark as f64 / 2.0) / travel
}

/// Pixel rectangle occupied by a placed watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl WatermarkRect {
    pub fn place(
        position: &PositionSpec,
        canvas_w: u32,
        canvas_h: u32,
        watermark_w: u32,
        watermark_h: u32,
    ) -> Self {
        let (x, y) = resolve(position, canvas_w, canvas_h, watermark_w, watermark_h);
        Self {
            x,
            y,
            width: watermark_w,
            height: watermark_h,
        }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x as f64
            && py >= self.y as f64
            && px < self.x as f64 + self.width as f64
            && py < self.y as f64 + self.height as f64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_anchors() {
        let cases = [
            (Anchor::TopLeft, (10, 10)),
            (Anchor::TopCenter, (400, 10)),
            (Anchor::TopRight, (790, 10)),
            (Anchor::CenterLeft, (10, 250)),
            (Anchor::Center, (400, 250)),
            (Anchor::CenterRight, (790, 250)),
            (Anchor::BottomLeft, (10, 490)),
            (Anchor::BottomCenter, (400, 490)),
            (Anchor::BottomRight, (790, 490)),
        ];
        for (anchor, expected) in cases {
            assert_eq!(
                resolve(&PositionSpec::Preset(anchor), 1000, 600, 200, 100),
                expected,
                "anchor {} resolved incorrectly",
                anchor
            );
        }
    }

    #[test]
    fn test_center_uses_integer_division() {
        assert_eq!(
            resolve(&PositionSpec::Preset(Anchor::Center), 101, 51, 10, 10),
            (45, 20)
        );
    }

    #[test]
    fn test_oversized_watermark_clamps_to_origin() {
        for anchor in Anchor::ALL {
            assert_eq!(
                resolve(&PositionSpec::Preset(anchor), 100, 100, 150, 120),
                (0, 0)
            );
        }
        let custom = PositionSpec::custom(1.0, 1.0, true);
        assert_eq!(resolve(&custom, 100, 100, 150, 120), (0, 0));
    }

    #[test]
    fn test_margin_never_pushes_off_canvas() {
        // Watermark nearly as wide as the canvas: right anchor would be negative
        let pos = PositionSpec::Preset(Anchor::BottomRight);
        assert_eq!(resolve(&pos, 100, 100, 95, 95), (0, 0));
        let pos = PositionSpec::Preset(Anchor::TopLeft);
        assert_eq!(resolve(&pos, 100, 100, 95, 95), (5, 5));
    }

    #[test]
    fn test_span_custom_extremes() {
        let origin = PositionSpec::custom(0.0, 0.0, true);
        let far = PositionSpec::custom(1.0, 1.0, true);
        assert_eq!(resolve(&origin, 1000, 800, 200, 100), (0, 0));
        assert_eq!(resolve(&far, 1000, 800, 200, 100), (800, 700));
    }

    #[test]
    fn test_legacy_drift_is_exactly_100px() {
        let legacy = PositionSpec::custom(0.5, 0.5, false);
        let span = PositionSpec::custom(0.5, 0.5, true);
        let (legacy_x, _) = resolve(&legacy, 1000, 1000, 200, 200);
        let (span_x, _) = resolve(&span, 1000, 1000, 200, 200);
        assert_eq!(legacy_x, 500);
        assert_eq!(span_x, 400);
        assert_eq!(legacy_x - span_x, 100);
    }

    #[test]
    fn test_legacy_result_is_clamped() {
        let legacy = PositionSpec::custom(0.95, 0.95, false);
        assert_eq!(resolve(&legacy, 1000, 1000, 200, 200), (800, 800));
    }

    #[test]
    fn test_custom_constructor_clamps_fractions() {
        assert_eq!(
            PositionSpec::custom(-0.5, 1.7, true),
            PositionSpec::Custom {
                rel_x: 0.0,
                rel_y: 1.0,
                span_normalized: true
            }
        );
        assert_eq!(
            PositionSpec::custom(f64::NAN, 0.25, false),
            PositionSpec::Custom {
                rel_x: 0.0,
                rel_y: 0.25,
                span_normalized: false
            }
        );
    }

    #[test]
    fn test_capture_then_resolve_round_trip() {
        let canvases = [(800u32, 600u32), (1920, 1080), (333, 777), (64, 64)];
        let watermarks = [(10u32, 10u32), (200, 50), (63, 63), (1, 1)];
        for (cw, ch) in canvases {
            for (ww, wh) in watermarks {
                if ww > cw || wh > ch {
                    continue;
                }
                let half_w = ww as f64 / 2.0;
                let half_h = wh as f64 / 2.0;
                // Pointers whose implied rectangle lies fully inside the canvas
                for step in 0..=10 {
                    let t = step as f64 / 10.0;
                    let px = half_w + t * (cw - ww) as f64;
                    let py = half_h + t * (ch - wh) as f64;
                    let captured = capture_drag(px, py, cw, ch, ww, wh);
                    let (x, y) = resolve(&captured, cw, ch, ww, wh);
                    assert!(
                        (x as f64 - (px - half_w)).abs() <= 1.0
                            && (y as f64 - (py - half_h)).abs() <= 1.0,
                        "round trip drifted: pointer ({}, {}) canvas {}x{} watermark {}x{} -> ({}, {})",
                        px,
                        py,
                        cw,
                        ch,
                        ww,
                        wh,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_capture_clamps_and_handles_zero_travel() {
        assert_eq!(
            capture_drag(-50.0, 5000.0, 400, 300, 100, 100),
            PositionSpec::custom(0.0, 1.0, true)
        );
        assert_eq!(
            capture_drag(60.0, 60.0, 100, 100, 100, 120),
            PositionSpec::custom(0.0, 0.0, true)
        );
    }

    #[test]
    fn test_span_invariance_across_scales() {
        let position = PositionSpec::custom(0.3, 0.8, true);
        // Preview (downscaled) and export pairs with the same proportions
        let pairs = [((800u32, 600u32), (80u32, 40u32)), ((4000, 3000), (400, 200))];
        let fractions: Vec<(f64, f64)> = pairs
            .iter()
            .map(|&((cw, ch), (ww, wh))| {
                let (x, y) = resolve(&position, cw, ch, ww, wh);
                (
                    x as f64 / (cw - ww) as f64,
                    y as f64 / (ch - wh) as f64,
                )
            })
            .collect();
        assert!((fractions[0].0 - fractions[1].0).abs() < 0.01);
        assert!((fractions[0].1 - fractions[1].1).abs() < 0.01);
    }

    #[test]
    fn test_migrate_legacy_keeps_pixel_offset() {
        let legacy = PositionSpec::custom(0.5, 0.25, false);
        let migrated = legacy.migrate_legacy(1000, 800, 200, 100);

        assert!(!migrated.is_legacy());
        assert_eq!(
            resolve(&migrated, 1000, 800, 200, 100),
            resolve(&legacy, 1000, 800, 200, 100)
        );
        match migrated {
            PositionSpec::Custom { rel_x, .. } => assert!((rel_x - 0.625).abs() < 1e-9),
            other => panic!("unexpected migration result {:?}", other),
        }
    }

    #[test]
    fn test_migrate_leaves_non_legacy_alone() {
        let preset = PositionSpec::Preset(Anchor::TopRight);
        let span = PositionSpec::custom(0.1, 0.2, true);
        assert_eq!(preset.migrate_legacy(100, 100, 10, 10), preset);
        assert_eq!(span.migrate_legacy(100, 100, 10, 10), span);
    }

    #[test]
    fn test_anchor_parse_accepts_localized_labels() {
        assert_eq!(Anchor::parse("bottom-right"), Some(Anchor::BottomRight));
        assert_eq!(Anchor::parse("Top_Left"), Some(Anchor::TopLeft));
        assert_eq!(Anchor::parse("右下"), Some(Anchor::BottomRight));
        assert_eq!(Anchor::parse("居中"), Some(Anchor::Center));
        assert_eq!(Anchor::parse("自定义"), None);
        for anchor in Anchor::ALL {
            assert_eq!(Anchor::parse(anchor.as_str()), Some(anchor));
        }
    }

    #[test]
    fn test_rect_contains_and_center() {
        let rect = WatermarkRect::place(&PositionSpec::Preset(Anchor::TopLeft), 500, 500, 100, 50);
        assert_eq!(rect.center(), (60.0, 35.0));
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(109.5, 59.5));
        assert!(!rect.contains(110.0, 30.0));
        assert!(!rect.contains(9.9, 30.0));
    }
}
