//! Drawing of a detection onto a copy of the source image.
//!
//! Everything is drawn on a transparent layer first, which is then alpha
//! blended over an RGBA copy of the source, so the caller's image is never
//! touched.

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Pixel, Rgb, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const FONT_PATHS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

// DejaVu Sans, shipped so labels always have a font to draw with
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

// average advance of a glyph relative to the font scale, used without a font
const GLYPH_WIDTH_RATIO: f32 = 0.6;

/// Color bucket derived from a detection confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfidenceTier {
    /// Above 0.75, drawn green.
    High,
    /// Above 0.5, drawn yellow.
    Medium,
    /// Everything else, drawn red.
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.75 {
            ConfidenceTier::High
        } else if confidence > 0.5 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            ConfidenceTier::High => Rgb([0, 255, 0]),
            ConfidenceTier::Medium => Rgb([255, 255, 0]),
            ConfidenceTier::Low => Rgb([255, 0, 0]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "green",
            ConfidenceTier::Medium => "yellow",
            ConfidenceTier::Low => "red",
        }
    }
}

/// A detection box in absolute pixels. Both corners are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl PixelBox {
    /// Scales normalized `[x1, y1, x2, y2]` to a `width` x `height` image,
    /// truncating to whole pixels.
    pub fn from_normalized(coords: [f32; 4], width: u32, height: u32) -> Self {
        let (x1, x2) = span(coords[0], coords[2], width);
        let (y1, y2) = span(coords[1], coords[3], height);
        Self { x1, y1, x2, y2 }
    }

    /// The drawable rectangle, with the far edges pulled inside a
    /// `width` x `height` canvas so the whole outline stays visible.
    fn to_rect(self, width: u32, height: u32) -> Rect {
        let x2 = self.x2.min(width.saturating_sub(1)).max(self.x1);
        let y2 = self.y2.min(height.saturating_sub(1)).max(self.y1);
        Rect::at(self.x1 as i32, self.y1 as i32).of_size(x2 - self.x1 + 1, y2 - self.y1 + 1)
    }
}

fn span(start: f32, end: f32, dimension: u32) -> (u32, u32) {
    let scale = |c: f32| (c.clamp(0.0, 1.0) * dimension as f32) as u32;
    let (a, b) = (scale(start), scale(end));
    let (mut lo, mut hi) = (a.min(b), a.max(b));

    // keep at least one pixel of extent when truncation collapses the span
    if lo == hi {
        if hi < dimension {
            hi += 1;
        } else if lo > 0 {
            lo -= 1;
        }
    }
    (lo, hi)
}

/// Drawing settings for [`render`].
pub struct OverlayStyle {
    /// Font for the label. Without one, only the label background is drawn.
    /// The default style uses the bundled DejaVu Sans.
    pub font: Option<FontVec>,
    pub font_scale: f32,
    /// Width of the box outline, drawn inward from the box edge.
    pub outline_width: u32,
    /// Alpha of the tier-colored box fill.
    pub fill_alpha: u8,
    pub label_background: Rgba<u8>,
    pub label_text: Rgba<u8>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font: bundled_font(),
            font_scale: 20.0,
            outline_width: 4,
            fill_alpha: 128,
            label_background: Rgba([0, 0, 0, 128]),
            label_text: Rgba([255, 255, 255, 255]),
        }
    }
}

impl OverlayStyle {
    /// Loads the label font from `font_path`.
    pub fn with_font_path(font_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let font_data = std::fs::read(font_path)?;
        let font = FontVec::try_from_vec(font_data)
            .map_err(|_| format!("Failed to parse font file: {}", font_path.display()))?;

        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Uses the first readable font from a list of common system locations,
    /// falling back to the bundled font.
    pub fn with_system_font() -> Self {
        for path in FONT_PATHS {
            let Ok(font_data) = std::fs::read(path) else {
                continue;
            };
            if let Ok(font) = FontVec::try_from_vec(font_data) {
                log::info!("Loaded label font: {}", path);
                return Self {
                    font: Some(font),
                    ..Self::default()
                };
            }
        }

        log::debug!("No system font found, using the bundled font");
        Self::default()
    }

    fn measure(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(self.font_scale), font, text),
            None => {
                let chars = text.chars().count() as f32;
                (
                    (chars * self.font_scale * GLYPH_WIDTH_RATIO).ceil() as u32,
                    self.font_scale.ceil() as u32,
                )
            }
        }
    }
}

fn bundled_font() -> Option<FontVec> {
    match FontVec::try_from_vec(BUNDLED_FONT.to_vec()) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("Bundled font is unreadable ({}), labels will be drawn without text", e);
            None
        }
    }
}

/// The label drawn above a box, e.g. `cat (60%)`.
pub fn label_text(label: &str, confidence: f32) -> String {
    format!("{} ({:.0}%)", label, confidence * 100.0)
}

/// Composites the detection box and its label over a copy of `image`.
pub fn render(
    image: &DynamicImage,
    coords: [f32; 4],
    confidence: f32,
    label: &str,
    style: &OverlayStyle,
) -> RgbaImage {
    let mut annotated = image.to_rgba8();
    let (width, height) = annotated.dimensions();
    if width == 0 || height == 0 {
        return annotated;
    }

    let pixel_box = PixelBox::from_normalized(coords, width, height);
    let tier = ConfidenceTier::from_confidence(confidence);
    log::debug!(
        "Drawing {:?} in {} on {}x{}",
        pixel_box,
        tier.as_str(),
        width,
        height
    );

    let mut layer = RgbaImage::new(width, height);
    draw_box(&mut layer, pixel_box.to_rect(width, height), tier, style);

    let text = label_text(label, confidence);
    let label_rect = label_rect(pixel_box, style.measure(&text), width, height);
    draw_filled_rect_mut(&mut layer, label_rect, style.label_background);
    if let Some(font) = &style.font {
        draw_text_mut(
            &mut layer,
            style.label_text,
            label_rect.left(),
            label_rect.top(),
            PxScale::from(style.font_scale),
            font,
            &text,
        );
    }

    composite(&mut annotated, &layer);
    annotated
}

fn draw_box(layer: &mut RgbaImage, rect: Rect, tier: ConfidenceTier, style: &OverlayStyle) {
    let Rgb([r, g, b]) = tier.color();

    draw_filled_rect_mut(layer, rect, Rgba([r, g, b, style.fill_alpha]));

    for inset in 0..style.outline_width {
        let shrink = 2 * inset;
        if rect.width() <= shrink || rect.height() <= shrink {
            break;
        }
        let ring = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
            .of_size(rect.width() - shrink, rect.height() - shrink);
        draw_hollow_rect_mut(layer, ring, Rgba([r, g, b, 255]));
    }
}

/// Places the label directly above the box's top-left corner, kept inside the canvas.
fn label_rect(pixel_box: PixelBox, text_size: (u32, u32), width: u32, height: u32) -> Rect {
    let label_width = text_size.0.clamp(1, width);
    let label_height = text_size.1.clamp(1, height);

    let top = pixel_box.y1.saturating_sub(label_height);
    let left = pixel_box.x1.min(width - label_width);

    Rect::at(left as i32, top as i32).of_size(label_width, label_height)
}

fn composite(base: &mut RgbaImage, layer: &RgbaImage) {
    for (dst, src) in base.pixels_mut().zip(layer.pixels()) {
        if src[3] > 0 {
            dst.blend(src);
        }
    }
}
