//! Frame annotation.
//!
//! Draws every detection (box + label) and the four summary lines onto the
//! frame buffer in place. Layout and colours are fixed cosmetics; text origins
//! are baseline-left. Box geometry is clipped to the frame in 64-bit
//! arithmetic, so any `i32` coordinates a detector reports are drawable.
//!
//! Text needs a TrueType font. A font that cannot be loaded is an error unless
//! the caller asks for boxes only.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::tally::{FrameTally, TrafficStatus};

/// Fixed colours, stroke and placement for the overlay.
#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub detection_color: Rgb<u8>,
    pub summary_color: Rgb<u8>,
    pub status_color: Rgb<u8>,
    pub thickness: u32,
    pub font_scale: f32,
    /// Label baseline sits this far above the box top.
    pub label_offset: i32,
    /// Baseline of the first summary line.
    pub summary_origin: (i32, i32),
    pub line_spacing: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            detection_color: Rgb([0, 255, 0]),
            summary_color: Rgb([0, 0, 255]),
            status_color: Rgb([255, 0, 0]),
            thickness: 2,
            font_scale: 26.0,
            label_offset: 10,
            summary_origin: (10, 30),
            line_spacing: 30,
        }
    }
}

/// The four summary lines, top to bottom.
pub fn summary_lines(tally: &FrameTally, status: TrafficStatus) -> [String; 4] {
    [
        format!("Cars: {}, Trucks: {}", tally.car, tally.truck),
        format!("Buses: {}, Motorcycles: {}", tally.bus, tally.motorcycle),
        format!("Bicycles: {}", tally.bicycle),
        format!("Traffic Flow: {}", status),
    ]
}

/// Overlay renderer. A boxes-only overlay draws no text at all.
pub struct Overlay {
    font: Option<FontVec>,
    style: OverlayStyle,
}

impl Overlay {
    pub fn boxes_only(style: OverlayStyle) -> Self {
        Self { font: None, style }
    }

    pub fn with_font_bytes(bytes: Vec<u8>, style: OverlayStyle) -> Result<Self> {
        let font = FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font: {}", e))?;
        Ok(Self {
            font: Some(font),
            style,
        })
    }

    pub fn with_font_file(path: &Path, style: OverlayStyle) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        Self::with_font_bytes(bytes, style)
    }

    /// Overlay drawing text with the font at `font`, or boxes only for `None`.
    pub fn load(font: Option<&Path>, style: OverlayStyle) -> Result<Self> {
        match font {
            Some(path) => Self::with_font_file(path, style).context(
                "overlay text needs a TrueType font; choose boxes-only mode to draw without text",
            ),
            None => {
                log::warn!("overlay text disabled: drawing boxes only");
                Ok(Self::boxes_only(style))
            }
        }
    }

    pub fn has_text(&self) -> bool {
        self.font.is_some()
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Annotate `image` in place.
    pub fn draw(
        &self,
        image: &mut RgbImage,
        detections: &[Detection],
        tally: &FrameTally,
        status: TrafficStatus,
    ) {
        for detection in detections {
            self.draw_detection(image, detection);
        }

        let (x, mut y) = self.style.summary_origin;
        let lines = summary_lines(tally, status);
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let color = if i == last {
                self.style.status_color
            } else {
                self.style.summary_color
            };
            self.draw_text(image, line, i64::from(x), i64::from(y), color);
            y += self.style.line_spacing;
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let bbox = &detection.bbox;
        let color = self.style.detection_color;
        let thickness = i64::from(self.style.thickness);

        // Edges beyond the margin are offscreen either way.
        let margin = thickness + 1;
        let clip = |v: i32, size: u32| i64::from(v).clamp(-margin, i64::from(size) + margin);
        let left = clip(bbox.left, image.width());
        let top = clip(bbox.top, image.height());
        let width = (clip(bbox.right, image.width()) - left).max(1);
        let height = (clip(bbox.bottom, image.height()) - top).max(1);

        for t in 0..thickness {
            let w = width - 2 * t;
            let h = height - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at((left + t) as i32, (top + t) as i32).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }
        self.draw_text(
            image,
            &detection.label,
            i64::from(bbox.left),
            i64::from(bbox.top) - i64::from(self.style.label_offset),
            color,
        );
    }

    fn draw_text(&self, image: &mut RgbImage, text: &str, x: i64, baseline: i64, color: Rgb<u8>) {
        let Some(font) = &self.font else {
            return;
        };
        let font_scale = self.style.font_scale;
        let passes = i64::from(self.style.thickness.max(1));
        let line = font_scale.ceil() as i64;
        let reach = line * text.chars().count() as i64 + passes;
        if x >= i64::from(image.width())
            || x + reach < 0
            || baseline - line >= i64::from(image.height())
            || baseline + line < 0
        {
            return;
        }

        let scale = PxScale::from(font_scale);
        let top = (baseline - (font_scale * 0.75) as i64) as i32;
        // a second pass one pixel over gives the bold stroke
        for dx in 0..passes {
            draw_text_mut(image, color, (x + dx) as i32, top, scale, font, text);
        }
    }
}
