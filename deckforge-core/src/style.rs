//! Style Template - Enforceable Layout Contract
//!
//! All geometry is in points on a fixed 16:9 canvas.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::layout::geometry::{Canvas, LayoutBox};

const DEFAULT_STYLE_JSON: &str = include_str!("../templates/analytics_16x9.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StyleTemplate {
    pub id: String,
    pub name: String,
    pub template_version: String,
    pub canvas: Canvas,
    pub font_family: String,
    pub palette: Palette,
    pub margin: f64,
    #[serde(default)]
    pub spacing: SpacingConfig,
    pub cover: CoverStyle,
    pub content: ContentStyle,
    pub synthesis: SynthesisStyle,
    pub message: MessageStyle,
    #[serde(default)]
    pub measure: MeasureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub primary: String,
    pub accent: String,
    pub text: String,
    pub background: String,
}

/// A text role: where it sits and how far its font may shrink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub font_size: f64,
    pub min_font_size: f64,
    #[serde(default)]
    pub bold: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoverStyle {
    pub title_box: LayoutBox,
    pub title: TextStyle,
    pub subtitle_box: LayoutBox,
    pub subtitle: TextStyle,
    pub footer_box: LayoutBox,
    pub footer: TextStyle,
    pub footer_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentStyle {
    pub headline_box: LayoutBox,
    pub headline: TextStyle,
    pub image_region: LayoutBox,
    /// Minimum clearance between the image frame and the region edge.
    pub image_margin: f64,
    /// Border width; `0` disables the frame.
    pub frame_width: f64,
    pub gutter: f64,
    pub bullet_slots: usize,
    pub slot_gap: f64,
    pub bullet: TextStyle,
}

impl ContentStyle {
    /// Right-hand region left over after the image region and gutter.
    pub fn bullet_region(&self, canvas: &Canvas, margin: f64) -> LayoutBox {
        let x = self.image_region.right() + self.gutter;
        LayoutBox::new(
            x,
            self.image_region.y,
            (canvas.width - margin - x).max(0.0),
            self.image_region.height,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisStyle {
    pub heading_box: LayoutBox,
    pub heading: TextStyle,
    pub list_box: LayoutBox,
    pub list: TextStyle,
    pub summary_heading: String,
    pub recommendations_heading: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageStyle {
    pub width: f64,
    pub height: f64,
    pub text: TextStyle,
}

/// Non-essential spacing, shrunk from `max` towards `min` before any font change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpacingConfig {
    pub line_spacing: [f64; 2],
    pub paragraph_gap: [f64; 2],
    pub inset: [f64; 2],
    pub spacing_steps: u32,
    pub font_step: f64,
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            line_spacing: [1.25, 1.0],
            paragraph_gap: [6.0, 0.0],
            inset: [4.0, 0.0],
            spacing_steps: 4,
            font_step: 0.5,
        }
    }
}

/// Average glyph advance as a fraction of the font size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasureConfig {
    pub glyph_factor: f64,
    pub bold_factor: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self { glyph_factor: 0.55, bold_factor: 1.08 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("Failed to read style template {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid style template: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Style template {id}: {reason}")]
    Invalid { id: String, reason: String },
}

impl StyleTemplate {
    pub fn builtin() -> Result<Self, StyleError> {
        Self::from_json(DEFAULT_STYLE_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, StyleError> {
        let style: StyleTemplate = serde_json::from_str(json)?;
        style.check()?;
        Ok(style)
    }

    pub fn load(path: &Path) -> Result<Self, StyleError> {
        let content = fs::read_to_string(path)
            .map_err(|e| StyleError::Io(path.display().to_string(), e))?;
        Self::from_json(&content)
    }

    /// Reject templates whose fixed boxes already break the canvas contract.
    pub fn check(&self) -> Result<(), StyleError> {
        let invalid = |reason: String| StyleError::Invalid { id: self.id.clone(), reason };
        let canvas = &self.canvas;

        if self.content.image_region.width > canvas.width * 0.7 {
            return Err(invalid("image region wider than 70% of the canvas".into()));
        }
        if self.cover.title_box.x != self.content.headline_box.x
            || self.cover.subtitle_box.x != self.content.headline_box.x
        {
            return Err(invalid("cover title, subtitle and headline must share a left edge".into()));
        }
        if self.content.bullet_slots == 0 {
            return Err(invalid("at least one bullet slot is required".into()));
        }
        for (name, style) in [
            ("headline", &self.content.headline),
            ("bullet", &self.content.bullet),
            ("list", &self.synthesis.list),
            ("message", &self.message.text),
        ] {
            if style.min_font_size <= 0.0 || style.min_font_size > style.font_size {
                return Err(invalid(format!("{} font floor must be in (0, font size]", name)));
            }
        }
        let fixed = [
            ("cover.titleBox", &self.cover.title_box),
            ("cover.subtitleBox", &self.cover.subtitle_box),
            ("cover.footerBox", &self.cover.footer_box),
            ("content.headlineBox", &self.content.headline_box),
            ("content.imageRegion", &self.content.image_region),
            ("synthesis.headingBox", &self.synthesis.heading_box),
            ("synthesis.listBox", &self.synthesis.list_box),
        ];
        for (name, b) in fixed {
            if !canvas.contains(b) {
                return Err(invalid(format!("{} lies outside the canvas", name)));
            }
        }
        let bullets = self.content.bullet_region(canvas, self.margin);
        if bullets.width <= 0.0 || !canvas.contains(&bullets) {
            return Err(invalid("no room left for the bullet region".into()));
        }
        Ok(())
    }
}
