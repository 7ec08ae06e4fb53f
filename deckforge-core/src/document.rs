//! Emitted Document Tree
//!
//! The document is the final artifact: resolved geometry per element plus an
//! SVG rendering per slide. It carries no timestamps or random ids so the
//! same inputs always hash the same.

use std::fmt::Write as _;
use std::path::PathBuf;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::hashing::{compute_document_hash, sha256_hex};
use crate::layout::geometry::{Canvas, LayoutBox};
use crate::layout::text::TextFit;
use crate::model::InsightStatus;
use crate::style::StyleTemplate;
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    Cover,
    ExecutiveSummary,
    Content,
    InsufficientData,
    Recommendations,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Title,
    Subtitle,
    Footer,
    Headline,
    Image,
    Bullet,
    Heading,
    List,
    Message,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementContent {
    Text {
        fit: TextFit,
        align: TextAlign,
        color: String,
        /// Per-paragraph list markers, rendered in the hanging indent.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        markers: Vec<String>,
        #[serde(default)]
        indent: f64,
    },
    Image {
        image_ref: PathBuf,
        native_size: [u32; 2],
        /// Clockwise rotation applied before scaling: 0 or 90.
        rotation: u16,
        frame_width: f64,
        frame_color: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedElement {
    pub role: ElementRole,
    pub bbox: LayoutBox,
    pub content: ElementContent,
}

impl PlacedElement {
    /// Rendered text with line wraps joined back into spaces.
    pub fn text(&self) -> Option<String> {
        match &self.content {
            ElementContent::Text { fit, .. } => Some(
                fit.paragraphs
                    .iter()
                    .map(|p| p.lines.join(" "))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            ElementContent::Image { .. } => None,
        }
    }

    /// Area covered by image pixels, inside the frame.
    pub fn image_area(&self) -> Option<LayoutBox> {
        match &self.content {
            ElementContent::Image { frame_width, .. } => Some(self.bbox.inset(*frame_width)),
            ElementContent::Text { .. } => None,
        }
    }

    /// Native size after the orientation correction.
    pub fn oriented_size(&self) -> Option<(f64, f64)> {
        match &self.content {
            ElementContent::Image { native_size: [w, h], rotation, .. } => {
                let (w, h) = (*w as f64, *h as f64);
                Some(if *rotation == 90 { (h, w) } else { (w, h) })
            }
            ElementContent::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenderedSlide {
    /// 0-based position in the deck.
    pub index: usize,
    pub kind: SlideKind,
    /// Source page number for page-backed slides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_slide: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InsightStatus>,
    pub elements: Vec<PlacedElement>,
}

impl RenderedSlide {
    pub fn boxes(&self) -> Vec<LayoutBox> {
        self.elements.iter().map(|e| e.bbox).collect()
    }

    pub fn element(&self, role: ElementRole) -> Option<&PlacedElement> {
        self.elements.iter().find(|e| e.role == role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedSlide {
    pub slide_index: usize,
    pub filename: String,
    pub format: String,
    pub data_base64: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeckDocument {
    pub engine_version: String,
    pub style_id: String,
    pub canvas: Canvas,
    pub deck_title: String,
    pub slides: Vec<RenderedSlide>,
    pub exports: Vec<ExportedSlide>,
    pub document_hash: String,
}

impl DeckDocument {
    /// Assemble the document, render every slide and seal it with its hash.
    pub fn assemble(
        style: &StyleTemplate,
        deck_title: &str,
        slides: Vec<RenderedSlide>,
    ) -> Result<Self, serde_json::Error> {
        let exports = slides
            .iter()
            .map(|slide| {
                let svg = render_svg(slide, style);
                ExportedSlide {
                    slide_index: slide.index,
                    filename: format!("slide_{:02}.svg", slide.index + 1),
                    format: "svg".to_string(),
                    data_base64: base64::engine::general_purpose::STANDARD.encode(svg.as_bytes()),
                    hash: sha256_hex(svg.as_bytes()),
                }
            })
            .collect();

        let mut document = DeckDocument {
            engine_version: ENGINE_VERSION.to_string(),
            style_id: style.id.clone(),
            canvas: style.canvas,
            deck_title: deck_title.to_string(),
            slides,
            exports,
            document_hash: String::new(), // Computed after
        };
        document.document_hash = compute_document_hash(&document)?;
        Ok(document)
    }

    /// Recompute the hash with the stored one blanked out.
    pub fn verify_hash(&self) -> Result<bool, serde_json::Error> {
        let mut unsealed = self.clone();
        unsealed.document_hash = String::new();
        Ok(compute_document_hash(&unsealed)? == self.document_hash)
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render one slide as a standalone SVG.
pub fn render_svg(slide: &RenderedSlide, style: &StyleTemplate) -> String {
    let canvas = style.canvas;
    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w:.2} {h:.2}" width="{w:.2}" height="{h:.2}">"#,
        w = canvas.width,
        h = canvas.height,
    );
    let _ = write!(
        svg,
        r#"<rect x="0" y="0" width="{:.2}" height="{:.2}" fill="{}"/>"#,
        canvas.width, canvas.height, style.palette.background
    );

    for element in &slide.elements {
        match &element.content {
            ElementContent::Text { fit, align, color, markers, indent } => {
                render_text(&mut svg, element.bbox, fit, *align, color, markers, *indent, &style.font_family);
            }
            ElementContent::Image { image_ref, rotation, frame_width, frame_color, .. } => {
                let area = element.bbox.inset(*frame_width);
                let href = escape_xml(&image_ref.to_string_lossy());
                if *rotation == 90 {
                    let (cx, cy) = (area.x + area.width / 2.0, area.y + area.height / 2.0);
                    let _ = write!(
                        svg,
                        r#"<image href="{href}" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" preserveAspectRatio="none" transform="rotate(90 {cx:.2} {cy:.2})"/>"#,
                        cx - area.height / 2.0,
                        cy - area.width / 2.0,
                        area.height,
                        area.width,
                    );
                } else {
                    let _ = write!(
                        svg,
                        r#"<image href="{href}" x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" preserveAspectRatio="none"/>"#,
                        area.x, area.y, area.width, area.height,
                    );
                }
                if *frame_width > 0.0 {
                    let stroke = element.bbox.inset(frame_width / 2.0);
                    let _ = write!(
                        svg,
                        r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="{}" stroke-width="{:.2}"/>"#,
                        stroke.x, stroke.y, stroke.width, stroke.height, frame_color, frame_width,
                    );
                }
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

fn render_text(
    svg: &mut String,
    bbox: LayoutBox,
    fit: &TextFit,
    align: TextAlign,
    color: &str,
    markers: &[String],
    indent: f64,
    font_family: &str,
) {
    let line_height = fit.line_height();
    let (x, anchor) = match align {
        TextAlign::Left => (bbox.x + fit.inset, "start"),
        TextAlign::Center => (bbox.x + bbox.width / 2.0, "middle"),
    };
    let top = match align {
        TextAlign::Left => bbox.y + fit.inset,
        TextAlign::Center => bbox.y + (bbox.height - fit.content_height) / 2.0 + fit.inset,
    };

    let mut y = top;
    for (i, paragraph) in fit.paragraphs.iter().enumerate() {
        let weight = if paragraph.bold { "bold" } else { "normal" };
        if let Some(marker) = markers.get(i) {
            let _ = write!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" font-family="{}" font-size="{:.2}" font-weight="{}" fill="{}">{}</text>"#,
                x, y + fit.font_size * 0.8, escape_xml(font_family), fit.font_size, weight, color, escape_xml(marker),
            );
        }
        for line in &paragraph.lines {
            let _ = write!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="{}" font-family="{}" font-size="{:.2}" font-weight="{}" fill="{}">{}</text>"#,
                x + indent, y + fit.font_size * 0.8, anchor, escape_xml(font_family), fit.font_size, weight, color, escape_xml(line),
            );
            y += line_height;
        }
        y += fit.paragraph_gap;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::text::FittedParagraph;

    fn text_element(text: &str) -> PlacedElement {
        PlacedElement {
            role: ElementRole::Headline,
            bbox: LayoutBox::new(36.0, 36.0, 888.0, 72.0),
            content: ElementContent::Text {
                fit: TextFit {
                    font_size: 24.0,
                    line_spacing: 1.25,
                    paragraph_gap: 6.0,
                    inset: 4.0,
                    paragraphs: vec![FittedParagraph { bold: true, lines: vec![text.to_string()] }],
                    content_height: 38.0,
                },
                align: TextAlign::Left,
                color: "#0072C6".to_string(),
                markers: vec![],
                indent: 0.0,
            },
        }
    }

    #[test]
    fn test_svg_escapes_text() {
        let style = StyleTemplate::builtin().unwrap();
        let slide = RenderedSlide {
            index: 0,
            kind: SlideKind::Content,
            source_slide: Some(1),
            status: Some(InsightStatus::Complete),
            elements: vec![text_element("R&D <growth>")],
        };
        let svg = render_svg(&slide, &style);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("R&amp;D &lt;growth&gt;"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_document_hash_seals_content() {
        let style = StyleTemplate::builtin().unwrap();
        let slide = RenderedSlide {
            index: 0,
            kind: SlideKind::Content,
            source_slide: Some(1),
            status: None,
            elements: vec![text_element("12% growth")],
        };
        let doc = DeckDocument::assemble(&style, "Deck", vec![slide]).unwrap();
        assert!(doc.verify_hash().unwrap());
        assert_eq!(doc.exports.len(), 1);
        assert_eq!(doc.exports[0].filename, "slide_01.svg");

        let mut tampered = doc.clone();
        tampered.deck_title = "Other".to_string();
        assert!(!tampered.verify_hash().unwrap());
    }
}
