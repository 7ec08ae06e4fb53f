//! Layout Engine
//!
//! Plans one slide per manifest page (plus cover and synthesis slides) and
//! resolves every element to a box. Output is self-checked before return.

use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{
    ElementContent, ElementRole, PlacedElement, RenderedSlide, SlideKind, TextAlign,
};
use crate::layout::geometry::{overlapping_pairs, LayoutBox, EPSILON};
use crate::layout::text::{fit_text, FitFailure, GlyphMeasurer, TextMeasurer, TextRun};
use crate::model::{DeckSpec, InsightRecord, InsightStatus, PageRecord};
use crate::style::{StyleTemplate, TextStyle};

pub const MISSING_ANALYSIS_MESSAGE: &str = "No analysis was supplied for this page.";
pub const INSUFFICIENT_DATA_HEADING: &str = "Insufficient data for this page";

/// A slide whose content cannot fit without breaking an invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOverflow {
    pub slide_index: usize,
    pub source_slide: Option<u32>,
    pub element: ElementRole,
    pub reason: String,
}

impl std::fmt::Display for LayoutOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slide {}", self.slide_index + 1)?;
        if let Some(page) = self.source_slide {
            write!(f, " (page {})", page)?;
        }
        write!(f, " {:?}: {}", self.element, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("LayoutOverflow: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Overflow(Vec<LayoutOverflow>),

    #[error("Layout self-check failed on slide {}: {reason}", .slide_index + 1)]
    SelfCheck { slide_index: usize, reason: String },
}

/// Resolved placement of a source image inside its region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePlacement {
    /// Frame-inclusive box; this is the element's box.
    pub frame_box: LayoutBox,
    pub image_box: LayoutBox,
    pub rotation: u16,
    pub scale: f64,
}

/// Scale an image by one factor to fit `region` less margin and frame.
///
/// Portrait images are turned 90 degrees first so the long axis is horizontal.
pub fn place_image(
    region: &LayoutBox,
    native_size: [u32; 2],
    margin: f64,
    frame_width: f64,
) -> Option<ImagePlacement> {
    let [w, h] = native_size;
    if w == 0 || h == 0 {
        return None;
    }
    let (rotation, w, h) = if h > w { (90, h as f64, w as f64) } else { (0, w as f64, h as f64) };

    let available = region.inset(margin + frame_width);
    let scale = (available.width / w).min(available.height / h);
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    let image_box = available.center(w * scale, h * scale);
    Some(ImagePlacement {
        frame_box: image_box.outset(frame_width),
        image_box,
        rotation,
        scale,
    })
}

enum SlidePlan<'a> {
    Cover,
    Synthesis(SlideKind, &'a [String]),
    Content(&'a PageRecord, &'a InsightRecord),
    Message(&'a PageRecord, InsightStatus, Vec<TextRun>),
}

pub struct LayoutEngine<'s, M: TextMeasurer = GlyphMeasurer> {
    style: &'s StyleTemplate,
    measurer: M,
}

impl<'s> LayoutEngine<'s, GlyphMeasurer> {
    pub fn new(style: &'s StyleTemplate) -> Self {
        Self { style, measurer: GlyphMeasurer::new(style.measure) }
    }
}

impl<'s, M: TextMeasurer> LayoutEngine<'s, M> {
    pub fn with_measurer(style: &'s StyleTemplate, measurer: M) -> Self {
        Self { style, measurer }
    }

    /// Lay out the whole deck in manifest order.
    ///
    /// Every slide is attempted; overflows are collected and reported together.
    pub fn layout_deck(
        &self,
        deck: &DeckSpec,
        pages: &[PageRecord],
    ) -> Result<Vec<RenderedSlide>, LayoutError> {
        let plans = plan_slides(deck, pages);
        let mut slides = Vec::with_capacity(plans.len());
        let mut overflows = vec![];

        for (index, plan) in plans.iter().enumerate() {
            match self.layout_slide(index, deck, plan) {
                Ok(slide) => {
                    self.self_check(&slide)?;
                    slides.push(slide);
                }
                Err(overflow) => {
                    warn!(slide = index + 1, reason = %overflow.reason, "slide overflowed");
                    overflows.push(overflow);
                }
            }
        }

        if overflows.is_empty() {
            Ok(slides)
        } else {
            Err(LayoutError::Overflow(overflows))
        }
    }

    fn layout_slide(
        &self,
        index: usize,
        deck: &DeckSpec,
        plan: &SlidePlan<'_>,
    ) -> Result<RenderedSlide, LayoutOverflow> {
        match plan {
            SlidePlan::Cover => self.cover_slide(index, deck),
            SlidePlan::Synthesis(kind, items) => self.synthesis_slide(index, *kind, items),
            SlidePlan::Content(page, record) => self.content_slide(index, page, record),
            SlidePlan::Message(page, status, runs) => self.message_slide(index, page, *status, runs),
        }
    }

    fn text_element(
        &self,
        ctx: (usize, Option<u32>),
        role: ElementRole,
        bbox: LayoutBox,
        runs: &[TextRun],
        text_style: &TextStyle,
        align: TextAlign,
        color: &str,
    ) -> Result<PlacedElement, LayoutOverflow> {
        let fit = fit_text(runs, &bbox, text_style, &self.style.spacing, &self.measurer)
            .map_err(|f| overflow(ctx, role, &f))?;
        if fit.font_size < text_style.font_size {
            debug!(slide = ctx.0 + 1, ?role, font = fit.font_size, "font reduced to fit");
        }
        Ok(PlacedElement {
            role,
            bbox,
            content: ElementContent::Text {
                fit,
                align,
                color: color.to_string(),
                markers: vec![],
                indent: 0.0,
            },
        })
    }

    /// Text with hanging list markers; the text column is narrowed by the indent.
    fn marked_element(
        &self,
        ctx: (usize, Option<u32>),
        role: ElementRole,
        bbox: LayoutBox,
        runs: &[TextRun],
        markers: Vec<String>,
        text_style: &TextStyle,
    ) -> Result<PlacedElement, LayoutOverflow> {
        let indent = text_style.font_size * 1.5;
        let column = LayoutBox::new(bbox.x, bbox.y, (bbox.width - indent).max(0.0), bbox.height);
        let fit = fit_text(runs, &column, text_style, &self.style.spacing, &self.measurer)
            .map_err(|f| overflow(ctx, role, &f))?;
        Ok(PlacedElement {
            role,
            bbox,
            content: ElementContent::Text {
                fit,
                align: TextAlign::Left,
                color: self.style.palette.text.clone(),
                markers,
                indent,
            },
        })
    }

    fn cover_slide(&self, index: usize, deck: &DeckSpec) -> Result<RenderedSlide, LayoutOverflow> {
        let cover = &self.style.cover;
        let palette = &self.style.palette;
        let ctx = (index, None);
        let mut elements = vec![self.text_element(
            ctx,
            ElementRole::Title,
            cover.title_box,
            &[TextRun::bold(&deck.title)],
            &cover.title,
            TextAlign::Left,
            &palette.primary,
        )?];
        if !deck.subtitle.trim().is_empty() {
            elements.push(self.text_element(
                ctx,
                ElementRole::Subtitle,
                cover.subtitle_box,
                &[TextRun::plain(&deck.subtitle)],
                &cover.subtitle,
                TextAlign::Left,
                &palette.text,
            )?);
        }
        elements.push(self.text_element(
            ctx,
            ElementRole::Footer,
            cover.footer_box,
            &[TextRun::plain(&cover.footer_text)],
            &cover.footer,
            TextAlign::Center,
            &palette.text,
        )?);
        Ok(RenderedSlide { index, kind: SlideKind::Cover, source_slide: None, status: None, elements })
    }

    fn synthesis_slide(
        &self,
        index: usize,
        kind: SlideKind,
        items: &[String],
    ) -> Result<RenderedSlide, LayoutOverflow> {
        let synthesis = &self.style.synthesis;
        let ctx = (index, None);
        let (heading, color) = match kind {
            SlideKind::Recommendations => (&synthesis.recommendations_heading, &self.style.palette.accent),
            _ => (&synthesis.summary_heading, &self.style.palette.primary),
        };
        let runs: Vec<TextRun> = items.iter().map(TextRun::plain).collect();
        let markers = (1..=items.len())
            .map(|n| match kind {
                SlideKind::Recommendations => format!("{}.", n),
                _ => "\u{2022}".to_string(),
            })
            .collect();
        let elements = vec![
            self.text_element(
                ctx,
                ElementRole::Heading,
                synthesis.heading_box,
                &[TextRun::bold(heading)],
                &synthesis.heading,
                TextAlign::Left,
                color,
            )?,
            self.marked_element(ctx, ElementRole::List, synthesis.list_box, &runs, markers, &synthesis.list)?,
        ];
        Ok(RenderedSlide { index, kind, source_slide: None, status: None, elements })
    }

    fn content_slide(
        &self,
        index: usize,
        page: &PageRecord,
        record: &InsightRecord,
    ) -> Result<RenderedSlide, LayoutOverflow> {
        let content = &self.style.content;
        let ctx = (index, Some(page.index));
        let mut elements = vec![self.text_element(
            ctx,
            ElementRole::Headline,
            content.headline_box,
            &[TextRun::bold(&record.headline)],
            &content.headline,
            TextAlign::Left,
            &self.style.palette.accent,
        )?];

        let placement = place_image(&content.image_region, page.image_size, content.image_margin, content.frame_width)
            .ok_or_else(|| LayoutOverflow {
                slide_index: index,
                source_slide: Some(page.index),
                element: ElementRole::Image,
                reason: format!(
                    "image {}x{} cannot be placed in its region",
                    page.image_size[0], page.image_size[1]
                ),
            })?;
        if placement.rotation != 0 {
            debug!(page = page.index, "portrait image rotated to landscape");
        }
        elements.push(PlacedElement {
            role: ElementRole::Image,
            bbox: placement.frame_box,
            content: ElementContent::Image {
                image_ref: page.image_ref.clone(),
                native_size: page.image_size,
                rotation: placement.rotation,
                frame_width: content.frame_width,
                frame_color: self.style.palette.accent.clone(),
            },
        });

        let region = content.bullet_region(&self.style.canvas, self.style.margin);
        let slots = content.bullet_slots;
        let slot_height =
            (region.height - content.slot_gap * slots.saturating_sub(1) as f64) / slots.max(1) as f64;
        if record.bullets.len() > slots {
            return Err(LayoutOverflow {
                slide_index: index,
                source_slide: Some(page.index),
                element: ElementRole::Bullet,
                reason: format!("{} bullets for {} slots", record.bullets.len(), slots),
            });
        }
        for (i, bullet) in record.bullets.iter().enumerate() {
            let slot = LayoutBox::new(
                region.x,
                region.y + i as f64 * (slot_height + content.slot_gap),
                region.width,
                slot_height,
            );
            let runs = [TextRun::bold(&bullet.bold_line), TextRun::plain(&bullet.detail)];
            elements.push(self.marked_element(
                ctx,
                ElementRole::Bullet,
                slot,
                &runs,
                vec!["\u{2022}".to_string()],
                &content.bullet,
            )?);
        }

        Ok(RenderedSlide {
            index,
            kind: SlideKind::Content,
            source_slide: Some(page.index),
            status: Some(InsightStatus::Complete),
            elements,
        })
    }

    fn message_slide(
        &self,
        index: usize,
        page: &PageRecord,
        status: InsightStatus,
        runs: &[TextRun],
    ) -> Result<RenderedSlide, LayoutOverflow> {
        let message = &self.style.message;
        let bbox = self.style.canvas.bounds().center(message.width, message.height);
        let element = self.text_element(
            (index, Some(page.index)),
            ElementRole::Message,
            bbox,
            runs,
            &message.text,
            TextAlign::Center,
            &self.style.palette.text,
        )?;
        Ok(RenderedSlide {
            index,
            kind: SlideKind::InsufficientData,
            source_slide: Some(page.index),
            status: Some(status),
            elements: vec![element],
        })
    }

    /// Containment, non-overlap and aspect checks over one finished slide.
    pub fn self_check(&self, slide: &RenderedSlide) -> Result<(), LayoutError> {
        let fail = |reason: String| LayoutError::SelfCheck { slide_index: slide.index, reason };
        for element in &slide.elements {
            if !self.style.canvas.contains(&element.bbox) {
                return Err(fail(format!("{:?} box {:?} leaves the canvas", element.role, element.bbox)));
            }
            if let (Some(area), Some((w, h))) = (element.image_area(), element.oriented_size()) {
                let rendered = area.width / area.height;
                let native = w / h;
                if (rendered - native).abs() > EPSILON * native.max(1.0) {
                    return Err(fail(format!("image aspect {:.6} differs from native {:.6}", rendered, native)));
                }
            }
            if let ElementContent::Text { fit, .. } = &element.content {
                if fit.content_height > element.bbox.height + EPSILON {
                    return Err(fail(format!("{:?} text is taller than its box", element.role)));
                }
            }
        }
        if let Some((a, b)) = overlapping_pairs(&slide.boxes()).first() {
            return Err(fail(format!(
                "{:?} overlaps {:?}",
                slide.elements[*a].role, slide.elements[*b].role
            )));
        }
        Ok(())
    }
}

fn overflow(ctx: (usize, Option<u32>), role: ElementRole, failure: &FitFailure) -> LayoutOverflow {
    let reason = match (&failure.unbreakable_word, failure.required_height) {
        (Some(word), _) => format!(
            "word \"{}\" is wider than the box at the {:.1}pt floor",
            word, failure.font_size
        ),
        (None, Some(required)) => format!(
            "text needs {:.1}pt of height at the {:.1}pt floor, box has {:.1}pt",
            required, failure.font_size, failure.available_height
        ),
        (None, None) => format!("text does not fit at the {:.1}pt floor", failure.font_size),
    };
    LayoutOverflow { slide_index: ctx.0, source_slide: ctx.1, element: role, reason }
}

fn record_message(record: &InsightRecord) -> Vec<TextRun> {
    // The title is never shown here: nothing on this slide may be declared.
    let lead = if record.headline.trim().is_empty() { INSUFFICIENT_DATA_HEADING } else { record.headline.as_str() };
    let mut runs = vec![TextRun::bold(lead)];
    for bullet in &record.bullets {
        runs.push(TextRun::plain(&bullet.bold_line));
        runs.push(TextRun::plain(&bullet.detail));
    }
    runs
}

fn skip_message(record: &InsightRecord) -> Vec<TextRun> {
    let reason = record
        .skip_reason
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .unwrap_or("Excluded by the analyst");
    vec![TextRun::bold("Page skipped"), TextRun::plain(reason)]
}

/// One slide per page in manifest order, bracketed by the synthesis slides.
fn plan_slides<'a>(deck: &'a DeckSpec, pages: &'a [PageRecord]) -> Vec<SlidePlan<'a>> {
    let mut plans = vec![SlidePlan::Cover];
    if !deck.executive_summary.is_empty() {
        plans.push(SlidePlan::Synthesis(SlideKind::ExecutiveSummary, &deck.executive_summary));
    }
    for page in pages {
        let plan = match deck.insight_for(page.index) {
            Some(record) => match record.status {
                InsightStatus::Complete => SlidePlan::Content(page, record),
                InsightStatus::InsufficientData => {
                    SlidePlan::Message(page, InsightStatus::InsufficientData, record_message(record))
                }
                InsightStatus::Skipped => SlidePlan::Message(page, InsightStatus::Skipped, skip_message(record)),
            },
            None => SlidePlan::Message(
                page,
                InsightStatus::InsufficientData,
                vec![TextRun::bold(MISSING_ANALYSIS_MESSAGE)],
            ),
        };
        plans.push(plan);
    }
    if !deck.recommendations.is_empty() {
        plans.push(SlidePlan::Synthesis(SlideKind::Recommendations, &deck.recommendations));
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bullet, SlideType};
    use std::path::PathBuf;

    fn page(index: u32, size: [u32; 2]) -> PageRecord {
        PageRecord {
            index,
            title_hint: format!("Page {}", index),
            image_ref: PathBuf::from(format!("temp/slide_{}.png", index)),
            image_size: size,
            slide_type: SlideType::General,
            extracted_labels: vec![],
            active_filters: Default::default(),
        }
    }

    fn complete(slide_number: u32) -> InsightRecord {
        InsightRecord {
            slide_number,
            title: "Adoption".into(),
            headline: "134 users from 1,275 total (11%)".into(),
            bullets: vec![
                Bullet::new("Adoption gap is wide", "Most licensed users never opened the tool"),
                Bullet::new("Power users cluster in IT", "Targeted enablement outside IT is the next step"),
            ],
            numbers_used: vec!["134".into(), "1,275".into(), "11%".into()],
            status: InsightStatus::Complete,
            skip_reason: None,
        }
    }

    fn deck(slides: Vec<InsightRecord>) -> DeckSpec {
        DeckSpec {
            title: "Copilot Adoption".into(),
            subtitle: "Quarterly review".into(),
            executive_summary: vec!["Adoption is concentrated".into()],
            recommendations: vec!["Launch enablement".into()],
            slides,
        }
    }

    #[test]
    fn test_place_image_landscape_preserves_aspect() {
        let region = LayoutBox::new(36.0, 120.0, 540.0, 384.0);
        let p = place_image(&region, [1600, 900], 12.0, 2.0).unwrap();
        assert_eq!(p.rotation, 0);
        assert!((p.image_box.width / p.image_box.height - 16.0 / 9.0).abs() < 1e-9);
        assert!(region.inset(12.0).contains(&p.frame_box));
    }

    #[test]
    fn test_place_image_rotates_portrait() {
        let region = LayoutBox::new(36.0, 120.0, 540.0, 384.0);
        let p = place_image(&region, [600, 1000], 12.0, 2.0).unwrap();
        assert_eq!(p.rotation, 90);
        assert!(p.image_box.width > p.image_box.height);
        assert!((p.image_box.width / p.image_box.height - 1000.0 / 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_place_image_rejects_empty() {
        let region = LayoutBox::new(0.0, 0.0, 100.0, 100.0);
        assert!(place_image(&region, [0, 10], 0.0, 0.0).is_none());
        assert!(place_image(&region, [10, 10], 60.0, 0.0).is_none());
    }

    #[test]
    fn test_deck_plan_order_and_kinds() {
        let style = StyleTemplate::builtin().unwrap();
        let mut skipped = complete(3);
        skipped.status = InsightStatus::Skipped;
        let d = deck(vec![complete(1), skipped]);
        let pages = [page(1, [1600, 900]), page(2, [1600, 900]), page(3, [1600, 900])];
        let slides = LayoutEngine::new(&style).layout_deck(&d, &pages).unwrap();
        let kinds: Vec<SlideKind> = slides.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SlideKind::Cover,
                SlideKind::ExecutiveSummary,
                SlideKind::Content,
                SlideKind::InsufficientData,
                SlideKind::InsufficientData,
                SlideKind::Recommendations,
            ]
        );
        assert_eq!(slides[4].status, Some(InsightStatus::Skipped));
        assert_eq!(slides[3].elements.len(), 1);
    }

    #[test]
    fn test_headline_anchor_shared_with_cover() {
        let style = StyleTemplate::builtin().unwrap();
        let d = deck(vec![complete(1)]);
        let slides = LayoutEngine::new(&style).layout_deck(&d, &[page(1, [1200, 800])]).unwrap();
        let title_x = slides[0].element(ElementRole::Title).unwrap().bbox.x;
        let subtitle_x = slides[0].element(ElementRole::Subtitle).unwrap().bbox.x;
        let headline_x = slides[2].element(ElementRole::Headline).unwrap().bbox.x;
        assert_eq!(title_x, headline_x);
        assert_eq!(subtitle_x, headline_x);
    }

    #[test]
    fn test_overflow_reports_slide_and_continues() {
        let style = StyleTemplate::builtin().unwrap();
        let mut long = complete(2);
        long.bullets[0].detail = "overflowing detail text ".repeat(40);
        let d = deck(vec![complete(1), long]);
        let err = LayoutEngine::new(&style)
            .layout_deck(&d, &[page(1, [1600, 900]), page(2, [1600, 900])])
            .unwrap_err();
        match err {
            LayoutError::Overflow(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].source_slide, Some(2));
                assert_eq!(list[0].element, ElementRole::Bullet);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_insufficient_data_message_omits_title() {
        let style = StyleTemplate::builtin().unwrap();
        let mut gap = complete(1);
        gap.status = InsightStatus::InsufficientData;
        gap.title = "2024 Adoption".into();
        gap.headline = String::new();
        gap.numbers_used.clear();
        gap.bullets = vec![Bullet::new("Filters hide the data", "Remove the region filter")];
        let slides = LayoutEngine::new(&style).layout_deck(&deck(vec![gap]), &[page(1, [1600, 900])]).unwrap();
        let text = slides[2].element(ElementRole::Message).unwrap().text().unwrap();
        assert!(text.starts_with(INSUFFICIENT_DATA_HEADING));
        assert!(!text.contains("2024"));
    }

    #[test]
    fn test_zero_bullet_slots_overflows_instead_of_panicking() {
        let mut style = StyleTemplate::builtin().unwrap();
        style.content.bullet_slots = 0;
        let err = LayoutEngine::new(&style)
            .layout_deck(&deck(vec![complete(1)]), &[page(1, [1600, 900])])
            .unwrap_err();
        match err {
            LayoutError::Overflow(list) => assert_eq!(list[0].element, ElementRole::Bullet),
            other => panic!("unexpected error: {other}"),
        }
    }
}
