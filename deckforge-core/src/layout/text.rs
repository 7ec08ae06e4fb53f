//! Text measurement and fitting.
//!
//! Fitting never truncates. Spacing shrinks first, then the font, down to
//! the style's floor; if that is still not enough the caller gets an error.

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

use crate::layout::geometry::{LayoutBox, EPSILON};
use crate::style::{MeasureConfig, SpacingConfig, TextStyle};

/// Width estimate for rendered text.
pub trait TextMeasurer {
    /// Conservative (upper-bound) advance of `text` at `font_size`.
    fn text_width(&self, text: &str, font_size: f64, bold: bool) -> f64;
}

/// Column count times an average glyph advance.
#[derive(Debug, Clone, Copy)]
pub struct GlyphMeasurer {
    config: MeasureConfig,
}

impl GlyphMeasurer {
    pub fn new(config: MeasureConfig) -> Self {
        Self { config }
    }
}

impl Default for GlyphMeasurer {
    fn default() -> Self {
        Self::new(MeasureConfig::default())
    }
}

impl TextMeasurer for GlyphMeasurer {
    fn text_width(&self, text: &str, font_size: f64, bold: bool) -> f64 {
        let factor = if bold {
            self.config.glyph_factor * self.config.bold_factor
        } else {
            self.config.glyph_factor
        };
        UnicodeWidthStr::width(text) as f64 * font_size * factor
    }
}

/// One paragraph of input text.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false }
    }

    pub fn bold(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FittedParagraph {
    pub bold: bool,
    pub lines: Vec<String>,
}

/// Resolved typography for one text box.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextFit {
    pub font_size: f64,
    pub line_spacing: f64,
    pub paragraph_gap: f64,
    pub inset: f64,
    pub paragraphs: Vec<FittedParagraph>,
    /// Height the text occupies including insets.
    pub content_height: f64,
}

impl TextFit {
    pub fn line_height(&self) -> f64 {
        self.font_size * self.line_spacing
    }

    pub fn line_count(&self) -> usize {
        self.paragraphs.iter().map(|p| p.lines.len()).sum()
    }
}

/// Closest the text got to fitting, at the font floor and tightest spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct FitFailure {
    pub font_size: f64,
    pub required_height: Option<f64>,
    pub available_height: f64,
    /// A single word wider than the box at the floor font size.
    pub unbreakable_word: Option<String>,
}

/// Greedy word wrap. `Err` carries a word that cannot fit on any line.
pub fn wrap_words<M: TextMeasurer + ?Sized>(
    text: &str,
    max_width: f64,
    font_size: f64,
    bold: bool,
    measurer: &M,
) -> Result<Vec<String>, String> {
    let mut lines = vec![];
    for raw_line in text.split('\n') {
        let mut current = String::new();
        for word in raw_line.split_whitespace() {
            if measurer.text_width(word, font_size, bold) > max_width + EPSILON {
                return Err(word.to_string());
            }
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if measurer.text_width(&candidate, font_size, bold) > max_width + EPSILON {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    Ok(lines)
}

fn lerp(range: [f64; 2], t: f64) -> f64 {
    range[0] + (range[1] - range[0]) * t
}

struct Attempt {
    font_size: f64,
    line_spacing: f64,
    paragraph_gap: f64,
    inset: f64,
}

fn layout_at<M: TextMeasurer + ?Sized>(
    runs: &[TextRun],
    area: &LayoutBox,
    attempt: &Attempt,
    measurer: &M,
) -> Result<TextFit, String> {
    let max_width = (area.width - 2.0 * attempt.inset).max(0.0);
    let mut paragraphs = vec![];
    for run in runs.iter().filter(|r| !r.text.trim().is_empty()) {
        let lines = wrap_words(&run.text, max_width, attempt.font_size, run.bold, measurer)?;
        paragraphs.push(FittedParagraph { bold: run.bold, lines });
    }
    let line_height = attempt.font_size * attempt.line_spacing;
    let lines: usize = paragraphs.iter().map(|p| p.lines.len()).sum();
    let gaps = paragraphs.len().saturating_sub(1) as f64;
    let content_height =
        2.0 * attempt.inset + lines as f64 * line_height + gaps * attempt.paragraph_gap;
    Ok(TextFit {
        font_size: attempt.font_size,
        line_spacing: attempt.line_spacing,
        paragraph_gap: attempt.paragraph_gap,
        inset: attempt.inset,
        paragraphs,
        content_height,
    })
}

/// Fit `runs` into `area`: spacing first, then font size down to the floor.
pub fn fit_text<M: TextMeasurer + ?Sized>(
    runs: &[TextRun],
    area: &LayoutBox,
    style: &TextStyle,
    spacing: &SpacingConfig,
    measurer: &M,
) -> Result<TextFit, FitFailure> {
    let steps = spacing.spacing_steps.max(1);
    let fits = |fit: &TextFit| fit.content_height <= area.height + EPSILON;

    let mut attempts: Vec<Attempt> = (0..=steps)
        .map(|step| {
            let t = step as f64 / steps as f64;
            Attempt {
                font_size: style.font_size,
                line_spacing: lerp(spacing.line_spacing, t),
                paragraph_gap: lerp(spacing.paragraph_gap, t),
                inset: lerp(spacing.inset, t),
            }
        })
        .collect();

    let font_step = if spacing.font_step > 0.0 { spacing.font_step } else { 0.5 };
    let mut font = style.font_size - font_step;
    while font >= style.min_font_size - EPSILON {
        attempts.push(Attempt {
            font_size: font,
            line_spacing: spacing.line_spacing[1],
            paragraph_gap: spacing.paragraph_gap[1],
            inset: spacing.inset[1],
        });
        font -= font_step;
    }

    let mut last_height = None;
    let mut last_word = None;
    for attempt in &attempts {
        match layout_at(runs, area, attempt, measurer) {
            Ok(fit) if fits(&fit) => return Ok(fit),
            Ok(fit) => {
                last_height = Some(fit.content_height);
                last_word = None;
            }
            Err(word) => {
                last_height = None;
                last_word = Some(word);
            }
        }
    }

    Err(FitFailure {
        font_size: attempts.last().map_or(style.min_font_size, |a| a.font_size),
        required_height: last_height,
        available_height: area.height,
        unbreakable_word: last_word,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(size: f64, floor: f64) -> TextStyle {
        TextStyle { font_size: size, min_font_size: floor, bold: false }
    }

    #[test]
    fn test_wrap_respects_width() {
        let m = GlyphMeasurer::default();
        let lines = wrap_words("alpha beta gamma delta epsilon", 60.0, 10.0, false, &m).unwrap();
        for line in &lines {
            assert!(m.text_width(line, 10.0, false) <= 60.0 + EPSILON);
        }
        assert_eq!(lines.join(" "), "alpha beta gamma delta epsilon");
    }

    #[test]
    fn test_wrap_reports_unbreakable_word() {
        let m = GlyphMeasurer::default();
        assert_eq!(
            wrap_words("ok supercalifragilistic", 40.0, 10.0, false, &m),
            Err("supercalifragilistic".to_string())
        );
    }

    #[test]
    fn test_short_text_keeps_configured_font() {
        let m = GlyphMeasurer::default();
        let area = LayoutBox::new(0.0, 0.0, 300.0, 120.0);
        let fit = fit_text(&[TextRun::bold("Short"), TextRun::plain("Also short")], &area, &style(14.0, 10.0), &SpacingConfig::default(), &m).unwrap();
        assert_eq!(fit.font_size, 14.0);
        assert_eq!(fit.line_spacing, 1.25);
        assert_eq!(fit.line_count(), 2);
    }

    #[test]
    fn test_spacing_shrinks_before_font() {
        let m = GlyphMeasurer::default();
        // Two lines at 14pt: 2 * 17.5 + 6 + 8 = 49 with full spacing, 28 at tightest.
        let area = LayoutBox::new(0.0, 0.0, 300.0, 30.0);
        let fit = fit_text(&[TextRun::bold("Short"), TextRun::plain("Also short")], &area, &style(14.0, 10.0), &SpacingConfig::default(), &m).unwrap();
        assert_eq!(fit.font_size, 14.0);
        assert!(fit.line_spacing < 1.25);
        assert!(fit.content_height <= 30.0 + EPSILON);
    }

    #[test]
    fn test_font_shrinks_to_floor_then_fails() {
        let m = GlyphMeasurer::default();
        let area = LayoutBox::new(0.0, 0.0, 300.0, 24.0);
        let runs = [TextRun::bold("Short"), TextRun::plain("Also short")];
        let fit = fit_text(&runs, &area, &style(14.0, 10.0), &SpacingConfig::default(), &m).unwrap();
        assert!(fit.font_size < 14.0 && fit.font_size >= 10.0);

        let tiny = LayoutBox::new(0.0, 0.0, 300.0, 12.0);
        let failure = fit_text(&runs, &tiny, &style(14.0, 10.0), &SpacingConfig::default(), &m).unwrap_err();
        assert_eq!(failure.font_size, 10.0);
        assert_eq!(failure.required_height, Some(20.0));
    }
}
