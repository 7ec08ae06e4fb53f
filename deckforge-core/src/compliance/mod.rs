//! Compliance Validator
//!
//! Static pass over the emitted document and the deck it came from. Every
//! enabled rule in the policy is evaluated; nothing is mutated, nothing is
//! raised. Layout invariants are re-derived from the document alone.

pub mod rules;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::document::{DeckDocument, ElementContent, ElementRole, RenderedSlide, SlideKind};
use crate::layout::geometry::{overlapping_pairs, EPSILON};
use crate::model::{DeckSpec, InsightRecord, InsightStatus, PageRecord};
use crate::tokens::{contains_token, untracked_tokens};

pub use rules::{FailureMode, PolicyError, Predicate, RulePolicy, RuleSpec, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceFinding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    /// 1-based deck position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceOutcome {
    Compliant,
    CompliantWithWarnings,
    NonCompliant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceReport {
    pub policy_version: String,
    pub outcome: ComplianceOutcome,
    /// Ids of rules that held everywhere.
    pub passed: Vec<String>,
    pub info: Vec<ComplianceFinding>,
    pub warnings: Vec<ComplianceFinding>,
    pub errors: Vec<ComplianceFinding>,
}

impl ComplianceReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_compliant(&self) -> bool {
        self.outcome != ComplianceOutcome::NonCompliant
    }

    pub fn findings(&self) -> impl Iterator<Item = &ComplianceFinding> {
        self.errors.iter().chain(&self.warnings).chain(&self.info)
    }

    /// Human-readable rendering for terminals.
    pub fn render_text(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = vec![
            rule.clone(),
            format!("COMPLIANCE REPORT (policy {})", self.policy_version),
            rule.clone(),
            "Summary:".to_string(),
            format!("  OK Passed: {}", self.passed.len()),
            format!("  ! Warnings: {}", self.warnings.len()),
            format!("  X Errors: {}", self.errors.len()),
        ];
        for (title, marker, findings) in [
            ("ERRORS (Must Fix):", "X", &self.errors),
            ("WARNINGS (Should Fix):", "!", &self.warnings),
        ] {
            if findings.is_empty() {
                continue;
            }
            out.push(rule.clone());
            out.push(title.to_string());
            out.push(rule.clone());
            for f in findings {
                out.push(format!("{} {}", marker, f.rule_id));
                out.push(format!("  {}", f.message));
            }
        }
        if self.errors.is_empty() && self.warnings.is_empty() {
            out.push(rule.clone());
            out.push("OK ALL CHECKS PASSED - POLICY COMPLIANT".to_string());
            out.push(rule);
        }
        out.join("\n")
    }
}

/// One failed instance of a predicate.
struct Hit {
    slide: Option<usize>,
    detail: String,
}

impl Hit {
    fn at(slide: &RenderedSlide, detail: impl Into<String>) -> Self {
        Self { slide: Some(slide.index + 1), detail: detail.into() }
    }

    fn deck(detail: impl Into<String>) -> Self {
        Self { slide: None, detail: detail.into() }
    }
}

/// Everything a predicate may look at.
pub struct ComplianceInput<'a> {
    pub document: &'a DeckDocument,
    pub deck: &'a DeckSpec,
    pub pages: &'a [PageRecord],
}

impl<'a> ComplianceInput<'a> {
    fn record(&self, slide: &RenderedSlide) -> Option<&'a InsightRecord> {
        slide.source_slide.and_then(|n| self.deck.insight_for(n))
    }

    fn content_slides(&self) -> impl Iterator<Item = &'a RenderedSlide> {
        self.document.slides.iter().filter(|s| s.kind == SlideKind::Content)
    }
}

pub struct ComplianceValidator {
    policy: RulePolicy,
}

impl ComplianceValidator {
    pub fn new(policy: RulePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RulePolicy {
        &self.policy
    }

    pub fn evaluate(&self, input: &ComplianceInput<'_>) -> ComplianceReport {
        let mut passed = vec![];
        let mut buckets: [Vec<ComplianceFinding>; 3] = [vec![], vec![], vec![]];

        for rule in self.policy.enabled_rules() {
            let hits = evaluate_predicate(&rule.predicate, input);
            if hits.is_empty() {
                passed.push(rule.id.clone());
                continue;
            }
            let severity = rule.effective_severity();
            let bucket = match severity {
                Severity::Info => 0,
                Severity::Warning => 1,
                Severity::Error => 2,
            };
            for hit in hits {
                buckets[bucket].push(ComplianceFinding {
                    rule_id: rule.id.clone(),
                    severity,
                    message: rule.render_message(hit.slide, &hit.detail),
                    slide: hit.slide,
                    remediation: rule.remediation.clone(),
                });
            }
        }

        let [info_findings, warnings, errors] = buckets;
        let outcome = if !errors.is_empty() {
            ComplianceOutcome::NonCompliant
        } else if !warnings.is_empty() {
            ComplianceOutcome::CompliantWithWarnings
        } else {
            ComplianceOutcome::Compliant
        };
        info!(
            passed = passed.len(),
            warnings = warnings.len(),
            errors = errors.len(),
            ?outcome,
            "compliance evaluated"
        );

        ComplianceReport {
            policy_version: self.policy.policy_version.clone(),
            outcome,
            passed,
            info: info_findings,
            warnings,
            errors,
        }
    }
}

fn evaluate_predicate(predicate: &Predicate, input: &ComplianceInput<'_>) -> Vec<Hit> {
    match predicate {
        Predicate::BulletCap { max } => bullet_cap(input, *max),
        Predicate::BoldLineWords { max } => bold_line_words(input, *max),
        Predicate::HeadlinePresent => headline_present(input),
        Predicate::SynthesisCap { max } => synthesis_cap(input, *max),
        Predicate::InsufficientDataExclusive => insufficient_data_exclusive(input),
        Predicate::MinFontSize { min_pt } => min_font_size(input, *min_pt),
        Predicate::CanvasAspect { ratio, tolerance } => canvas_aspect(input, *ratio, *tolerance),
        Predicate::WithinBounds => within_bounds(input),
        Predicate::NoOverlap => no_overlap(input),
        Predicate::TextFits => text_fits(input),
        Predicate::ImageAspect { tolerance } => image_aspect(input, *tolerance),
        Predicate::ImageLandscape => image_landscape(input),
        Predicate::TitleAnchor => title_anchor(input),
        Predicate::NumbersTraced => numbers_traced(input),
        Predicate::NumbersDeclared => numbers_declared(input),
        Predicate::HeadlineHasNumber => headline_has_number(input),
        Predicate::SlideCoverage => slide_coverage(input),
        Predicate::AnalysisSupplied => analysis_supplied(input),
    }
}

// --- Structural ---

fn bullet_cap(input: &ComplianceInput<'_>, max: usize) -> Vec<Hit> {
    input
        .content_slides()
        .filter_map(|slide| {
            let rendered = slide.elements.iter().filter(|e| e.role == ElementRole::Bullet).count();
            let declared = input.record(slide).map_or(0, |r| r.bullets.len());
            let count = rendered.max(declared);
            (count > max).then(|| Hit::at(slide, format!("{} bullets, limit {}", count, max)))
        })
        .collect()
}

fn bold_line_words(input: &ComplianceInput<'_>, max: usize) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in input.content_slides() {
        let Some(record) = input.record(slide) else { continue };
        for bullet in &record.bullets {
            let words = bullet.bold_line.split_whitespace().count();
            if words > max {
                hits.push(Hit::at(slide, format!("\"{}\" has {} words, limit {}", bullet.bold_line, words, max)));
            }
        }
    }
    hits
}

fn headline_present(input: &ComplianceInput<'_>) -> Vec<Hit> {
    input
        .content_slides()
        .filter(|slide| {
            slide
                .element(ElementRole::Headline)
                .and_then(|e| e.text())
                .map_or(true, |t| t.trim().is_empty())
        })
        .map(|slide| Hit::at(slide, "missing headline"))
        .collect()
}

fn synthesis_cap(input: &ComplianceInput<'_>, max: usize) -> Vec<Hit> {
    [
        ("executive_summary", input.deck.executive_summary.len()),
        ("recommendations", input.deck.recommendations.len()),
    ]
    .into_iter()
    .filter(|(_, len)| *len > max)
    .map(|(field, len)| Hit::deck(format!("{} has {} entries, limit {}", field, len, max)))
    .collect()
}

fn insufficient_data_exclusive(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        if slide.kind != SlideKind::InsufficientData {
            if slide.kind == SlideKind::Content
                && input.record(slide).map_or(true, |r| r.status != InsightStatus::Complete)
            {
                hits.push(Hit::at(slide, "content slide without a complete insight"));
            }
            continue;
        }
        let roles: Vec<ElementRole> = slide.elements.iter().map(|e| e.role).collect();
        if roles != [ElementRole::Message] {
            hits.push(Hit::at(slide, format!("expected a single message box, found {:?}", roles)));
        }
        if let Some(record) = input.record(slide) {
            if record.status == InsightStatus::InsufficientData && !record.numbers_used.is_empty() {
                hits.push(Hit::at(slide, format!("declares numbers {:?}", record.numbers_used)));
            }
        }
    }
    hits
}

// --- Typographic ---

fn min_font_size(input: &ComplianceInput<'_>, min_pt: f64) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            if let ElementContent::Text { fit, .. } = &element.content {
                if fit.font_size < min_pt - EPSILON {
                    hits.push(Hit::at(slide, format!("{:?} at {:.1}pt, floor {:.1}pt", element.role, fit.font_size, min_pt)));
                }
            }
        }
    }
    hits
}

fn canvas_aspect(input: &ComplianceInput<'_>, ratio: [u32; 2], tolerance: f64) -> Vec<Hit> {
    let canvas = input.document.canvas;
    if ratio[1] == 0 || canvas.height <= 0.0 {
        return vec![Hit::deck("degenerate canvas or ratio")];
    }
    let expected = ratio[0] as f64 / ratio[1] as f64;
    let actual = canvas.aspect_ratio();
    if (expected - actual).abs() > tolerance {
        vec![Hit::deck(format!("{:.3}, expected {}:{}", actual, ratio[0], ratio[1]))]
    } else {
        vec![]
    }
}

// --- Layout ---

fn within_bounds(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let canvas = input.document.canvas;
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            if !canvas.contains(&element.bbox) {
                hits.push(Hit::at(slide, format!("{:?} at {:?}", element.role, element.bbox)));
            }
        }
    }
    hits
}

fn no_overlap(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        for (a, b) in overlapping_pairs(&slide.boxes()) {
            hits.push(Hit::at(
                slide,
                format!("{:?} overlaps {:?}", slide.elements[a].role, slide.elements[b].role),
            ));
        }
    }
    hits
}

fn text_fits(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            if let ElementContent::Text { fit, .. } = &element.content {
                if fit.content_height > element.bbox.height + EPSILON {
                    hits.push(Hit::at(
                        slide,
                        format!("{:?} needs {:.1}pt, box is {:.1}pt", element.role, fit.content_height, element.bbox.height),
                    ));
                }
            }
        }
    }
    hits
}

fn image_aspect(input: &ComplianceInput<'_>, tolerance: f64) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            let (Some(area), Some((w, h))) = (element.image_area(), element.oriented_size()) else { continue };
            if area.height <= 0.0 || h <= 0.0 {
                hits.push(Hit::at(slide, "zero-height image"));
                continue;
            }
            let native = w / h;
            let rendered = area.width / area.height;
            if ((rendered - native) / native).abs() > tolerance {
                hits.push(Hit::at(slide, format!("rendered {:.6}, native {:.6}", rendered, native)));
            }
        }
    }
    hits
}

fn image_landscape(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            if let Some(area) = element.image_area() {
                if area.width < area.height {
                    hits.push(Hit::at(slide, format!("{:.1}x{:.1}", area.width, area.height)));
                }
            }
        }
    }
    hits
}

fn title_anchor(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let cover = input.document.slides.iter().find(|s| s.kind == SlideKind::Cover);
    let Some(anchor) = cover.and_then(|c| c.element(ElementRole::Title)).map(|e| e.bbox.x) else {
        return vec![Hit::deck("no cover title to anchor against")];
    };
    let mut hits = vec![];
    for slide in &input.document.slides {
        for element in &slide.elements {
            let anchored = matches!(element.role, ElementRole::Subtitle | ElementRole::Headline);
            if anchored && (element.bbox.x - anchor).abs() > EPSILON {
                hits.push(Hit::at(slide, format!("{:?} x={:.2}, cover title x={:.2}", element.role, element.bbox.x, anchor)));
            }
        }
    }
    hits
}

// --- Source fidelity ---

fn numbers_traced(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let deck_numbers: Vec<&str> = input.deck.all_numbers().into_iter().collect();
    let mut hits = vec![];
    for slide in &input.document.slides {
        let declared: Vec<&str> = match slide.kind {
            SlideKind::Cover => continue,
            SlideKind::ExecutiveSummary | SlideKind::Recommendations => deck_numbers.clone(),
            SlideKind::Content | SlideKind::InsufficientData => input
                .record(slide)
                .map(|r| r.numbers_used.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        };
        let mut missing: BTreeSet<String> = BTreeSet::new();
        for element in &slide.elements {
            if let Some(text) = element.text() {
                missing.extend(untracked_tokens(&text, &declared).into_iter().map(str::to_string));
            }
        }
        if !missing.is_empty() {
            let quoted: Vec<String> = missing.iter().map(|t| format!("\"{}\"", t)).collect();
            hits.push(Hit::at(slide, quoted.join(", ")));
        }
    }
    hits
}

fn numbers_declared(input: &ComplianceInput<'_>) -> Vec<Hit> {
    input
        .content_slides()
        .filter(|slide| input.record(slide).map_or(true, |r| r.numbers_used.is_empty()))
        .map(|slide| Hit::at(slide, "numbers_used is empty"))
        .collect()
}

fn headline_has_number(input: &ComplianceInput<'_>) -> Vec<Hit> {
    input
        .content_slides()
        .filter_map(|slide| {
            let text = slide.element(ElementRole::Headline)?.text()?;
            (!contains_token(&text)).then(|| Hit::at(slide, format!("\"{}\"", text)))
        })
        .collect()
}

// --- Coverage ---

fn slide_coverage(input: &ComplianceInput<'_>) -> Vec<Hit> {
    let mut hits = vec![];
    let known: BTreeSet<u32> = input.pages.iter().map(|p| p.index).collect();
    for page in input.pages {
        let count = input
            .document
            .slides
            .iter()
            .filter(|s| s.source_slide == Some(page.index))
            .count();
        if count != 1 {
            hits.push(Hit::deck(format!("page {} maps to {} slides", page.index, count)));
        }
    }
    for slide in &input.document.slides {
        if let Some(n) = slide.source_slide {
            if !known.contains(&n) {
                hits.push(Hit::at(slide, format!("slide refers to unknown page {}", n)));
            }
        }
    }
    let order: Vec<u32> = input.document.slides.iter().filter_map(|s| s.source_slide).collect();
    let expected: Vec<u32> = input.pages.iter().map(|p| p.index).collect();
    if hits.is_empty() && order != expected {
        hits.push(Hit::deck(format!("page order {:?}, manifest order {:?}", order, expected)));
    }
    hits
}

fn analysis_supplied(input: &ComplianceInput<'_>) -> Vec<Hit> {
    input
        .pages
        .iter()
        .filter(|p| input.deck.insight_for(p.index).is_none())
        .map(|p| Hit::deck(p.index.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PlacedElement;
    use crate::layout::geometry::LayoutBox;
    use crate::layout::LayoutEngine;
    use crate::model::{Bullet, SlideType};
    use crate::style::StyleTemplate;
    use std::path::PathBuf;

    fn page(index: u32) -> PageRecord {
        PageRecord {
            index,
            title_hint: "Usage".into(),
            image_ref: PathBuf::from(format!("temp/slide_{}.png", index)),
            image_size: [1600, 900],
            slide_type: SlideType::General,
            extracted_labels: vec![],
            active_filters: Default::default(),
        }
    }

    fn deck() -> DeckSpec {
        DeckSpec {
            title: "Adoption".into(),
            subtitle: "Review".into(),
            executive_summary: vec!["134 active users anchor adoption".into()],
            recommendations: vec![],
            slides: vec![InsightRecord {
                slide_number: 1,
                title: "Usage".into(),
                headline: "134 users from 1,275 total (11%)".into(),
                bullets: vec![Bullet::new("Adoption gap is wide", "Most users never return")],
                numbers_used: vec!["134".into(), "1,275".into(), "11%".into()],
                status: InsightStatus::Complete,
                skip_reason: None,
            }],
        }
    }

    fn build(deck: &DeckSpec, pages: &[PageRecord]) -> DeckDocument {
        let style = StyleTemplate::builtin().unwrap();
        let slides = LayoutEngine::new(&style).layout_deck(deck, pages).unwrap();
        DeckDocument::assemble(&style, &deck.title, slides).unwrap()
    }

    fn validator() -> ComplianceValidator {
        ComplianceValidator::new(RulePolicy::builtin().unwrap())
    }

    #[test]
    fn test_clean_deck_is_compliant() {
        let d = deck();
        let pages = [page(1)];
        let doc = build(&d, &pages);
        let report = validator().evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.outcome, ComplianceOutcome::Compliant);
        assert!(report.render_text().contains("ALL CHECKS PASSED"));
    }

    #[test]
    fn test_untraced_number_in_bold_line_is_error() {
        let mut d = deck();
        d.slides[0].bullets[0].bold_line = "Only 4% return weekly".into();
        let pages = [page(1)];
        let doc = build(&d, &pages);
        let report = validator().evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        assert_eq!(report.outcome, ComplianceOutcome::NonCompliant);
        let finding = report.errors.iter().find(|f| f.rule_id == "fidelity.numbers_traced").unwrap();
        assert_eq!(finding.slide, Some(3));
        assert!(finding.message.contains("\"4%\""));
    }

    #[test]
    fn test_tampered_geometry_is_caught_independently() {
        let d = deck();
        let pages = [page(1)];
        let mut doc = build(&d, &pages);
        let content = doc.slides.iter_mut().find(|s| s.kind == SlideKind::Content).unwrap();
        let headline_box = content.elements[0].bbox;
        content.elements.push(PlacedElement {
            role: ElementRole::Bullet,
            bbox: LayoutBox::new(headline_box.x, headline_box.y, 2000.0, 10.0),
            content: content.elements[0].content.clone(),
        });
        let report = validator().evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        let ids: Vec<&str> = report.errors.iter().map(|f| f.rule_id.as_str()).collect();
        assert!(ids.contains(&"layout.within_bounds"));
        assert!(ids.contains(&"layout.no_overlap"));
    }

    #[test]
    fn test_missing_analysis_is_warning_not_error() {
        let d = deck();
        let pages = [page(1), page(2)];
        let doc = build(&d, &pages);
        let report = validator().evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.outcome, ComplianceOutcome::CompliantWithWarnings);
        assert_eq!(report.warnings[0].rule_id, "coverage.analysis_supplied");
        assert!(report.passed.contains(&"coverage.one_slide_per_page".to_string()));
    }

    #[test]
    fn test_disabled_rules_are_not_evaluated() {
        let mut policy = RulePolicy::builtin().unwrap();
        for rule in &mut policy.rules {
            rule.enabled = false;
        }
        let d = deck();
        let pages = [page(1)];
        let doc = build(&d, &pages);
        let report = ComplianceValidator::new(policy)
            .evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        assert_eq!(report.passed, vec!["fidelity.numbers_traced".to_string()]);
        assert_eq!(report.findings().count(), 0);
    }

    #[test]
    fn test_untraced_number_stays_error_under_edited_policy() {
        let mut policy = RulePolicy::builtin().unwrap();
        for rule in &mut policy.rules {
            if rule.is_mandatory() {
                rule.severity = Severity::Warning;
                rule.enabled = false;
            }
        }
        let mut d = deck();
        d.slides[0].bullets[0].detail.push_str(" up 4%");
        let pages = [page(1)];
        let doc = build(&d, &pages);
        let report = ComplianceValidator::new(policy)
            .evaluate(&ComplianceInput { document: &doc, deck: &d, pages: &pages });
        let finding = report.errors.iter().find(|f| f.rule_id == "fidelity.numbers_traced").unwrap();
        assert_eq!(finding.severity, Severity::Error);
        assert!(finding.message.contains("\"4%\""));
        assert_eq!(report.outcome, ComplianceOutcome::NonCompliant);
    }
}
