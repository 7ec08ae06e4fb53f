//! Insight Schema Validator
//!
//! Rules produce structured violations. The validator collects every
//! violation before reporting; nothing is coerced.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{DeckSpec, InsightRecord, InsightStatus, SourceManifest};
use crate::tokens::{contains_token, untracked_tokens};

/// Structural limits of the insight payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchemaLimits {
    pub max_bullets: usize,
    pub max_bold_line_words: usize,
    pub max_synthesis_items: usize,
}

impl Default for SchemaLimits {
    fn default() -> Self {
        Self {
            max_bullets: 3,
            max_bold_line_words: 8,
            max_synthesis_items: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaViolation {
    pub rule: String,
    /// Offending slide; `None` for deck-level fields.
    pub slide_number: Option<u32>,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slide_number {
            Some(n) => write!(f, "slide {}: {}: {}", n, self.rule, self.message)?,
            None => write!(f, "deck: {}: {}", self.rule, self.message)?,
        }
        if let Some(actual) = &self.actual {
            write!(f, " (got {})", actual)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{} schema violation(s): {}", .0.len(), join_violations(.0))]
    Violations(Vec<SchemaViolation>),
}

impl SchemaError {
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            SchemaError::Violations(v) => v,
        }
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Per-record rule
pub trait InsightRule {
    fn name(&self) -> &'static str;
    fn check(&self, record: &InsightRecord, limits: &SchemaLimits) -> Vec<SchemaViolation>;
}

fn violation(
    rule: &'static str,
    record: &InsightRecord,
    message: impl Into<String>,
    expected: Option<String>,
    actual: Option<String>,
) -> SchemaViolation {
    SchemaViolation {
        rule: rule.to_string(),
        slide_number: Some(record.slide_number),
        message: message.into(),
        expected,
        actual,
    }
}

// --- Concrete Rules ---

pub struct BulletCapRule;

impl InsightRule for BulletCapRule {
    fn name(&self) -> &'static str { "bullet_cap" }

    fn check(&self, record: &InsightRecord, limits: &SchemaLimits) -> Vec<SchemaViolation> {
        if record.bullets.len() <= limits.max_bullets {
            return vec![];
        }
        vec![violation(
            self.name(),
            record,
            "Too many bullets",
            Some(format!("at most {}", limits.max_bullets)),
            Some(record.bullets.len().to_string()),
        )]
    }
}

pub struct BoldLineRule;

impl InsightRule for BoldLineRule {
    fn name(&self) -> &'static str { "bold_line" }

    fn check(&self, record: &InsightRecord, limits: &SchemaLimits) -> Vec<SchemaViolation> {
        let mut violations = vec![];
        for (i, bullet) in record.bullets.iter().enumerate() {
            let words = bullet.bold_line.split_whitespace().count();
            if words == 0 {
                violations.push(violation(
                    self.name(),
                    record,
                    format!("Bullet {} has an empty bold line", i + 1),
                    None,
                    None,
                ));
            } else if words > limits.max_bold_line_words {
                violations.push(violation(
                    self.name(),
                    record,
                    format!("Bullet {} bold line is too long", i + 1),
                    Some(format!("at most {} words", limits.max_bold_line_words)),
                    Some(format!("{} words", words)),
                ));
            }
            if !bullet.detail.is_empty() && bullet.bold_line.trim() == bullet.detail.trim() {
                violations.push(violation(
                    self.name(),
                    record,
                    format!("Bullet {} repeats its bold line as detail", i + 1),
                    None,
                    None,
                ));
            }
        }
        violations
    }
}

pub struct HeadlineRule;

impl InsightRule for HeadlineRule {
    fn name(&self) -> &'static str { "headline_present" }

    fn check(&self, record: &InsightRecord, _limits: &SchemaLimits) -> Vec<SchemaViolation> {
        if record.status == InsightStatus::Complete && record.headline.trim().is_empty() {
            return vec![violation(self.name(), record, "Complete record has no headline", None, None)];
        }
        vec![]
    }
}

pub struct TraceabilityRule;

impl InsightRule for TraceabilityRule {
    fn name(&self) -> &'static str { "number_traceability" }

    fn check(&self, record: &InsightRecord, _limits: &SchemaLimits) -> Vec<SchemaViolation> {
        let mut missing: Vec<&str> = untracked_tokens(&record.headline, &record.numbers_used);
        for bullet in &record.bullets {
            for token in untracked_tokens(&bullet.detail, &record.numbers_used) {
                if !missing.contains(&token) {
                    missing.push(token);
                }
            }
        }
        if missing.is_empty() {
            return vec![];
        }
        let quoted: Vec<String> = missing.iter().map(|t| format!("\"{}\"", t)).collect();
        vec![violation(
            self.name(),
            record,
            format!("Untracked numbers {}", quoted.join(", ")),
            Some("every number listed in numbers_used".to_string()),
            Some(format!("numbers_used = {:?}", record.numbers_used)),
        )]
    }
}

pub struct InsufficientDataRule;

impl InsightRule for InsufficientDataRule {
    fn name(&self) -> &'static str { "insufficient_data_exclusive" }

    fn check(&self, record: &InsightRecord, _limits: &SchemaLimits) -> Vec<SchemaViolation> {
        if record.status != InsightStatus::InsufficientData {
            return vec![];
        }
        let mut violations = vec![];
        if !record.numbers_used.is_empty() {
            violations.push(violation(
                self.name(),
                record,
                "Insufficient-data record declares numbers",
                Some("numbers_used = []".to_string()),
                Some(format!("{:?}", record.numbers_used)),
            ));
        }
        if record.bullets.is_empty() {
            violations.push(violation(
                self.name(),
                record,
                "Insufficient-data record needs a data-gap statement",
                Some("at least one bullet".to_string()),
                None,
            ));
        }
        for (i, bullet) in record.bullets.iter().enumerate() {
            if contains_token(&bullet.bold_line) || contains_token(&bullet.detail) {
                violations.push(violation(
                    self.name(),
                    record,
                    format!("Bullet {} makes a numeric claim on an insufficient-data record", i + 1),
                    None,
                    None,
                ));
            }
        }
        violations
    }
}

/// Validator runs every record rule plus the deck-level checks.
pub struct SchemaValidator {
    rules: Vec<Box<dyn InsightRule>>,
    limits: SchemaLimits,
}

impl SchemaValidator {
    pub fn new(limits: SchemaLimits) -> Self {
        Self {
            rules: vec![
                Box::new(BulletCapRule),
                Box::new(BoldLineRule),
                Box::new(HeadlineRule),
                Box::new(TraceabilityRule),
                Box::new(InsufficientDataRule),
            ],
            limits,
        }
    }

    pub fn limits(&self) -> &SchemaLimits {
        &self.limits
    }

    /// Check one record. Skipped records carry no rendered content.
    pub fn validate_record(&self, record: &InsightRecord) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = vec![];
        if record.slide_number == 0 {
            violations.push(violation("slide_number", record, "Slide numbers start at 1", None, None));
        }
        if record.status != InsightStatus::Skipped {
            for rule in &self.rules {
                violations.extend(rule.check(record, &self.limits));
            }
        }
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check the whole deck, optionally against the prepare-phase manifest.
    pub fn validate_deck(
        &self,
        deck: &DeckSpec,
        manifest: Option<&SourceManifest>,
    ) -> Result<(), SchemaError> {
        let mut violations = vec![];

        for (field, items) in [
            ("executive_summary", &deck.executive_summary),
            ("recommendations", &deck.recommendations),
        ] {
            if items.len() > self.limits.max_synthesis_items {
                violations.push(SchemaViolation {
                    rule: "synthesis_cap".to_string(),
                    slide_number: None,
                    message: format!("Too many {} entries", field),
                    expected: Some(format!("at most {}", self.limits.max_synthesis_items)),
                    actual: Some(items.len().to_string()),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for record in &deck.slides {
            if !seen.insert(record.slide_number) {
                violations.push(violation("slide_number", record, "Duplicate slide number", None, None));
            }
            if let Some(manifest) = manifest {
                if record.slide_number != 0 && manifest.page(record.slide_number).is_none() {
                    violations.push(violation(
                        "slide_number",
                        record,
                        "Slide number not present in the source manifest",
                        Some(format!("1..={}", manifest.total_slides)),
                        None,
                    ));
                }
            }
            if let Err(v) = self.validate_record(record) {
                violations.extend(v);
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Violations(violations))
        }
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new(SchemaLimits::default())
    }
}
