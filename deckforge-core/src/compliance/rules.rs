//! Rule Table - governance policy as data
//!
//! Each entry names a predicate from a fixed vocabulary plus its parameters,
//! severity and message template. Revising the policy never touches the
//! evaluation engine.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ENGINE_VERSION;

const DEFAULT_POLICY_JSON: &str = include_str!("../../policy/default_policy.json");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What to do with the document when error findings exist.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Withhold the document.
    #[default]
    Block,
    /// Write the document and surface findings.
    Warn,
    /// Write the document; findings are only logged.
    Log,
}

/// The decidable predicates the engine knows how to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Predicate {
    BulletCap { max: usize },
    BoldLineWords { max: usize },
    HeadlinePresent,
    SynthesisCap { max: usize },
    InsufficientDataExclusive,
    MinFontSize { min_pt: f64 },
    CanvasAspect { ratio: [u32; 2], tolerance: f64 },
    WithinBounds,
    NoOverlap,
    TextFits,
    ImageAspect { tolerance: f64 },
    ImageLandscape,
    TitleAnchor,
    NumbersTraced,
    NumbersDeclared,
    HeadlineHasNumber,
    SlideCoverage,
    AnalysisSupplied,
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    pub id: String,
    #[serde(flatten)]
    pub predicate: Predicate,
    pub severity: Severity,
    /// Template with `{slide}` and `{detail}` placeholders.
    pub message: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub remediation: Vec<String>,
}

impl RuleSpec {
    /// Traceability is always an enabled error, whatever the table says.
    pub fn is_mandatory(&self) -> bool {
        self.predicate == Predicate::NumbersTraced
    }

    pub fn effective_severity(&self) -> Severity {
        if self.is_mandatory() { Severity::Error } else { self.severity }
    }

    pub fn render_message(&self, slide: Option<usize>, detail: &str) -> String {
        let slide = slide.map_or_else(|| "-".to_string(), |s| s.to_string());
        self.message.replace("{slide}", &slide).replace("{detail}", detail)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RulePolicy {
    pub policy_version: String,
    pub engine_min_version: String,
    #[serde(default)]
    pub failure_mode: FailureMode,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Failed to read policy {0}: {1}")]
    Io(String, std::io::Error),

    #[error("Invalid policy: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Policy {0} requires engine >= {1}, current is {2}")]
    EngineVersionMismatch(String, String, String),

    #[error("Invalid version in policy: {0}")]
    Version(#[from] semver::Error),

    #[error("Duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("Rule {0} must be enabled with severity error")]
    MandatoryRuleWeakened(String),

    #[error("Policy has no numbers_traced rule")]
    MissingTraceability,
}

impl RulePolicy {
    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_json(DEFAULT_POLICY_JSON)
    }

    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        let policy: RulePolicy = serde_json::from_str(json)?;
        policy.check()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path)
            .map_err(|e| PolicyError::Io(path.display().to_string(), e))?;
        Self::from_json(&content)
    }

    /// Engine compatibility, id uniqueness and an intact traceability rule.
    pub fn check(&self) -> Result<(), PolicyError> {
        let engine = semver::Version::parse(ENGINE_VERSION)?;
        let required = semver::Version::parse(&self.engine_min_version)?;
        semver::Version::parse(&self.policy_version)?;
        if engine < required {
            return Err(PolicyError::EngineVersionMismatch(
                self.policy_version.clone(),
                self.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }

        let mut ids = BTreeSet::new();
        for rule in &self.rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(PolicyError::DuplicateRule(rule.id.clone()));
            }
        }

        let mut traced = false;
        for rule in self.rules.iter().filter(|r| r.is_mandatory()) {
            if !rule.enabled || rule.severity != Severity::Error {
                return Err(PolicyError::MandatoryRuleWeakened(rule.id.clone()));
            }
            traced = true;
        }
        if !traced {
            return Err(PolicyError::MissingTraceability);
        }
        Ok(())
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.iter().filter(|r| r.enabled || r.is_mandatory())
    }

    pub fn rule(&self, id: &str) -> Option<&RuleSpec> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_policy_parses() {
        let policy = RulePolicy::builtin().unwrap();
        assert_eq!(policy.failure_mode, FailureMode::Block);
        let traced = policy.rule("fidelity.numbers_traced").unwrap();
        assert_eq!(traced.predicate, Predicate::NumbersTraced);
        assert_eq!(traced.severity, Severity::Error);
        assert_eq!(
            policy.rule("structure.bullet_cap").unwrap().predicate,
            Predicate::BulletCap { max: 3 }
        );
    }

    #[test]
    fn test_rejects_newer_engine_requirement() {
        let json = r#"{"policy_version": "2.0.0", "engine_min_version": "99.0.0", "rules": []}"#;
        assert!(matches!(
            RulePolicy::from_json(json),
            Err(PolicyError::EngineVersionMismatch(..))
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let json = r#"{"policy_version": "1.0.0", "engine_min_version": "1.0.0", "rules": [
            {"id": "a", "check": "no_overlap", "severity": "error", "message": "x"},
            {"id": "a", "check": "within_bounds", "severity": "error", "message": "y"}
        ]}"#;
        assert!(matches!(RulePolicy::from_json(json), Err(PolicyError::DuplicateRule(_))));
    }

    #[test]
    fn test_rejects_downgraded_traceability() {
        for patch in [r#""severity": "warning""#, r#""severity": "info""#, r#""severity": "error", "enabled": false"#] {
            let json = format!(
                r#"{{"policy_version": "1.0.0", "engine_min_version": "1.0.0", "rules": [
                    {{"id": "fidelity.numbers_traced", "check": "numbers_traced", {}, "message": "x"}}
                ]}}"#,
                patch
            );
            assert!(
                matches!(RulePolicy::from_json(&json), Err(PolicyError::MandatoryRuleWeakened(_))),
                "{}",
                patch
            );
        }
    }

    #[test]
    fn test_rejects_missing_traceability() {
        let json = r#"{"policy_version": "1.0.0", "engine_min_version": "1.0.0", "rules": [
            {"id": "layout.no_overlap", "check": "no_overlap", "severity": "error", "message": "x"}
        ]}"#;
        assert!(matches!(RulePolicy::from_json(json), Err(PolicyError::MissingTraceability)));
    }

    #[test]
    fn test_message_template() {
        let policy = RulePolicy::builtin().unwrap();
        let rule = policy.rule("layout.no_overlap").unwrap();
        assert_eq!(
            rule.render_message(Some(4), "Image overlaps Bullet"),
            "Slide 4 has overlapping elements: Image overlaps Bullet"
        );
    }
}
