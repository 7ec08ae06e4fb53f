//! Build Pipeline - Single Entry Point
//!
//! CRITICAL: build MUST run schema validation before layout and compliance
//! after assembly. No bypass. Nothing is written before both have run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::compliance::{
    ComplianceInput, ComplianceReport, ComplianceValidator, FailureMode, PolicyError, RulePolicy,
};
use crate::config::{ConfigAuthority, ConfigError, Resolved, RunConfig};
use crate::document::DeckDocument;
use crate::handoff::HandoffError;
use crate::hashing::compute_build_hash;
use crate::layout::{LayoutEngine, LayoutError};
use crate::manifest::{write_json_atomic, ExtractionError};
use crate::model::{DeckSpec, SourceManifest};
use crate::schema::{SchemaError, SchemaLimits, SchemaValidator};
use crate::style::{StyleError, StyleTemplate};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static COMPLIANCE_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_compliance_call_count() -> u32 {
    COMPLIANCE_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_compliance_call_count() {
    COMPLIANCE_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ExtractionError: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("SchemaViolation: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Everything the caller needs to judge a build, written beside the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    pub engine_version: String,
    pub style_id: String,
    pub style_authority: ConfigAuthority,
    pub policy_version: String,
    pub policy_authority: ConfigAuthority,
    pub failure_mode: FailureMode,
    pub build_hash: String,
    pub document_hash: String,
    pub slide_count: usize,
    /// The document was withheld because of error findings.
    pub blocked: bool,
    pub compliance: ComplianceReport,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub document: DeckDocument,
    pub report: BuildReport,
}

impl BuildResult {
    /// The document, unless the policy withheld it.
    pub fn released(&self) -> Option<&DeckDocument> {
        (!self.report.blocked).then_some(&self.document)
    }
}

/// Paths written by [`BuildPipeline::build_to`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WrittenArtifacts {
    pub document: Option<PathBuf>,
    pub report: PathBuf,
}

/// `<output>.report.json`
pub fn report_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".report.json");
    PathBuf::from(path)
}

/// The build pipeline - single entry point for phase 2
pub struct BuildPipeline {
    style: StyleTemplate,
    style_authority: ConfigAuthority,
    schema: SchemaValidator,
    compliance: ComplianceValidator,
    policy_authority: ConfigAuthority,
}

impl BuildPipeline {
    pub fn new(resolved: Resolved, limits: SchemaLimits) -> Self {
        Self {
            style: resolved.style,
            style_authority: resolved.style_authority,
            schema: SchemaValidator::new(limits),
            compliance: ComplianceValidator::new(resolved.policy),
            policy_authority: resolved.policy_authority,
        }
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, PipelineError> {
        Ok(Self::new(config.resolve()?, config.limits.clone()))
    }

    pub fn style(&self) -> &StyleTemplate {
        &self.style
    }

    pub fn policy(&self) -> &RulePolicy {
        self.compliance.policy()
    }

    pub fn schema(&self) -> &SchemaValidator {
        &self.schema
    }

    /// Schema-check a deck against its manifest. No rendering.
    pub fn validate(&self, deck: &DeckSpec, manifest: &SourceManifest) -> Result<(), PipelineError> {
        self.schema.validate_deck(deck, Some(manifest))?;
        Ok(())
    }

    /// The ONLY compliance entry point.
    pub fn check_compliance(
        &self,
        document: &DeckDocument,
        deck: &DeckSpec,
        manifest: &SourceManifest,
    ) -> ComplianceReport {
        #[cfg(feature = "test-hooks")]
        COMPLIANCE_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.compliance.evaluate(&ComplianceInput {
            document,
            deck,
            pages: &manifest.slides,
        })
    }

    /// Validate, lay out, assemble and check a deck.
    ///
    /// CRITICAL: This ALWAYS validates the schema first and runs compliance last.
    pub fn build(&self, deck: &DeckSpec, manifest: &SourceManifest) -> Result<BuildResult, PipelineError> {
        let span = info_span!("build", pages = manifest.total_slides);
        let _guard = span.enter();

        // MANDATORY: no layout of an invalid deck.
        self.validate(deck, manifest)?;
        info!(records = deck.slides.len(), "schema valid");

        let slides = LayoutEngine::new(&self.style).layout_deck(deck, &manifest.slides)?;
        let document = DeckDocument::assemble(&self.style, &deck.title, slides)?;

        let compliance = self.check_compliance(&document, deck, manifest);
        let policy = self.policy();
        let blocked = policy.failure_mode == FailureMode::Block && compliance.has_errors();
        if policy.failure_mode == FailureMode::Log {
            for finding in compliance.findings() {
                warn!(rule = %finding.rule_id, slide = ?finding.slide, "{}", finding.message);
            }
        }

        let build_hash = compute_build_hash(
            &self.style.id,
            &policy.policy_version,
            deck,
            &manifest.slides,
            ENGINE_VERSION,
        )?;

        let report = BuildReport {
            engine_version: ENGINE_VERSION.to_string(),
            style_id: self.style.id.clone(),
            style_authority: self.style_authority,
            policy_version: policy.policy_version.clone(),
            policy_authority: self.policy_authority,
            failure_mode: policy.failure_mode,
            build_hash,
            document_hash: document.document_hash.clone(),
            slide_count: document.slides.len(),
            blocked,
            compliance,
        };
        info!(slides = report.slide_count, blocked, outcome = ?report.compliance.outcome, "build finished");

        Ok(BuildResult { document, report })
    }

    /// Build and write `output` plus `<output>.report.json`.
    ///
    /// A failed build writes nothing. A blocked build writes only the report.
    pub fn build_to(
        &self,
        deck: &DeckSpec,
        manifest: &SourceManifest,
        output: &Path,
    ) -> Result<(BuildResult, WrittenArtifacts), PipelineError> {
        let result = self.build(deck, manifest)?;

        let document = match result.released() {
            Some(document) => {
                write_json_atomic(output, document).map_err(|source| PipelineError::Io {
                    path: output.to_path_buf(),
                    source,
                })?;
                Some(output.to_path_buf())
            }
            None => None,
        };
        let report = report_path(output);
        write_json_atomic(&report, &result.report).map_err(|source| PipelineError::Io {
            path: report.clone(),
            source,
        })?;

        Ok((result, WrittenArtifacts { document, report }))
    }
}
