//! DeckForge Core - Dashboard Insight Deck Compiler
//!
//! # The Six Laws (Non-Negotiable)
//! 1. The Manifest Is Truth: one slide per source page, in source order
//! 2. Insights Are Contracts: malformed input aborts before rendering
//! 3. Every Number Is Traced: rendered numbers must be declared by the analyst
//! 4. Geometry Is Checked Twice: by the layout engine and again by compliance
//! 5. Deterministic Output: identical inputs give byte-identical documents
//! 6. Analysts Suggest, Engine Enforces

pub mod model;
pub mod tokens;
pub mod schema;
pub mod style;
pub mod layout;
pub mod document;
pub mod compliance;
pub mod manifest;
pub mod handoff;
pub mod hashing;
pub mod config;
pub mod logging;
pub mod pipeline;

pub use model::{Bullet, DeckSpec, InsightRecord, InsightStatus, PageRecord, SlideType, SourceManifest};
pub use schema::{SchemaError, SchemaLimits, SchemaValidator, SchemaViolation};
pub use style::StyleTemplate;
pub use layout::{Canvas, LayoutBox, LayoutEngine, LayoutError, LayoutOverflow};
pub use document::{DeckDocument, ElementRole, RenderedSlide, SlideKind};
pub use compliance::{
    ComplianceFinding, ComplianceOutcome, ComplianceReport, ComplianceValidator, FailureMode,
    RulePolicy, Severity,
};
pub use manifest::{ExtractionError, ManifestBuilder};
pub use handoff::{Handoff, HandoffError, HandoffState};
pub use hashing::{canonical_json, compute_build_hash, compute_document_hash};
pub use config::{ConfigAuthority, RunConfig};
pub use pipeline::{BuildPipeline, BuildReport, BuildResult, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
