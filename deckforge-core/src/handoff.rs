//! Phase Handoff - file rendezvous between prepare and build
//!
//! The analyst runs out of process. The contract is "the insights file exists
//! and is schema-valid", never a function return.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::manifest::{load_manifest, ExtractionError, MANIFEST_FILE};
use crate::model::{DeckSpec, SourceManifest};
use crate::schema::{SchemaError, SchemaValidator};

pub const INSIGHTS_FILE: &str = "insights.json";
pub const STALE_SUFFIX: &str = ".stale";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("No manifest at {0}; run prepare first")]
    NotPrepared(PathBuf),

    #[error("Failed to read manifest: {0}")]
    Manifest(#[from] ExtractionError),

    #[error("Failed to read insights {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Invalid insights JSON {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("Failed to retire stale insights {path}: {source}")]
    Retire { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Where a run stands, derived from the files on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffState {
    /// No manifest yet.
    Unprepared,
    /// Manifest written; no usable insights file.
    AwaitingAnalysis { reason: String },
    /// Insights present and schema-valid.
    Ready,
}

pub struct Handoff {
    manifest_path: PathBuf,
    insights_path: PathBuf,
}

impl Handoff {
    pub fn new(work_dir: &Path, insights_path: Option<PathBuf>) -> Self {
        Self {
            manifest_path: work_dir.join(MANIFEST_FILE),
            insights_path: insights_path.unwrap_or_else(|| work_dir.join(INSIGHTS_FILE)),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn insights_path(&self) -> &Path {
        &self.insights_path
    }

    pub fn manifest(&self) -> Result<SourceManifest, HandoffError> {
        if !self.manifest_path.exists() {
            return Err(HandoffError::NotPrepared(self.manifest_path.clone()));
        }
        Ok(load_manifest(&self.manifest_path)?)
    }

    /// Move an insights file left by an earlier run to `<insights>.stale`.
    ///
    /// Called after a new manifest is written so the next wait cannot pick
    /// up analysis of a previous export.
    pub fn retire_insights(&self) -> Result<Option<PathBuf>, HandoffError> {
        if !self.insights_path.exists() {
            return Ok(None);
        }
        let mut stale = self.insights_path.as_os_str().to_owned();
        stale.push(STALE_SUFFIX);
        let stale = PathBuf::from(stale);
        fs::rename(&self.insights_path, &stale).map_err(|source| HandoffError::Retire {
            path: self.insights_path.clone(),
            source,
        })?;
        warn!(from = %self.insights_path.display(), to = %stale.display(), "moved aside insights from an earlier run");
        Ok(Some(stale))
    }

    /// Read and validate the insights file once.
    pub fn try_collect(
        &self,
        manifest: &SourceManifest,
        validator: &SchemaValidator,
    ) -> Result<DeckSpec, HandoffError> {
        let deck = load_deck(&self.insights_path)?;
        validator.validate_deck(&deck, Some(manifest))?;
        Ok(deck)
    }

    pub fn state(&self, validator: &SchemaValidator) -> HandoffState {
        let manifest = match self.manifest() {
            Ok(m) => m,
            Err(_) => return HandoffState::Unprepared,
        };
        match self.try_collect(&manifest, validator) {
            Ok(_) => HandoffState::Ready,
            Err(e) => HandoffState::AwaitingAnalysis { reason: e.to_string() },
        }
    }

    /// Block until the insights file exists and validates. No timeout.
    pub fn wait_for_insights(
        &self,
        manifest: &SourceManifest,
        validator: &SchemaValidator,
        poll_interval: Duration,
    ) -> DeckSpec {
        info!(path = %self.insights_path.display(), "waiting for analysis");
        let mut last_reason = String::new();
        loop {
            match self.try_collect(manifest, validator) {
                Ok(deck) => {
                    info!(records = deck.slides.len(), "analysis received");
                    return deck;
                }
                Err(e) => {
                    let reason = e.to_string();
                    if reason != last_reason {
                        info!(%reason, "insights not ready");
                        last_reason = reason;
                    }
                }
            }
            thread::sleep(poll_interval);
        }
    }
}

pub fn load_deck(path: &Path) -> Result<DeckSpec, HandoffError> {
    let content = fs::read_to_string(path).map_err(|source| HandoffError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| HandoffError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PageRecord, SlideType};
    use chrono::Utc;

    fn write_manifest(work: &Path) -> SourceManifest {
        let manifest = SourceManifest {
            run_id: "run".to_string(),
            prepared_at: Utc::now(),
            source_file: PathBuf::from("export"),
            total_slides: 1,
            slides: vec![PageRecord {
                index: 1,
                title_hint: "Usage".to_string(),
                image_ref: PathBuf::from("pages/slide_1.png"),
                image_size: [1600, 900],
                slide_type: SlideType::General,
                extracted_labels: vec![],
                active_filters: Default::default(),
            }],
        };
        fs::write(work.join(MANIFEST_FILE), serde_json::to_string(&manifest).unwrap()).unwrap();
        manifest
    }

    const VALID: &str = r#"{"slides": [{"slide_number": 1, "title": "Usage",
        "headline": "134 users active", "numbers_used": ["134"],
        "bullets": [{"bold_line": "134 active users", "detail": "Up from last quarter"}]}]}"#;

    #[test]
    fn test_state_progression() {
        let work = tempfile::tempdir().unwrap();
        let handoff = Handoff::new(work.path(), None);
        let validator = SchemaValidator::default();
        assert_eq!(handoff.state(&validator), HandoffState::Unprepared);

        write_manifest(work.path());
        assert!(matches!(handoff.state(&validator), HandoffState::AwaitingAnalysis { .. }));

        fs::write(handoff.insights_path(), VALID).unwrap();
        assert_eq!(handoff.state(&validator), HandoffState::Ready);
    }

    #[test]
    fn test_invalid_insights_keep_waiting() {
        let work = tempfile::tempdir().unwrap();
        let manifest = write_manifest(work.path());
        let handoff = Handoff::new(work.path(), None);
        fs::write(handoff.insights_path(), r#"{"slides": [{"slide_number": 9}]}"#).unwrap();
        assert!(matches!(
            handoff.state(&SchemaValidator::default()),
            HandoffState::AwaitingAnalysis { .. }
        ));

        let path = handoff.insights_path().to_path_buf();
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            fs::write(path, VALID).unwrap();
        });
        let deck = handoff.wait_for_insights(&manifest, &SchemaValidator::default(), Duration::from_millis(5));
        writer.join().unwrap();
        assert_eq!(deck.slides.len(), 1);
    }

    #[test]
    fn test_retire_moves_earlier_insights_aside() {
        let work = tempfile::tempdir().unwrap();
        write_manifest(work.path());
        let handoff = Handoff::new(work.path(), None);
        let validator = SchemaValidator::default();
        assert_eq!(handoff.retire_insights().unwrap(), None);

        fs::write(handoff.insights_path(), VALID).unwrap();
        assert_eq!(handoff.state(&validator), HandoffState::Ready);

        let stale = handoff.retire_insights().unwrap().unwrap();
        assert_eq!(stale, work.path().join("insights.json.stale"));
        assert_eq!(fs::read_to_string(&stale).unwrap(), VALID);
        assert!(matches!(handoff.state(&validator), HandoffState::AwaitingAnalysis { .. }));
    }

    #[test]
    fn test_load_deck_reports_path() {
        let err = load_deck(Path::new("/nonexistent/insights.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/insights.json"));
    }
}
