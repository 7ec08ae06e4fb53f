//! Data Model - Pages, Insights, Decks
//!
//! PageRecords come from the prepare phase and are append-only.
//! InsightRecords come from the external analyst and are read-only here.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of the source export, in manifest order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    /// 1-based position in the source export.
    #[serde(rename = "slide_number")]
    pub index: u32,
    /// Title hint handed to the analyst.
    #[serde(rename = "title")]
    pub title_hint: String,
    #[serde(rename = "image_path")]
    pub image_ref: PathBuf,
    /// Native pixel size `[width, height]` of the page image.
    pub image_size: [u32; 2],
    #[serde(default)]
    pub slide_type: SlideType,
    #[serde(default)]
    pub extracted_labels: Vec<String>,
    #[serde(default)]
    pub active_filters: BTreeSet<String>,
}

/// Analyst context derived from the page title and labels.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SlideType {
    Trend,
    Leaderboard,
    HealthCheck,
    HabitFormation,
    LicensePriority,
    Geographic,
    #[default]
    General,
}

/// Phase-1 artifact: the analysis request consumed by the external analyst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceManifest {
    pub run_id: String,
    pub prepared_at: DateTime<Utc>,
    pub source_file: PathBuf,
    pub total_slides: usize,
    pub slides: Vec<PageRecord>,
}

impl SourceManifest {
    pub fn page(&self, slide_number: u32) -> Option<&PageRecord> {
        self.slides.iter().find(|p| p.index == slide_number)
    }
}

/// Per-page disposition decided by the analyst.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightStatus {
    #[default]
    Complete,
    InsufficientData,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bullet {
    pub bold_line: String,
    #[serde(default)]
    pub detail: String,
}

impl Bullet {
    pub fn new(bold_line: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            bold_line: bold_line.into(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsightRecord {
    pub slide_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub bullets: Vec<Bullet>,
    #[serde(default)]
    pub numbers_used: Vec<String>,
    #[serde(default)]
    pub status: InsightStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl InsightRecord {
    /// Every text fragment that ends up rendered for this record.
    pub fn rendered_text(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.headline.as_str()).chain(
            self.bullets
                .iter()
                .flat_map(|b| [b.bold_line.as_str(), b.detail.as_str()]),
        )
    }
}

/// Aggregate root for one build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckSpec {
    #[serde(default = "default_deck_title")]
    pub title: String,
    #[serde(default = "default_deck_subtitle")]
    pub subtitle: String,
    #[serde(default)]
    pub executive_summary: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub slides: Vec<InsightRecord>,
}

fn default_deck_title() -> String { "Executive Analytics Dashboard".to_string() }
fn default_deck_subtitle() -> String { "Insights & Recommendations".to_string() }

impl DeckSpec {
    pub fn insight_for(&self, slide_number: u32) -> Option<&InsightRecord> {
        self.slides.iter().find(|s| s.slide_number == slide_number)
    }

    /// Union of every declared source number in the deck.
    pub fn all_numbers(&self) -> BTreeSet<&str> {
        self.slides
            .iter()
            .flat_map(|s| s.numbers_used.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let s: InsightStatus = serde_json::from_str("\"INSUFFICIENT_DATA\"").unwrap();
        assert_eq!(s, InsightStatus::InsufficientData);
        assert_eq!(serde_json::to_string(&InsightStatus::Skipped).unwrap(), "\"SKIPPED\"");
    }

    #[test]
    fn test_deck_defaults() {
        let deck: DeckSpec = serde_json::from_str(
            r#"{"slides": [{"slide_number": 1, "headline": "x"}]}"#,
        ).unwrap();
        assert!(deck.executive_summary.is_empty());
        assert!(deck.recommendations.is_empty());
        assert_eq!(deck.slides[0].status, InsightStatus::Complete);
        assert_eq!(deck.title, "Executive Analytics Dashboard");
    }

    #[test]
    fn test_page_record_wire_names() {
        let page: PageRecord = serde_json::from_str(
            r#"{"slide_number": 2, "title": "Usage", "image_path": "temp/slide_2.png", "image_size": [1600, 900]}"#,
        ).unwrap();
        assert_eq!(page.index, 2);
        assert_eq!(page.slide_type, SlideType::General);
        assert!(page.active_filters.is_empty());
    }
}
