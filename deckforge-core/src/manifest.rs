//! Source Manifest Builder - prepare phase
//!
//! Reads an export directory of page images and writes the analysis request
//! consumed by the external analyst. Page order follows the number embedded
//! in each file name.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{PageRecord, SlideType, SourceManifest};

pub const MANIFEST_FILE: &str = "analysis_request.json";
pub const SIDECAR_FILE: &str = "pages.json";
const PAGES_DIR: &str = "pages";
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Source not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported source {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("Page {page} ({path}): corrupt image: {reason}")]
    CorruptImage { page: u32, path: PathBuf, reason: String },

    #[error("Export {0} contains no page images")]
    Empty(PathBuf),

    #[error("Pages {first} and {second} both claim page number {page}")]
    DuplicatePage { page: u32, first: PathBuf, second: PathBuf },

    #[error("No page number left for {0}")]
    PageNumberOverflow(PathBuf),

    #[error("Sidecar pages.json lists {0}, which is not in the export")]
    UnknownSidecarImage(String),

    #[error("Invalid pages.json: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ExtractionError + '_ {
    move |source| ExtractionError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    #[serde(default)]
    pages: Vec<SidecarPage>,
}

#[derive(Debug, Deserialize)]
struct SidecarPage {
    image: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    filters: Vec<String>,
}

/// Native `[width, height]` from a PNG header.
pub fn png_dimensions(bytes: &[u8]) -> Result<[u32; 2], String> {
    if bytes.len() < 24 {
        return Err("file is shorter than a PNG header".to_string());
    }
    if bytes[..8] != PNG_SIGNATURE {
        return Err("missing PNG signature".to_string());
    }
    if &bytes[12..16] != b"IHDR" {
        return Err("first chunk is not IHDR".to_string());
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    if width == 0 || height == 0 {
        return Err(format!("zero dimension {}x{}", width, height));
    }
    Ok([width, height])
}

fn read_header(path: &Path) -> Result<Vec<u8>, std::io::Error> {
    let mut header = Vec::with_capacity(24);
    fs::File::open(path)?.take(24).read_to_end(&mut header)?;
    Ok(header)
}

/// Last run of digits in the file stem: `slide_12.png` -> 12.
fn page_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.chars().rev().collect::<String>().parse().ok()
}

/// Drop emoji and other astral-plane characters.
pub fn clean_title(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| (*c as u32) < 0x10000).collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

const TYPE_KEYWORDS: &[(SlideType, &[&str])] = &[
    (SlideType::Trend, &["trend", "over time", "growth", "timeline", "history", "month", "week", "daily", "progression", "trajectory"]),
    (SlideType::Leaderboard, &["top", "leader", "ranking", "most active", "power users", "champion", "by user", "by department", "leaderboard"]),
    (SlideType::HealthCheck, &["health", "overview", "summary", "portfolio", "dashboard", "kpi", "metrics", "snapshot", "status"]),
    (SlideType::HabitFormation, &["frequency", "engagement", "tier", "habit", "usage pattern", "infrequent", "heavy", "light", "occasional", "weekly", "monthly", "distribution"]),
    (SlideType::LicensePriority, &["license", "premium", "unlicensed", "subscription", "upgrade", "priority", "high-value", "allocation", "assignment"]),
    (SlideType::Geographic, &["location", "geography", "region", "country", "city", "state", "territory", "by location"]),
];

/// Keyword score over title and labels; ties go to the earlier type.
pub fn classify(title: &str, labels: &[String]) -> SlideType {
    let text = format!("{} {}", title, labels.join(" ")).to_lowercase();
    let mut best = (SlideType::General, 0);
    for (slide_type, keywords) in TYPE_KEYWORDS {
        let score = keywords.iter().filter(|k| text.contains(*k)).count();
        if score > best.1 {
            best = (*slide_type, score);
        }
    }
    best.0
}

pub struct ManifestBuilder {
    work_dir: PathBuf,
}

impl ManifestBuilder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self { work_dir: work_dir.into() }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(MANIFEST_FILE)
    }

    /// Build the manifest, copy page images into the work directory and
    /// write the analysis request. Nothing is written until every page has
    /// been read and checked.
    pub fn prepare(&self, source: &Path) -> Result<SourceManifest, ExtractionError> {
        if !source.exists() {
            return Err(ExtractionError::NotFound(source.to_path_buf()));
        }
        if !source.is_dir() {
            return Err(ExtractionError::Unsupported {
                path: source.to_path_buf(),
                reason: "expected an export directory of PNG page images".to_string(),
            });
        }

        let sidecar = self.read_sidecar(source)?;
        let images = collect_images(source)?;
        if images.is_empty() {
            return Err(ExtractionError::Empty(source.to_path_buf()));
        }

        let known: BTreeSet<String> = images
            .values()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        for entry in &sidecar {
            if !known.contains(entry.0) {
                return Err(ExtractionError::UnknownSidecarImage(entry.0.clone()));
            }
        }

        let pages_dir = self.work_dir.join(PAGES_DIR);
        let mut pages = Vec::with_capacity(images.len());
        for (&index, path) in &images {
            let header = read_header(path).map_err(io_err(path))?;
            let image_size = png_dimensions(&header).map_err(|reason| ExtractionError::CorruptImage {
                page: index,
                path: path.clone(),
                reason,
            })?;

            let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let hints = sidecar.get(&file_name);
            let labels: Vec<String> = hints.map(|h| h.labels.clone()).unwrap_or_default();
            let title = hints
                .and_then(|h| h.title.clone())
                .or_else(|| labels.first().cloned())
                .map(|t| clean_title(&t))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled Slide".to_string());
            let slide_type = classify(&title, &labels);

            debug!(page = index, ?image_size, ?slide_type, "page extracted");
            pages.push((path.clone(), PageRecord {
                index,
                title_hint: title,
                image_ref: pages_dir.join(format!("slide_{}.png", index)),
                image_size,
                slide_type,
                extracted_labels: labels,
                active_filters: hints.map(|h| h.filters.iter().cloned().collect()).unwrap_or_default(),
            }));
        }

        let manifest = SourceManifest {
            run_id: Uuid::new_v4().to_string(),
            prepared_at: Utc::now(),
            source_file: source.to_path_buf(),
            total_slides: pages.len(),
            slides: pages.iter().map(|(_, p)| p.clone()).collect(),
        };

        fs::create_dir_all(&pages_dir).map_err(io_err(&pages_dir))?;
        for (src, page) in &pages {
            fs::copy(src, &page.image_ref).map_err(io_err(&page.image_ref))?;
        }
        let manifest_path = self.manifest_path();
        write_json_atomic(&manifest_path, &manifest).map_err(io_err(&manifest_path))?;

        info!(pages = manifest.total_slides, run_id = %manifest.run_id, path = %manifest_path.display(), "manifest written");
        Ok(manifest)
    }

    fn read_sidecar(&self, source: &Path) -> Result<BTreeMap<String, SidecarPage>, ExtractionError> {
        let path = source.join(SIDECAR_FILE);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        let sidecar: Sidecar = serde_json::from_str(&content)?;
        Ok(sidecar.pages.into_iter().map(|p| (p.image.clone(), p)).collect())
    }
}

/// PNG files keyed by page number. Files without a number follow, by name.
fn collect_images(source: &Path) -> Result<BTreeMap<u32, PathBuf>, ExtractionError> {
    let mut numbered: BTreeMap<u32, PathBuf> = BTreeMap::new();
    let mut unnumbered = vec![];
    for entry in fs::read_dir(source).map_err(io_err(source))? {
        let path = entry.map_err(io_err(source))?.path();
        let is_png = path
            .extension()
            .map_or(false, |e| e.eq_ignore_ascii_case("png"));
        if !path.is_file() || !is_png {
            continue;
        }
        match page_number(&path) {
            Some(n) if n > 0 => {
                if let Some(first) = numbered.get(&n) {
                    return Err(ExtractionError::DuplicatePage {
                        page: n,
                        first: first.clone(),
                        second: path,
                    });
                }
                numbered.insert(n, path);
            }
            _ => unnumbered.push(path),
        }
    }
    unnumbered.sort();
    let mut next = numbered.keys().next_back().copied().unwrap_or(0);
    for path in unnumbered {
        next = next
            .checked_add(1)
            .ok_or_else(|| ExtractionError::PageNumberOverflow(path.clone()))?;
        numbered.insert(next, path);
    }
    Ok(numbered)
}

/// Write to a temporary sibling, then rename into place.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

pub fn load_manifest(path: &Path) -> Result<SourceManifest, ExtractionError> {
    let content = fs::read_to_string(path).map_err(io_err(path))?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        assert_eq!(png_dimensions(&png_header(1600, 900)), Ok([1600, 900]));
        assert!(png_dimensions(b"GIF89a....................").is_err());
        assert!(png_dimensions(&png_header(0, 900)).is_err());
    }

    #[test]
    fn test_page_number_from_name() {
        assert_eq!(page_number(Path::new("slide_12.png")), Some(12));
        assert_eq!(page_number(Path::new("page-3-final.png")), Some(3));
        assert_eq!(page_number(Path::new("cover.png")), None);
    }

    #[test]
    fn test_clean_title_strips_emoji() {
        assert_eq!(clean_title("\u{1F4CA} Usage  Trends"), "Usage Trends");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("Usage over time", &[]), SlideType::Trend);
        assert_eq!(classify("Top users by department", &[]), SlideType::Leaderboard);
        assert_eq!(classify("Unlicensed upgrade candidates", &[]), SlideType::LicensePriority);
        assert_eq!(classify("Misc", &[]), SlideType::General);
    }

    #[test]
    fn test_prepare_orders_by_number_and_reads_sidecar() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(src.path().join("slide_10.png"), png_header(800, 1200)).unwrap();
        fs::write(src.path().join("slide_2.png"), png_header(1600, 900)).unwrap();
        fs::write(src.path().join("notes.txt"), "ignored").unwrap();
        fs::write(
            src.path().join(SIDECAR_FILE),
            r#"{"pages": [{"image": "slide_2.png", "title": "Weekly trend", "labels": ["Active users"], "filters": ["Region = EU"]}]}"#,
        ).unwrap();

        let manifest = ManifestBuilder::new(work.path()).prepare(src.path()).unwrap();
        let indices: Vec<u32> = manifest.slides.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![2, 10]);
        assert_eq!(manifest.slides[0].title_hint, "Weekly trend");
        assert_eq!(manifest.slides[0].slide_type, SlideType::Trend);
        assert!(manifest.slides[0].active_filters.contains("Region = EU"));
        assert_eq!(manifest.slides[1].image_size, [800, 1200]);
        assert_eq!(manifest.slides[1].title_hint, "Untitled Slide");
        assert!(manifest.slides[1].image_ref.exists());

        let reloaded = load_manifest(&work.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(reloaded.slides, manifest.slides);
    }

    #[test]
    fn test_prepare_rejects_corrupt_page_without_writing() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(src.path().join("slide_1.png"), png_header(1600, 900)).unwrap();
        fs::write(src.path().join("slide_2.png"), b"not an image at all, sorry").unwrap();

        let err = ManifestBuilder::new(work.path()).prepare(src.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::CorruptImage { page: 2, .. }));
        assert!(!work.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_unnumbered_page_after_max_number_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(format!("page_{}.png", u32::MAX)), b"").unwrap();
        fs::write(dir.path().join("cover.png"), b"").unwrap();
        let err = collect_images(dir.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::PageNumberOverflow(ref p) if p.ends_with("cover.png")));
    }

    #[test]
    fn test_prepare_rejects_files() {
        let src = tempfile::NamedTempFile::new().unwrap();
        let work = tempfile::tempdir().unwrap();
        let err = ManifestBuilder::new(work.path()).prepare(src.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Unsupported { .. }));
    }
}
