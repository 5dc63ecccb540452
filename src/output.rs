//! Result types produced by a bundle run.

use crate::error::UrlError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlStatus {
    /// The renderer wrote a PDF.
    Rendered,
    /// The renderer failed; the batch carried on.
    Failed { error: UrlError },
    /// Never started because the run was cancelled first.
    Cancelled,
}

/// What happened to a single CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlResult {
    /// 1-based position in the URL list; merge order.
    pub index: usize,
    pub url: String,
    /// Where the renderer was told to write. In merged mode this is a scratch
    /// file that no longer exists once the run returns.
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub status: UrlStatus,
    /// Wall-clock time spent in the renderer.
    pub duration_ms: u64,
}

impl UrlResult {
    pub fn is_rendered(&self) -> bool {
        matches!(self.status, UrlStatus::Rendered)
    }

    pub fn error(&self) -> Option<&UrlError> {
        match &self.status {
            UrlStatus::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Counters and timings for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleStats {
    pub total_urls: usize,
    pub rendered: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub merge_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOutput {
    /// One entry per URL, sorted by index.
    pub results: Vec<UrlResult>,
    /// Path of the merged document (merged mode only).
    pub merged_pdf: Option<PathBuf>,
    /// Page count of the merged document, when it was re-assembled by the
    /// merger (`None` for a single copied input).
    pub merged_pages: Option<usize>,
    /// True when cancellation was requested during the run.
    pub cancelled: bool,
    pub stats: BundleStats,
}

impl BundleOutput {
    /// Output files of the URLs that rendered successfully (separate mode).
    pub fn rendered_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.results
            .iter()
            .filter(|r| r.is_rendered())
            .map(|r| &r.output_path)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UrlError> {
        self.results.iter().filter_map(UrlResult::error)
    }
}
