//! Result types returned by a download.
//!
//! A download that reaches the file write always yields a
//! [`DownloadOutput`], even when it is degraded. Whether a partial document
//! is good enough is the caller's decision, made from [`LoadReport`] and
//! [`DownloadOutput::degradations`].

use crate::error::Degradation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the embed page declares about a document. A hint only: either field
/// may be missing, and the declared page count is sometimes wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub expected_page_count: Option<usize>,
}

/// Why the scroll phase of the loader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollExit {
    /// The declared page count was reached and held steady.
    TargetReachedStable,
    /// No declared count, and the page count stopped growing.
    NoGrowth,
    /// The attempt budget ran out first.
    BudgetExhausted,
    /// A browser error ended the phase early.
    Interrupted,
}

/// Outcome of the page loader for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub expected_pages: Option<usize>,
    pub loaded_pages: usize,
    pub scroll_exit: ScrollExit,
    pub scroll_attempts: usize,
    /// Page elements visited during render confirmation.
    pub pages_sampled: usize,
    pub aggressive_retry_ran: bool,
    pub aggressive_attempts: usize,
    /// Set when a browser error cut loading short.
    pub interrupted: Option<String>,
}

impl LoadReport {
    /// True when the declared count is known and was not reached.
    pub fn is_short(&self) -> bool {
        self.expected_pages
            .is_some_and(|expected| self.loaded_pages < expected)
    }
}

/// Statistics for one download.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Size of the PDF straight out of the print step.
    pub captured_bytes: usize,
    /// Size of the file on disk.
    pub final_bytes: usize,
    pub blank_pages_removed: usize,
    pub compressed: bool,
    pub metadata_duration_ms: u64,
    pub load_duration_ms: u64,
    pub capture_duration_ms: u64,
    pub postprocess_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything known about a finished download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutput {
    pub id: String,
    pub path: PathBuf,
    pub metadata: DocumentMetadata,
    pub load: LoadReport,
    pub stats: DownloadStats,
    pub degradations: Vec<Degradation>,
}

impl DownloadOutput {
    /// File name component of [`Self::path`], as served by the HTTP API.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Result of [`crate::inspect`]: the resolved target and its metadata, with
/// no browser involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub id: String,
    pub source_url: String,
    pub metadata: DocumentMetadata,
    /// File the download would be written to.
    pub output_path: PathBuf,
    pub degradations: Vec<Degradation>,
}
