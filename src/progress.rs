//! Progress-callback trait for download events.
//!
//! Inject an [`Arc<dyn DownloadProgressCallback>`] via
//! [`crate::config::DownloadConfigBuilder::progress_callback`] to follow a
//! download while it runs. A big document can spend many minutes in the page
//! loader, so the events are mostly about that stage: which phase it is in
//! and how many page elements the viewer has attached so far.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal spinner, a channel or a job
//! record without the library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use scribd_fetch::{DownloadProgressCallback, DownloadConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PeakPages(AtomicUsize);
//!
//! impl DownloadProgressCallback for PeakPages {
//!     fn on_pages_observed(&self, observed: usize, _expected: Option<usize>) {
//!         self.0.fetch_max(observed, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = DownloadConfig::builder()
//!     .progress_callback(Arc::new(PeakPages(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// Coarse stages of one download, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    Metadata,
    Launching,
    Navigating,
    AwaitingViewer,
    Scrolling,
    ConfirmingRender,
    AggressiveRetry,
    Capturing,
    PostProcessing,
    Writing,
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStage::Metadata => "fetching metadata",
            DownloadStage::Launching => "launching browser",
            DownloadStage::Navigating => "opening viewer",
            DownloadStage::AwaitingViewer => "waiting for first page",
            DownloadStage::Scrolling => "scrolling",
            DownloadStage::ConfirmingRender => "confirming render",
            DownloadStage::AggressiveRetry => "retrying missing pages",
            DownloadStage::Capturing => "printing to PDF",
            DownloadStage::PostProcessing => "post-processing",
            DownloadStage::Writing => "writing file",
        };
        f.write_str(s)
    }
}

/// Called by the download pipeline as it moves through its stages.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait DownloadProgressCallback: Send + Sync {
    /// Called once the document id is resolved.
    ///
    /// # Arguments
    /// * `id`: numeric document id
    fn on_download_start(&self, id: &str) {
        let _ = id;
    }

    /// Called on every stage transition.
    fn on_stage(&self, stage: DownloadStage) {
        let _ = stage;
    }

    /// Called after each page-element count taken by the loader.
    ///
    /// # Arguments
    /// * `observed`: page elements currently attached
    /// * `expected`: declared page count, when known
    fn on_pages_observed(&self, observed: usize, expected: Option<usize>) {
        let _ = (observed, expected);
    }

    /// Called after the print step with the size of the raw capture.
    fn on_captured(&self, bytes: usize) {
        let _ = bytes;
    }

    /// Called once the file is on disk.
    ///
    /// # Arguments
    /// * `path`: final file path
    /// * `bytes`: final file size
    fn on_download_complete(&self, path: &std::path::Path, bytes: usize) {
        let _ = (path, bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl DownloadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DownloadConfig`].
pub type ProgressCallback = Arc<dyn DownloadProgressCallback>;
