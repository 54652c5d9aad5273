//! Error types for the scribd-fetch library.
//!
//! Two distinct types reflect two distinct failure modes:
//!
//! * [`ScribdError`]: **Fatal**, the download cannot produce a file at all
//!   (unresolvable id, no browser, the viewer never showed a page, the print
//!   returned nothing, the output could not be written). Returned as
//!   `Err(ScribdError)` from the top-level `download*` functions.
//!
//! * [`Degradation`]: **Non-fatal**, something went worse than hoped
//!   (metadata missing, fewer pages loaded than declared, a post-processing
//!   stage failed and was skipped) but a usable file was still written.
//!   Collected in [`crate::output::DownloadOutput::degradations`] so callers
//!   can decide whether a partial document is acceptable.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the scribd-fetch library.
///
/// Soft failures use [`Degradation`] and are stored in the output rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum ScribdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input is neither a recognised document URL nor a numeric id.
    #[error("Invalid URL or ID: '{input}'\nExpected e.g. https://www.scribd.com/document/123456789/Title or 123456789")]
    InvalidInput { input: String },

    // ── Browser errors ────────────────────────────────────────────────────
    /// No Chromium executable could be found.
    #[error("No Chromium/Chrome executable available: {0}")]
    BrowserUnavailable(String),

    /// The browser process started but the DevTools connection failed.
    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    /// Navigation to the viewer failed outright (DNS, TLS, crash).
    #[error("Failed to open '{url}': {reason}")]
    NavigationFailed { url: String, reason: String },

    /// Not a single page element appeared within the first viewer timeout.
    #[error("Viewer did not load: no element matching '{selector}' after {}s", .waited.as_secs())]
    ViewerLoadTimeout { selector: String, waited: Duration },

    /// A DevTools call on an open page failed (script error, closed target).
    #[error("Browser session error: {0}")]
    Session(String),

    /// The print step produced no usable PDF.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem recorded while producing the document.
///
/// The pipeline always continues past these; they exist so the caller can
/// see what was degraded without having to scrape logs.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum Degradation {
    /// The embed page could not be fetched, or carried neither field.
    #[error("Metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    /// Loading stopped short of the declared page count.
    #[error("Loaded {loaded} of {expected} expected pages")]
    PageLoadShortfall { expected: usize, loaded: usize },

    /// Loading was cut off by a browser error; capture went ahead anyway.
    #[error("Page loading interrupted after {loaded} pages: {reason}")]
    LoadInterrupted { loaded: usize, reason: String },

    /// One chrome-removal script failed; the rest of the batch still ran.
    #[error("Cleanup step '{step}' failed: {detail}")]
    CleanupStepFailed { step: String, detail: String },

    /// A post-processing stage failed; its input was passed through unchanged.
    #[error("Post-processing stage '{stage}' skipped: {detail}")]
    PostProcessFailed { stage: String, detail: String },
}
