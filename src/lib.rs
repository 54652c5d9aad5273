//! # scribd-fetch
//!
//! Download Scribd documents as PDF by driving a headless Chromium through
//! the document viewer.
//!
//! ## Why drive a browser?
//!
//! The viewer attaches pages lazily as the reader scrolls, and renders each
//! page's images and text layer only once it is near the viewport. There is
//! no single request that returns the whole document. This crate scrolls the
//! viewer until every declared page is attached and rendered, strips the
//! viewer's toolbars and overlays, and prints what is left to an A4 PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL or id
//!  │
//!  ├─ 1. Input     extract the numeric id, build the embed URL
//!  ├─ 2. Metadata  declared title + page count (one GET, best-effort)
//!  ├─ 3. Browser   launch Chromium, open the embed view
//!  ├─ 4. Loader    scroll until all pages are attached and rendered
//!  ├─ 5. Capture   remove viewer chrome, print to PDF
//!  ├─ 6. Polish    drop blank pages, optionally compress (spawn_blocking)
//!  └─ 7. Output    atomic write to {output_dir}/{title}.pdf
//! ```
//!
//! Only a handful of failures are fatal (see [`ScribdError`]). Everything
//! else (a missing page count, a short load, a failed compression) is
//! recorded as a [`Degradation`] in the returned [`DownloadOutput`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribd_fetch::{download, DownloadConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DownloadConfig::builder()
//!         .output_dir("downloads")
//!         .compress(true)
//!         .build()?;
//!     let output = download("https://www.scribd.com/document/123456789/Title", &config).await?;
//!     println!("{}", output.path.display());
//!     eprintln!("pages: {} of {:?}",
//!         output.load.loaded_pages,
//!         output.load.expected_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `scribd-fetch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | off     | Enables [`server`] and the `scribd-fetch-server` binary (axum) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scribd-fetch = { version = "0.2", default-features = false }
//! ```
//!
//! ## External tools
//!
//! A Chromium or Chrome executable is required. It is found through
//! `CHROME_PATH`, then `PATH`, then the usual install locations. Ghostscript
//! is optional; with it, `--compress` re-distils the PDF and shrinks scanned
//! documents considerably, without it a lossless stream compression is used.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod download;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scripts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DownloadConfig, DownloadConfigBuilder, LoadPolicy, DEFAULT_USER_AGENT};
pub use download::{download, download_sync, download_to_dir, inspect};
pub use error::{Degradation, ScribdError};
pub use output::{
    DocumentMetadata, DownloadOutput, DownloadStats, Inspection, LoadReport, ScrollExit,
};
pub use pipeline::input::{resolve_target, sanitize_filename, DocumentTarget};
pub use progress::{DownloadProgressCallback, DownloadStage, NoopProgressCallback, ProgressCallback};
