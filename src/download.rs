//! Download entry points: the orchestrator that runs every pipeline stage.
//!
//! ## Stage order
//!
//! resolve → metadata probe → launch → navigate → load → capture → close →
//! post-process → atomic write.
//!
//! The browser is closed on every path out of the browsing stages, success
//! or error. Post-processing runs after the browser is gone, so a slow
//! Ghostscript run does not keep a Chromium process alive.

use crate::config::DownloadConfig;
use crate::error::{Degradation, ScribdError};
use crate::output::{DocumentMetadata, DownloadOutput, DownloadStats, Inspection, LoadReport};
use crate::pipeline::browser::ChromiumSession;
use crate::pipeline::capture::{self, CaptureTiming, CleanupReport};
use crate::pipeline::input::{self, DocumentTarget};
use crate::pipeline::viewer::{ViewerSession, WaitUntil};
use crate::pipeline::{loader, metadata, postprocess};
use crate::progress::{DownloadStage, ProgressCallback};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Download a document as PDF into `config.output_dir`.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`: document URL or bare numeric id
/// * `config`: download configuration
///
/// # Returns
/// `Ok(DownloadOutput)` whenever a PDF was written, even a partial one.
/// Check [`DownloadOutput::degradations`] and [`DownloadOutput::load`].
///
/// # Errors
/// Returns `Err(ScribdError)` only for fatal errors:
/// - the input is not a URL or id
/// - no browser could be found or started
/// - the viewer never showed a single page
/// - printing produced no PDF
/// - the output file could not be written
pub async fn download(
    input: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<DownloadOutput, ScribdError> {
    let total_start = Instant::now();
    let input = input.as_ref();
    info!("Starting download: {}", input);
    let progress = config.progress_callback.as_ref();

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let target = input::resolve_target(input)?;
    info!("Document id: {}", target.id);
    if let Some(cb) = progress {
        cb.on_download_start(&target.id);
    }

    // ── Step 2: Metadata probe ───────────────────────────────────────────
    stage(progress, DownloadStage::Metadata);
    let metadata_start = Instant::now();
    let (metadata, probe_failure) = metadata::probe_metadata(
        &target.source_url,
        &config.user_agent,
        Duration::from_secs(config.metadata_timeout_secs),
    )
    .await;
    let metadata_duration_ms = metadata_start.elapsed().as_millis() as u64;
    let mut degradations: Vec<Degradation> = probe_failure.into_iter().collect();

    let title = metadata
        .title
        .clone()
        .unwrap_or_else(|| target.default_title());
    let path = input::output_path(&config.output_dir, &title);
    info!(
        title = %title,
        expected_pages = ?metadata.expected_page_count,
        "Output will be written to {}",
        path.display()
    );

    // ── Step 3: Browse (launch, navigate, load, capture) ─────────────────
    stage(progress, DownloadStage::Launching);
    let session = ChromiumSession::launch(config).await?;
    let browsed = browse(&session, &target, &metadata, config).await;
    session.close().await;
    let browsed = browsed?;

    degradations.extend(load_degradations(&browsed.load));
    degradations.extend(browsed.cleanup.degradations());
    let captured_bytes = browsed.pdf.len();

    // ── Step 4: Post-process ─────────────────────────────────────────────
    stage(progress, DownloadStage::PostProcessing);
    let post_start = Instant::now();
    let (clean, compress) = (config.clean, config.compress);
    let post = tokio::task::spawn_blocking(move || post_process(browsed.pdf, clean, compress))
        .await
        .map_err(|e| ScribdError::Internal(format!("post-processing task failed: {e}")))?;
    let postprocess_duration_ms = post_start.elapsed().as_millis() as u64;
    degradations.extend(post.degradations);

    // ── Step 5: Atomic write ─────────────────────────────────────────────
    stage(progress, DownloadStage::Writing);
    write_atomic(&path, &post.pdf).await?;
    info!("Saved {} ({} bytes)", path.display(), post.pdf.len());

    let stats = DownloadStats {
        captured_bytes,
        final_bytes: post.pdf.len(),
        blank_pages_removed: post.removed,
        compressed: post.compressed,
        metadata_duration_ms,
        load_duration_ms: browsed.load_duration_ms,
        capture_duration_ms: browsed.capture_duration_ms,
        postprocess_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    if !degradations.is_empty() {
        warn!("Download finished with {} degradation(s)", degradations.len());
        for d in &degradations {
            debug!("Degradation: {}", d);
        }
    }
    info!(
        "Download complete: {}/{} pages, {}ms total",
        browsed.load.loaded_pages,
        browsed
            .load
            .expected_pages
            .map_or_else(|| "?".to_string(), |n| n.to_string()),
        stats.total_duration_ms
    );
    if let Some(cb) = progress {
        cb.on_download_complete(&path, stats.final_bytes);
    }

    Ok(DownloadOutput {
        id: target.id,
        path,
        metadata,
        load: browsed.load,
        stats,
        degradations,
    })
}

/// Download into `output_dir` instead of `config.output_dir`.
pub async fn download_to_dir(
    input: impl AsRef<str>,
    output_dir: impl AsRef<Path>,
    config: &DownloadConfig,
) -> Result<DownloadOutput, ScribdError> {
    let mut config = config.clone();
    config.output_dir = output_dir.as_ref().to_path_buf();
    download(input, &config).await
}

/// Synchronous wrapper around [`download`].
///
/// Creates a temporary tokio runtime internally.
pub fn download_sync(
    input: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<DownloadOutput, ScribdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScribdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(download(input, config))
}

/// Resolve the input and probe its metadata without starting a browser.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &DownloadConfig,
) -> Result<Inspection, ScribdError> {
    let target = input::resolve_target(input.as_ref())?;
    let (metadata, probe_failure) = metadata::probe_metadata(
        &target.source_url,
        &config.user_agent,
        Duration::from_secs(config.metadata_timeout_secs),
    )
    .await;
    let title = metadata
        .title
        .clone()
        .unwrap_or_else(|| target.default_title());
    Ok(Inspection {
        output_path: input::output_path(&config.output_dir, &title),
        id: target.id,
        source_url: target.source_url,
        metadata,
        degradations: probe_failure.into_iter().collect(),
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct Browsed {
    load: LoadReport,
    pdf: Vec<u8>,
    cleanup: CleanupReport,
    load_duration_ms: u64,
    capture_duration_ms: u64,
}

async fn browse<S: ViewerSession>(
    session: &S,
    target: &DocumentTarget,
    metadata: &DocumentMetadata,
    config: &DownloadConfig,
) -> Result<Browsed, ScribdError> {
    let progress = config.progress_callback.as_ref();

    stage(progress, DownloadStage::Navigating);
    info!("Navigating to {}", target.source_url);
    session
        .navigate(
            &target.source_url,
            WaitUntil::NetworkIdle,
            Duration::from_secs(config.navigation_timeout_secs),
        )
        .await?;
    session
        .pause(Duration::from_millis(config.initial_settle_ms))
        .await;

    let load_start = Instant::now();
    let load = loader::load_all_pages(
        session,
        metadata.expected_page_count,
        &config.load_policy,
        progress,
    )
    .await?;
    let load_duration_ms = load_start.elapsed().as_millis() as u64;

    stage(progress, DownloadStage::Capturing);
    let capture_start = Instant::now();
    let capture = capture::capture_pdf(session, &CaptureTiming::default()).await?;
    let capture_duration_ms = capture_start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_captured(capture.pdf.len());
    }

    Ok(Browsed {
        load,
        pdf: capture.pdf,
        cleanup: capture.cleanup,
        load_duration_ms,
        capture_duration_ms,
    })
}

fn stage(progress: Option<&ProgressCallback>, stage: DownloadStage) {
    debug!("Stage: {}", stage);
    if let Some(cb) = progress {
        cb.on_stage(stage);
    }
}

/// Soft failures recorded by the loader.
fn load_degradations(load: &LoadReport) -> Vec<Degradation> {
    let mut out = Vec::new();
    if let Some(reason) = &load.interrupted {
        out.push(Degradation::LoadInterrupted {
            loaded: load.loaded_pages,
            reason: reason.clone(),
        });
    }
    if let (Some(expected), true) = (load.expected_pages, load.is_short()) {
        out.push(Degradation::PageLoadShortfall {
            expected,
            loaded: load.loaded_pages,
        });
    }
    out
}

struct PostProcessed {
    pdf: Vec<u8>,
    removed: usize,
    compressed: bool,
    degradations: Vec<Degradation>,
}

/// Blank-page removal, then compression, each only when enabled.
fn post_process(pdf: Vec<u8>, clean: bool, compress: bool) -> PostProcessed {
    let mut out = PostProcessed {
        pdf,
        removed: 0,
        compressed: false,
        degradations: Vec::new(),
    };

    if clean {
        let cleaned = postprocess::remove_blank_pages(out.pdf);
        out.pdf = cleaned.pdf;
        out.removed = cleaned.removed;
        out.degradations.extend(cleaned.failure);
    }

    if compress {
        let compressor = postprocess::default_compressor();
        let compressed = postprocess::compress_with(out.pdf, compressor.as_ref());
        out.pdf = compressed.pdf;
        out.compressed = compressed.applied;
        out.degradations.extend(compressed.failure);
    }

    out
}

/// Write `bytes` to `path` via a uniquely named temp file in the same
/// directory and a rename, creating the parent directory first. A failed
/// write never leaves a partial file at `path`, and concurrent writers of the
/// same path never share a temp file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScribdError> {
    let fail = |source: std::io::Error| ScribdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await.map_err(fail)?;

    let target = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;
        // Dropping an unpersisted temp file deletes it.
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| fail(std::io::Error::other(format!("write task failed: {e}"))))?
    .map_err(fail)
}
