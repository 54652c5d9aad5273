//! CLI binary for scribd-fetch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DownloadConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scribd_fetch::{
    download, inspect, Degradation, DownloadConfig, DownloadOutput, DownloadProgressCallback,
    DownloadStage, ProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the stage is all we know, switching to
/// a page bar once the loader reports counts against a declared total.
struct CliProgressCallback {
    bar: ProgressBar,
    bar_active: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            bar_active: AtomicBool::new(false),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
    }
}

impl DownloadProgressCallback for CliProgressCallback {
    fn on_download_start(&self, id: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Downloading document {id}"))
        ));
    }

    fn on_stage(&self, stage: DownloadStage) {
        let prefix = match stage {
            DownloadStage::Metadata
            | DownloadStage::Launching
            | DownloadStage::Navigating
            | DownloadStage::AwaitingViewer => "Preparing",
            DownloadStage::Scrolling
            | DownloadStage::ConfirmingRender
            | DownloadStage::AggressiveRetry => "Loading",
            DownloadStage::Capturing => "Capturing",
            DownloadStage::PostProcessing | DownloadStage::Writing => "Finishing",
        };
        // Leaving the loader: back to a plain spinner.
        if matches!(stage, DownloadStage::Capturing) && self.bar_active.swap(false, Ordering::SeqCst)
        {
            self.bar.set_style(Self::spinner_style());
        }
        self.bar.set_prefix(prefix);
        self.bar.set_message(stage.to_string());
    }

    fn on_pages_observed(&self, observed: usize, expected: Option<usize>) {
        match expected {
            Some(total) => {
                if !self.bar_active.swap(true, Ordering::SeqCst) {
                    self.activate_bar(total);
                }
                self.bar.set_position(observed.min(total) as u64);
            }
            None => self.bar.set_message(format!("{observed} pages attached")),
        }
    }

    fn on_captured(&self, bytes: usize) {
        self.bar.println(format!(
            "  {} Printed {}",
            green("✓"),
            dim(&human_bytes(bytes))
        ));
    }

    fn on_download_complete(&self, _path: &Path, _bytes: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download by URL into ./downloads
  scribd-fetch https://www.scribd.com/document/123456789/Some-Title

  # Download by id, compressed, into another directory
  scribd-fetch 123456789 --compress -o ~/papers

  # Keep blank pages
  scribd-fetch 123456789 --no-clean

  # Show title and page count only (no browser needed)
  scribd-fetch --inspect-only 123456789

  # Machine-readable result
  scribd-fetch --json 123456789 > result.json

ENVIRONMENT VARIABLES:
  CHROME_PATH              Chromium/Chrome executable (else PATH, then install dirs)
  GHOSTSCRIPT_PATH         Ghostscript executable used by --compress
  SCRIBD_FETCH_*           Every flag, e.g. SCRIBD_FETCH_OUTPUT_DIR=/tmp/out
  RUST_LOG                 Overrides the log filter (e.g. scribd_fetch=debug)

NOTES:
  Only publicly viewable documents can be downloaded.
  Long documents take a while: the viewer only loads pages as they scroll
  into view, and each page is visited at least once.
"#;

/// Download Scribd documents as PDF through a headless browser.
#[derive(Parser, Debug)]
#[command(
    name = "scribd-fetch",
    version,
    about = "Download Scribd documents as PDF through a headless browser",
    long_about = "Download a Scribd document as PDF. The document's viewer is opened in a \
headless Chromium and scrolled until every page is loaded; the viewer's toolbars are \
removed and the page is printed to A4. Blank pages are removed and the file can \
optionally be compressed with Ghostscript.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document URL or numeric document id.
    url_or_id: String,

    /// Compress the PDF (Ghostscript when available, lossless otherwise).
    #[arg(long, env = "SCRIBD_FETCH_COMPRESS")]
    compress: bool,

    /// Keep blank pages.
    #[arg(long, env = "SCRIBD_FETCH_NO_CLEAN")]
    no_clean: bool,

    /// Directory the PDF is written to.
    #[arg(short, long = "output-dir", env = "SCRIBD_FETCH_OUTPUT_DIR", default_value = "downloads")]
    output_dir: PathBuf,

    /// Chromium/Chrome executable to use.
    #[arg(long, env = "SCRIBD_FETCH_CHROME")]
    chrome: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long, env = "SCRIBD_FETCH_HEADED")]
    headed: bool,

    /// Seconds to wait for the first page of the viewer.
    #[arg(long, env = "SCRIBD_FETCH_VIEWER_TIMEOUT", default_value_t = 120)]
    viewer_timeout: u64,

    /// Seconds allowed for the metadata request.
    #[arg(long, env = "SCRIBD_FETCH_METADATA_TIMEOUT", default_value_t = 30)]
    metadata_timeout: u64,

    /// Print title and page count only, no download.
    #[arg(long)]
    inspect_only: bool,

    /// Output structured JSON (DownloadOutput) on stdout.
    #[arg(long, env = "SCRIBD_FETCH_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "SCRIBD_FETCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIBD_FETCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCRIBD_FETCH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers progress, so library INFO logs are hidden while it
    // is shown. Verbose mode always gets everything.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let info = inspect(&cli.url_or_id, &config)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("Id:           {}", info.id);
            println!("Viewer:       {}", info.source_url);
            println!(
                "Title:        {}",
                info.metadata.title.as_deref().unwrap_or("(unknown)")
            );
            match info.metadata.expected_page_count {
                Some(n) => println!("Pages:        {}", n),
                None => println!("Pages:        (unknown)"),
            }
            println!("Output:       {}", info.output_path.display());
            for d in &info.degradations {
                eprintln!("{} {}", yellow("⚠"), d);
            }
        }
        return Ok(());
    }

    // ── Run download ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DownloadProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let output = download(&cli.url_or_id, &config)
        .await
        .context("Download failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }

    Ok(())
}

/// Map CLI args to `DownloadConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DownloadConfig> {
    let mut builder = DownloadConfig::builder()
        .output_dir(&cli.output_dir)
        .compress(cli.compress)
        .clean(!cli.no_clean)
        .headless(!cli.headed)
        .viewer_timeout_secs(cli.viewer_timeout)
        .metadata_timeout_secs(cli.metadata_timeout);

    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(output: &DownloadOutput) {
    let load = &output.load;
    let pages = match load.expected_pages {
        Some(expected) => format!("{}/{} pages", load.loaded_pages, expected),
        None => format!("{} pages", load.loaded_pages),
    };
    let mark = if output.degradations.is_empty() {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {}  {:.1}s  →  {}",
        mark,
        pages,
        output.stats.total_duration_ms as f64 / 1000.0,
        bold(&output.path.display().to_string()),
    );

    let mut details = vec![human_bytes(output.stats.final_bytes)];
    if output.stats.blank_pages_removed > 0 {
        details.push(format!(
            "{} blank page(s) removed",
            output.stats.blank_pages_removed
        ));
    }
    if output.stats.compressed {
        details.push(format!(
            "compressed from {}",
            human_bytes(output.stats.captured_bytes)
        ));
    }
    eprintln!("   {}", dim(&details.join("  ·  ")));

    for d in &output.degradations {
        let line = match d {
            Degradation::PageLoadShortfall { .. } => {
                format!("{d} (the viewer may not have served every page)")
            }
            other => other.to_string(),
        };
        eprintln!("   {} {}", yellow("⚠"), line);
    }
}

fn human_bytes(n: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
