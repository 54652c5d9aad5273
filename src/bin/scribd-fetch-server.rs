//! HTTP server binary for scribd-fetch.
//!
//! Serves [`scribd_fetch::server::router`] on the configured address.

use anyhow::{Context, Result};
use clap::Parser;
use scribd_fetch::server::{router, AppState};
use scribd_fetch::DownloadConfig;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve document downloads over HTTP.
#[derive(Parser, Debug)]
#[command(name = "scribd-fetch-server", version, about = "Serve document downloads over HTTP")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "SCRIBD_FETCH_BIND", default_value = "0.0.0.0:7860")]
    bind: SocketAddr,

    /// Directory downloads are written to and served from.
    #[arg(short, long = "output-dir", env = "SCRIBD_FETCH_OUTPUT_DIR", default_value = "downloads")]
    output_dir: PathBuf,

    /// Chromium/Chrome executable to use.
    #[arg(long, env = "SCRIBD_FETCH_CHROME")]
    chrome: Option<PathBuf>,

    /// Seconds to wait for the first page of the viewer.
    #[arg(long, env = "SCRIBD_FETCH_VIEWER_TIMEOUT", default_value_t = 120)]
    viewer_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIBD_FETCH_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    tokio::fs::create_dir_all(&cli.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", cli.output_dir.display()))?;

    let mut builder = DownloadConfig::builder()
        .output_dir(&cli.output_dir)
        .viewer_timeout_secs(cli.viewer_timeout);
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome);
    }
    let config = builder.build().context("Invalid configuration")?;

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!(
        "Listening on http://{} (files in {})",
        cli.bind,
        cli.output_dir.display()
    );

    axum::serve(listener, router(AppState::new(config)))
        .await
        .context("Server error")?;
    Ok(())
}
