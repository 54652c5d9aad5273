//! # tool-locate
//!
//! Find the external executables that `scribd-fetch` drives, so that users
//! do not have to pass paths around on every invocation:
//!
//! - **Chromium / Chrome**: the headless browser that renders the viewer and
//!   prints it to PDF.
//! - **Ghostscript**: the optional high-quality PDF compressor.
//!
//! ## How it works
//!
//! On the first call to [`locate`] for a given [`Tool`]:
//!
//! 1. Checks the tool's environment override (`CHROME_PATH`,
//!    `GHOSTSCRIPT_PATH`). If set and the file exists, it wins.
//! 2. Walks `PATH` for the platform's executable names (`gs`, `gswin64c.exe`,
//!    `chromium`, `google-chrome`, …).
//! 3. Checks well-known install locations and browser caches (Playwright's
//!    `ms-playwright` directory, macOS app bundles, `Program Files`).
//!
//! The answer is memoised per process; later calls never touch the disk.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tool_locate::{locate, Tool};
//!
//! let chrome = locate(Tool::Chromium).expect("install Chromium or set CHROME_PATH");
//! println!("browser at {}", chrome.display());
//!
//! if let Some(gs) = tool_locate::ghostscript() {
//!     println!("ghostscript at {}", gs.display());
//! }
//! ```

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Tools ────────────────────────────────────────────────────────────────────

/// An external executable the downloader knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Chromium, Chrome or Edge; anything speaking the DevTools protocol.
    Chromium,
    /// Ghostscript, used for `pdfwrite` re-compression.
    Ghostscript,
}

impl Tool {
    /// Environment variable that overrides discovery for this tool.
    pub fn env_var(self) -> &'static str {
        match self {
            Tool::Chromium => "CHROME_PATH",
            Tool::Ghostscript => "GHOSTSCRIPT_PATH",
        }
    }

    /// Executable names looked up on `PATH`, most specific first.
    pub fn executable_names(self) -> &'static [&'static str] {
        match (self, std::env::consts::OS) {
            (Tool::Chromium, "windows") => &["chrome.exe", "msedge.exe", "chromium.exe"],
            (Tool::Chromium, "macos") => &["chromium", "google-chrome", "chrome"],
            (Tool::Chromium, _) => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
                "chrome",
            ],
            (Tool::Ghostscript, "windows") => &["gswin64c.exe", "gswin32c.exe", "gs.exe"],
            (Tool::Ghostscript, _) => &["gs", "gswin64c.exe"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Chromium => f.write_str("Chromium"),
            Tool::Ghostscript => f.write_str("Ghostscript"),
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tool discovery.
#[derive(Error, Debug, Clone)]
pub enum LocateError {
    /// Nothing matched in the override, on `PATH`, or in the known locations.
    #[error("{tool} not found (searched {searched} locations).\nInstall it or set {env_var}=/path/to/executable")]
    NotFound {
        tool: Tool,
        env_var: &'static str,
        searched: usize,
    },
}

// ── Thread-safe memo ─────────────────────────────────────────────────────────

static CHROMIUM: OnceLock<Option<PathBuf>> = OnceLock::new();
static GHOSTSCRIPT: OnceLock<Option<PathBuf>> = OnceLock::new();

fn memo(tool: Tool) -> &'static OnceLock<Option<PathBuf>> {
    match tool {
        Tool::Chromium => &CHROMIUM,
        Tool::Ghostscript => &GHOSTSCRIPT,
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate `tool`, memoising the answer for the rest of the process.
pub fn locate(tool: Tool) -> Result<PathBuf, LocateError> {
    memo(tool)
        .get_or_init(|| discover(tool))
        .clone()
        .ok_or_else(|| LocateError::NotFound {
            tool,
            env_var: tool.env_var(),
            searched: candidate_count(tool),
        })
}

/// `true` when [`locate`] would succeed.
pub fn is_available(tool: Tool) -> bool {
    locate(tool).is_ok()
}

/// Convenience wrapper: the Ghostscript executable, if installed.
pub fn ghostscript() -> Option<PathBuf> {
    locate(Tool::Ghostscript).ok()
}

/// Convenience wrapper: the Chromium executable.
pub fn chromium() -> Result<PathBuf, LocateError> {
    locate(Tool::Chromium)
}

/// Search the directories of a `PATH`-style variable for any of `names`.
///
/// Exposed for callers that want to search a custom path list without
/// touching the process environment.
pub fn search_path_list(path_list: &OsStr, names: &[&str]) -> Option<PathBuf> {
    for dir in std::env::split_paths(path_list) {
        for name in names {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn discover(tool: Tool) -> Option<PathBuf> {
    // 1. Environment variable override.
    if let Some(p) = std::env::var_os(tool.env_var()).map(PathBuf::from) {
        if is_executable(&p) {
            return Some(p);
        }
        // Fall through: override set but unusable → keep searching.
        eprintln!(
            "tool-locate: {} '{}' is not an executable file; searching PATH …",
            tool.env_var(),
            p.display()
        );
    }

    // 2. PATH.
    if let Some(path_list) = std::env::var_os("PATH") {
        if let Some(found) = search_path_list(&path_list, tool.executable_names()) {
            return Some(found);
        }
    }

    // 3. Well-known locations.
    well_known_locations(tool)
        .into_iter()
        .find(|p| is_executable(p))
}

fn candidate_count(tool: Tool) -> usize {
    let path_dirs = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).count())
        .unwrap_or(0);
    1 + path_dirs * tool.executable_names().len() + well_known_locations(tool).len()
}

/// Fixed install locations plus browser caches under the user's home.
fn well_known_locations(tool: Tool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    match (tool, std::env::consts::OS) {
        (Tool::Chromium, "macos") => {
            out.push(PathBuf::from(
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ));
            out.push(PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"));
        }
        (Tool::Chromium, "windows") => {
            out.push(PathBuf::from(
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            ));
            out.push(PathBuf::from(
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ));
        }
        (Tool::Chromium, _) => {
            out.push(PathBuf::from("/usr/bin/chromium"));
            out.push(PathBuf::from("/snap/bin/chromium"));
        }
        (Tool::Ghostscript, "windows") => {
            out.push(PathBuf::from(r"C:\Program Files\gs\bin\gswin64c.exe"));
        }
        (Tool::Ghostscript, _) => {
            out.push(PathBuf::from("/usr/local/bin/gs"));
            out.push(PathBuf::from("/opt/homebrew/bin/gs"));
        }
    }

    if tool == Tool::Chromium {
        out.extend(playwright_chromium_builds());
    }
    out
}

/// Chromium builds downloaded by Playwright, newest revision first.
///
/// Default cache roots:
/// - **Linux**: `~/.cache/ms-playwright/`
/// - **macOS**: `~/Library/Caches/ms-playwright/`
/// - **Windows**: `%LOCALAPPDATA%\ms-playwright\`
fn playwright_chromium_builds() -> Vec<PathBuf> {
    let Some(root) = dirs::cache_dir().map(|c| c.join("ms-playwright")) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };

    let mut revisions: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(OsStr::to_str)
                .is_some_and(|n| n.starts_with("chromium-"))
        })
        .collect();
    revisions.sort();
    revisions.reverse();

    let relative = match std::env::consts::OS {
        "macos" => "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
        "windows" => r"chrome-win\chrome.exe",
        _ => "chrome-linux/chrome",
    };
    revisions.into_iter().map(|r| r.join(relative)).collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
