//! Configuration types for a document download.
//!
//! All download behaviour is controlled through [`DownloadConfig`], built via
//! its [`DownloadConfigBuilder`]. The scroll/retry budgets of the page loader
//! live in their own [`LoadPolicy`] so a caller can tune how hard the loader
//! works without touching output or browser settings.
//!
//! # Design choice: builder over constructor
//! Most callers only change the output directory and the compress/clean
//! switches. The builder lets them set those and rely on the documented
//! defaults for everything else.

use crate::error::ScribdError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// User-Agent presented by both the metadata probe and the browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Configuration for a single document download.
///
/// Built via [`DownloadConfig::builder()`] or using
/// [`DownloadConfig::default()`].
///
/// # Example
/// ```rust
/// use scribd_fetch::DownloadConfig;
///
/// let config = DownloadConfig::builder()
///     .output_dir("out")
///     .compress(true)
///     .build()
///     .unwrap();
/// assert!(config.clean);
/// ```
#[derive(Clone)]
pub struct DownloadConfig {
    /// Directory the finished PDF is written to. Created on demand. Default: `downloads`.
    pub output_dir: PathBuf,

    /// Run the compression stage after capture. Default: false.
    pub compress: bool,

    /// Run blank-page removal after capture. Default: true.
    pub clean: bool,

    /// Explicit Chromium executable. When `None` the tool locator searches
    /// `CHROME_PATH`, then `PATH`, then well-known install locations.
    pub chrome_executable: Option<PathBuf>,

    /// Run the browser without a visible window. Default: true.
    pub headless: bool,

    /// User-Agent for the probe and the browser page.
    pub user_agent: String,

    /// Timeout for the single metadata GET, in seconds. Default: 30.
    pub metadata_timeout_secs: u64,

    /// Timeout for the initial navigation to the viewer, in seconds. Default: 120.
    ///
    /// Covers the `load` event and the network-idle wait after it. Missing
    /// the `load` event is fatal; a network that never goes quiet is not.
    pub navigation_timeout_secs: u64,

    /// Settle time after navigation before the loader starts, in milliseconds. Default: 5000.
    pub initial_settle_ms: u64,

    /// Budgets and waits for the page loader.
    pub load_policy: LoadPolicy,

    /// Optional observer for stage transitions and page counts.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("downloads"),
            compress: false,
            clean: true,
            chrome_executable: None,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            metadata_timeout_secs: 30,
            navigation_timeout_secs: 120,
            initial_settle_ms: 5_000,
            load_policy: LoadPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("output_dir", &self.output_dir)
            .field("compress", &self.compress)
            .field("clean", &self.clean)
            .field("chrome_executable", &self.chrome_executable)
            .field("headless", &self.headless)
            .field("metadata_timeout_secs", &self.metadata_timeout_secs)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("load_policy", &self.load_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DownloadProgressCallback>"),
            )
            .finish()
    }
}

impl DownloadConfig {
    /// Create a new builder for `DownloadConfig`.
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DownloadConfig`].
#[derive(Debug)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn compress(mut self, v: bool) -> Self {
        self.config.compress = v;
        self
    }

    pub fn clean(mut self, v: bool) -> Self {
        self.config.clean = v;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn metadata_timeout_secs(mut self, secs: u64) -> Self {
        self.config.metadata_timeout_secs = secs;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn initial_settle_ms(mut self, ms: u64) -> Self {
        self.config.initial_settle_ms = ms;
        self
    }

    /// Shorthand for overriding only the first-page viewer timeout.
    pub fn viewer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_policy.viewer_timeout = Duration::from_secs(secs);
        self
    }

    pub fn load_policy(mut self, policy: LoadPolicy) -> Self {
        self.config.load_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DownloadConfig, ScribdError> {
        let c = &self.config;
        if c.output_dir.as_os_str().is_empty() {
            return Err(ScribdError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        if c.user_agent.trim().is_empty() {
            return Err(ScribdError::InvalidConfig(
                "User-Agent must not be empty".into(),
            ));
        }
        if c.metadata_timeout_secs == 0 {
            return Err(ScribdError::InvalidConfig(
                "Metadata timeout must be ≥ 1 second".into(),
            ));
        }
        if c.navigation_timeout_secs == 0 {
            return Err(ScribdError::InvalidConfig(
                "Navigation timeout must be ≥ 1 second".into(),
            ));
        }
        c.load_policy.validate()?;
        Ok(self.config)
    }
}

// ── Load policy ──────────────────────────────────────────────────────────

/// Budgets, thresholds and waits that drive the page loader.
///
/// The defaults were tuned against the live viewer: long documents need
/// hundreds of scroll passes before every page element is attached, and the
/// viewer rate-limits page fetches, hence the generous pauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPolicy {
    /// Selector matching one page element of the viewer.
    pub page_selector: String,
    /// First-element wait. The only wait whose timeout is fatal. Default: 120 s.
    pub viewer_timeout: Duration,

    /// Scroll-phase attempt budget when the page count is known. Default: 500.
    pub max_attempts_with_target: usize,
    /// Scroll-phase attempt budget when the page count is unknown. Default: 300.
    pub max_attempts_without_target: usize,
    /// Consecutive unchanged polls at or above the target needed to stop. Default: 10.
    pub stable_threshold: usize,
    /// Consecutive unchanged polls needed to stop without a target. Default: 30.
    pub no_change_threshold: usize,
    /// Scroll advance as a multiple of the viewport height. Default: 1.5.
    pub scroll_step_factor: f64,
    /// Wait after each scroll step. Default: 3 s.
    pub scroll_step_wait: Duration,
    /// Hard cap on steps in one top-to-bottom walk. Default: 2000.
    pub max_walk_steps: usize,
    /// Wait after the bottom-of-page events fire. Default: 3 s.
    pub bottom_wait: Duration,
    /// Network quiescence bound in the scroll phase. Default: 15 s.
    pub network_idle_timeout: Duration,
    /// Every this many attempts, pause for `periodic_pause`. Default: 10.
    pub periodic_pause_every: usize,
    /// Extra pause inserted every `periodic_pause_every` attempts. Default: 5 s.
    pub periodic_pause: Duration,

    /// Wait for a page's text layer during render confirmation. Default: 3 s.
    pub text_layer_timeout: Duration,
    /// Wait for a page's canvas/img during render confirmation. Default: 3 s.
    pub content_timeout: Duration,
    /// Per-page pause for documents up to `render_pause_threshold` pages. Default: 300 ms.
    pub render_pause: Duration,
    /// Per-page pause for larger documents. Default: 200 ms.
    pub render_pause_large: Duration,
    /// Page count above which `render_pause_large` applies. Default: 500.
    pub render_pause_threshold: usize,
    /// Log render confirmation progress every this many pages. Default: 50.
    pub render_log_every: usize,

    /// Attempt budget for the aggressive retry phase. Default: 100.
    pub aggressive_max_attempts: usize,
    /// Scroll step wait inside the aggressive phase; never shorter than
    /// `scroll_step_wait`. Default: 5 s.
    pub aggressive_step_wait: Duration,
    /// Network quiescence bound inside the aggressive phase. Default: 20 s.
    pub aggressive_network_idle_timeout: Duration,
    /// Pause between aggressive attempts. Default: 3 s.
    pub aggressive_pause: Duration,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            page_selector: "[class*='page']".to_string(),
            viewer_timeout: Duration::from_secs(120),
            max_attempts_with_target: 500,
            max_attempts_without_target: 300,
            stable_threshold: 10,
            no_change_threshold: 30,
            scroll_step_factor: 1.5,
            scroll_step_wait: Duration::from_secs(3),
            max_walk_steps: 2_000,
            bottom_wait: Duration::from_secs(3),
            network_idle_timeout: Duration::from_secs(15),
            periodic_pause_every: 10,
            periodic_pause: Duration::from_secs(5),
            text_layer_timeout: Duration::from_secs(3),
            content_timeout: Duration::from_secs(3),
            render_pause: Duration::from_millis(300),
            render_pause_large: Duration::from_millis(200),
            render_pause_threshold: 500,
            render_log_every: 50,
            aggressive_max_attempts: 100,
            aggressive_step_wait: Duration::from_secs(5),
            aggressive_network_idle_timeout: Duration::from_secs(20),
            aggressive_pause: Duration::from_secs(3),
        }
    }
}

impl LoadPolicy {
    /// Scroll-phase attempt budget for the given target.
    pub fn max_attempts(&self, expected: Option<usize>) -> usize {
        if expected.is_some() {
            self.max_attempts_with_target
        } else {
            self.max_attempts_without_target
        }
    }

    /// Sampling stride for render confirmation: every page of a short
    /// document, every tenth page of a very long one.
    pub fn sample_stride(page_count: usize) -> usize {
        match page_count {
            0..=99 => 1,
            100..=499 => 2,
            500..=999 => 5,
            _ => 10,
        }
    }

    /// Per-page pause during render confirmation.
    pub fn render_pause_for(&self, page_count: usize) -> Duration {
        if page_count > self.render_pause_threshold {
            self.render_pause_large
        } else {
            self.render_pause
        }
    }

    fn validate(&self) -> Result<(), ScribdError> {
        if self.page_selector.trim().is_empty() {
            return Err(ScribdError::InvalidConfig(
                "Page selector must not be empty".into(),
            ));
        }
        if self.max_attempts_with_target == 0 || self.max_attempts_without_target == 0 {
            return Err(ScribdError::InvalidConfig(
                "Scroll attempt budgets must be ≥ 1".into(),
            ));
        }
        if self.stable_threshold == 0 || self.no_change_threshold == 0 {
            return Err(ScribdError::InvalidConfig(
                "Stability thresholds must be ≥ 1".into(),
            ));
        }
        if !(self.scroll_step_factor.is_finite() && self.scroll_step_factor > 0.0) {
            return Err(ScribdError::InvalidConfig(format!(
                "Scroll step factor must be a positive number, got {}",
                self.scroll_step_factor
            )));
        }
        if self.max_walk_steps == 0 {
            return Err(ScribdError::InvalidConfig(
                "Walk step cap must be ≥ 1".into(),
            ));
        }
        if self.aggressive_step_wait < self.scroll_step_wait {
            return Err(ScribdError::InvalidConfig(format!(
                "Aggressive step wait ({:?}) must not be shorter than the scroll step wait ({:?})",
                self.aggressive_step_wait, self.scroll_step_wait
            )));
        }
        if self.periodic_pause_every == 0 || self.render_log_every == 0 {
            return Err(ScribdError::InvalidConfig(
                "Pause and log intervals must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = DownloadConfig::default();
        assert_eq!(c.output_dir, PathBuf::from("downloads"));
        assert!(c.clean);
        assert!(!c.compress);
        assert_eq!(c.load_policy.viewer_timeout, Duration::from_secs(120));
        assert_eq!(c.load_policy.max_attempts(Some(10)), 500);
        assert_eq!(c.load_policy.max_attempts(None), 300);
        assert_eq!(c.load_policy.scroll_step_wait, Duration::from_secs(3));
        assert_eq!(c.load_policy.aggressive_step_wait, Duration::from_secs(5));
        assert!(c.load_policy.aggressive_step_wait > c.load_policy.scroll_step_wait);
    }

    #[test]
    fn aggressive_wait_shorter_than_scroll_wait_rejected() {
        let policy = LoadPolicy {
            scroll_step_wait: Duration::from_secs(4),
            aggressive_step_wait: Duration::from_secs(2),
            ..LoadPolicy::default()
        };
        let err = DownloadConfig::builder()
            .load_policy(policy)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Aggressive step wait"));
    }

    #[test]
    fn builder_sets_fields() {
        let c = DownloadConfig::builder()
            .output_dir("/tmp/out")
            .compress(true)
            .clean(false)
            .viewer_timeout_secs(30)
            .build()
            .unwrap();
        assert_eq!(c.output_dir, PathBuf::from("/tmp/out"));
        assert!(c.compress);
        assert!(!c.clean);
        assert_eq!(c.load_policy.viewer_timeout, Duration::from_secs(30));
    }

    #[test]
    fn empty_output_dir_rejected() {
        let err = DownloadConfig::builder().output_dir("").build().unwrap_err();
        assert!(matches!(err, ScribdError::InvalidConfig(_)));
    }

    #[test]
    fn zero_metadata_timeout_rejected() {
        let err = DownloadConfig::builder()
            .metadata_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Metadata timeout"));
    }

    #[test]
    fn bad_policy_rejected() {
        let policy = LoadPolicy {
            scroll_step_factor: 0.0,
            ..LoadPolicy::default()
        };
        let err = DownloadConfig::builder()
            .load_policy(policy)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Scroll step factor"));
    }

    #[test]
    fn stride_boundaries() {
        assert_eq!(LoadPolicy::sample_stride(0), 1);
        assert_eq!(LoadPolicy::sample_stride(99), 1);
        assert_eq!(LoadPolicy::sample_stride(100), 2);
        assert_eq!(LoadPolicy::sample_stride(499), 2);
        assert_eq!(LoadPolicy::sample_stride(500), 5);
        assert_eq!(LoadPolicy::sample_stride(999), 5);
        assert_eq!(LoadPolicy::sample_stride(1000), 10);
    }

    #[test]
    fn render_pause_shrinks_with_size() {
        let p = LoadPolicy::default();
        assert!(p.render_pause_for(1200) < p.render_pause_for(40));
    }
}
