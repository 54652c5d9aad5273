//! Page loader: drive a lazy-loading viewer until every page is attached.
//!
//! The viewer only attaches page elements as the window scrolls near them,
//! and it fetches page assets slowly. Nothing on the page says "done", so the
//! loader infers completeness from the page-element count over time.
//!
//! ## Phases
//!
//! ```text
//! AwaitingViewer ──▶ Scrolling ──▶ ConfirmingRender ──┬──▶ Done
//!  (fatal timeout)   (bounded)     (sampled pages)    └──▶ AggressiveRetry ──▶ Done
//! ```
//!
//! 1. **AwaitingViewer**: wait for the first page element. The only fatal
//!    step: if the viewer never shows a page there is nothing to capture.
//! 2. **Scrolling**: walk the window to the bottom in viewport-sized steps,
//!    poke the viewer with `scroll`/`resize` events, and recount. Stops when
//!    the declared count is reached and holds steady, when an undeclared count
//!    stops growing, or when the attempt budget runs out.
//! 3. **ConfirmingRender**: visit (a sample of) the attached pages and give
//!    each a moment to paint its text layer and canvas, so the print step
//!    does not capture grey placeholders.
//! 4. **AggressiveRetry**: only when a declared count is known and was not
//!    reached. Repeats the walk with longer waits until the count is met or
//!    the retry budget runs out.
//!
//! Shortfalls never fail the download: the report says what was loaded and
//! the caller records a degradation.

use crate::config::LoadPolicy;
use crate::error::ScribdError;
use crate::output::{LoadReport, ScrollExit};
use crate::pipeline::viewer::ViewerSession;
use crate::progress::{DownloadStage, ProgressCallback};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Selector for the text overlay of a rendered page.
pub const TEXT_LAYER_SELECTOR: &str = ".textLayer, .text_layer";
/// Selector for the painted content of a rendered page.
pub const CONTENT_SELECTOR: &str = "canvas, img";

/// Named state of the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    AwaitingViewer,
    Scrolling,
    ConfirmingRender,
    AggressiveRetry,
    Done,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadPhase::AwaitingViewer => "awaiting viewer",
            LoadPhase::Scrolling => "scrolling",
            LoadPhase::ConfirmingRender => "confirming render",
            LoadPhase::AggressiveRetry => "aggressive retry",
            LoadPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// Counters of the scrolling phase. One instance per session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadState {
    pub observed_page_count: usize,
    pub stable_iterations: usize,
    pub no_change_iterations: usize,
    pub attempt: usize,
    pub scroll_offset: f64,
}

impl LoadState {
    /// Fold one page-element count into the counters.
    ///
    /// An unchanged count bumps the no-change counter, and the stability
    /// counter too once the count has reached `expected`. Any change (growth
    /// or shrinkage) resets both and becomes the new baseline.
    pub fn observe(&mut self, count: usize, expected: Option<usize>) {
        if count == self.observed_page_count {
            self.no_change_iterations += 1;
            if expected.is_some_and(|e| count >= e) {
                self.stable_iterations += 1;
            }
        } else {
            self.stable_iterations = 0;
            self.no_change_iterations = 0;
            self.observed_page_count = count;
        }
    }

    /// Convergence verdict after the latest observation, if any.
    pub fn converged(&self, expected: Option<usize>, policy: &LoadPolicy) -> Option<ScrollExit> {
        match expected {
            Some(e)
                if self.observed_page_count >= e
                    && self.stable_iterations >= policy.stable_threshold =>
            {
                Some(ScrollExit::TargetReachedStable)
            }
            None if self.no_change_iterations >= policy.no_change_threshold => {
                Some(ScrollExit::NoGrowth)
            }
            _ => None,
        }
    }
}

/// Load every page of the viewer open in `session`.
///
/// # Errors
/// [`ScribdError::ViewerLoadTimeout`] if no page element appears within
/// `policy.viewer_timeout`, or the session error that prevented the check.
/// Everything after that first element is best-effort.
pub async fn load_all_pages<S: ViewerSession>(
    session: &S,
    expected: Option<usize>,
    policy: &LoadPolicy,
    progress: Option<&ProgressCallback>,
) -> Result<LoadReport, ScribdError> {
    PageLoader {
        session,
        policy,
        expected,
        progress,
        phase: LoadPhase::AwaitingViewer,
    }
    .run()
    .await
}

struct PageLoader<'a, S> {
    session: &'a S,
    policy: &'a LoadPolicy,
    expected: Option<usize>,
    progress: Option<&'a ProgressCallback>,
    phase: LoadPhase,
}

impl<S: ViewerSession> PageLoader<'_, S> {
    async fn run(mut self) -> Result<LoadReport, ScribdError> {
        self.enter(LoadPhase::AwaitingViewer);
        self.await_viewer().await?;

        let mut report = LoadReport {
            expected_pages: self.expected,
            loaded_pages: 0,
            scroll_exit: ScrollExit::BudgetExhausted,
            scroll_attempts: 0,
            pages_sampled: 0,
            aggressive_retry_ran: false,
            aggressive_attempts: 0,
            interrupted: None,
        };

        self.enter(LoadPhase::Scrolling);
        let mut state = LoadState::default();
        report.scroll_exit = self.scroll_until_stable(&mut state, &mut report).await;
        report.loaded_pages = state.observed_page_count;

        if report.interrupted.is_none() {
            self.enter(LoadPhase::ConfirmingRender);
            self.confirm_render(&mut report).await;
        }

        if report.interrupted.is_none() && report.is_short() {
            self.enter(LoadPhase::AggressiveRetry);
            self.aggressive_retry(&mut report).await;
        }

        self.enter(LoadPhase::Done);
        match (self.expected, report.is_short()) {
            (Some(expected), true) => warn!(
                "Expected {} pages but only loaded {}",
                expected, report.loaded_pages
            ),
            _ => info!("Total pages loaded: {}", report.loaded_pages),
        }
        Ok(report)
    }

    fn enter(&mut self, phase: LoadPhase) {
        debug!("Loader phase: {} -> {}", self.phase, phase);
        self.phase = phase;
        let stage = match phase {
            LoadPhase::AwaitingViewer => DownloadStage::AwaitingViewer,
            LoadPhase::Scrolling => DownloadStage::Scrolling,
            LoadPhase::ConfirmingRender => DownloadStage::ConfirmingRender,
            LoadPhase::AggressiveRetry => DownloadStage::AggressiveRetry,
            LoadPhase::Done => return,
        };
        if let Some(cb) = self.progress {
            cb.on_stage(stage);
        }
    }

    fn observed(&self, count: usize) {
        if let Some(cb) = self.progress {
            cb.on_pages_observed(count, self.expected);
        }
    }

    // ── Phase 0 ──────────────────────────────────────────────────────────

    async fn await_viewer(&self) -> Result<(), ScribdError> {
        let selector = &self.policy.page_selector;
        let found = self
            .session
            .wait_for_selector(selector, self.policy.viewer_timeout)
            .await?;
        if !found {
            warn!("Timeout waiting for page elements");
            return Err(ScribdError::ViewerLoadTimeout {
                selector: selector.clone(),
                waited: self.policy.viewer_timeout,
            });
        }
        info!("First page element found, starting to load all pages");
        Ok(())
    }

    // ── Phase 1 ──────────────────────────────────────────────────────────

    async fn scroll_until_stable(&self, state: &mut LoadState, report: &mut LoadReport) -> ScrollExit {
        let budget = self.policy.max_attempts(self.expected);
        let selector = &self.policy.page_selector;

        let exit = loop {
            if state.attempt >= budget {
                info!("Scroll budget of {} attempts exhausted", budget);
                break ScrollExit::BudgetExhausted;
            }

            let count = match self.session.count_elements(selector).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Page loading interrupted at attempt {}: {}", state.attempt + 1, e);
                    report.interrupted = Some(e.to_string());
                    break ScrollExit::Interrupted;
                }
            };
            self.observed(count);
            state.observe(count, self.expected);
            debug!(
                attempt = state.attempt + 1,
                pages = count,
                expected = ?self.expected,
                stable = state.stable_iterations,
                unchanged = state.no_change_iterations,
                "Scroll poll"
            );

            if let Some(exit) = state.converged(self.expected, self.policy) {
                match exit {
                    ScrollExit::TargetReachedStable => {
                        info!("All {} pages loaded", count)
                    }
                    _ => info!(
                        "No new content after {} attempts, stopping",
                        state.no_change_iterations
                    ),
                }
                state.attempt += 1;
                break exit;
            }

            match self.scroll_pass(self.policy.scroll_step_wait).await {
                Ok(offset) => state.scroll_offset = offset,
                Err(e) => debug!("Error in incremental scrolling: {}", e),
            }
            if let Err(e) = self.settle_at_bottom().await {
                debug!("Error at bottom of document: {}", e);
            }

            if state.attempt > 0 && state.attempt % self.policy.periodic_pause_every.max(1) == 0 {
                debug!("Extra wait after {} attempts", state.attempt);
                self.session.pause(self.policy.periodic_pause).await;
            }
            state.attempt += 1;
        };

        report.scroll_attempts = state.attempt;
        info!(
            "Progressive loading finished with {} pages after {} attempts",
            state.observed_page_count, state.attempt
        );
        exit
    }

    /// Walk from the current offset to the bottom in steps of
    /// `scroll_step_factor` viewports. Returns the final offset.
    async fn scroll_pass(&self, step_wait: Duration) -> Result<f64, ScribdError> {
        let mut metrics = self.session.scroll_metrics().await?;
        let mut steps = 0;
        while !metrics.at_bottom() && steps < self.policy.max_walk_steps {
            let step = metrics.viewport_height * self.policy.scroll_step_factor;
            let target = (metrics.offset + step).min(metrics.document_height);
            self.session.scroll_to(target).await?;
            self.session.pause(step_wait).await;
            steps += 1;

            let next = self.session.scroll_metrics().await?;
            if next.offset <= metrics.offset {
                debug!("Scroll offset stuck at {}", next.offset);
                return Ok(next.offset);
            }
            metrics = next;
        }
        Ok(metrics.offset)
    }

    async fn settle_at_bottom(&self) -> Result<(), ScribdError> {
        let clicked = self.session.dispatch_lazy_load_events(true).await?;
        if clicked > 0 {
            debug!("Clicked {} load-more buttons", clicked);
        }
        self.session.pause(self.policy.bottom_wait).await;
        if !self
            .session
            .wait_for_network_idle(self.policy.network_idle_timeout)
            .await?
        {
            debug!("Network idle timeout during scroll, continuing");
        }
        Ok(())
    }

    // ── Phase 2 ──────────────────────────────────────────────────────────

    async fn confirm_render(&self, report: &mut LoadReport) {
        let selector = &self.policy.page_selector;
        let total = match self.session.count_elements(selector).await {
            Ok(n) => n,
            Err(e) => {
                warn!("Could not count pages for render confirmation: {}", e);
                report.interrupted = Some(e.to_string());
                return;
            }
        };
        report.loaded_pages = total;
        self.observed(total);

        let stride = LoadPolicy::sample_stride(total);
        let pause = self.policy.render_pause_for(total);
        info!("Ensuring {} pages are rendered (every {} page)", total, stride);

        for i in 0..total {
            if i % stride == 0 && self.render_one(i, pause).await {
                report.pages_sampled += 1;
            }
            if (i + 1) % self.policy.render_log_every.max(1) == 0 {
                debug!("Rendered {}/{} pages", i + 1, total);
            }
        }
        info!("Render confirmation finished for {} pages", total);
    }

    /// Returns whether the page element was visited.
    async fn render_one(&self, index: usize, pause: Duration) -> bool {
        let selector = &self.policy.page_selector;
        match self.session.scroll_element_into_view(selector, index).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Page {} detached before render check", index + 1);
                return false;
            }
            Err(e) => {
                debug!("Error rendering page {}: {}", index + 1, e);
                return false;
            }
        }

        let waits = [
            (TEXT_LAYER_SELECTOR, self.policy.text_layer_timeout, "Text layer"),
            (CONTENT_SELECTOR, self.policy.content_timeout, "Canvas or image"),
        ];
        for (child, timeout, what) in waits {
            match self
                .session
                .wait_for_selector_within(selector, index, child, timeout)
                .await
            {
                Ok(true) => {}
                Ok(false) => debug!("{} not found in page {}", what, index + 1),
                Err(e) => debug!("Error waiting for {} in page {}: {}", what, index + 1, e),
            }
        }

        self.session.pause(pause).await;
        true
    }

    // ── Phase 3 ──────────────────────────────────────────────────────────

    async fn aggressive_retry(&self, report: &mut LoadReport) {
        let Some(expected) = self.expected else {
            return;
        };
        report.aggressive_retry_ran = true;
        let mut current = report.loaded_pages;
        info!(
            "Starting aggressive loading (current: {}, expected: {})",
            current, expected
        );

        while report.aggressive_attempts < self.policy.aggressive_max_attempts && current < expected {
            report.aggressive_attempts += 1;
            match self.aggressive_attempt().await {
                Ok(n) => {
                    self.observed(n);
                    if n > current {
                        info!("Aggressive load added {} pages", n - current);
                        current = n;
                    }
                }
                Err(e) => debug!("Error in aggressive load: {}", e),
            }
            if current >= expected {
                break;
            }
            self.session.pause(self.policy.aggressive_pause).await;
        }

        report.loaded_pages = match self.session.count_elements(&self.policy.page_selector).await {
            Ok(n) => n.max(current),
            Err(_) => current,
        };
        info!(
            "Aggressive loading finished with {} pages after {} attempts",
            report.loaded_pages, report.aggressive_attempts
        );
    }

    async fn aggressive_attempt(&self) -> Result<usize, ScribdError> {
        self.scroll_pass(self.policy.aggressive_step_wait).await?;
        self.session.dispatch_lazy_load_events(false).await?;
        if !self
            .session
            .wait_for_network_idle(self.policy.aggressive_network_idle_timeout)
            .await?
        {
            debug!("Network idle timeout during aggressive load");
        }
        self.session.count_elements(&self.policy.page_selector).await
    }
}
