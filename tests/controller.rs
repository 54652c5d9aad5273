//! Page-loader behaviour against a simulated lazy-loading viewer.
//!
//! The simulated viewer attaches page elements one at a time as it is
//! polled, up to a cap. Pauses return immediately but are recorded, so a
//! full default-policy run (hundreds of attempts) finishes in milliseconds.

use scribd_fetch::pipeline::loader::load_all_pages;
use scribd_fetch::pipeline::viewer::{PrintOptions, ScrollMetrics, ViewerSession, WaitUntil};
use scribd_fetch::{
    DownloadProgressCallback, DownloadStage, LoadPolicy, ProgressCallback, ScribdError, ScrollExit,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Simulated viewer ─────────────────────────────────────────────────────────

const PAGE_HEIGHT: f64 = 1100.0;
const VIEWPORT: f64 = 720.0;

#[derive(Default)]
struct ViewerState {
    attached: usize,
    offset: f64,
    count_calls: usize,
    pauses: Vec<Duration>,
    events_with_click: usize,
    events_without_click: usize,
    scrolled_into_view: Vec<usize>,
}

struct SimulatedViewer {
    /// Pages the viewer will ever attach.
    cap: usize,
    /// Whether the first page element ever appears.
    shows_first_page: bool,
    /// Fail every count after this many successful ones.
    fail_counts_after: Option<usize>,
    state: Mutex<ViewerState>,
}

impl SimulatedViewer {
    fn growing_to(cap: usize) -> Self {
        Self {
            cap,
            shows_first_page: true,
            fail_counts_after: None,
            state: Mutex::new(ViewerState {
                attached: 1,
                ..ViewerState::default()
            }),
        }
    }

    fn pauses_of(&self, d: Duration) -> usize {
        self.state
            .lock()
            .unwrap()
            .pauses
            .iter()
            .filter(|p| **p == d)
            .count()
    }
}

impl ViewerSession for SimulatedViewer {
    async fn navigate(&self, _: &str, _: WaitUntil, _: Duration) -> Result<(), ScribdError> {
        Ok(())
    }

    async fn evaluate(&self, _: &str) -> Result<Value, ScribdError> {
        Ok(Value::Null)
    }

    async fn emulate_print_media(&self) -> Result<(), ScribdError> {
        Ok(())
    }

    async fn print_to_pdf(&self, _: &PrintOptions) -> Result<Vec<u8>, ScribdError> {
        Ok(b"%PDF-1.4\n%%EOF".to_vec())
    }

    async fn pause(&self, duration: Duration) {
        self.state.lock().unwrap().pauses.push(duration);
    }

    async fn count_elements(&self, _: &str) -> Result<usize, ScribdError> {
        let mut s = self.state.lock().unwrap();
        if let Some(limit) = self.fail_counts_after {
            if s.count_calls >= limit {
                return Err(ScribdError::Session("target closed".into()));
            }
        }
        s.count_calls += 1;
        let seen = s.attached;
        // One more page becomes available per poll.
        if s.attached < self.cap {
            s.attached += 1;
        }
        Ok(seen)
    }

    async fn scroll_metrics(&self) -> Result<ScrollMetrics, ScribdError> {
        let s = self.state.lock().unwrap();
        Ok(ScrollMetrics {
            offset: s.offset,
            document_height: s.attached as f64 * PAGE_HEIGHT,
            viewport_height: VIEWPORT,
        })
    }

    async fn scroll_to(&self, y: f64) -> Result<(), ScribdError> {
        let mut s = self.state.lock().unwrap();
        let max = (s.attached as f64 * PAGE_HEIGHT - VIEWPORT).max(0.0);
        s.offset = y.clamp(0.0, max);
        Ok(())
    }

    async fn dispatch_lazy_load_events(&self, click_load_more: bool) -> Result<usize, ScribdError> {
        let mut s = self.state.lock().unwrap();
        if click_load_more {
            s.events_with_click += 1;
        } else {
            s.events_without_click += 1;
        }
        Ok(0)
    }

    async fn wait_for_network_idle(&self, _: Duration) -> Result<bool, ScribdError> {
        Ok(true)
    }

    async fn wait_for_selector(&self, _: &str, _: Duration) -> Result<bool, ScribdError> {
        Ok(self.shows_first_page)
    }

    async fn scroll_element_into_view(&self, _: &str, index: usize) -> Result<bool, ScribdError> {
        let mut s = self.state.lock().unwrap();
        if index < s.attached {
            s.scrolled_into_view.push(index);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn wait_for_selector_within(
        &self,
        _: &str,
        _: usize,
        _: &str,
        _: Duration,
    ) -> Result<bool, ScribdError> {
        Ok(true)
    }
}

#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<DownloadStage>>,
    peak: Mutex<usize>,
}

impl DownloadProgressCallback for StageRecorder {
    fn on_stage(&self, stage: DownloadStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_pages_observed(&self, observed: usize, _expected: Option<usize>) {
        let mut peak = self.peak.lock().unwrap();
        *peak = (*peak).max(observed);
    }
}

// ── Convergence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_converges_when_viewer_grows_one_page_per_poll() {
    let viewer = SimulatedViewer::growing_to(40);
    let policy = LoadPolicy::default();

    let report = load_all_pages(&viewer, Some(40), &policy, None)
        .await
        .unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::TargetReachedStable);
    assert_eq!(report.loaded_pages, 40);
    assert!(!report.is_short());
    assert!(!report.aggressive_retry_ran);
    // 40 polls to grow, then `stable_threshold` unchanged polls.
    assert_eq!(report.scroll_attempts, 40 + policy.stable_threshold);
    assert!(report.scroll_attempts < policy.max_attempts_with_target);
}

#[tokio::test]
async fn test_converges_without_declared_count() {
    let viewer = SimulatedViewer::growing_to(12);
    let policy = LoadPolicy::default();

    let report = load_all_pages(&viewer, None, &policy, None).await.unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::NoGrowth);
    assert_eq!(report.loaded_pages, 12);
    assert_eq!(report.scroll_attempts, 12 + policy.no_change_threshold);
    assert!(!report.aggressive_retry_ran);
}

#[tokio::test]
async fn test_render_confirmation_visits_every_page_of_short_document() {
    let viewer = SimulatedViewer::growing_to(30);
    let report = load_all_pages(&viewer, Some(30), &LoadPolicy::default(), None)
        .await
        .unwrap();

    assert_eq!(report.pages_sampled, 30);
    let visited = viewer.state.lock().unwrap().scrolled_into_view.clone();
    assert_eq!(visited, (0..30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_render_confirmation_samples_long_document() {
    let viewer = SimulatedViewer::growing_to(150);
    let policy = LoadPolicy {
        stable_threshold: 1,
        ..LoadPolicy::default()
    };
    let report = load_all_pages(&viewer, Some(150), &policy, None)
        .await
        .unwrap();

    // Stride 2 for 100..500 pages.
    assert_eq!(report.pages_sampled, 75);
    let visited = viewer.state.lock().unwrap().scrolled_into_view.clone();
    assert!(visited.iter().all(|i| i % 2 == 0));
}

// ── Degradation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stuck_viewer_exhausts_budget_then_retries_aggressively() {
    let viewer = SimulatedViewer::growing_to(20);
    let policy = LoadPolicy::default();

    let report = load_all_pages(&viewer, Some(50), &policy, None)
        .await
        .unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::BudgetExhausted);
    assert_eq!(report.scroll_attempts, policy.max_attempts_with_target);
    assert!(report.aggressive_retry_ran);
    assert_eq!(report.aggressive_attempts, policy.aggressive_max_attempts);
    assert_eq!(report.loaded_pages, 20);
    assert!(report.is_short());
    assert!(report.interrupted.is_none());

    let s = viewer.state.lock().unwrap();
    // Phase 1 clicks load-more, the aggressive phase does not.
    assert_eq!(s.events_with_click, policy.max_attempts_with_target);
    assert_eq!(s.events_without_click, policy.aggressive_max_attempts);
}

#[tokio::test]
async fn test_aggressive_retry_stops_once_target_met() {
    // Grows slowly enough that a tiny scroll budget falls short, but the
    // aggressive phase polls enough to catch up.
    let viewer = SimulatedViewer::growing_to(30);
    let policy = LoadPolicy {
        max_attempts_with_target: 5,
        ..LoadPolicy::default()
    };

    let report = load_all_pages(&viewer, Some(30), &policy, None)
        .await
        .unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::BudgetExhausted);
    assert!(report.aggressive_retry_ran);
    assert!(report.aggressive_attempts < policy.aggressive_max_attempts);
    assert_eq!(report.loaded_pages, 30);
    assert!(!report.is_short());
}

#[tokio::test]
async fn test_no_aggressive_retry_without_declared_count() {
    let viewer = SimulatedViewer::growing_to(8);
    let policy = LoadPolicy {
        max_attempts_without_target: 4,
        ..LoadPolicy::default()
    };
    let report = load_all_pages(&viewer, None, &policy, None).await.unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::BudgetExhausted);
    assert!(!report.aggressive_retry_ran);
}

#[tokio::test]
async fn test_periodic_pause_every_tenth_attempt() {
    let viewer = SimulatedViewer::growing_to(3);
    let policy = LoadPolicy {
        periodic_pause: Duration::from_millis(4321),
        aggressive_max_attempts: 0,
        ..LoadPolicy::default()
    };
    load_all_pages(&viewer, Some(100), &policy, None)
        .await
        .unwrap();

    // Attempts 10, 20, ..., 490 of 500; never the first.
    assert_eq!(viewer.pauses_of(Duration::from_millis(4321)), 49);
}

// ── Fatal and interrupted paths ──────────────────────────────────────────────

#[tokio::test]
async fn test_missing_first_page_is_fatal() {
    let viewer = SimulatedViewer {
        shows_first_page: false,
        ..SimulatedViewer::growing_to(10)
    };
    let err = load_all_pages(&viewer, Some(10), &LoadPolicy::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ScribdError::ViewerLoadTimeout { .. }));
}

#[tokio::test]
async fn test_count_failure_interrupts_without_failing() {
    let viewer = SimulatedViewer {
        fail_counts_after: Some(3),
        ..SimulatedViewer::growing_to(10)
    };
    let report = load_all_pages(&viewer, Some(10), &LoadPolicy::default(), None)
        .await
        .unwrap();

    assert_eq!(report.scroll_exit, ScrollExit::Interrupted);
    assert_eq!(report.loaded_pages, 3);
    assert!(report.interrupted.as_deref().unwrap().contains("target closed"));
    assert!(!report.aggressive_retry_ran);
    assert_eq!(report.pages_sampled, 0);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_reports_phases_in_order() {
    let viewer = SimulatedViewer::growing_to(20);
    let recorder = Arc::new(StageRecorder::default());
    let cb: ProgressCallback = recorder.clone();
    let policy = LoadPolicy {
        max_attempts_with_target: 5,
        aggressive_max_attempts: 2,
        ..LoadPolicy::default()
    };

    load_all_pages(&viewer, Some(200), &policy, Some(&cb))
        .await
        .unwrap();

    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![
            DownloadStage::AwaitingViewer,
            DownloadStage::Scrolling,
            DownloadStage::ConfirmingRender,
            DownloadStage::AggressiveRetry,
        ]
    );
    assert!(*recorder.peak.lock().unwrap() >= 5);
}

#[tokio::test]
async fn test_loader_future_is_send() {
    let viewer = Arc::new(SimulatedViewer::growing_to(5));
    let handle = tokio::spawn(async move {
        load_all_pages(&*viewer, Some(5), &LoadPolicy::default(), None).await
    });
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.loaded_pages, 5);
}
