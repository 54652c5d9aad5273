//! The browser-session surface the loader and capture stages drive.
//!
//! ## Why a trait?
//!
//! The page loader is the one stage whose behaviour depends on timing and on
//! a third-party web application. Putting the browser behind
//! [`ViewerSession`] lets the loader be exercised against a simulated viewer
//! in tests, with pauses that cost nothing, while production uses the
//! Chromium implementation in [`crate::pipeline::browser`].
//!
//! Only [`ViewerSession::navigate`], [`ViewerSession::evaluate`],
//! [`ViewerSession::emulate_print_media`] and [`ViewerSession::print_to_pdf`]
//! need a real implementation. The DOM queries have default bodies built on
//! `evaluate` and the snippets in [`crate::scripts`].

use crate::error::ScribdError;
use crate::scripts;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Poll interval for selector and network-idle waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Consecutive unchanged resource counts that count as network idle.
const IDLE_POLLS: usize = 2;

/// Window scroll state in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollMetrics {
    pub offset: f64,
    pub document_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    /// True once the viewport bottom has reached the end of the document.
    pub fn at_bottom(&self) -> bool {
        self.offset >= self.document_height - self.viewport_height
    }
}

/// When navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// `load` fired and the resource count stopped moving.
    #[default]
    NetworkIdle,
}

/// Paper and layout options for the print step. Sizes in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub landscape: bool,
    pub print_background: bool,
    pub scale: f64,
    pub display_header_footer: bool,
    pub prefer_css_page_size: bool,
}

impl PrintOptions {
    /// A4 portrait, zero margins, backgrounds on, no scaling.
    pub fn a4() -> Self {
        Self {
            paper_width: 8.27,
            paper_height: 11.69,
            margin: 0.0,
            landscape: false,
            print_background: true,
            scale: 1.0,
            display_header_footer: false,
            prefer_css_page_size: false,
        }
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self::a4()
    }
}

/// One open viewer page.
///
/// All methods take `&self`; implementations serialise access internally.
/// Futures are `Send` so a download can run on a spawned task.
pub trait ViewerSession: Send + Sync {
    /// Open `url` and wait for `until`, bounded by `timeout`.
    fn navigate(
        &self,
        url: &str,
        until: WaitUntil,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ScribdError>> + Send;

    /// Evaluate a script and return its JSON-serialisable result.
    fn evaluate(&self, script: &str) -> impl Future<Output = Result<Value, ScribdError>> + Send;

    /// Switch the page to `print` media.
    fn emulate_print_media(&self) -> impl Future<Output = Result<(), ScribdError>> + Send;

    /// Print the page to PDF bytes.
    fn print_to_pdf(
        &self,
        options: &PrintOptions,
    ) -> impl Future<Output = Result<Vec<u8>, ScribdError>> + Send;

    /// Sleep. Simulated sessions override this to return immediately.
    fn pause(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn count_elements(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<usize, ScribdError>> + Send {
        async move {
            let v = self.evaluate(&scripts::count_elements(selector)).await?;
            as_usize(&v)
        }
    }

    fn scroll_metrics(&self) -> impl Future<Output = Result<ScrollMetrics, ScribdError>> + Send {
        async move {
            let v = self.evaluate(scripts::SCROLL_METRICS).await?;
            serde_json::from_value(v)
                .map_err(|e| ScribdError::Session(format!("bad scroll metrics: {e}")))
        }
    }

    fn scroll_to(&self, y: f64) -> impl Future<Output = Result<(), ScribdError>> + Send {
        async move {
            self.evaluate(&scripts::scroll_to(y)).await?;
            Ok(())
        }
    }

    /// Fire `scroll`/`resize` and optionally click "load more" buttons.
    /// Returns the number of buttons clicked.
    fn dispatch_lazy_load_events(
        &self,
        click_load_more: bool,
    ) -> impl Future<Output = Result<usize, ScribdError>> + Send {
        async move {
            let v = self
                .evaluate(&scripts::lazy_load_events(click_load_more))
                .await?;
            as_usize(&v)
        }
    }

    /// Wait until the page's resource-timing count stops moving.
    /// `Ok(false)` on timeout.
    ///
    /// The count only sees completed requests and stops growing once the
    /// resource-timing buffer is full, so sessions that can observe requests
    /// directly should override this (as the Chromium session does).
    fn wait_for_network_idle(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ScribdError>> + Send {
        async move {
            let mut last = None;
            let mut unchanged = 0;
            for _ in 0..poll_budget(timeout) {
                let count = as_usize(&self.evaluate(scripts::RESOURCE_COUNT).await?)?;
                if last == Some(count) {
                    unchanged += 1;
                    if unchanged >= IDLE_POLLS {
                        return Ok(true);
                    }
                } else {
                    unchanged = 0;
                    last = Some(count);
                }
                self.pause(POLL_INTERVAL).await;
            }
            Ok(false)
        }
    }

    /// Wait for any element matching `selector`. `Ok(false)` on timeout.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ScribdError>> + Send {
        async move {
            let script = scripts::selector_present(selector);
            for _ in 0..poll_budget(timeout) {
                if self.evaluate(&script).await?.as_bool().unwrap_or(false) {
                    return Ok(true);
                }
                self.pause(POLL_INTERVAL).await;
            }
            Ok(false)
        }
    }

    /// Bring the `index`-th match of `selector` into view. `Ok(false)` if
    /// there is no such element.
    fn scroll_element_into_view(
        &self,
        selector: &str,
        index: usize,
    ) -> impl Future<Output = Result<bool, ScribdError>> + Send {
        async move {
            let v = self
                .evaluate(&scripts::scroll_element_into_view(selector, index))
                .await?;
            Ok(v.as_bool().unwrap_or(false))
        }
    }

    /// Wait for `child` inside the `index`-th match of `selector`.
    fn wait_for_selector_within(
        &self,
        selector: &str,
        index: usize,
        child: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, ScribdError>> + Send {
        async move {
            let script = scripts::child_present(selector, index, child);
            for _ in 0..poll_budget(timeout) {
                if self.evaluate(&script).await?.as_bool().unwrap_or(false) {
                    return Ok(true);
                }
                self.pause(POLL_INTERVAL).await;
            }
            Ok(false)
        }
    }

    fn inject_style(&self, css: &str) -> impl Future<Output = Result<(), ScribdError>> + Send {
        async move {
            self.evaluate(&scripts::inject_style(css)).await?;
            Ok(())
        }
    }
}

/// Number of polls that fit in `timeout`, at least one.
fn poll_budget(timeout: Duration) -> u128 {
    (timeout.as_millis() / POLL_INTERVAL.as_millis()).max(1)
}

fn as_usize(v: &Value) -> Result<usize, ScribdError> {
    v.as_u64()
        .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .map(|n| n as usize)
        .ok_or_else(|| ScribdError::Session(format!("expected a count, got {v}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers scripts from a queue of canned values, recording each script.
    struct ScriptedSession {
        answers: Mutex<Vec<Value>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(mut answers: Vec<Value>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ViewerSession for ScriptedSession {
        async fn navigate(&self, _: &str, _: WaitUntil, _: Duration) -> Result<(), ScribdError> {
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<Value, ScribdError> {
            self.seen.lock().unwrap().push(script.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ScribdError::Session("no more answers".into()))
        }

        async fn emulate_print_media(&self) -> Result<(), ScribdError> {
            Ok(())
        }

        async fn print_to_pdf(&self, _: &PrintOptions) -> Result<Vec<u8>, ScribdError> {
            Ok(b"%PDF-1.4".to_vec())
        }

        async fn pause(&self, _: Duration) {}
    }

    #[tokio::test]
    async fn count_parses_integer() {
        let s = ScriptedSession::new(vec![json!(12)]);
        assert_eq!(s.count_elements(".page").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn count_rejects_non_number() {
        let s = ScriptedSession::new(vec![json!("twelve")]);
        assert!(matches!(
            s.count_elements(".page").await,
            Err(ScribdError::Session(_))
        ));
    }

    #[tokio::test]
    async fn scroll_metrics_deserialise() {
        let s = ScriptedSession::new(vec![json!({
            "offset": 0, "document_height": 5000, "viewport_height": 720
        })]);
        let m = s.scroll_metrics().await.unwrap();
        assert_eq!(m.viewport_height, 720.0);
        assert!(!m.at_bottom());
    }

    #[tokio::test]
    async fn network_idle_after_stable_counts() {
        let s = ScriptedSession::new(vec![json!(3), json!(5), json!(5), json!(5)]);
        assert!(s.wait_for_network_idle(Duration::from_secs(5)).await.unwrap());
        assert_eq!(s.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn network_idle_times_out_softly() {
        // One second is four polls; the count never settles.
        let s = ScriptedSession::new((0..10).map(|n| json!(n)).collect());
        assert!(!s.wait_for_network_idle(Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn wait_for_selector_polls_until_present() {
        let s = ScriptedSession::new(vec![json!(false), json!(false), json!(true)]);
        assert!(s
            .wait_for_selector(".page", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn wait_for_selector_times_out() {
        let s = ScriptedSession::new(vec![json!(false); 8]);
        assert!(!s
            .wait_for_selector(".page", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[test]
    fn a4_defaults() {
        let p = PrintOptions::default();
        assert_eq!((p.paper_width, p.paper_height), (8.27, 11.69));
        assert_eq!(p.margin, 0.0);
        assert!(p.print_background);
        assert!(!p.landscape);
    }

    #[test]
    fn at_bottom_edge() {
        let m = ScrollMetrics {
            offset: 4280.0,
            document_height: 5000.0,
            viewport_height: 720.0,
        };
        assert!(m.at_bottom());
    }
}
