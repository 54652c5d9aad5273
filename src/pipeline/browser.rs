//! Chromium implementation of [`ViewerSession`] over the DevTools protocol.
//!
//! One [`ChromiumSession`] owns one browser process and one page. It is
//! closed explicitly with [`ChromiumSession::close`] on both the success and
//! the error path of a download. If the owning task panics or is cancelled
//! first, `Drop` stops the event-handler task and lets `chromiumoxide` kill
//! the child process.
//!
//! Network quiescence is measured from the page's DevTools `Network` events
//! (see [`NetworkTracker`]), not from in-page resource timing.

use crate::config::DownloadConfig;
use crate::error::ScribdError;
use crate::pipeline::network::{NetworkTracker, NETWORK_QUIET};
use crate::pipeline::viewer::{PrintOptions, ViewerSession, WaitUntil, POLL_INTERVAL};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, SetBypassCspParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Viewport the viewer is laid out in.
const WINDOW_SIZE: (u32, u32) = (1280, 720);

/// Extra Chromium switches. Background throttling is off so lazy-load timers
/// keep firing in a headless, never-focused window.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor",
    "--memory-pressure-off",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
    "--no-first-run",
    "--no-default-browser-check",
    "--mute-audio",
];

/// A running browser with a single page open.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Page,
    handler: Option<JoinHandle<()>>,
    network: Arc<Mutex<NetworkTracker>>,
    network_listener: Option<JoinHandle<()>>,
}

/// A page's request lifecycle, reduced to what [`NetworkTracker`] needs.
enum RequestEvent {
    Started(String),
    Ended(String),
}

/// Resolve the Chromium executable: explicit path first, then the locator.
pub fn chromium_executable(config: &DownloadConfig) -> Result<PathBuf, ScribdError> {
    match &config.chrome_executable {
        Some(path) if path.is_file() => Ok(path.clone()),
        Some(path) => Err(ScribdError::BrowserUnavailable(format!(
            "'{}' does not exist or is not a file",
            path.display()
        ))),
        None => tool_locate::chromium().map_err(|e| ScribdError::BrowserUnavailable(e.to_string())),
    }
}

impl ChromiumSession {
    /// Start Chromium and open a blank page with the configured User-Agent.
    pub async fn launch(config: &DownloadConfig) -> Result<Self, ScribdError> {
        let executable = chromium_executable(config)?;
        info!("Launching browser: {}", executable.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .request_timeout(Duration::from_secs(config.navigation_timeout_secs))
            .no_sandbox();
        if !config.headless {
            builder = builder.with_head();
        }
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        let browser_config = builder.build().map_err(ScribdError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScribdError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(ScribdError::BrowserLaunch(format!(
                    "could not open a page: {e}"
                )));
            }
        };

        let mut session = Self {
            browser: Some(browser),
            page,
            handler: Some(handler),
            network: Arc::new(Mutex::new(NetworkTracker::default())),
            network_listener: None,
        };
        session.network_listener = Some(session.track_network().await?);

        session
            .page
            .execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await
            .map_err(|e| ScribdError::BrowserLaunch(format!("user agent override: {e}")))?;
        if let Err(e) = session.page.execute(SetBypassCspParams::new(true)).await {
            debug!("CSP bypass unavailable: {e}");
        }

        Ok(session)
    }

    /// Subscribe to the page's request events and feed them into the
    /// session's [`NetworkTracker`] from a background task.
    async fn track_network(&self) -> Result<JoinHandle<()>, ScribdError> {
        if let Err(e) = self.page.execute(EnableParams::default()).await {
            warn!("Failed to enable Network domain: {e}");
        }
        let subscribe = |e: chromiumoxide::error::CdpError| {
            ScribdError::BrowserLaunch(format!("network event subscription: {e}"))
        };
        let sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(subscribe)?
            .map(|e| RequestEvent::Started(e.request_id.inner().clone()));
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(subscribe)?
            .map(|e| RequestEvent::Ended(e.request_id.inner().clone()));
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(subscribe)?
            .map(|e| RequestEvent::Ended(e.request_id.inner().clone()));

        let tracker = Arc::clone(&self.network);
        let mut events = futures::stream::select(sent, futures::stream::select(finished, failed));
        Ok(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let now = Instant::now();
                let mut tracker = lock(&tracker);
                match event {
                    RequestEvent::Started(id) => tracker.request_started(&id, now),
                    RequestEvent::Ended(id) => tracker.request_ended(&id, now),
                }
            }
        }))
    }

    /// Close the page and the browser, and wait for the process to exit.
    /// Errors are logged, never returned: by now the capture is done or lost.
    pub async fn close(mut self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Failed to close page: {e}");
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {e}");
            }
            if let Err(e) = browser.wait().await {
                warn!("Failed to reap browser process: {e}");
            }
        }
        if let Some(listener) = self.network_listener.take() {
            listener.abort();
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        debug!("Browser closed");
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(listener) = self.network_listener.take() {
            listener.abort();
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if self.browser.is_some() {
            warn!("Browser session dropped without close; the process will be killed");
        }
    }
}

impl ViewerSession for ChromiumSession {
    async fn navigate(
        &self,
        url: &str,
        until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), ScribdError> {
        info!("Opening {}", url);
        let started = Instant::now();
        lock(&self.network).reset(started);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(ScribdError::NavigationFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ScribdError::NavigationFailed {
                    url: url.to_string(),
                    reason: format!("timed out after {}s", timeout.as_secs()),
                })
            }
        }

        if until == WaitUntil::NetworkIdle {
            let remaining = timeout.saturating_sub(started.elapsed());
            if !self.wait_for_network_idle(remaining).await? {
                debug!("Network still busy after navigation, continuing");
            }
        }
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, ScribdError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(ScribdError::Session)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| ScribdError::Session(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Idle once no request has been in flight for [`NETWORK_QUIET`].
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<bool, ScribdError> {
        let deadline = Instant::now() + timeout;
        loop {
            let (idle, in_flight) = {
                let tracker = lock(&self.network);
                (tracker.is_idle(NETWORK_QUIET, Instant::now()), tracker.in_flight())
            };
            if idle {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!(in_flight, "Network not idle after {:?}", timeout);
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn emulate_print_media(&self) -> Result<(), ScribdError> {
        self.page
            .execute(SetEmulatedMediaParams::builder().media("print").build())
            .await
            .map_err(|e| ScribdError::Session(format!("print media emulation: {e}")))?;
        Ok(())
    }

    async fn print_to_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, ScribdError> {
        let params = PrintToPdfParams::builder()
            .landscape(options.landscape)
            .display_header_footer(options.display_header_footer)
            .print_background(options.print_background)
            .prefer_css_page_size(options.prefer_css_page_size)
            .scale(options.scale)
            .paper_width(options.paper_width)
            .paper_height(options.paper_height)
            .margin_top(options.margin)
            .margin_bottom(options.margin)
            .margin_left(options.margin)
            .margin_right(options.margin)
            .build();
        self.page
            .pdf(params)
            .await
            .map_err(|e| ScribdError::CaptureFailed(format!("print to PDF: {e}")))
    }
}

/// The tracker holds plain counters, so a panic mid-update cannot leave it
/// in a state worth refusing.
fn lock(tracker: &Mutex<NetworkTracker>) -> MutexGuard<'_, NetworkTracker> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_executable_is_unavailable() {
        let config = DownloadConfig::builder()
            .chrome_executable("/definitely/not/here/chrome")
            .build()
            .unwrap();
        let err = chromium_executable(&config).unwrap_err();
        assert!(matches!(err, ScribdError::BrowserUnavailable(_)));
        assert!(err.to_string().contains("/definitely/not/here/chrome"));
    }

    #[test]
    fn explicit_existing_file_is_used_as_is() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = DownloadConfig::builder()
            .chrome_executable(file.path())
            .build()
            .unwrap();
        assert_eq!(chromium_executable(&config).unwrap(), file.path());
    }

    #[test]
    fn launch_args_keep_timers_running() {
        assert!(LAUNCH_ARGS.contains(&"--disable-background-timer-throttling"));
        assert!(LAUNCH_ARGS.contains(&"--disable-renderer-backgrounding"));
    }
}
