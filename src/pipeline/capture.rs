//! Render-to-artifact capture: strip viewer chrome and print to PDF.
//!
//! Runs after the loader. The chrome-removal scripts in
//! [`crate::scripts::CLEANUP_STEPS`] are run one by one; a failing step is
//! recorded and the batch carries on, because a stray toolbar in the output
//! is better than no output. Only the print itself can fail the capture.

use crate::error::{Degradation, ScribdError};
use crate::pipeline::viewer::{PrintOptions, ViewerSession};
use crate::scripts::{self, CleanupStep};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Leading bytes of every PDF file.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// Settle times around the print step.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTiming {
    /// After the cleanup batch. Default: 2 s.
    pub after_cleanup: Duration,
    /// After the print stylesheet goes in. Default: 5 s.
    pub before_print: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            after_cleanup: Duration::from_secs(2),
            before_print: Duration::from_secs(5),
        }
    }
}

/// Outcome of one cleanup step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub name: &'static str,
    pub error: Option<String>,
}

/// Aggregated outcome of the cleanup batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub steps: Vec<StepOutcome>,
}

impl CleanupReport {
    pub fn failed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.error.is_some())
    }

    pub fn all_ok(&self) -> bool {
        self.failed().next().is_none()
    }

    /// One [`Degradation::CleanupStepFailed`] per failed step.
    pub fn degradations(&self) -> Vec<Degradation> {
        self.failed()
            .map(|s| Degradation::CleanupStepFailed {
                step: s.name.to_string(),
                detail: s.error.clone().unwrap_or_default(),
            })
            .collect()
    }
}

/// The printed document plus what happened on the way there.
#[derive(Debug, Clone)]
pub struct Capture {
    pub pdf: Vec<u8>,
    pub cleanup: CleanupReport,
}

/// Run every step in order, never stopping early.
pub async fn run_cleanup<S: ViewerSession>(session: &S, steps: &[CleanupStep]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for step in steps {
        let error = match session.evaluate(step.script).await {
            Ok(v) => {
                debug!("Cleanup step {} done ({})", step.name, v);
                None
            }
            Err(e) => {
                warn!("Cleanup step {} failed: {}", step.name, e);
                Some(e.to_string())
            }
        };
        report.steps.push(StepOutcome {
            name: step.name,
            error,
        });
    }
    report
}

/// Clean the page, switch to print media and print it.
///
/// # Errors
/// [`ScribdError::CaptureFailed`] when the print call fails, returns
/// nothing, or returns something that is not a PDF.
pub async fn capture_pdf<S: ViewerSession>(
    session: &S,
    timing: &CaptureTiming,
) -> Result<Capture, ScribdError> {
    info!("Removing viewer chrome");
    let cleanup = run_cleanup(session, scripts::CLEANUP_STEPS).await;
    session.pause(timing.after_cleanup).await;

    if let Err(e) = session.emulate_print_media().await {
        warn!("Print media emulation failed, printing with screen media: {}", e);
    }
    if let Err(e) = session.inject_style(scripts::PRINT_CSS).await {
        warn!("Print stylesheet injection failed: {}", e);
    }
    session.pause(timing.before_print).await;

    info!("Printing to PDF");
    let pdf = session.print_to_pdf(&PrintOptions::a4()).await?;
    validate_pdf(&pdf)?;
    info!("PDF generated ({} bytes)", pdf.len());

    Ok(Capture { pdf, cleanup })
}

fn validate_pdf(bytes: &[u8]) -> Result<(), ScribdError> {
    if bytes.is_empty() {
        return Err(ScribdError::CaptureFailed(
            "print returned an empty document".into(),
        ));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        let head: Vec<u8> = bytes.iter().take(8).copied().collect();
        return Err(ScribdError::CaptureFailed(format!(
            "print returned non-PDF data starting with {:?}",
            String::from_utf8_lossy(&head)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::viewer::WaitUntil;
    use serde_json::Value;
    use std::sync::Mutex;

    struct FakePage {
        failing_script_marker: Option<&'static str>,
        pdf: Vec<u8>,
        log: Mutex<Vec<String>>,
    }

    impl FakePage {
        fn new(pdf: &[u8]) -> Self {
            Self {
                failing_script_marker: None,
                pdf: pdf.to_vec(),
                log: Mutex::new(Vec::new()),
            }
        }
    }

    impl ViewerSession for FakePage {
        async fn navigate(&self, _: &str, _: WaitUntil, _: Duration) -> Result<(), ScribdError> {
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<Value, ScribdError> {
            self.log.lock().unwrap().push("evaluate".into());
            match self.failing_script_marker {
                Some(m) if script.contains(m) => Err(ScribdError::Session("boom".into())),
                _ => Ok(Value::from(1)),
            }
        }

        async fn emulate_print_media(&self) -> Result<(), ScribdError> {
            self.log.lock().unwrap().push("print_media".into());
            Ok(())
        }

        async fn print_to_pdf(&self, opts: &PrintOptions) -> Result<Vec<u8>, ScribdError> {
            assert_eq!(*opts, PrintOptions::a4());
            self.log.lock().unwrap().push("print".into());
            Ok(self.pdf.clone())
        }

        async fn pause(&self, d: Duration) {
            self.log.lock().unwrap().push(format!("pause {}", d.as_secs()));
        }
    }

    #[tokio::test]
    async fn batch_continues_past_failing_step() {
        let page = FakePage {
            failing_script_marker: Some(".document_scroller"),
            ..FakePage::new(b"%PDF-1.4")
        };
        let report = run_cleanup(&page, scripts::CLEANUP_STEPS).await;

        assert_eq!(report.steps.len(), scripts::CLEANUP_STEPS.len());
        let failed: Vec<_> = report.failed().map(|s| s.name).collect();
        assert_eq!(failed, ["unclip_containers"]);
        assert!(!report.all_ok());
        assert_eq!(
            report.degradations(),
            vec![Degradation::CleanupStepFailed {
                step: "unclip_containers".into(),
                detail: "Browser session error: boom".into(),
            }]
        );
    }

    #[tokio::test]
    async fn capture_runs_steps_in_order() {
        let page = FakePage::new(b"%PDF-1.7 body");
        let capture = capture_pdf(&page, &CaptureTiming::default()).await.unwrap();
        assert!(capture.cleanup.all_ok());
        assert_eq!(capture.pdf, b"%PDF-1.7 body");

        let log = page.log.lock().unwrap().clone();
        let n = scripts::CLEANUP_STEPS.len();
        assert!(log[..n].iter().all(|e| e == "evaluate"));
        assert_eq!(
            &log[n..],
            ["pause 2", "print_media", "evaluate", "pause 5", "print"]
        );
    }

    #[tokio::test]
    async fn empty_print_is_fatal() {
        let page = FakePage::new(b"");
        let err = capture_pdf(&page, &CaptureTiming::default()).await.unwrap_err();
        assert!(matches!(err, ScribdError::CaptureFailed(_)));
    }

    #[tokio::test]
    async fn non_pdf_print_is_fatal() {
        let page = FakePage::new(b"<html>oops</html>");
        let err = capture_pdf(&page, &CaptureTiming::default()).await.unwrap_err();
        assert!(err.to_string().contains("non-PDF"));
    }
}
