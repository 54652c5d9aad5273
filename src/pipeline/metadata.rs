//! Metadata probe: read the declared title and page count of a document.
//!
//! One GET of the embed page, no retries. The body is not parsed as HTML;
//! the two fields sit in an inline JSON blob and are pulled out with regexes.
//! Anything going wrong here only costs the loader its page-count target, so
//! failures come back as a [`Degradation`] alongside empty metadata.

use crate::error::Degradation;
use crate::output::DocumentMetadata;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());
static RE_PAGE_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""page_count"\s*:\s*(\d+)"#).unwrap());

/// Fetch and parse the embed page at `url`.
///
/// Never fails: a transport or HTTP error yields empty metadata plus a
/// [`Degradation::MetadataUnavailable`].
pub async fn probe_metadata(
    url: &str,
    user_agent: &str,
    timeout: Duration,
) -> (DocumentMetadata, Option<Degradation>) {
    info!("Fetching document metadata from {}", url);
    match fetch_body(url, user_agent, timeout).await {
        Ok(body) => {
            let meta = parse_metadata(&body);
            if meta.expected_page_count.is_none() {
                warn!("Page count not found in embed page");
            }
            if meta.title.is_none() {
                warn!("Title not found in embed page, a default name will be used");
            }
            debug!(
                title = ?meta.title,
                pages = ?meta.expected_page_count,
                "Metadata parsed"
            );
            (meta, None)
        }
        Err(reason) => {
            warn!("Failed to fetch metadata from {}: {}", url, reason);
            (
                DocumentMetadata::default(),
                Some(Degradation::MetadataUnavailable { reason }),
            )
        }
    }
}

async fn fetch_body(url: &str, user_agent: &str, timeout: Duration) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            format!("timed out after {}s", timeout.as_secs())
        } else {
            e.to_string()
        }
    })?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }

    response.text().await.map_err(|e| e.to_string())
}

/// Extract title and page count from the raw embed page body.
///
/// The first match of each pattern wins. Titles are JSON-unescaped when the
/// capture is a valid JSON string body, and kept raw otherwise. Blank titles
/// and a page count of zero count as missing.
pub fn parse_metadata(body: &str) -> DocumentMetadata {
    let title = RE_TITLE
        .captures(body)
        .map(|c| unescape_json_string(&c[1]))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let expected_page_count = RE_PAGE_COUNT
        .captures(body)
        .and_then(|c| c[1].parse::<usize>().ok())
        .filter(|&n| n > 0);

    DocumentMetadata {
        title,
        expected_page_count,
    }
}

fn unescape_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_fields() {
        let body = r#"<script>var doc = {"id":1,"title" : "Annual Report","page_count": 42};</script>"#;
        let m = parse_metadata(body);
        assert_eq!(m.title.as_deref(), Some("Annual Report"));
        assert_eq!(m.expected_page_count, Some(42));
    }

    #[test]
    fn missing_fields_are_none() {
        let m = parse_metadata("<html><body>nothing here</body></html>");
        assert_eq!(m, DocumentMetadata::default());
    }

    #[test]
    fn first_match_wins() {
        let body = r#"{"title":"First","page_count":3} {"title":"Second","page_count":9}"#;
        let m = parse_metadata(body);
        assert_eq!(m.title.as_deref(), Some("First"));
        assert_eq!(m.expected_page_count, Some(3));
    }

    #[test]
    fn unicode_escapes_are_decoded() {
        let m = parse_metadata(r#""title":"Caf\u00e9 & Bar""#);
        assert_eq!(m.title.as_deref(), Some("Café & Bar"));
    }

    #[test]
    fn escaped_quotes_stay_in_the_title() {
        let m = parse_metadata(r#"{"title":"The \"Best\" Guide","page_count":3}"#);
        assert_eq!(m.title.as_deref(), Some(r#"The "Best" Guide"#));
        assert_eq!(m.expected_page_count, Some(3));
    }

    #[test]
    fn blank_title_and_zero_pages_ignored() {
        let m = parse_metadata(r#""title":"   ","page_count":0"#);
        assert_eq!(m, DocumentMetadata::default());
    }

    #[tokio::test]
    async fn unreachable_host_degrades() {
        // Port 9 on loopback is the discard port; nothing listens there in CI.
        let (meta, degradation) = probe_metadata(
            "http://127.0.0.1:9/embeds/1/content",
            crate::config::DEFAULT_USER_AGENT,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(meta, DocumentMetadata::default());
        assert!(matches!(
            degradation,
            Some(Degradation::MetadataUnavailable { .. })
        ));
    }
}
