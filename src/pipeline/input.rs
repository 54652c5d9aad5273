//! Input resolution: turn a user-supplied URL or id into a [`DocumentTarget`],
//! and turn a document title into a safe file name.
//!
//! ## Why go through the embed URL?
//!
//! Every document page on the platform (`/document/{id}/slug`,
//! `/doc/{id}`, shared links with query strings) has the same embed view at
//! `/embeds/{id}/content`. The embed view carries no login wall and no
//! recommendation rail, so the loader only has to deal with page elements.

use crate::error::ScribdError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

static ID_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:document|embeds)/(\d+)").unwrap());

static ILLEGAL_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// File extension of every downloaded artifact.
pub const OUTPUT_EXTENSION: &str = "pdf";

/// A resolved document: its numeric id and the viewer URL to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
    pub id: String,
    pub source_url: String,
}

impl DocumentTarget {
    /// Title used when the metadata probe finds none.
    pub fn default_title(&self) -> String {
        format!("scribd_document_{}", self.id)
    }
}

/// Embed view URL for a document id.
pub fn embed_url(id: &str) -> String {
    format!("https://www.scribd.com/embeds/{id}/content")
}

/// Resolve a URL or bare numeric id.
///
/// Accepts anything containing `document/<digits>` or `embeds/<digits>`,
/// or a string made only of ASCII digits. Surrounding whitespace is ignored.
pub fn resolve_target(input: &str) -> Result<DocumentTarget, ScribdError> {
    let trimmed = input.trim();

    let id = if let Some(caps) = ID_IN_URL.captures(trimmed) {
        caps[1].to_string()
    } else if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        return Err(ScribdError::InvalidInput {
            input: input.to_string(),
        });
    };

    debug!("Resolved document id {} from '{}'", id, input);
    Ok(DocumentTarget {
        source_url: embed_url(&id),
        id,
    })
}

/// Strip characters that are illegal in file names on common platforms.
///
/// Removes `\ / * ? : " < > |`, trims surrounding whitespace, and falls back
/// to `untitled` when nothing is left. Applying it twice changes nothing.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = ILLEGAL_FILENAME_CHARS.replace_all(name, "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{dir}/{sanitize(title)}.pdf`
pub fn output_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize_filename(title), OUTPUT_EXTENSION))
}
