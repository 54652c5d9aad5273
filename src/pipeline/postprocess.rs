//! Post-processing: blank-page removal and compression of the printed PDF.
//!
//! ## Why is post-processing necessary?
//!
//! Printing a web viewer to paginated output is lossy in predictable ways:
//!
//! - Page elements that are slightly taller than an A4 sheet spill a few
//!   pixels onto an otherwise empty sheet.
//! - The viewer's spacer elements and placeholders print as white pages.
//! - Chromium writes every page as a separate, lightly compressed stream, so a
//!   scanned document of a few hundred pages can run to hundreds of megabytes.
//!
//! Both stages here are pure functions over an owned byte buffer and never
//! fail the download: on any error the input buffer is handed back untouched
//! together with a [`Degradation`] describing what was skipped.
//!
//! ## Blank-page heuristic
//!
//! A page is blank when its extracted text is empty after stripping all
//! whitespace, it paints no image (image XObjects, also inside form XObjects,
//! or inline images), and it strokes no line or curve (`l`, `c`, `v`, `y`).
//! This is an approximation: a page holding only filled rectangles or a
//! white image counts as non-blank or blank in ways a human might disagree
//! with. When in doubt, or when the page cannot be classified, it is kept.

use crate::error::Degradation;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Nesting limit when following form XObjects and resource parents.
const MAX_DEPTH: usize = 8;

/// Path-construction operators that draw a visible line or curve.
const VECTOR_OPERATORS: &[&str] = &["l", "c", "v", "y"];

// ── Blank-page removal ───────────────────────────────────────────────────────

/// Result of [`remove_blank_pages`].
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub pdf: Vec<u8>,
    pub removed: usize,
    pub failure: Option<Degradation>,
}

/// Drop every blank page, keeping the others in order.
///
/// Returns the input unchanged when nothing is blank, when every page is
/// blank (an empty document is never produced), or when the document cannot
/// be parsed or re-saved.
pub fn remove_blank_pages(pdf: Vec<u8>) -> Cleaned {
    match try_remove_blank_pages(&pdf) {
        Ok(Some((out, removed))) => {
            info!("Removed {} blank pages", removed);
            Cleaned {
                pdf: out,
                removed,
                failure: None,
            }
        }
        Ok(None) => Cleaned {
            pdf,
            removed: 0,
            failure: None,
        },
        Err(e) => {
            warn!("Blank-page removal failed, keeping document as is: {}", e);
            Cleaned {
                pdf,
                removed: 0,
                failure: Some(Degradation::PostProcessFailed {
                    stage: "remove_blank_pages".into(),
                    detail: e.to_string(),
                }),
            }
        }
    }
}

fn try_remove_blank_pages(bytes: &[u8]) -> Result<Option<(Vec<u8>, usize)>, lopdf::Error> {
    let mut doc = Document::load_mem(bytes)?;
    let pages = doc.get_pages();
    let total = pages.len();

    let blank: Vec<u32> = pages
        .iter()
        .filter(|&(&page_no, &page_id)| match is_blank_page(&doc, page_no, page_id) {
            Ok(blank) => {
                if blank {
                    debug!("Page {} is blank", page_no);
                }
                blank
            }
            Err(e) => {
                warn!("Could not classify page {}, keeping it: {}", page_no, e);
                false
            }
        })
        .map(|(&page_no, _)| page_no)
        .collect();

    if blank.is_empty() {
        info!("No blank pages detected");
        return Ok(None);
    }
    if blank.len() == total {
        warn!("All {} pages classify as blank, keeping document as is", total);
        return Ok(None);
    }

    doc.delete_pages(&blank);
    doc.prune_objects();
    let mut out = Vec::with_capacity(bytes.len());
    doc.save_to(&mut out)?;
    Ok(Some((out, blank.len())))
}

/// Classify one page. `page_no` is 1-based.
pub fn is_blank_page(doc: &Document, page_no: u32, page_id: ObjectId) -> Result<bool, lopdf::Error> {
    let text = doc.extract_text(&[page_no])?;
    if text.chars().any(|c| !c.is_whitespace()) {
        return Ok(false);
    }

    let content = doc.get_and_decode_page_content(page_id)?;
    let resources = page_resources(doc, page_id)?;
    Ok(!paints_anything(doc, &content, resources, 0)?)
}

/// True when `content` draws a line, a curve, or an image, directly or
/// through a form XObject.
fn paints_anything(
    doc: &Document,
    content: &Content,
    resources: Option<&Dictionary>,
    depth: usize,
) -> Result<bool, lopdf::Error> {
    for op in &content.operations {
        match op.operator.as_str() {
            o if VECTOR_OPERATORS.contains(&o) => return Ok(true),
            "BI" | "ID" | "EI" => return Ok(true),
            "Do" => {
                let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) else {
                    continue;
                };
                if xobject_paints(doc, resources, name, depth)? {
                    return Ok(true);
                }
            }
            _ => {}
        }
    }
    Ok(false)
}

fn xobject_paints(
    doc: &Document,
    resources: Option<&Dictionary>,
    name: &[u8],
    depth: usize,
) -> Result<bool, lopdf::Error> {
    let Some(resources) = resources else {
        return Ok(false);
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Ok(false);
    };
    let xobjects = resolve(doc, xobjects)?.as_dict()?;
    let Ok(target) = xobjects.get(name) else {
        return Ok(false);
    };
    let stream = resolve(doc, target)?.as_stream()?;

    match stream.dict.get(b"Subtype").and_then(|s| s.as_name()) {
        Ok(b"Image") => Ok(true),
        Ok(b"Form") if depth < MAX_DEPTH => {
            let data = if stream.dict.get(b"Filter").is_ok() {
                stream.decompressed_content()?
            } else {
                stream.content.clone()
            };
            let inner = Content::decode(&data)?;
            // A form without its own resources inherits the caller's.
            let inner_resources = match stream.dict.get(b"Resources") {
                Ok(r) => Some(resolve(doc, r)?.as_dict()?),
                Err(_) => Some(resources),
            };
            paints_anything(doc, &inner, inner_resources, depth + 1)
        }
        _ => Ok(false),
    }
}

/// The page's resource dictionary, inherited from ancestors when absent.
fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>, lopdf::Error> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_DEPTH {
        if let Ok(res) = node.get(b"Resources") {
            return Ok(Some(resolve(doc, res)?.as_dict()?));
        }
        match node.get(b"Parent").and_then(|p| p.as_reference()) {
            Ok(parent) => node = doc.get_dictionary(parent)?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> Result<&'a Object, lopdf::Error> {
    for _ in 0..MAX_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id)?,
            other => return Ok(other),
        }
    }
    Ok(obj)
}

// ── Compression ──────────────────────────────────────────────────────────────

/// A whole-document compression backend.
pub trait Compressor {
    fn name(&self) -> &'static str;
    fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>, String>;
}

/// Ghostscript `pdfwrite` re-distillation with the `/ebook` preset.
/// Downsamples images, so it shrinks scanned documents the most.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    pub executable: PathBuf,
}

impl Ghostscript {
    pub fn args(input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-sDEVICE=pdfwrite".into(),
            "-dCompatibilityLevel=1.4".into(),
            "-dPDFSETTINGS=/ebook".into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            "-dBATCH".into(),
            format!("-sOutputFile={}", output.display()),
            input.display().to_string(),
        ]
    }
}

impl Compressor for Ghostscript {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>, String> {
        let dir = tempfile::tempdir().map_err(|e| format!("tempdir: {e}"))?;
        let input = dir.path().join("input.pdf");
        let output = dir.path().join("output.pdf");
        std::fs::write(&input, pdf).map_err(|e| format!("write temp input: {e}"))?;

        let result = Command::new(&self.executable)
            .args(Self::args(&input, &output))
            .output()
            .map_err(|e| format!("failed to run {}: {e}", self.executable.display()))?;
        if !result.status.success() {
            return Err(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            ));
        }
        std::fs::read(&output).map_err(|e| format!("read temp output: {e}"))
    }
}

/// In-process stream compression with `lopdf`. Lossless and weaker than
/// Ghostscript, but always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfCompressor;

impl Compressor for LopdfCompressor {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn compress(&self, pdf: &[u8]) -> Result<Vec<u8>, String> {
        let mut doc = Document::load_mem(pdf)
            .map_err(|e| format!("Failed to parse PDF for compression: {e}"))?;
        doc.compress();
        let mut out = Vec::with_capacity(pdf.len());
        doc.save_to(&mut out)
            .map_err(|e| format!("Failed to save compressed PDF: {e}"))?;
        Ok(out)
    }
}

/// Ghostscript when installed, `lopdf` otherwise.
pub fn default_compressor() -> Box<dyn Compressor + Send> {
    match tool_locate::ghostscript() {
        Some(executable) => {
            info!("Ghostscript found at '{}'", executable.display());
            Box::new(Ghostscript { executable })
        }
        None => {
            warn!("Ghostscript not found, using lossless stream compression");
            Box::new(LopdfCompressor)
        }
    }
}

/// Result of [`compress_with`].
#[derive(Debug, Clone)]
pub struct Compressed {
    pub pdf: Vec<u8>,
    pub applied: bool,
    pub failure: Option<Degradation>,
}

/// Compress with `compressor`, returning the original bytes on any failure.
pub fn compress_with(pdf: Vec<u8>, compressor: &dyn Compressor) -> Compressed {
    let result = compressor.compress(&pdf).and_then(|out| {
        if out.starts_with(b"%PDF") {
            Ok(out)
        } else {
            Err("compressor produced no PDF".to_string())
        }
    });
    match result {
        Ok(out) => {
            info!(
                "Compressed with {}: {} -> {} bytes",
                compressor.name(),
                pdf.len(),
                out.len()
            );
            Compressed {
                pdf: out,
                applied: true,
                failure: None,
            }
        }
        Err(detail) => {
            warn!("Compression with {} failed: {}", compressor.name(), detail);
            Compressed {
                pdf,
                applied: false,
                failure: Some(Degradation::PostProcessFailed {
                    stage: format!("compress ({})", compressor.name()),
                    detail,
                }),
            }
        }
    }
}
