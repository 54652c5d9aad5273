//! Pipeline stages for downloading a document as PDF.
//!
//! Each submodule implements one step. The browser-facing stages are generic
//! over [`viewer::ViewerSession`], so the loader and the capture step run
//! against a simulated viewer in tests and against Chromium in production.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ metadata ──▶ browser ──▶ loader ──▶ capture ──▶ postprocess
//! (URL/id)   (embed     (Chromium)  (scroll    (print     (blank pages,
//!             page)                  until      to PDF)    compression)
//!                                    complete)
//! ```
//!
//! 1. [`input`]: resolve the user-supplied URL or id to a [`input::DocumentTarget`]
//!    and derive the output file name
//! 2. [`metadata`]: one HTTP request for the declared title and page count;
//!    never fatal
//! 3. [`browser`]: launch Chromium and implement [`viewer::ViewerSession`] on
//!    top of the DevTools protocol
//!    ([`network`] tracks its in-flight requests for quiescence waits)
//! 4. [`loader`]: the page-completeness controller; scrolls until every page
//!    is attached and rendered, or its budgets run out
//! 5. [`capture`]: strip the viewer's chrome and print the page
//! 6. [`postprocess`]: pure transforms over the PDF bytes; run in
//!    `spawn_blocking` because `lopdf` and Ghostscript are blocking

pub mod browser;
pub mod capture;
pub mod input;
pub mod loader;
pub mod metadata;
pub mod network;
pub mod postprocess;
pub mod viewer;
