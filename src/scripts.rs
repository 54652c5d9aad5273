//! In-page JavaScript and CSS injected into the viewer.
//!
//! Centralising every snippet here serves two purposes:
//!
//! 1. **Single source of truth**: tweaking which elements count as chrome,
//!    or how the print stylesheet looks, means editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect the snippets without a browser,
//!    so a broken selector or a stray `const` at top level is caught early.
//!
//! Every script is a self-invoking arrow function. Repeated evaluations in
//! the same page therefore never collide on `const` declarations, and the
//! return value of the last expression is what the browser hands back.

/// Reads `{offset, document_height, viewport_height}` in CSS pixels.
pub const SCROLL_METRICS: &str = r#"(() => ({
    offset: window.scrollY,
    document_height: document.body.scrollHeight,
    viewport_height: window.innerHeight
}))()"#;

/// Fires `scroll` and `resize` on the window so the viewer re-checks which
/// pages are near the viewport. Clicking visible "load more" affordances is
/// switched on by the caller. Returns the number of buttons clicked.
pub fn lazy_load_events(click_load_more: bool) -> String {
    format!(
        r#"(() => {{
    window.dispatchEvent(new Event('scroll'));
    window.dispatchEvent(new Event('resize'));
    if (!{click_load_more}) return 0;
    let clicked = 0;
    document.querySelectorAll('button[class*="load"], [class*="more"]').forEach(btn => {{
        if (btn.offsetParent !== null) {{ btn.click(); clicked += 1; }}
    }});
    return clicked;
}})()"#
    )
}

/// Scrolls the window to an absolute vertical offset.
pub fn scroll_to(y: f64) -> String {
    format!("(() => {{ window.scrollTo(0, {y}); return window.scrollY; }})()")
}

/// Number of elements matching `selector`.
pub fn count_elements(selector: &str) -> String {
    format!(
        "(() => document.querySelectorAll({}).length)()",
        js_string(selector)
    )
}

/// Whether at least one element matches `selector`.
pub fn selector_present(selector: &str) -> String {
    format!(
        "(() => document.querySelector({}) !== null)()",
        js_string(selector)
    )
}

/// Scrolls the `index`-th element matching `selector` into view, if it
/// exists and is off-screen. Returns whether the element exists.
pub fn scroll_element_into_view(selector: &str, index: usize) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelectorAll({sel})[{index}];
    if (!el) return false;
    const r = el.getBoundingClientRect();
    if (r.bottom < 0 || r.top > window.innerHeight) {{
        el.scrollIntoView({{ block: 'center' }});
    }}
    return true;
}})()"#,
        sel = js_string(selector)
    )
}

/// Whether the `index`-th element matching `selector` contains a descendant
/// matching `child`.
pub fn child_present(selector: &str, index: usize, child: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelectorAll({sel})[{index}];
    return !!el && el.querySelector({child}) !== null;
}})()"#,
        sel = js_string(selector),
        child = js_string(child)
    )
}

/// Number of resource fetches the page has issued so far. Polled to detect
/// network quiescence: when it stops moving, the viewer is idle.
pub const RESOURCE_COUNT: &str =
    "(() => performance.getEntriesByType('resource').length)()";

/// Appends a `<style>` element with the given CSS to the document head.
pub fn inject_style(css: &str) -> String {
    format!(
        r#"(() => {{
    const style = document.createElement('style');
    style.textContent = {css};
    (document.head || document.documentElement).appendChild(style);
    return true;
}})()"#,
        css = js_string(css)
    )
}

// ── Capture cleanup ──────────────────────────────────────────────────────

/// One named, independently failable chrome-removal step.
#[derive(Debug, Clone, Copy)]
pub struct CleanupStep {
    pub name: &'static str,
    pub script: &'static str,
}

/// Ordered chrome-removal batch run before printing. Each step is safe to
/// run more than once.
pub const CLEANUP_STEPS: &[CleanupStep] = &[
    CleanupStep {
        name: "remove_chrome",
        script: r#"(() => {
    const chrome = document.querySelectorAll(
        '.toolbar_top, .toolbar_bottom, .navigation, .header, .footer, ' +
        '.sidebar, .menu, .popup, .overlay, .modal, .advertisement, ' +
        "[class*='toolbar'], [class*='nav'], [id*='toolbar'], [id*='nav']"
    );
    chrome.forEach(el => el.remove());
    return chrome.length;
})()"#,
    },
    CleanupStep {
        name: "unclip_containers",
        script: r#"(() => {
    const containers = document.querySelectorAll('.document_scroller, .outer_container, .page_container');
    containers.forEach(el => {
        el.style.overflow = 'visible';
        el.style.height = 'auto';
        el.style.maxHeight = 'none';
        el.style.margin = '0';
        el.style.padding = '0';
    });
    return containers.length;
})()"#,
    },
    CleanupStep {
        name: "reset_body",
        script: r#"(() => {
    document.body.style.margin = '0';
    document.body.style.padding = '0';
    document.body.style.height = 'auto';
    document.body.style.overflow = 'visible';
    document.documentElement.style.margin = '0';
    document.documentElement.style.padding = '0';
    return 1;
})()"#,
    },
    CleanupStep {
        name: "show_pages",
        script: r#"(() => {
    const pages = document.querySelectorAll('[class*="page"]');
    pages.forEach((page, index) => {
        page.style.display = 'block';
        page.style.visibility = 'visible';
        page.style.opacity = '1';
        page.style.margin = '0';
        page.style.padding = '0';
        page.style.pageBreakInside = 'avoid';
        page.style.pageBreakAfter = index < pages.length - 1 ? 'always' : 'auto';
    });
    return pages.length;
})()"#,
    },
];

/// Print stylesheet: zero page margins, no padding around page elements,
/// and any leftover chrome hidden.
pub const PRINT_CSS: &str = r#"
@page {
    margin: 0 !important;
    padding: 0 !important;
}

body {
    margin: 0 !important;
    padding: 0 !important;
}

[class*='page'] {
    margin: 0 !important;
    padding: 0 !important;
    page-break-inside: avoid !important;
    display: block !important;
}

.toolbar_top, .toolbar_bottom, .navigation,
.header, .footer, .sidebar {
    display: none !important;
}
"#;

/// Quote a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
