//! Pure HTML and CSS content rewriting.
//!
//! Byte-in, byte-out transformations with no I/O and no shared state: the
//! same input, hide rules and dark flag always produce the same output. HTML
//! documents get a single `<style>` block spliced right after the opening
//! `<head>` tag; stylesheets get override blocks appended after the original
//! rules so they win the cascade at equal specificity. Operating on raw bytes
//! keeps non-UTF-8 documents intact outside the spliced ASCII fragments.

// ─────────────────────────────────────────────────────────────────────────────
// Shared CSS fragments
// ─────────────────────────────────────────────────────────────────────────────

/// Dark-mode override rules shared by every tracked domain.
pub const DARK_OVERRIDE_CSS: &str = "\
:root { color-scheme: dark; }
html, body { background: #1f1f1f !important; color: #e6e6e6 !important; }
a, a:visited { color: #6fb3ff !important; }
input, textarea, select, button { background: #2b2b2b !important; color: #e6e6e6 !important; border-color: #454545 !important; }
img, video { filter: brightness(0.88); }";

/// Hides the floating feedback widgets the tracked dictionary pages overlay
/// on their content.
pub const FEEDBACK_HIDE_CSS: &str =
    "#feedback, .feedback, .feedback-entry, #b_feedback, .fb-panel { display: none !important; }";

// ─────────────────────────────────────────────────────────────────────────────
// Transformations
// ─────────────────────────────────────────────────────────────────────────────

/// Rewrites an HTML document by injecting one `<style>` block right after
/// the opening `<head>` tag. The block contains the domain hide rules, the
/// dark overrides when `dark` is set, and the feedback-widget rule, in that
/// order. A document with no head tag passes through byte-identical.
pub fn rewrite_document(input: &[u8], hide_css: &str, dark: bool) -> Vec<u8> {
    let Some(at) = head_injection_point(input) else {
        return input.to_vec();
    };
    let block = build_style_block(hide_css, dark);
    let mut out = Vec::with_capacity(input.len() + block.len());
    out.extend_from_slice(&input[..at]);
    out.extend_from_slice(block.as_bytes());
    out.extend_from_slice(&input[at..]);
    out
}

/// Rewrites a stylesheet by appending the dark overrides (when `dark` is
/// set) and the domain hide rules after the original content.
pub fn rewrite_stylesheet(input: &[u8], hide_css: &str, dark: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + DARK_OVERRIDE_CSS.len() + hide_css.len() + 2);
    out.extend_from_slice(input);
    if dark {
        out.push(b'\n');
        out.extend_from_slice(DARK_OVERRIDE_CSS.as_bytes());
    }
    out.push(b'\n');
    out.extend_from_slice(hide_css.as_bytes());
    out
}

/// The single injected `<style>` block for an HTML document.
fn build_style_block(hide_css: &str, dark: bool) -> String {
    let mut css = String::with_capacity(hide_css.len() + DARK_OVERRIDE_CSS.len() + 64);
    css.push_str(hide_css);
    if dark {
        css.push('\n');
        css.push_str(DARK_OVERRIDE_CSS);
    }
    css.push('\n');
    css.push_str(FEEDBACK_HIDE_CSS);
    format!("<style>{css}</style>")
}

/// Locates the byte offset just after the `>` closing the first `<head ...>`
/// opening tag. The match is case-insensitive and the token must be followed
/// by `>` or ASCII whitespace, so `<header>` never matches. Returns `None`
/// when no such anchor exists; the caller passes the document through
/// untouched.
fn head_injection_point(html: &[u8]) -> Option<usize> {
    const TOKEN: &[u8] = b"<head";
    let mut i = 0;
    while i + TOKEN.len() <= html.len() {
        if html[i..i + TOKEN.len()].eq_ignore_ascii_case(TOKEN) {
            match html.get(i + TOKEN.len()) {
                Some(b'>') => return Some(i + TOKEN.len() + 1),
                Some(c) if c.is_ascii_whitespace() => {
                    // Attributes present: the block goes after the tag's
                    // closing '>'.
                    let rest = &html[i + TOKEN.len()..];
                    return rest
                        .iter()
                        .position(|&b| b == b'>')
                        .map(|off| i + TOKEN.len() + off + 1);
                }
                _ => {} // `<header`, `<heading`… keep scanning
            }
        }
        i += 1;
    }
    None
}
