//! Text passes applied around the structural conversion.
//!
//! Each pass is a function `&str -> String`. The output of [`run_pipeline`] is
//! a fixed point of [`run_pipeline`], which is what makes normalization
//! idempotent.

use std::sync::LazyLock;

use regex::Regex;

/// Run the post-conversion cleanup passes.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = normalize_whitespace(md);
    result = collapse_blank_lines(&result);
    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pre-pass: strip preambles
// ---------------------------------------------------------------------------

/// Remove XML declarations, processing instructions and doctype declarations.
pub(crate) fn strip_preamble(markup: &str) -> String {
    static PI_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)<\?.*?\?>").expect("valid regex"));
    static DOCTYPE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").expect("valid regex"));

    let without_pi = PI_RE.replace_all(markup, "");
    DOCTYPE_RE.replace_all(&without_pi, "").to_string()
}

/// Cut out the content of the `<body>` element.
///
/// Runs before any HTML parsing: an XHTML head may hold self-closing
/// `<title/>` or `<script/>` tags, which an HTML parser reads as unterminated
/// and which would then swallow the rest of the file. Without a closing tag
/// everything after `<body>` is kept; without a body the markup is returned
/// as is.
pub(crate) fn extract_body(markup: &str) -> &str {
    static OPEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)<body(?:\s[^>]*|/)?>").expect("valid regex"));
    static CLOSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("valid regex"));

    let Some(open) = OPEN_RE.find(markup) else {
        return markup;
    };
    if open.as_str().ends_with("/>") {
        return "";
    }
    let rest = &markup[open.end()..];
    match CLOSE_RE.find_iter(rest).last() {
        Some(close) => &rest[..close.start()],
        None => rest,
    }
}

/// Re-escape decoded text that would parse as markup or as an entity.
///
/// `<` before a tag-like character and `&` before an entity-like name become
/// `&lt;` and `&amp;`. Everything else (`a < b`, `AT&T`) is left readable.
/// Parsing the escaped form yields the same text again, so a second
/// normalization reproduces the first.
pub(crate) fn escape_markup(text: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<([A-Za-z/!?])").expect("valid regex"));
    static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"&(#|[A-Za-z][A-Za-z0-9]*;|(?:amp|lt|gt|quot|nbsp|copy|reg)\b)")
            .expect("valid regex")
    });

    if !text.contains(['<', '&']) {
        return text.to_string();
    }
    let escaped = ENTITY_RE.replace_all(text, "&amp;$1");
    TAG_RE.replace_all(&escaped, "&lt;$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim every line and collapse runs of horizontal whitespace to one space.
///
/// Lines inside fenced code blocks are left alone.
fn normalize_whitespace(md: &str) -> String {
    static HSPACE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

    let mut lines: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for line in md.split('\n') {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(line.trim().to_string());
            continue;
        }

        if in_code_block {
            lines.push(line.trim_end_matches('\r').to_string());
            continue;
        }

        let collapsed = HSPACE_RE.replace_all(line, " ");
        lines.push(collapsed.trim().to_string());
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ line breaks into exactly 2.
pub fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
