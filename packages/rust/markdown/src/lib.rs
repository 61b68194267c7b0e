//! XHTML-to-text normalization for package content files.
//!
//! Converts one content file's markup into a lightweight Markdown-style text
//! fragment. The conversion is a walk over the parsed DOM that dispatches on a
//! closed set of element categories; anything outside that set is unwrapped so
//! its text is never lost. Cleanup passes then settle whitespace.

mod cleanup;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};

pub use cleanup::collapse_blank_lines;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Normalize raw content-file markup into a text fragment.
///
/// 1. Strips XML/doctype preambles
/// 2. Keeps only the `<body>` region
/// 3. Converts block and inline structure (see [`Category`])
/// 4. Settles whitespace: trimmed lines, at most one blank line in a row
///
/// Returns an empty string when nothing survives. Already-normalized text is
/// returned unchanged. Decoded text that looks like a tag or an entity stays
/// escaped (`&lt;b>`, `&amp;copy;`) so it is never read back as markup.
#[instrument(level = "debug", skip_all, fields(input_len = markup.len()))]
pub fn normalize(markup: &str) -> String {
    let markup = cleanup::strip_preamble(markup);
    let body = cleanup::extract_body(&markup);
    let fragment = Html::parse_fragment(body);

    let raw = render_children(fragment.root_element(), Ctx::default());

    let text = cleanup::run_pipeline(&raw);
    debug!(raw_len = raw.len(), final_len = text.len(), "normalization complete");
    text
}

/// Count words in normalized text, excluding fenced code blocks.
pub fn count_words(text: &str) -> usize {
    let mut in_code_block = false;
    let mut count = 0;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if !in_code_block {
            count += line
                .split_whitespace()
                .filter(|w| !w.chars().all(|c| matches!(c, '#' | '-' | '>' | '*' | '|')))
                .count();
        }
    }

    count
}

// ---------------------------------------------------------------------------
// Element categories
// ---------------------------------------------------------------------------

/// The closed set of element categories the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Paragraph,
    Rule,
    Heading(usize),
    List,
    ListItem,
    Emphasis,
    Strong,
    Code,
    Preformatted,
    Blockquote,
    Abbreviation,
    LineBreak,
    Table,
    /// Non-rendered content (scripts, styles, templates).
    Hidden,
    /// Anything else: the tag is dropped and its children are kept.
    Unwrap,
}

impl Category {
    fn of(name: &str) -> Self {
        match name {
            "p" => Self::Paragraph,
            "hr" => Self::Rule,
            "h1" => Self::Heading(1),
            "h2" => Self::Heading(2),
            "h3" => Self::Heading(3),
            "h4" => Self::Heading(4),
            "h5" => Self::Heading(5),
            "h6" => Self::Heading(6),
            "ul" | "ol" => Self::List,
            "li" => Self::ListItem,
            "em" | "i" => Self::Emphasis,
            "strong" | "b" => Self::Strong,
            "code" => Self::Code,
            "pre" => Self::Preformatted,
            "blockquote" => Self::Blockquote,
            "abbr" => Self::Abbreviation,
            "br" => Self::LineBreak,
            "table" => Self::Table,
            "script" | "style" | "template" | "head" | "title" => Self::Hidden,
            _ => Self::Unwrap,
        }
    }
}

/// Rendering context inherited by descendants.
#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    /// Inside `<pre>`: text is verbatim and inline markers are suppressed.
    preformatted: bool,
}

// ---------------------------------------------------------------------------
// Tree walk
// ---------------------------------------------------------------------------

fn render_children(el: ElementRef<'_>, ctx: Ctx) -> String {
    el.children()
        .map(|child| match child.value() {
            Node::Text(text) => cleanup::escape_markup(text),
            Node::Element(_) => ElementRef::wrap(child)
                .map(|child_el| render_element(child_el, ctx))
                .unwrap_or_default(),
            // Comments, processing instructions, doctypes.
            _ => String::new(),
        })
        .collect()
}

fn render_element(el: ElementRef<'_>, ctx: Ctx) -> String {
    match Category::of(el.value().name()) {
        Category::Paragraph => format!("\n\n{}\n\n", render_children(el, ctx)),
        Category::Rule => "\n\n---\n\n".to_string(),
        Category::Heading(level) => {
            let text = single_line(&render_children(el, ctx));
            if text.is_empty() {
                return String::new();
            }
            format!("\n\n{} {text}\n\n", "#".repeat(level))
        }
        Category::List => {
            // Whitespace between items would turn a tight list into a loose one.
            let items: String = el
                .children()
                .filter_map(|child| match child.value() {
                    Node::Text(text) if !text.trim().is_empty() => {
                        Some(cleanup::escape_markup(text))
                    }
                    Node::Element(_) => ElementRef::wrap(child).map(|item| render_element(item, ctx)),
                    _ => None,
                })
                .collect();
            format!("\n\n{items}\n\n")
        }
        Category::ListItem => {
            let inner = render_children(el, ctx);
            let body = inner
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if body.is_empty() {
                return String::new();
            }
            format!("- {body}\n")
        }
        Category::Emphasis if !ctx.preformatted => {
            wrap_inline(&render_children(el, ctx), |t| format!("*{t}*"))
        }
        Category::Strong if !ctx.preformatted => {
            wrap_inline(&render_children(el, ctx), |t| format!("**{t}**"))
        }
        Category::Code if !ctx.preformatted => {
            wrap_inline(&render_children(el, ctx), |t| format!("`{t}`"))
        }
        Category::Preformatted => {
            let inner = render_children(el, Ctx { preformatted: true });
            let body = inner.trim_matches('\n');
            if body.trim().is_empty() {
                return String::new();
            }
            format!("\n\n```\n{body}\n```\n\n")
        }
        Category::Blockquote => {
            let inner = collapse_blank_lines(&render_children(el, ctx));
            let quoted = inner
                .trim()
                .lines()
                .map(|line| match line.trim() {
                    "" => ">".to_string(),
                    text => format!("> {text}"),
                })
                .collect::<Vec<_>>()
                .join("\n");
            if quoted.is_empty() {
                return String::new();
            }
            format!("\n\n{quoted}\n\n")
        }
        Category::Abbreviation => {
            let inner = render_children(el, ctx);
            match el.value().attr("title").map(str::trim).filter(|t| !t.is_empty()) {
                Some(title) => {
                    let title = cleanup::escape_markup(title);
                    wrap_inline(&inner, |t| format!("{t} ({title})"))
                }
                None => inner,
            }
        }
        Category::LineBreak => "\n".to_string(),
        Category::Table => render_table(el),
        Category::Hidden => String::new(),
        // Inline markers inside <pre> fall through to plain unwrapping.
        Category::Emphasis | Category::Strong | Category::Code | Category::Unwrap => {
            render_children(el, ctx)
        }
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Convert a `<table>` element into a pipe table.
fn render_table(table: ElementRef<'_>) -> String {
    static TR_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("tr").expect("static selector"));
    static CELL_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("th, td").expect("static selector"));

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for (i, tr) in table.select(&TR_SEL).enumerate() {
        let cells: Vec<String> = tr
            .select(&CELL_SEL)
            .map(|cell| {
                let text = cleanup::escape_markup(&cell.text().collect::<String>());
                single_line(&text).replace('|', "\\|")
            })
            .collect();
        if cells.is_empty() {
            continue;
        }
        if i == 0 && tr.child_elements().any(|c| c.value().name() == "th") {
            has_header = true;
        }
        rows.push(cells);
    }

    // Determine column count from the widest row
    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    let header = if has_header {
        rows.remove(0)
    } else {
        vec![String::new(); col_count]
    };

    let mut md = String::from("\n\n");
    md.push_str(&format!("| {} |\n", header.join(" | ")));
    md.push_str(&format!("| {} |\n", vec!["---"; col_count].join(" | ")));
    for row in &rows {
        md.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Apply an inline marker to the trimmed content, keeping surrounding
/// whitespace outside the marker.
fn wrap_inline(inner: &str, mark: impl FnOnce(&str) -> String) -> String {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return inner.to_string();
    }
    let leading = &inner[..inner.len() - inner.trim_start().len()];
    let trailing = &inner[inner.trim_end().len()..];
    format!("{leading}{}{trailing}", mark(trimmed))
}

/// Collapse all whitespace (including line breaks) to single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="en-US">
<head>
    <title>The Sisters</title>
</head>
<body epub:type="bodymatter z3998:fiction">
    <section id="the-sisters" epub:type="chapter">
        <h2 epub:type="title">The Sisters</h2>
        <p>There was no hope for him this time: it was the third stroke.</p>
        <p>Every night I said softly to myself the word <em>paralysis</em>.</p>
        <hr/>
        <p>He had a little library made up of old numbers of <i>The Union Jack</i> and <b>Pluck</b>.</p>
    </section>
</body>
</html>"#;

    #[test]
    fn normalize_chapter() {
        let text = normalize(CHAPTER);
        assert_eq!(
            text,
            "## The Sisters\n\n\
             There was no hope for him this time: it was the third stroke.\n\n\
             Every night I said softly to myself the word *paralysis*.\n\n\
             ---\n\n\
             He had a little library made up of old numbers of *The Union Jack* and **Pluck**."
        );
    }

    #[test]
    fn head_title_is_not_duplicated() {
        let text = normalize(CHAPTER);
        assert_eq!(text.matches("The Sisters").count(), 1);
    }

    #[test]
    fn output_has_no_markup_tags() {
        let text = normalize(CHAPTER);
        assert!(!text.contains('<'));
        assert!(!text.contains("xml"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            CHAPTER,
            "<body><h1>Title</h1><ul><li>one</li><li>two <em>three</em></li></ul></body>",
            "<body><blockquote><p>Quoted line.</p><p>Second.</p></blockquote><p>After</p></body>",
            "<body><pre>  fn main() {\n      body();\n  }</pre><p>x</p></body>",
            "<body><table><tr><th>Name</th><th>Age</th></tr><tr><td>Ann</td><td>3</td></tr></table></body>",
            "<body><p>line one<br/>line two</p><p><abbr title=\"Doctor\">Dr.</abbr> Who</p></body>",
        ];

        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input}");
        }
    }

    #[test]
    fn headings_use_atx_levels() {
        let text = normalize("<body><h1>One</h1><h3>  Three\n  lines </h3><h6>Six</h6></body>");
        assert_eq!(text, "# One\n\n### Three lines\n\n###### Six");
    }

    #[test]
    fn lists_use_hyphen_markers() {
        let html = "<body><ul>\n  <li>Item one</li>\n  <li>Item two</li>\n</ul><ol><li>First</li></ol></body>";
        assert_eq!(normalize(html), "- Item one\n- Item two\n\n- First");
    }

    #[test]
    fn blockquote_lines_are_prefixed() {
        let html = "<body><blockquote><p>To be.</p><p>Or not.</p></blockquote></body>";
        assert_eq!(normalize(html), "> To be.\n>\n> Or not.");
    }

    #[test]
    fn inline_code_and_pre() {
        let html = "<body><p>Call <code>run()</code> now.</p><pre><code>let x = 1;\n    x + 1</code></pre></body>";
        assert_eq!(
            normalize(html),
            "Call `run()` now.\n\n```\nlet x = 1;\n    x + 1\n```"
        );
    }

    #[test]
    fn abbreviation_with_title() {
        assert_eq!(
            normalize("<body><p><abbr title=\"Mister\">Mr.</abbr> Duffy</p></body>"),
            "Mr. (Mister) Duffy"
        );
        assert_eq!(
            normalize("<body><p><abbr>Mr.</abbr> Duffy</p></body>"),
            "Mr. Duffy"
        );
    }

    #[test]
    fn unknown_elements_are_unwrapped_not_dropped() {
        let html = "<body><article><div><span epub:type=\"z3998:roman\">XIV</span> <custom-tag>kept text</custom-tag></div></article></body>";
        assert_eq!(normalize(html), "XIV kept text");
    }

    #[test]
    fn scripts_and_styles_are_dropped() {
        let html = "<body><style>p { color: red; }</style><p>Visible</p><script>var x = 1;</script></body>";
        assert_eq!(normalize(html), "Visible");
    }

    #[test]
    fn emphasis_keeps_whitespace_outside_markers() {
        assert_eq!(normalize("<body><p>a<em> b </em>c</p></body>"), "a *b* c");
    }

    #[test]
    fn tables_become_pipe_tables() {
        let html = "<body><table><tr><th>Name</th><th>Value</th></tr><tr><td>foo</td><td>bar</td></tr></table></body>";
        assert_eq!(
            normalize(html),
            "| Name | Value |\n| --- | --- |\n| foo | bar |"
        );
    }

    #[test]
    fn self_closing_head_elements_keep_body() {
        let title = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title/><link href="core.css" rel="stylesheet" type="text/css"/></head>
<body><p>Chapter text here.</p></body></html>"#;
        assert_eq!(normalize(title), "Chapter text here.");

        let script = r#"<html xmlns="http://www.w3.org/1999/xhtml"><head><script src="a.js"/></head>
<body><section><p>Chapter text here.</p><p>And more.</p></section></body></html>"#;
        assert_eq!(normalize(script), "Chapter text here.\n\nAnd more.");
    }

    #[test]
    fn escaped_markup_in_text_stays_escaped() {
        let once = normalize("<body><p>1 &lt;b&gt;x&lt;/b&gt; and &amp;copy;</p></body>");
        assert_eq!(once, "1 &lt;b>x&lt;/b> and &amp;copy;");
        assert_eq!(normalize(&once), once);
        assert!(!normalize(&once).contains("<b>"));
    }

    #[test]
    fn five_line_breaks_collapse_to_two() {
        assert_eq!(normalize("Alpha\n\n\n\n\nBeta"), "Alpha\n\nBeta");
    }

    #[test]
    fn empty_body_yields_empty_fragment() {
        assert_eq!(normalize("<html><head><title>Only head</title></head><body>  </body></html>"), "");
        assert_eq!(normalize("<body><p></p><hr/></body>"), "---");
    }

    #[test]
    fn count_words_skips_markers_and_code() {
        let text = "# Title\n\nOne two three.\n\n```\nnot counted here\n```\n\n- four";
        assert_eq!(count_words(text), 5);
    }
}
