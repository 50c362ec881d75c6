//! Post-conversion passes over Markdown, and Markdown → plain text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Tidy converter output into stable Markdown.
pub(crate) fn tidy_markdown(md: &str, base_url: Option<&Url>) -> String {
    let mut result = strip_leftover_html(md);
    result = resolve_links(&result, base_url);
    result = trim_line_ends(&result);
    result = collapse_blank_lines(&result);
    let trimmed = result.trim_matches('\n');
    format!("{trimmed}\n")
}

/// Reduce Markdown to the prose a reader sees, one block per line.
///
/// Code blocks are dropped entirely; link and image syntax keep only the
/// visible text.
pub(crate) fn to_plain_text(md: &str) -> String {
    let without_code = drop_code_blocks(md);
    let unwrapped = unwrap_links(&without_code);
    let lines: Vec<String> = unwrapped
        .lines()
        .filter(|l| !is_table_rule(l))
        .map(strip_line_markup)
        .filter(|l| !l.is_empty())
        .collect();
    lines.join("\n")
}

pub(crate) fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}

// ---------------------------------------------------------------------------
// Markdown passes
// ---------------------------------------------------------------------------

/// Remove block-level HTML wrappers that survived conversion, outside code fences.
fn strip_leftover_html(md: &str) -> String {
    static WRAPPER_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|main)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                WRAPPER_TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Make relative link targets absolute against the page URL.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    let Some(base) = base_url else {
        return md.to_string();
    };

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let (bang, text, href) = (&caps[1], &caps[2], &caps[3]);
            let absolute = href.contains("://") || href.starts_with('#') || href.starts_with("mailto:");
            match base.join(href) {
                Ok(resolved) if !absolute => format!("{bang}[{text}]({resolved})"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// At most one empty line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
    BLANKS_RE.replace_all(md, "\n\n").into_owned()
}

// ---------------------------------------------------------------------------
// Plain-text passes
// ---------------------------------------------------------------------------

fn drop_code_blocks(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
    static INLINE_CODE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`[^`\n]*`").expect("valid regex"));

    let no_fences = FENCE_RE.replace_all(md, "\n");
    INLINE_CODE_RE.replace_all(&no_fences, "").into_owned()
}

fn unwrap_links(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));

    let no_images = IMAGE_RE.replace_all(md, "$1");
    LINK_RE.replace_all(&no_images, "$1").into_owned()
}

fn is_table_rule(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Strip heading markers, list bullets, quotes, emphasis and table pipes.
fn strip_line_markup(line: &str) -> String {
    static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^\s*(?:#{1,6}\s+|>\s*|[-*+]\s+|\d+[.)]\s+)+").expect("valid regex")
    });
    static EMPHASIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\*\*|__|\*|_|~~)([^*_~]+)(\*\*|__|\*|_|~~)").expect("valid regex"));

    let line = PREFIX_RE.replace(line, "");
    let line = EMPHASIS_RE.replace_all(&line, "$2");
    let cells: Vec<&str> = line
        .split('|')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    cells.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
