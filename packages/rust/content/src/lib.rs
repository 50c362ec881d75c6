//! Content stage: isolate a page's main content and derive Markdown and
//! plain text from it.
//!
//! HTML is converted with `htmd` after page chrome is removed, tidied by a
//! few Markdown passes, then reduced to plain text for keyword analysis.

mod cleanup;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use pagegraph_shared::{ComponentType, Page, PipelineError, Result, StageComponent};

/// Metadata keys written by [`ContentProcessor`].
pub const MARKDOWN_KEY: &str = "content.markdown";
pub const TEXT_KEY: &str = "content.text";
pub const WORD_COUNT_KEY: &str = "content.word_count";
pub const HASH_KEY: &str = "content.hash";
pub const HEADING_KEY: &str = "content.heading";

/// Main-content containers, most specific first.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]", "#content", ".content"];

/// Elements never treated as content.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg", "form",
];

/// Derived representations of a page's main content.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedContent {
    pub markdown: String,
    pub text: String,
    pub word_count: usize,
    /// Hex SHA-256 of `markdown`.
    pub hash: String,
    /// First top-level heading, if any.
    pub heading: Option<String>,
}

/// Convert raw markup into Markdown and plain text.
#[instrument(skip(html), fields(bytes = html.len()))]
pub fn convert(html: &str, source_url: Option<&str>) -> Result<ConvertedContent> {
    let content_html = main_content_html(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(CHROME_TAGS.to_vec())
        .build();
    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| PipelineError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base_url = source_url.and_then(|u| Url::parse(u).ok());
    let markdown = cleanup::tidy_markdown(&raw_markdown, base_url.as_ref());
    let text = cleanup::to_plain_text(&markdown);
    let word_count = cleanup::count_words(&text);
    let heading = markdown
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|h| h.trim().to_string());

    debug!(markdown_len = markdown.len(), word_count, "content converted");

    Ok(ConvertedContent {
        hash: compute_hash(&markdown),
        markdown,
        text,
        word_count,
        heading,
    })
}

fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Inner HTML of the first main-content container, falling back to `<body>`.
fn main_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    CONTENT_SELECTORS
        .iter()
        .chain(std::iter::once(&"body"))
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next().map(|el| el.inner_html()))
        .unwrap_or_else(|| html.to_string())
}

// ---------------------------------------------------------------------------
// Stage component
// ---------------------------------------------------------------------------

/// Content-stage component. Requires raw markup on the page.
#[derive(Debug, Clone, Default)]
pub struct ContentProcessor;

impl ContentProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl StageComponent for ContentProcessor {
    fn component_type(&self) -> ComponentType {
        ComponentType::Content
    }

    fn validate(&self, page: &Page) -> Result<bool> {
        if page.raw_content.trim().is_empty() {
            return Err(PipelineError::validation("page has no raw content"));
        }
        Ok(true)
    }

    fn process(&self, page: &mut Page) -> Result<()> {
        let converted = convert(&page.raw_content, Some(page.url()))?;

        page.metadata
            .insert(MARKDOWN_KEY.into(), converted.markdown.into());
        page.metadata.insert(TEXT_KEY.into(), converted.text.into());
        page.metadata
            .insert(WORD_COUNT_KEY.into(), converted.word_count.into());
        page.metadata.insert(HASH_KEY.into(), converted.hash.into());
        if let Some(heading) = converted.heading {
            page.metadata.insert(HEADING_KEY.into(), heading.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_main_content_and_strips_chrome() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Rust Guide</h1><p>Ownership keeps <strong>memory</strong> safe.</p></main>
            <footer><p>Copyright 2024</p></footer>
        </body></html>"#;

        let c = convert(html, Some("https://example.com/guide")).unwrap();
        assert!(c.markdown.contains("# Rust Guide"));
        assert!(c.text.contains("Ownership keeps memory safe."));
        assert!(!c.markdown.contains("Copyright"));
        assert!(!c.text.contains("Home"));
        assert_eq!(c.heading.as_deref(), Some("Rust Guide"));
        assert_eq!(c.word_count, 6);
    }

    #[test]
    fn falls_back_to_body() {
        let html = "<html><body><h2>Notes</h2><p>Plain body text.</p></body></html>";
        let c = convert(html, None).unwrap();
        assert!(c.text.contains("Plain body text."));
        assert!(c.heading.is_none());
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = convert("<main><p>alpha</p></main>", None).unwrap();
        let b = convert("<main><p>alpha</p></main>", None).unwrap();
        let c = convert("<main><p>beta</p></main>", None).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn code_blocks_excluded_from_text() {
        let html = r#"<main><p>Intro words here.</p><pre><code>let x = compute();</code></pre></main>"#;
        let c = convert(html, None).unwrap();
        assert!(c.markdown.contains("compute()"));
        assert!(!c.text.contains("compute"));
    }

    #[test]
    fn component_writes_metadata() {
        let mut page = Page::new(
            "https://example.com/a",
            "<main><h1>Title</h1><p>Body text.</p></main>",
        )
        .unwrap();
        let processor = ContentProcessor::new();
        assert!(processor.validate(&page).unwrap());
        processor.process(&mut page).unwrap();

        assert!(page.meta_str(MARKDOWN_KEY).unwrap().contains("Body text."));
        assert!(page.meta_str(TEXT_KEY).unwrap().contains("Body text."));
        assert_eq!(page.metadata[WORD_COUNT_KEY], serde_json::json!(3));
        assert!(page.meta_str(HASH_KEY).is_some());
        assert_eq!(page.meta_str(HEADING_KEY), Some("Title"));
    }

    #[test]
    fn validate_rejects_empty_markup() {
        let page = Page::new("https://example.com/a", "   ").unwrap();
        let err = ContentProcessor::new().validate(&page).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }
}
