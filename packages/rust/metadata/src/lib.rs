//! Metadata stage: title, description, author, publication date and
//! language from a page's markup, plus a completeness score.
//!
//! Each field is resolved from the highest-priority source that has it:
//! JSON-LD structured data, then `<meta>` tags (including Open Graph),
//! then the document `<title>` element (title only).

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use pagegraph_shared::{ComponentType, MetadataConfig, Page, PipelineError, Result, StageComponent};

/// Metadata keys written by [`MetadataExtractor`].
pub const TITLE_KEY: &str = "metadata.title";
pub const DESCRIPTION_KEY: &str = "metadata.description";
pub const AUTHOR_KEY: &str = "metadata.author";
pub const PUBLISHED_KEY: &str = "metadata.published";
pub const LANGUAGE_KEY: &str = "metadata.language";
/// `{ "score": f64, "missing_fields": [..] }`
pub const QUALITY_KEY: &str = "metadata.quality";
pub const MISSING_FIELDS_KEY: &str = "metadata.missing_fields";

const MISSING_FIELD_PENALTY: f64 = 0.2;

/// Where a field value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    StructuredData,
    MetaTag,
    TitleElement,
}

/// Fields extracted from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    /// RFC 3339 when the source date parses, otherwise the raw value.
    pub published: Option<String>,
    pub language: Option<String>,
    pub title_source: Option<FieldSource>,
}

impl PageMetadata {
    /// Value of a field by its config name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => self.title.as_deref(),
            "description" => self.description.as_deref(),
            "author" => self.author.as_deref(),
            "published" | "date_published" => self.published.as_deref(),
            "language" => self.language.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});
static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("valid selector"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static HTML_ROOT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("html[lang]").expect("valid selector"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z][A-Za-z0-9-]*(\s[^<>]*)?/?>").expect("valid regex"));

/// Extract metadata fields from raw HTML.
#[instrument(skip(html), fields(bytes = html.len()))]
pub fn extract(html: &str) -> PageMetadata {
    let doc = Html::parse_document(html);
    let structured = structured_data(&doc);
    let metas = meta_tags(&doc);

    let meta = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| {
            metas
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(k))
                .map(|(_, v)| v.clone())
        })
    };

    let mut out = PageMetadata::default();

    if let Some(t) = structured.title.clone() {
        out.title = Some(t);
        out.title_source = Some(FieldSource::StructuredData);
    } else if let Some(t) = meta(&["og:title", "twitter:title"]) {
        out.title = Some(t);
        out.title_source = Some(FieldSource::MetaTag);
    } else if let Some(t) = doc
        .select(&TITLE)
        .next()
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
    {
        out.title = Some(t);
        out.title_source = Some(FieldSource::TitleElement);
    }

    out.description = structured
        .description
        .or_else(|| meta(&["description", "og:description", "twitter:description"]));
    out.author = structured
        .author
        .or_else(|| meta(&["author", "article:author", "twitter:creator"]));
    out.published = structured
        .published
        .or_else(|| meta(&["article:published_time", "date", "datepublished", "dc.date"]))
        .map(|d| normalize_date(&d));
    out.language = structured
        .language
        .or_else(|| {
            doc.select(&HTML_ROOT)
                .next()
                .and_then(|el| el.value().attr("lang"))
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
        })
        .or_else(|| meta(&["content-language", "og:locale"]));

    debug!(
        has_title = out.title.is_some(),
        has_author = out.author.is_some(),
        "metadata extracted"
    );
    out
}

/// Fields found in JSON-LD blocks. Earlier blocks win.
#[derive(Debug, Default)]
struct Structured {
    title: Option<String>,
    description: Option<String>,
    author: Option<String>,
    published: Option<String>,
    language: Option<String>,
}

fn structured_data(doc: &Html) -> Structured {
    let mut out = Structured::default();

    for script in doc.select(&LD_JSON) {
        let raw = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping malformed JSON-LD block");
                continue;
            }
        };

        let nodes = ld_nodes(&value);
        out.title = out
            .title
            .take()
            .or_else(|| nodes.iter().find_map(|n| ld_string(n, "headline")))
            .or_else(|| {
                nodes
                    .iter()
                    .filter(|n| is_content_node(n))
                    .find_map(|n| ld_string(n, "name"))
            });
        for node in nodes {
            out.description = out.description.take().or_else(|| ld_string(node, "description"));
            out.author = out.author.take().or_else(|| node.get("author").and_then(ld_author));
            out.published = out.published.take().or_else(|| ld_string(node, "datePublished"));
            out.language = out.language.take().or_else(|| ld_string(node, "inLanguage"));
        }
    }
    out
}

/// Top-level objects, arrays of objects, and `@graph` members.
fn ld_nodes(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().flat_map(ld_nodes).collect(),
        Value::Object(map) => {
            let mut nodes = vec![value];
            if let Some(graph) = map.get("@graph") {
                nodes.extend(ld_nodes(graph));
            }
            nodes
        }
        _ => Vec::new(),
    }
}

fn ld_string(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(collapse_ws)
        .filter(|s| !s.is_empty())
}

/// Whether a node's `name` can stand in for the page title.
fn is_content_node(node: &Value) -> bool {
    !matches!(
        node.get("@type").and_then(Value::as_str),
        Some("Person" | "Organization" | "WebSite" | "BreadcrumbList" | "ImageObject")
    )
}

/// `"author"` may be a string, an object with `name`, or a list of either.
fn ld_author(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(collapse_ws(s)).filter(|s| !s.is_empty()),
        Value::Object(_) => ld_string(value, "name"),
        Value::Array(items) => items.iter().find_map(ld_author),
        _ => None,
    }
}

/// `(name, content)` for every `<meta>` carrying both, keyed by `name`,
/// `property`, `itemprop` or `http-equiv`.
fn meta_tags(doc: &Html) -> Vec<(String, String)> {
    doc.select(&META)
        .filter_map(|el| {
            let attrs = el.value();
            let name = attrs
                .attr("name")
                .or_else(|| attrs.attr("property"))
                .or_else(|| attrs.attr("itemprop"))
                .or_else(|| attrs.attr("http-equiv"))?;
            let content = collapse_ws(attrs.attr("content")?);
            (!content.is_empty()).then(|| (name.trim().to_string(), content))
        })
        .collect()
}

fn normalize_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    raw.to_string()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 1.0 minus 0.2 per missing required field, clamped to `[0, 1]`.
pub fn quality_score(meta: &PageMetadata, required: &[String]) -> (f64, Vec<String>) {
    let missing: Vec<String> = required
        .iter()
        .filter(|f| meta.field(f).is_none())
        .cloned()
        .collect();
    let score = (1.0 - MISSING_FIELD_PENALTY * missing.len() as f64).clamp(0.0, 1.0);
    (score, missing)
}

// ---------------------------------------------------------------------------
// Stage component
// ---------------------------------------------------------------------------

/// Metadata-stage component.
#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor {
    required_fields: Vec<String>,
}

impl MetadataExtractor {
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            required_fields: config.required_fields.clone(),
        }
    }
}

impl StageComponent for MetadataExtractor {
    fn component_type(&self) -> ComponentType {
        ComponentType::Metadata
    }

    fn validate(&self, page: &Page) -> Result<bool> {
        if page.raw_content.trim().is_empty() {
            return Err(PipelineError::validation("page has no raw markup"));
        }
        if !TAG_RE.is_match(&page.raw_content) {
            return Err(PipelineError::validation("raw markup contains no elements"));
        }
        Ok(true)
    }

    fn process(&self, page: &mut Page) -> Result<()> {
        let meta = extract(&page.raw_content);
        let (score, missing) = quality_score(&meta, &self.required_fields);

        let fields = [
            (TITLE_KEY, &meta.title),
            (DESCRIPTION_KEY, &meta.description),
            (AUTHOR_KEY, &meta.author),
            (PUBLISHED_KEY, &meta.published),
            (LANGUAGE_KEY, &meta.language),
        ];
        for (key, value) in fields {
            if let Some(v) = value {
                page.metadata.insert(key.into(), v.clone().into());
            }
        }
        page.metadata.insert(
            QUALITY_KEY.into(),
            json!({ "score": score, "missing_fields": missing }),
        );
        page.metadata
            .insert(MISSING_FIELDS_KEY.into(), json!(missing));
        page.metrics.quality = score;

        if !missing.is_empty() {
            debug!(url = page.url(), ?missing, score, "required metadata missing");
        }
        Ok(())
    }
}
