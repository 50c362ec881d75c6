//! Core domain types for the page-processing pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// PageId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for page identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub Uuid);

impl PageId {
    /// Generate a new time-sortable page identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// PageStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a page record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Discovered,
    InProgress,
    Active,
    History,
    Error,
}

impl PageStatus {
    /// Whether `self -> next` is in the legal transition table.
    pub fn can_transition_to(self, next: PageStatus) -> bool {
        use PageStatus::*;
        matches!(
            (self, next),
            (Discovered, InProgress)
                | (InProgress, Active)
                | (InProgress, Error)
                | (Active, History)
                | (Active, Error)
                | (History, Active)
                | (Error, Discovered)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::InProgress => "in_progress",
            Self::Active => "active",
            Self::History => "history",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered phase of page processing.
///
/// Variant order is the pipeline order; `Error` sorts last and is reachable
/// from every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialize,
    Metadata,
    Content,
    Analysis,
    Storage,
    Complete,
    Error,
}

impl Stage {
    /// The happy-path stage sequence.
    pub const PIPELINE: [Stage; 6] = [
        Stage::Initialize,
        Stage::Metadata,
        Stage::Content,
        Stage::Analysis,
        Stage::Storage,
        Stage::Complete,
    ];

    /// The stage that follows `self` on the happy path.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Initialize => Some(Self::Metadata),
            Self::Metadata => Some(Self::Content),
            Self::Content => Some(Self::Analysis),
            Self::Analysis => Some(Self::Storage),
            Self::Storage => Some(Self::Complete),
            Self::Complete | Self::Error => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether `target` can be entered from `self`.
    pub fn can_advance_to(self, target: Stage) -> bool {
        if target == Stage::Error {
            return true;
        }
        !self.is_terminal() && target > self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Metadata => "metadata",
            Self::Content => "content",
            Self::Analysis => "analysis",
            Self::Storage => "storage",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ComponentType
// ---------------------------------------------------------------------------

/// Explicit tag carried by every stage component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Metadata,
    Content,
    Keywords,
    Record,
    Custom(String),
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata => f.write_str("metadata"),
            Self::Content => f.write_str("content"),
            Self::Keywords => f.write_str("keywords"),
            Self::Record => f.write_str("record"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Keyword relationships
// ---------------------------------------------------------------------------

/// Kind of a directed edge between two canonical keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Contains,
    Hierarchical,
    Related,
    Synonym,
    Entity,
    Custom,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Hierarchical => "hierarchical",
            Self::Related => "related",
            Self::Synonym => "synonym",
            Self::Entity => "entity",
            Self::Custom => "custom",
        }
    }
}

/// Directed edge between two canonical keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRelationship {
    pub source: String,
    pub target: String,
    pub kind: RelationshipKind,
    /// Confidence in `0.0..=1.0`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Quality and relevance metrics accumulated across stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// Metadata/record quality in `0.0..=1.0`.
    pub quality: f64,
    /// Mean accepted keyword score in `0.0..=1.0`.
    pub relevance: f64,
}

/// A failure recorded against a page while it moved through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageError {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentType>,
    /// Short error label (see [`PipelineError::kind`]).
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// The unit of work: one captured web page on its way to a knowledge record.
///
/// URL and domain are fixed at construction and never empty. Status changes
/// go through [`Page::transition_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    url: String,
    domain: String,
    /// Raw captured markup.
    #[serde(skip)]
    pub raw_content: String,
    status: PageStatus,
    pub discovered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub keywords: BTreeMap<String, f64>,
    #[serde(default)]
    pub relationships: Vec<KeywordRelationship>,
    #[serde(default)]
    pub metrics: PageMetrics,
    #[serde(default)]
    pub errors: Vec<PageError>,
}

impl Page {
    /// Create a freshly discovered page. Fails if the URL has no host.
    pub fn new(url: &str, raw_content: impl Into<String>) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| PipelineError::validation(format!("invalid URL '{url}': {e}")))?;
        let domain = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PipelineError::validation(format!("URL '{url}' has no domain")))?
            .to_string();

        let now = Utc::now();
        Ok(Self {
            id: PageId::new(),
            url: parsed.to_string(),
            domain,
            raw_content: raw_content.into(),
            status: PageStatus::Discovered,
            discovered_at: now,
            processed_at: None,
            updated_at: now,
            metadata: BTreeMap::new(),
            keywords: BTreeMap::new(),
            relationships: Vec::new(),
            metrics: PageMetrics::default(),
            errors: Vec::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    /// Move the page to `next`, enforcing the legal transition table.
    pub fn transition_status(&mut self, next: PageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(PipelineError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append an error entry for `stage`.
    pub fn record_error(
        &mut self,
        stage: Stage,
        component: Option<ComponentType>,
        error: &PipelineError,
    ) {
        self.errors.push(PageError {
            stage,
            component,
            kind: error.kind().to_string(),
            message: error.to_string(),
            at: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// A copy of the page without its raw markup.
    pub fn snapshot(&self) -> Page {
        Page {
            id: self.id,
            url: self.url.clone(),
            domain: self.domain.clone(),
            raw_content: String::new(),
            status: self.status,
            discovered_at: self.discovered_at,
            processed_at: self.processed_at,
            updated_at: self.updated_at,
            metadata: self.metadata.clone(),
            keywords: self.keywords.clone(),
            relationships: self.relationships.clone(),
            metrics: self.metrics.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Read a string field from the metadata map.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProcessingEvent
// ---------------------------------------------------------------------------

/// Outcome carried by a [`ProcessingEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Ok,
    Error,
}

/// Immutable record of a stage transition or component outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingEvent {
    pub page_id: PageId,
    pub url: String,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentType>,
    pub status: EventStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Read-only snapshot of the page, attached to terminal events.
    #[serde(skip)]
    pub page: Option<Arc<Page>>,
}

impl ProcessingEvent {
    pub fn new(page: &Page, stage: Stage, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            page_id: page.id,
            url: page.url().to_string(),
            stage,
            component: None,
            status,
            message: message.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
            page: None,
        }
    }

    pub fn with_component(mut self, component: ComponentType) -> Self {
        self.component = Some(component);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach [`Page::snapshot`] of `page`.
    pub fn with_snapshot(mut self, page: &Page) -> Self {
        self.page = Some(Arc::new(page.snapshot()));
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == EventStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_id_roundtrip() {
        let id = PageId::new();
        let parsed: PageId = id.to_string().parse().expect("parse PageId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn event_snapshot_drops_raw_markup() {
        let mut page = Page::new("https://example.com/a", "<p>big</p>").unwrap();
        page.keywords.insert("rust".into(), 0.9);
        let event = ProcessingEvent::new(&page, Stage::Complete, EventStatus::Ok, "done")
            .with_snapshot(&page);
        let snapshot = event.page.unwrap();
        assert!(snapshot.raw_content.is_empty());
        assert_eq!(snapshot.id, page.id);
        assert_eq!(snapshot.url(), page.url());
        assert_eq!(snapshot.keywords, page.keywords);
        assert_eq!(page.raw_content, "<p>big</p>");
    }

    #[test]
    fn page_requires_domain() {
        assert!(Page::new("https://example.com/a", "<html></html>").is_ok());
        assert!(Page::new("not a url", "").is_err());
        assert!(Page::new("file:///etc/hosts", "").is_err());
    }

    #[test]
    fn page_domain_from_url() {
        let page = Page::new("https://docs.example.com/guide?x=1", "").unwrap();
        assert_eq!(page.domain(), "docs.example.com");
        assert_eq!(page.status(), PageStatus::Discovered);
    }

    #[test]
    fn legal_status_transitions() {
        let mut page = Page::new("https://example.com", "").unwrap();
        page.transition_status(PageStatus::InProgress).unwrap();
        page.transition_status(PageStatus::Active).unwrap();
        page.transition_status(PageStatus::History).unwrap();
        page.transition_status(PageStatus::Active).unwrap();
        page.transition_status(PageStatus::Error).unwrap();
        page.transition_status(PageStatus::Discovered).unwrap();
    }

    #[test]
    fn illegal_status_transition_rejected() {
        let mut page = Page::new("https://example.com", "").unwrap();
        let err = page.transition_status(PageStatus::Active).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidStateTransition { .. }));
        assert_eq!(page.status(), PageStatus::Discovered);

        assert!(!PageStatus::History.can_transition_to(PageStatus::Error));
        assert!(!PageStatus::Error.can_transition_to(PageStatus::Active));
    }

    #[test]
    fn stage_order_and_reachability() {
        assert_eq!(Stage::Initialize.next(), Some(Stage::Metadata));
        assert_eq!(Stage::Storage.next(), Some(Stage::Complete));
        assert_eq!(Stage::Complete.next(), None);

        assert!(Stage::Metadata.can_advance_to(Stage::Analysis));
        assert!(!Stage::Analysis.can_advance_to(Stage::Metadata));
        assert!(!Stage::Content.can_advance_to(Stage::Content));
        assert!(!Stage::Complete.can_advance_to(Stage::Storage));
        assert!(Stage::Complete.can_advance_to(Stage::Error));
    }

    #[test]
    fn page_serialization_skips_raw_content() {
        let page = Page::new("https://example.com/x", "<html>secret</html>").unwrap();
        let json = serde_json::to_string(&page).expect("serialize");
        assert!(!json.contains("secret"));
        assert!(json.contains("\"status\":\"discovered\""));
    }

    #[test]
    fn record_error_captures_kind() {
        let mut page = Page::new("https://example.com", "").unwrap();
        page.record_error(
            Stage::Metadata,
            Some(ComponentType::Metadata),
            &PipelineError::validation("no markup"),
        );
        assert_eq!(page.errors.len(), 1);
        assert_eq!(page.errors[0].kind, "validation");
        assert_eq!(page.errors[0].stage, Stage::Metadata);
    }
}
