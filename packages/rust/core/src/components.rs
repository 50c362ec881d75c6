//! Analysis and storage stage components.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use pagegraph_content::{HASH_KEY, TEXT_KEY};
use pagegraph_keywords::KeywordExtractionEngine;
use pagegraph_metadata::{DESCRIPTION_KEY, QUALITY_KEY, TITLE_KEY};
use pagegraph_shared::{ComponentType, Page, PipelineError, Result, StageComponent};

/// Metadata keys written by [`KeywordAnalysis`].
pub const KEYWORD_DETAILS_KEY: &str = "keywords.details";
pub const KEYWORD_COUNT_KEY: &str = "keywords.count";

/// Metadata keys written by [`RecordAssembler`].
pub const COVERAGE_KEY: &str = "record.keyword_coverage";
pub const ASSEMBLED_AT_KEY: &str = "record.assembled_at";

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Analysis-stage component: keyword extraction over title, description and
/// body text.
pub struct KeywordAnalysis {
    engine: KeywordExtractionEngine,
}

impl KeywordAnalysis {
    pub fn new(engine: KeywordExtractionEngine) -> Self {
        Self { engine }
    }
}

/// Title, description and body joined so each starts a new sentence.
fn analysis_text(page: &Page) -> String {
    let mut parts: Vec<String> = Vec::new();
    for key in [TITLE_KEY, DESCRIPTION_KEY, TEXT_KEY] {
        let Some(value) = page.meta_str(key).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        if value.ends_with(['.', '!', '?']) || key == TEXT_KEY {
            parts.push(value.to_string());
        } else {
            parts.push(format!("{value}."));
        }
    }
    parts.join("\n")
}

impl StageComponent for KeywordAnalysis {
    fn component_type(&self) -> ComponentType {
        ComponentType::Keywords
    }

    fn validate(&self, page: &Page) -> Result<bool> {
        match page.meta_str(TEXT_KEY) {
            Some(text) if !text.trim().is_empty() => Ok(true),
            _ => Err(PipelineError::validation("page has no content text")),
        }
    }

    fn process(&self, page: &mut Page) -> Result<()> {
        let text = analysis_text(page);
        let keywords = self.engine.extract(&text)?;

        page.keywords = keywords.iter().map(|k| (k.text.clone(), k.score)).collect();
        page.relationships = KeywordExtractionEngine::relationships(&keywords);
        page.metrics.relevance = if keywords.is_empty() {
            0.0
        } else {
            keywords.iter().map(|k| k.score).sum::<f64>() / keywords.len() as f64
        };

        let details = serde_json::to_value(&keywords)
            .map_err(|e| PipelineError::processing(format!("keyword serialization failed: {e}")))?;
        page.metadata.insert(KEYWORD_DETAILS_KEY.into(), details);
        page.metadata
            .insert(KEYWORD_COUNT_KEY.into(), keywords.len().into());

        debug!(
            url = page.url(),
            keywords = keywords.len(),
            relationships = page.relationships.len(),
            relevance = page.metrics.relevance,
            "page analysed"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Keyword count at which coverage saturates.
const TARGET_KEYWORDS: usize = 5;
/// Weight of metadata quality in the final record quality.
const METADATA_WEIGHT: f64 = 0.8;

/// Storage-stage component: checks the record is storable and finalises
/// its quality.
#[derive(Debug, Clone, Default)]
pub struct RecordAssembler;

impl RecordAssembler {
    pub fn new() -> Self {
        Self
    }
}

impl StageComponent for RecordAssembler {
    fn component_type(&self) -> ComponentType {
        ComponentType::Record
    }

    fn validate(&self, page: &Page) -> Result<bool> {
        if page.url().is_empty() || page.domain().is_empty() {
            return Err(PipelineError::validation("record has no URL or domain"));
        }
        if page.meta_str(HASH_KEY).is_none() {
            return Err(PipelineError::validation("record has no content hash"));
        }
        Ok(true)
    }

    fn process(&self, page: &mut Page) -> Result<()> {
        let metadata_quality = page
            .metadata
            .get(QUALITY_KEY)
            .and_then(|q| q["score"].as_f64())
            .unwrap_or(page.metrics.quality);
        let coverage = (page.keywords.len() as f64 / TARGET_KEYWORDS as f64).min(1.0);

        page.metrics.quality = (METADATA_WEIGHT * metadata_quality
            + (1.0 - METADATA_WEIGHT) * coverage)
            .clamp(0.0, 1.0);
        page.metadata.insert(COVERAGE_KEY.into(), json!(coverage));
        page.metadata
            .insert(ASSEMBLED_AT_KEY.into(), json!(Utc::now().to_rfc3339()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagegraph_shared::{KeywordConfig, ValidatorConfig};

    fn analysis() -> KeywordAnalysis {
        KeywordAnalysis::new(KeywordExtractionEngine::new(
            KeywordConfig::default(),
            &ValidatorConfig::default(),
        ))
    }

    #[test]
    fn analysis_text_terminates_short_fields() {
        let mut page = Page::new("https://example.com/", "").unwrap();
        page.metadata.insert(TITLE_KEY.into(), json!("Deep Learning"));
        page.metadata
            .insert(DESCRIPTION_KEY.into(), json!("An overview!"));
        page.metadata.insert(TEXT_KEY.into(), json!("Body text"));
        assert_eq!(analysis_text(&page), "Deep Learning.\nAn overview!\nBody text");
    }

    #[test]
    fn analysis_writes_keywords_and_relevance() {
        let mut page = Page::new("https://example.com/nn", "").unwrap();
        page.metadata.insert(
            TEXT_KEY.into(),
            json!("Neural networks and deep learning are reshaping machine learning research."),
        );

        let component = analysis();
        assert!(component.validate(&page).unwrap());
        component.process(&mut page).unwrap();

        for expected in ["neural networks", "deep learning", "machine learning"] {
            assert!(page.keywords.contains_key(expected), "missing {expected}");
        }
        assert!(!page.keywords.contains_key("research"));
        assert!(page.metrics.relevance > 0.0 && page.metrics.relevance <= 1.0);
        assert_eq!(page.metadata[KEYWORD_COUNT_KEY], json!(page.keywords.len()));
        assert!(page.relationships.iter().all(|r| page.keywords.contains_key(&r.source)));
    }

    #[test]
    fn analysis_requires_text() {
        let page = Page::new("https://example.com/", "<p></p>").unwrap();
        let err = analysis().validate(&page).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn assembler_blends_quality() {
        let mut page = Page::new("https://example.com/", "").unwrap();
        assert!(RecordAssembler::new().validate(&page).is_err());

        page.metadata.insert(HASH_KEY.into(), json!("abc"));
        page.metadata.insert(
            QUALITY_KEY.into(),
            json!({ "score": 0.8, "missing_fields": ["title"] }),
        );
        page.keywords.insert("rust".into(), 0.9);
        page.keywords.insert("ownership".into(), 0.7);

        let assembler = RecordAssembler::new();
        assert!(assembler.validate(&page).unwrap());
        assembler.process(&mut page).unwrap();

        // 0.8 * 0.8 + 0.2 * (2 / 5)
        assert!((page.metrics.quality - 0.72).abs() < 1e-9);
        assert_eq!(page.metadata[COVERAGE_KEY], json!(0.4));
    }
}
