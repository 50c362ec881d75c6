//! Page pipeline orchestration for pagegraph.
//!
//! This crate ties metadata extraction, content conversion, keyword analysis
//! and record assembly into a staged pipeline driven by
//! [`PipelineOrchestrator`], with per-page state in [`StateManager`] and an
//! observable [`EventSystem`].

pub mod capture;
pub mod components;
pub mod coordinator;
pub mod events;
pub mod orchestrator;
pub mod state;

use std::sync::Arc;

use pagegraph_content::ContentProcessor;
use pagegraph_keywords::KeywordExtractionEngine;
use pagegraph_metadata::MetadataExtractor;
use pagegraph_shared::{AppConfig, PageStore, PipelineConfig, Stage};

pub use components::{KeywordAnalysis, RecordAssembler};
pub use coordinator::ComponentCoordinator;
pub use events::{EventSubscriber, EventSystem};
pub use orchestrator::PipelineOrchestrator;
pub use state::StateManager;

/// The standard component set: metadata, content, keyword analysis and
/// record assembly on their respective stages.
pub fn default_coordinator(config: &AppConfig) -> ComponentCoordinator {
    let engine = KeywordExtractionEngine::new(config.keywords.clone(), &config.validator);
    ComponentCoordinator::new()
        .with(MetadataExtractor::new(&config.metadata), Stage::Metadata)
        .with(ContentProcessor::new(), Stage::Content)
        .with(KeywordAnalysis::new(engine), Stage::Analysis)
        .with(RecordAssembler::new(), Stage::Storage)
}

/// A pipeline over the standard components, saving into `store`.
pub fn build_pipeline<S: PageStore>(config: &AppConfig, store: S) -> PipelineOrchestrator<S> {
    let pipeline_config = PipelineConfig::from(config);
    let events = Arc::new(EventSystem::with_capacity(
        pipeline_config.event_logging_enabled,
        pipeline_config.event_log_capacity,
    ));
    PipelineOrchestrator::new(
        Arc::new(pipeline_config),
        default_coordinator(config),
        events,
        store,
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use pagegraph_shared::{Page, PageStore, PipelineError, Result, StoredId};

    /// URL-keyed in-memory store; re-saving a URL keeps its first id.
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        pages: Arc<Mutex<BTreeMap<String, (StoredId, Page)>>>,
    }

    impl MemoryStore {
        pub fn saved_urls(&self) -> Vec<String> {
            self.pages.lock().unwrap().keys().cloned().collect()
        }

        pub fn len(&self) -> usize {
            self.pages.lock().unwrap().len()
        }

        pub fn get(&self, url: &str) -> Option<Page> {
            self.pages.lock().unwrap().get(url).map(|(_, p)| p.clone())
        }
    }

    impl PageStore for MemoryStore {
        async fn save(&self, page: &Page) -> Result<StoredId> {
            let mut pages = self.pages.lock().unwrap();
            let id = pages
                .get(page.url())
                .map(|(id, _)| id.clone())
                .unwrap_or_else(|| StoredId(page.id.to_string()));
            pages.insert(page.url().to_string(), (id.clone(), page.clone()));
            Ok(id)
        }
    }

    /// Store whose every save fails.
    pub struct FailingStore;

    impl PageStore for FailingStore {
        async fn save(&self, _page: &Page) -> Result<StoredId> {
            Err(PipelineError::Storage("disk full".into()))
        }
    }
}
