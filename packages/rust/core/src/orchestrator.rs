//! Drives a page through the stage sequence.
//!
//! Each stage: entry validation, then every registered component in order,
//! each on a blocking thread against a copy of the page and bounded by the
//! stage timeout. Failures are recorded on the page; a failure in a
//! required stage ends the run in [`Stage::Error`], a failure in an optional
//! stage moves on to the next one.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use pagegraph_shared::{
    EventStatus, Page, PageStatus, PageStore, PipelineConfig, PipelineError, ProcessingEvent,
    Result, Stage, StageSettings,
};

use crate::coordinator::ComponentCoordinator;
use crate::events::EventSystem;
use crate::state::StateManager;

/// Metadata key holding the id returned by the page store.
pub const STORED_ID_KEY: &str = "record.stored_id";

pub struct PipelineOrchestrator<S: PageStore> {
    config: Arc<PipelineConfig>,
    coordinator: Arc<ComponentCoordinator>,
    state: Arc<StateManager>,
    events: Arc<EventSystem>,
    store: Arc<S>,
}

impl<S: PageStore> Clone for PipelineOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            coordinator: Arc::clone(&self.coordinator),
            state: Arc::clone(&self.state),
            events: Arc::clone(&self.events),
            store: Arc::clone(&self.store),
        }
    }
}

/// How one stage ended.
enum StageOutcome {
    Advance,
    Fail(PipelineError),
}

impl<S: PageStore> PipelineOrchestrator<S> {
    pub fn new(
        config: Arc<PipelineConfig>,
        coordinator: ComponentCoordinator,
        events: Arc<EventSystem>,
        store: S,
    ) -> Self {
        Self {
            config,
            coordinator: Arc::new(coordinator),
            state: Arc::new(StateManager::new()),
            events,
            store: Arc::new(store),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventSystem> {
        &self.events
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one page through the pipeline.
    ///
    /// Only an unusable URL is an `Err`. Every other failure comes back as a
    /// page in [`PageStatus::Error`] with its `errors` populated.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn process_page(&self, url: &str, raw_content: impl Into<String>) -> Result<Page> {
        let mut page = Page::new(url, raw_content)?;
        self.state.track(page.id);

        if let Err(e) = page.transition_status(PageStatus::InProgress) {
            return Ok(self.fail(page, Stage::Initialize, e));
        }
        self.emit(ProcessingEvent::new(
            &page,
            Stage::Initialize,
            EventStatus::Ok,
            "processing started",
        ));
        info!(page_id = %page.id, "processing page");

        let mut stage = Stage::Initialize;
        while let Some(settings) = self.config.stages.get(stage).copied() {
            if let StageOutcome::Fail(e) = self.run_stage(&mut page, stage, settings).await {
                return Ok(self.fail(page, stage, e));
            }

            let Some(next) = stage.next() else { break };
            if let Err(e) = self.state.transition(page.id, next) {
                return Ok(self.fail(page, stage, e));
            }
            stage = next;
            if stage != Stage::Complete {
                self.emit(ProcessingEvent::new(&page, stage, EventStatus::Ok, "stage entered"));
            }
        }

        Ok(self.complete(page).await)
    }

    /// Run many pages concurrently, at most `max_concurrent_pages` at once.
    ///
    /// Results are in input order. Stages of a single page never overlap.
    pub async fn process_pages<I, U, C>(&self, inputs: I) -> Vec<Result<Page>>
    where
        I: IntoIterator<Item = (U, C)>,
        U: Into<String>,
        C: Into<String>,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_pages.max(1)));
        let mut handles = Vec::new();

        for (url, raw) in inputs {
            let (url, raw): (String, String) = (url.into(), raw.into());
            let this = self.clone();
            let sem = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::processing(format!("worker pool closed: {e}")))?;
                this.process_page(&url, raw).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::processing(format!("page task failed: {e}"))),
            });
        }
        results
    }

    // -----------------------------------------------------------------------
    // Stage execution
    // -----------------------------------------------------------------------

    async fn run_stage(&self, page: &mut Page, stage: Stage, settings: StageSettings) -> StageOutcome {
        let StageSettings {
            required,
            validation_required,
            ..
        } = settings;
        if validation_required {
            let reasons = self.coordinator.stage_diagnostics(page, stage);
            if !reasons.is_empty() {
                let err = PipelineError::validation(reasons.join("; "));
                if required {
                    return StageOutcome::Fail(err);
                }
                page.record_error(stage, None, &err);
                self.emit(
                    ProcessingEvent::new(page, stage, EventStatus::Error, format!("stage skipped: {err}"))
                        .with_meta("skipped", true),
                );
                warn!(%stage, error = %err, "optional stage skipped");
                return StageOutcome::Advance;
            }
        }

        let invoked = self
            .coordinator
            .invoke_stage(page, stage, settings.timeout(), |page, component_type| {
                self.emit(
                    ProcessingEvent::new(page, stage, EventStatus::Ok, "component finished")
                        .with_component(component_type),
                );
            })
            .await;

        if let Err((component_type, err)) = invoked {
            page.record_error(stage, Some(component_type.clone()), &err);
            self.emit(
                ProcessingEvent::new(page, stage, EventStatus::Error, err.to_string())
                    .with_component(component_type.clone()),
            );
            if required {
                return StageOutcome::Fail(err);
            }
            warn!(%stage, component = %component_type, error = %err, "optional stage failed, continuing");
        }
        StageOutcome::Advance
    }

    /// Hand the page to the store and finish in [`Stage::Complete`].
    async fn complete(&self, mut page: Page) -> Page {
        page.processed_at = Some(Utc::now());
        if let Err(e) = page.transition_status(PageStatus::Active) {
            return self.fail(page, Stage::Storage, e);
        }

        match self.store.save(&page).await {
            Ok(id) => {
                page.metadata.insert(STORED_ID_KEY.into(), id.to_string().into());
            }
            Err(e) => return self.fail(page, Stage::Storage, e),
        }

        self.emit(
            ProcessingEvent::new(&page, Stage::Complete, EventStatus::Ok, "processing complete")
                .with_meta("keywords", page.keywords.len())
                .with_meta("quality", page.metrics.quality)
                .with_snapshot(&page),
        );
        info!(
            page_id = %page.id,
            keywords = page.keywords.len(),
            quality = page.metrics.quality,
            "page complete"
        );
        self.state.remove(page.id);
        page
    }

    /// Record `err` against `stage` and end the run in [`Stage::Error`].
    fn fail(&self, mut page: Page, stage: Stage, err: PipelineError) -> Page {
        let already_recorded = page
            .errors
            .last()
            .is_some_and(|e| e.stage == stage && e.message == err.to_string());
        if !already_recorded {
            page.record_error(stage, None, &err);
        }
        if page.status() != PageStatus::Error {
            if let Err(e) = page.transition_status(PageStatus::Error) {
                warn!(page_id = %page.id, error = %e, "could not mark page as failed");
            }
        }
        if let Err(e) = self.state.transition(page.id, Stage::Error) {
            warn!(page_id = %page.id, error = %e, "could not record error stage");
        }

        self.emit(
            ProcessingEvent::new(&page, Stage::Error, EventStatus::Error, err.to_string())
                .with_meta("failed_stage", stage.as_str())
                .with_meta("error_kind", err.kind())
                .with_snapshot(&page),
        );
        warn!(page_id = %page.id, %stage, error = %err, "page failed");
        self.state.remove(page.id);
        page
    }

    fn emit(&self, event: ProcessingEvent) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use pagegraph_shared::{ComponentType, StageComponent};

    use crate::test_support::{FailingStore, MemoryStore};

    /// Records its name into the page trail; optionally fails or sleeps.
    struct Step {
        name: &'static str,
        fail: bool,
        sleep: Option<Duration>,
        valid: bool,
    }

    impl Step {
        fn ok(name: &'static str) -> Self {
            Self { name, fail: false, sleep: None, valid: true }
        }
        fn failing(name: &'static str) -> Self {
            Self { fail: true, ..Self::ok(name) }
        }
        fn sleeping(name: &'static str, d: Duration) -> Self {
            Self { sleep: Some(d), ..Self::ok(name) }
        }
        fn invalid(name: &'static str) -> Self {
            Self { valid: false, ..Self::ok(name) }
        }
    }

    impl StageComponent for Step {
        fn component_type(&self) -> ComponentType {
            ComponentType::Custom(self.name.into())
        }
        fn validate(&self, _page: &Page) -> Result<bool> {
            if self.valid {
                Ok(true)
            } else {
                Err(PipelineError::validation(format!("{} needs more", self.name)))
            }
        }
        fn process(&self, page: &mut Page) -> Result<()> {
            if let Some(d) = self.sleep {
                std::thread::sleep(d);
            }
            let trail = page
                .meta_str("trail")
                .map(|t| format!("{t},{}", self.name))
                .unwrap_or_else(|| self.name.to_string());
            page.metadata.insert("trail".into(), trail.into());
            if self.fail {
                page.metadata.insert("leaked".into(), true.into());
                return Err(PipelineError::component(self.name, "boom"));
            }
            Ok(())
        }
    }

    fn all_stages(coordinator: ComponentCoordinator) -> ComponentCoordinator {
        coordinator
            .with(Step::ok("meta"), Stage::Metadata)
            .with(Step::ok("content"), Stage::Content)
            .with(Step::ok("storage"), Stage::Storage)
    }

    fn orchestrator<S: PageStore>(
        coordinator: ComponentCoordinator,
        store: S,
    ) -> PipelineOrchestrator<S> {
        PipelineOrchestrator::new(
            Arc::new(PipelineConfig::default()),
            coordinator,
            Arc::new(EventSystem::new(false)),
            store,
        )
    }

    fn stages_of(events: &[ProcessingEvent]) -> Vec<Stage> {
        let mut stages: Vec<Stage> = Vec::new();
        for e in events {
            if stages.last() != Some(&e.stage) {
                stages.push(e.stage);
            }
        }
        stages
    }

    #[tokio::test]
    async fn happy_path_reaches_complete_and_saves() {
        let store = MemoryStore::default();
        let pipeline = orchestrator(
            all_stages(ComponentCoordinator::new()).with(Step::ok("analysis"), Stage::Analysis),
            store.clone(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Active);
        assert!(page.errors.is_empty());
        assert!(page.processed_at.is_some());
        assert_eq!(page.meta_str("trail"), Some("meta,content,analysis,storage"));
        assert_eq!(pipeline.state().get_state(page.id), None);
        assert_eq!(store.saved_urls(), vec!["https://example.com/a".to_string()]);
        assert!(page.meta_str(STORED_ID_KEY).is_some());

        let events = pipeline.events().events_for(page.id);
        assert_eq!(stages_of(&events), Stage::PIPELINE.to_vec());
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Complete);
        let snapshot = last.page.as_ref().unwrap();
        assert_eq!(snapshot.id, page.id);
        assert!(snapshot.raw_content.is_empty());
    }

    #[tokio::test]
    async fn required_component_failure_ends_in_error() {
        let pipeline = orchestrator(
            ComponentCoordinator::new()
                .with(Step::ok("meta"), Stage::Metadata)
                .with(Step::failing("content"), Stage::Content)
                .with(Step::ok("storage"), Stage::Storage),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Error);
        assert_eq!(page.errors.len(), 1);
        assert_eq!(page.errors[0].stage, Stage::Content);
        assert_eq!(page.errors[0].component, Some(ComponentType::Custom("content".into())));
        // The failed invocation's mutations are discarded.
        assert!(page.metadata.get("leaked").is_none());
        assert_eq!(page.meta_str("trail"), Some("meta"));
        assert_eq!(pipeline.state().get_state(page.id), None);
        assert!(pipeline.store().saved_urls().is_empty());

        let stages = stages_of(&pipeline.events().events_for(page.id));
        assert_eq!(
            stages,
            vec![Stage::Initialize, Stage::Metadata, Stage::Content, Stage::Error]
        );
    }

    #[tokio::test]
    async fn optional_stage_failure_still_completes() {
        let pipeline = orchestrator(
            all_stages(ComponentCoordinator::new()).with(Step::failing("analysis"), Stage::Analysis),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Active);
        assert_eq!(page.errors.len(), 1);
        assert_eq!(page.errors[0].stage, Stage::Analysis);
        let error_events: Vec<_> = pipeline
            .events()
            .events_for(page.id)
            .into_iter()
            .filter(|e| e.is_error())
            .collect();
        assert_eq!(error_events.len(), 1);
        assert_eq!(error_events[0].stage, Stage::Analysis);
    }

    #[tokio::test]
    async fn optional_stage_invalid_is_skipped_and_reported() {
        let pipeline = orchestrator(
            all_stages(ComponentCoordinator::new()).with(Step::invalid("analysis"), Stage::Analysis),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Active);
        assert_eq!(page.meta_str("trail"), Some("meta,content,storage"));
        assert_eq!(page.errors.len(), 1);
        assert!(page.errors[0].message.contains("analysis needs more"));
        let skipped = pipeline
            .events()
            .events_for(page.id)
            .into_iter()
            .find(|e| e.metadata.contains_key("skipped"));
        assert!(skipped.is_some());
    }

    #[tokio::test]
    async fn required_stage_invalid_ends_in_error() {
        let pipeline = orchestrator(
            ComponentCoordinator::new().with(Step::invalid("meta"), Stage::Metadata),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Error);
        assert_eq!(page.errors.len(), 1);
        assert_eq!(page.errors[0].kind, "validation");
        assert!(page.meta_str("trail").is_none());
    }

    #[tokio::test]
    async fn validation_can_be_disabled_per_stage() {
        let mut config = PipelineConfig::default();
        config.stages.metadata = StageSettings {
            validation_required: false,
            ..config.stages.metadata
        };
        let pipeline = PipelineOrchestrator::new(
            Arc::new(config),
            ComponentCoordinator::new().with(Step::invalid("meta"), Stage::Metadata),
            Arc::new(EventSystem::new(false)),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();
        assert_eq!(page.status(), PageStatus::Active);
        assert_eq!(page.meta_str("trail"), Some("meta"));
    }

    #[tokio::test]
    async fn component_timeout_is_a_failure() {
        let mut config = PipelineConfig::default();
        config.stages.content = StageSettings::new(0.05, true);
        let pipeline = PipelineOrchestrator::new(
            Arc::new(config),
            ComponentCoordinator::new()
                .with(Step::sleeping("content", Duration::from_millis(500)), Stage::Content),
            Arc::new(EventSystem::new(false)),
            MemoryStore::default(),
        );

        let page = pipeline
            .process_page("https://example.com/slow", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Error);
        assert_eq!(page.errors[0].kind, "timeout");
        assert!(page.meta_str("trail").is_none());
    }

    #[tokio::test]
    async fn store_failure_ends_in_error() {
        let pipeline = orchestrator(all_stages(ComponentCoordinator::new()), FailingStore);

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();

        assert_eq!(page.status(), PageStatus::Error);
        assert_eq!(page.errors.len(), 1);
        assert_eq!(page.errors[0].kind, "storage");
        let last = pipeline.events().events_for(page.id).pop().unwrap();
        assert_eq!(last.stage, Stage::Error);
        assert_eq!(last.metadata["failed_stage"], "storage");
    }

    #[tokio::test]
    async fn invalid_url_is_err() {
        let pipeline = orchestrator(ComponentCoordinator::new(), MemoryStore::default());
        assert!(pipeline.process_page("not a url", "").await.is_err());
        assert!(pipeline.events().is_empty());
    }

    #[tokio::test]
    async fn same_url_twice_is_two_fresh_runs() {
        let store = MemoryStore::default();
        let pipeline = orchestrator(all_stages(ComponentCoordinator::new()), store.clone());

        let first = pipeline.process_page("https://example.com/a", "<p>1</p>").await.unwrap();
        let second = pipeline.process_page("https://example.com/a", "<p>2</p>").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.status(), PageStatus::Active);
        assert_eq!(second.status(), PageStatus::Active);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_stop_pipeline() {
        let pipeline = orchestrator(all_stages(ComponentCoordinator::new()), MemoryStore::default());
        pipeline
            .events()
            .subscribe(|_: &ProcessingEvent| -> Result<()> { panic!("observer bug") });

        let page = pipeline
            .process_page("https://example.com/a", "<p>hi</p>")
            .await
            .unwrap();
        assert_eq!(page.status(), PageStatus::Active);
    }

    #[tokio::test]
    async fn batch_preserves_order_and_bounds_concurrency() {
        let mut config = PipelineConfig::default();
        config.max_concurrent_pages = 2;

        let running = Arc::new(Mutex::new((0usize, 0usize)));
        struct Gauge(Arc<Mutex<(usize, usize)>>);
        impl StageComponent for Gauge {
            fn component_type(&self) -> ComponentType {
                ComponentType::Custom("gauge".into())
            }
            fn validate(&self, _page: &Page) -> Result<bool> {
                Ok(true)
            }
            fn process(&self, _page: &mut Page) -> Result<()> {
                {
                    let mut g = self.0.lock().unwrap();
                    g.0 += 1;
                    g.1 = g.1.max(g.0);
                }
                std::thread::sleep(Duration::from_millis(30));
                self.0.lock().unwrap().0 -= 1;
                Ok(())
            }
        }

        let pipeline = PipelineOrchestrator::new(
            Arc::new(config),
            ComponentCoordinator::new().with(Gauge(Arc::clone(&running)), Stage::Content),
            Arc::new(EventSystem::new(false)),
            MemoryStore::default(),
        );

        let urls: Vec<String> = (0..6).map(|i| format!("https://example.com/{i}")).collect();
        let inputs: Vec<(String, String)> = urls
            .iter()
            .map(|u| (u.clone(), "<p>x</p>".to_string()))
            .chain(std::iter::once(("bad url".to_string(), String::new())))
            .collect();
        let results = pipeline.process_pages(inputs).await;

        assert_eq!(results.len(), 7);
        for (result, url) in results.iter().zip(&urls) {
            assert_eq!(result.as_ref().unwrap().url(), url.as_str());
        }
        assert!(results[6].is_err());
        assert!(running.lock().unwrap().1 <= 2);
    }

    #[tokio::test]
    async fn terminal_state_is_visible_until_its_event_is_delivered() {
        let failing = orchestrator(
            ComponentCoordinator::new().with(Step::failing("meta"), Stage::Metadata),
            MemoryStore::default(),
        );
        let ok = orchestrator(ComponentCoordinator::new(), MemoryStore::default());

        for (p, expected) in [(&failing, Stage::Error), (&ok, Stage::Complete)] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let state = Arc::clone(p.state());
            p.events().subscribe(move |e: &ProcessingEvent| -> Result<()> {
                if e.stage.is_terminal() {
                    sink.lock().unwrap().push(state.get_state(e.page_id));
                }
                Ok(())
            });

            let page = p.process_page("https://example.com/", "<p/>").await.unwrap();
            assert_eq!(*seen.lock().unwrap(), vec![Some(expected)]);
            assert_eq!(p.state().get_state(page.id), None);
        }
    }

    #[tokio::test]
    async fn batch_releases_state_and_bounds_event_log() {
        let pipeline = PipelineOrchestrator::new(
            Arc::new(PipelineConfig::default()),
            all_stages(ComponentCoordinator::new()),
            Arc::new(EventSystem::with_capacity(false, 20)),
            MemoryStore::default(),
        );

        let markup = format!("<p>{}</p>", "x".repeat(100_000));
        let inputs: Vec<(String, String)> = (0..50)
            .map(|i| (format!("https://example.com/{i}"), markup.clone()))
            .collect();
        let results = pipeline.process_pages(inputs).await;

        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|r| r.as_ref().unwrap().status() == PageStatus::Active));
        assert!(pipeline.state().is_empty());

        let events = pipeline.events().events();
        assert_eq!(events.len(), 20);
        let snapshots: Vec<_> = events.iter().filter_map(|e| e.page.as_ref()).collect();
        assert!(!snapshots.is_empty());
        assert!(snapshots.iter().all(|p| p.raw_content.is_empty()));
    }

    #[tokio::test]
    async fn initialize_and_terminal_events_per_run() {
        let pipeline = orchestrator(
            ComponentCoordinator::new().with(Step::failing("meta"), Stage::Metadata),
            MemoryStore::default(),
        );
        let ok = orchestrator(ComponentCoordinator::new(), MemoryStore::default());

        for (p, expected) in [(&pipeline, Stage::Error), (&ok, Stage::Complete)] {
            let page = p.process_page("https://example.com/", "<p/>").await.unwrap();
            let events = p.events().events_for(page.id);
            assert_eq!(events.first().unwrap().stage, Stage::Initialize);
            assert_eq!(events.last().unwrap().stage, expected);
            assert_eq!(events.iter().filter(|e| e.stage.is_terminal()).count(), 1);
        }
    }
}
