//! Stage → component registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use pagegraph_shared::{ComponentType, Page, PipelineError, Result, Stage, StageComponent};

/// Components registered per stage, kept in registration order.
#[derive(Default)]
pub struct ComponentCoordinator {
    stages: BTreeMap<Stage, Vec<Arc<dyn StageComponent>>>,
}

impl std::fmt::Debug for ComponentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (stage, components) in &self.stages {
            let types: Vec<String> = components
                .iter()
                .map(|c| c.component_type().to_string())
                .collect();
            map.entry(stage, &types);
        }
        map.finish()
    }
}

impl ComponentCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `component` to `stage`.
    ///
    /// # Panics
    ///
    /// If `stage` is terminal, or a component of the same type is already
    /// registered on it.
    pub fn register(&mut self, component: Arc<dyn StageComponent>, stage: Stage) {
        assert!(
            !stage.is_terminal(),
            "cannot register a component on terminal stage {stage}"
        );
        let component_type = component.component_type();
        let registered = self.stages.entry(stage).or_default();
        assert!(
            !registered
                .iter()
                .any(|c| c.component_type() == component_type),
            "component {component_type} registered twice on stage {stage}"
        );
        debug!(%stage, component = %component_type, "component registered");
        registered.push(component);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, component: impl StageComponent + 'static, stage: Stage) -> Self {
        self.register(Arc::new(component), stage);
        self
    }

    /// Components for `stage`, in registration order.
    pub fn components(&self, stage: Stage) -> &[Arc<dyn StageComponent>] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Why `page` may not enter `stage`; empty when every component accepts it.
    ///
    /// A component's validation error becomes its diagnostic; `Ok(false)`
    /// gets a generic one.
    pub fn stage_diagnostics(&self, page: &Page, stage: Stage) -> Vec<String> {
        self.components(stage)
            .iter()
            .filter_map(|c| match c.validate(page) {
                Ok(true) => None,
                Ok(false) => Some(format!("{} rejected the page", c.component_type())),
                Err(e) => Some(format!("{}: {e}", c.component_type())),
            })
            .collect()
    }

    /// Whether every component on `stage` accepts `page`.
    pub fn validate_stage(&self, page: &Page, stage: Stage) -> bool {
        self.stage_diagnostics(page, stage).is_empty()
    }

    /// Run every component on `stage` in registration order, each on a
    /// blocking thread against a copy of `page` and bounded by `timeout`.
    ///
    /// A successful copy replaces `page` and is passed to `on_success`. The
    /// first failure stops the stage and leaves `page` as it was before the
    /// failing component ran.
    pub async fn invoke_stage(
        &self,
        page: &mut Page,
        stage: Stage,
        timeout: Duration,
        mut on_success: impl FnMut(&Page, ComponentType),
    ) -> std::result::Result<(), (ComponentType, PipelineError)> {
        for component in self.components(stage) {
            let component_type = component.component_type();
            match invoke(Arc::clone(component), page, timeout).await {
                Ok(updated) => {
                    *page = updated;
                    on_success(page, component_type);
                }
                Err(e) => return Err((component_type, e)),
            }
        }
        Ok(())
    }
}

/// Run `component` against a copy of `page` on a blocking thread.
///
/// A timed-out invocation is abandoned; its thread finishes in the
/// background and its result is dropped.
async fn invoke(
    component: Arc<dyn StageComponent>,
    page: &Page,
    timeout: Duration,
) -> Result<Page> {
    let name = component.component_type().to_string();
    let mut working = page.clone();
    let task = tokio::task::spawn_blocking(move || component.process(&mut working).map(|()| working));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(PipelineError::component(
            name,
            format!("component panicked: {join_err}"),
        )),
        Err(_) => Err(PipelineError::Timeout {
            component: name,
            after: timeout,
        }),
    }
}
