//! Authoritative current stage of every in-flight page.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use pagegraph_shared::{PageId, PipelineError, Result, Stage};

#[derive(Debug, Clone)]
struct Entry {
    stage: Stage,
    visited: Vec<Stage>,
}

/// Per-page stage table.
///
/// Reads and writes for different pages may interleave freely; a given page
/// is only ever advanced by the task processing it.
#[derive(Debug, Default)]
pub struct StateManager {
    pages: RwLock<HashMap<PageId, Entry>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `page_id` at [`Stage::Initialize`], replacing any
    /// previous entry for it.
    pub fn track(&self, page_id: PageId) {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        pages.insert(
            page_id,
            Entry {
                stage: Stage::Initialize,
                visited: vec![Stage::Initialize],
            },
        );
    }

    /// Current stage, or `None` for an untracked page.
    pub fn get_state(&self, page_id: PageId) -> Option<Stage> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.get(&page_id).map(|e| e.stage)
    }

    /// Stages recorded for `page_id`, in the order they were entered.
    pub fn history(&self, page_id: PageId) -> Vec<Stage> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages
            .get(&page_id)
            .map(|e| e.visited.clone())
            .unwrap_or_default()
    }

    /// Move `page_id` to `new_stage`.
    ///
    /// [`Stage::Error`] is always accepted. Any other target must be later
    /// than the current stage of a non-terminal page, otherwise this fails
    /// with [`PipelineError::InvalidTransition`].
    pub fn transition(&self, page_id: PageId, new_stage: Stage) -> Result<()> {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = pages.get_mut(&page_id) else {
            return Err(PipelineError::InvalidTransition {
                page_id: page_id.to_string(),
                from: "untracked".into(),
                to: new_stage.to_string(),
            });
        };

        if !entry.stage.can_advance_to(new_stage) {
            return Err(PipelineError::InvalidTransition {
                page_id: page_id.to_string(),
                from: entry.stage.to_string(),
                to: new_stage.to_string(),
            });
        }
        entry.stage = new_stage;
        entry.visited.push(new_stage);
        Ok(())
    }

    /// Stop tracking `page_id`, returning its last stage.
    pub fn remove(&self, page_id: PageId) -> Option<Stage> {
        let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
        pages.remove(&page_id).map(|e| e.stage)
    }

    /// Current stage of every tracked page.
    pub fn snapshot(&self) -> HashMap<PageId, Stage> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages.iter().map(|(id, e)| (*id, e.stage)).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
