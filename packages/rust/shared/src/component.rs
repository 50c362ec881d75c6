//! Interfaces implemented by pluggable pipeline collaborators.

use std::future::Future;

use crate::error::Result;
use crate::types::{ComponentType, Page};

/// A pluggable unit of logic bound to one pipeline stage.
///
/// `validate` returning `Ok(false)` or `Err(PipelineError::Validation)` both
/// mean the page is not eligible for the stage; the coordinator folds the
/// error into `false` and keeps its message as the diagnostic.
pub trait StageComponent: Send + Sync {
    /// Explicit tag identifying this component.
    fn component_type(&self) -> ComponentType;

    /// Check the page satisfies this component's entry precondition.
    fn validate(&self, page: &Page) -> Result<bool>;

    /// Enrich the page in place.
    fn process(&self, page: &mut Page) -> Result<()>;
}

/// Opaque identifier returned by the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredId(pub String);

impl std::fmt::Display for StoredId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Narrow save interface to the graph store.
///
/// Saving the same page (same URL) more than once must not create duplicates.
pub trait PageStore: Send + Sync + 'static {
    fn save(&self, page: &Page) -> impl Future<Output = Result<StoredId>> + Send;
}
