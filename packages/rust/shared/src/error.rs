//! Error types for the page-processing pipeline.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stage's entry precondition failed.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A stage component's processing logic failed.
    #[error("component error in {component}: {message}")]
    Component { component: String, message: String },

    /// A requested page-status change is not in the legal transition table.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A requested stage change is not forward-reachable.
    #[error("invalid stage transition for page {page_id}: {from} -> {to}")]
    InvalidTransition {
        page_id: String,
        from: String,
        to: String,
    },

    /// Keyword extraction or validation failure.
    #[error("processing error: {0}")]
    Processing(String),

    /// A component invocation exceeded its stage timeout.
    #[error("component {component} timed out after {after:?}")]
    Timeout { component: String, after: Duration },

    /// Graph store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP error while capturing a page.
    #[error("network error: {0}")]
    Network(String),

    /// Markup or structured-data parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a component error tagged with the failing component.
    pub fn component(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a processing error from any displayable message.
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable label, stored on page error entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
            Self::Validation { .. } => "validation",
            Self::Component { .. } => "component",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Processing(_) => "processing",
            Self::Timeout { .. } => "timeout",
            Self::Storage(_) => "storage",
            Self::Network(_) => "network",
            Self::Parse { .. } => "parse",
            Self::Conversion(_) => "conversion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PipelineError::config("missing stage table");
        assert_eq!(err.to_string(), "config error: missing stage table");

        let err = PipelineError::InvalidStateTransition {
            from: "discovered".into(),
            to: "active".into(),
        };
        assert!(err.to_string().contains("discovered -> active"));
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(PipelineError::validation("x").kind(), "validation");
        assert_eq!(PipelineError::component("metadata", "x").kind(), "component");
        assert_eq!(
            PipelineError::Timeout {
                component: "content".into(),
                after: Duration::from_millis(5),
            }
            .kind(),
            "timeout"
        );
    }
}
