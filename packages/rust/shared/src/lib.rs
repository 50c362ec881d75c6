//! Shared types, error model, and configuration for the page pipeline.
//!
//! This crate is the foundation depended on by all other pagegraph crates.
//! It provides:
//! - [`PipelineError`], the unified error type
//! - Domain types ([`Page`], [`Stage`], [`PageStatus`], [`ProcessingEvent`])
//! - Collaborator interfaces ([`StageComponent`], [`PageStore`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod component;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use component::{PageStore, StageComponent, StoredId};
pub use config::{
    AppConfig, CaptureConfig, KeywordConfig, MetadataConfig, PipelineConfig, PipelineSettings,
    StageSettings, StagesConfig, StorageSettings, ValidatorConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{PipelineError, Result};
pub use types::{
    ComponentType, EventStatus, KeywordRelationship, Page, PageError, PageId, PageMetrics,
    PageStatus, ProcessingEvent, RelationshipKind, Stage,
};
