//! Shared types, error model, and configuration for ScrapeGraph.
//!
//! This crate is the foundation depended on by all other ScrapeGraph crates.
//! It provides:
//! - [`ScrapeGraphError`]: the unified error type
//! - Source classification ([`classify`], [`classify_for`], [`InputKey`], [`SourceType`])
//! - Domain types ([`Document`], [`SchemaDescriptor`], [`Usage`], [`RunId`])
//! - Capability traits consumed by nodes ([`FetchCapability`], [`ReasoningCapability`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod capability;
pub mod config;
pub mod error;
pub mod source;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capability::{
    AnswerPayload, AnswerRequest, CapabilityFactory, EmbeddingCapability, Embeddings,
    FetchCapability, ReasoningCapability,
};
pub use config::{
    AppConfig, EmbedderConfig, GraphOptions, LlmConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{Result, ScrapeGraphError};
pub use source::{InputKey, InputKind, SourceType, classify, classify_for};
pub use types::{Document, RunId, SchemaDescriptor, Usage};
