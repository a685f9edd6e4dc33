//! Reasoning and embedding backends for ScrapeGraph.
//!
//! Every supported provider speaks the OpenAI-compatible HTTP API, so a
//! single [`OpenAiCompatibleClient`] serves them all. [`ProviderFactory`]
//! maps `provider/model` identifiers onto base URLs and API keys.

mod client;
mod factory;

pub use client::{DEFAULT_TIMEOUT_SECS, OpenAiCompatibleClient};
pub use factory::{Provider, ProviderFactory, parse_model_id};
