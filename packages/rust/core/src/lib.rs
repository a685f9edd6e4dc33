//! Scraper pipelines for ScrapeGraph.
//!
//! This crate assembles the fetch, retrieval, and answer nodes into graphs
//! and exposes them through the [`ScraperGraph`] facade.

pub mod nodes;
pub mod prompts;
pub mod scraper;

pub use scraper::{Collaborators, ScraperGraph};
