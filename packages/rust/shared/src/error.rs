//! Error types for ScrapeGraph.
//!
//! Library crates use [`ScrapeGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ScrapeGraph operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeGraphError {
    /// Invalid or missing capability configuration. Fatal, never retried.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A node's declared inputs cannot be satisfied by the seed or earlier outputs.
    #[error("wiring error: {message}")]
    Wiring { message: String },

    /// The fetch collaborator could not find the source file or directory.
    #[error("source not found: {path:?}")]
    SourceNotFound { path: PathBuf },

    /// Source content or a backend payload could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The pipeline completed without producing an `answer` key.
    #[error("pipeline completed without producing an answer")]
    NoAnswer,

    /// Reasoning or embedding backend failure (network, HTTP status, protocol).
    #[error("capability error: {0}")]
    Capability(String),

    /// The run was cancelled between node boundaries.
    #[error("run cancelled before node '{next_node}'")]
    Cancelled { next_node: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScrapeGraphError>;

impl ScrapeGraphError {
    /// Create a configuration error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a wiring error from any displayable message.
    pub fn wiring(msg: impl Into<String>) -> Self {
        Self::Wiring {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a source-not-found error for a path.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
