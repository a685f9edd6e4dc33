//! Graph orchestration engine for ScrapeGraph.
//!
//! This crate provides:
//! - [`State`]: the ordered key/value store threaded through a run
//! - [`Node`]: the unit-of-work trait with declared input/output keys
//! - [`KeyExpr`]: boolean input expressions (`user_prompt & (doc | relevant_chunks)`)
//! - [`Graph`] / [`GraphBuilder`]: wiring validation and sequential execution
//! - [`ExecutionInfo`]: per-node timings and token usage

pub mod execution;
pub mod graph;
pub mod keys;
pub mod node;
pub mod state;

pub use execution::{ExecutionInfo, GraphStatus, NodeExecution};
pub use graph::{Graph, GraphBuilder, GraphObserver, RunOptions, SilentObserver};
pub use keys::KeyExpr;
pub use node::{Node, NodeContext, NodeOutcome, resolve_inputs};
pub use state::State;

pub use tokio_util::sync::CancellationToken;
