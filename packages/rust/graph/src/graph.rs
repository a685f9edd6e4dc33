//! Graph assembly, wiring validation, and sequential execution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use scrapegraph_shared::{Result, RunId, ScrapeGraphError};

use crate::execution::{ExecutionInfo, GraphStatus};
use crate::node::{Node, NodeContext, NodeOutcome};
use crate::state::State;

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Progress callbacks for graph execution.
pub trait GraphObserver: Send + Sync {
    /// Called before a node runs.
    fn node_started(&self, name: &str, index: usize, total: usize);
    /// Called after a node returns successfully.
    fn node_finished(&self, name: &str, elapsed: Duration);
    /// Called once the run reaches `Completed` or `Failed`.
    fn run_finished(&self, status: GraphStatus);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl GraphObserver for SilentObserver {
    fn node_started(&self, _name: &str, _index: usize, _total: usize) {}
    fn node_finished(&self, _name: &str, _elapsed: Duration) {}
    fn run_finished(&self, _status: GraphStatus) {}
}

/// Per-run knobs for [`Graph::execute_with`].
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Checked before each node; a cancelled token stops the run there.
    pub cancel: Option<CancellationToken>,
    pub observer: Option<Arc<dyn GraphObserver>>,
}

impl RunOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn GraphObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects nodes and edges, then validates them into a [`Graph`].
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
    edges: Vec<(String, String)>,
    entry_point: Option<String>,
    seed_keys: Vec<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_point: None,
            seed_keys: Vec::new(),
        }
    }

    /// Keys the caller promises to put in the seed state.
    pub fn seed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn add_node(self, node: impl Node + 'static) -> Self {
        self.add_shared_node(Arc::new(node))
    }

    pub fn add_shared_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Explicit edge. Without any edges, declaration order is the chain.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// First node to run. Defaults to the first declared node.
    pub fn entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = Some(name.into());
        self
    }

    /// Validate topology and wiring.
    ///
    /// Fails with `Wiring` when the graph is empty, names collide, edges
    /// do not form a single chain covering every node, or a node reads a key
    /// that neither the seed nor an earlier node provides.
    pub fn build(self) -> Result<Graph> {
        if self.nodes.is_empty() {
            return Err(ScrapeGraphError::wiring(format!(
                "graph '{}' has no nodes",
                self.name
            )));
        }

        let mut index_by_name = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if index_by_name.insert(node.name().to_string(), i).is_some() {
                return Err(ScrapeGraphError::wiring(format!(
                    "duplicate node name '{}'",
                    node.name()
                )));
            }
        }

        let order = self.chain_order(&index_by_name)?;
        let nodes: Vec<Arc<dyn Node>> = order.iter().map(|&i| Arc::clone(&self.nodes[i])).collect();

        validate_wiring(&nodes, &self.seed_keys)?;

        debug!(
            graph = %self.name,
            nodes = ?nodes.iter().map(|n| n.name()).collect::<Vec<_>>(),
            "graph built"
        );

        Ok(Graph {
            name: self.name,
            nodes,
            seed_keys: self.seed_keys,
        })
    }

    /// Resolve the execution order as indexes into `self.nodes`.
    fn chain_order(&self, index_by_name: &HashMap<String, usize>) -> Result<Vec<usize>> {
        let lookup = |name: &str| {
            index_by_name.get(name).copied().ok_or_else(|| {
                ScrapeGraphError::wiring(format!("unknown node '{name}' in graph '{}'", self.name))
            })
        };

        if self.edges.is_empty() {
            let entry = match &self.entry_point {
                Some(name) => lookup(name.as_str())?,
                None => 0,
            };
            if entry != 0 {
                return Err(ScrapeGraphError::wiring(format!(
                    "entry point '{}' must be the first node when no edges are declared",
                    self.nodes[entry].name()
                )));
            }
            return Ok((0..self.nodes.len()).collect());
        }

        let mut next: HashMap<usize, usize> = HashMap::new();
        let mut has_incoming = HashSet::new();
        for (from, to) in &self.edges {
            let (from_idx, to_idx) = (lookup(from.as_str())?, lookup(to.as_str())?);
            if next.insert(from_idx, to_idx).is_some() {
                return Err(ScrapeGraphError::wiring(format!(
                    "node '{from}' has more than one outgoing edge"
                )));
            }
            if !has_incoming.insert(to_idx) {
                return Err(ScrapeGraphError::wiring(format!(
                    "node '{to}' has more than one incoming edge"
                )));
            }
        }

        // Without an explicit entry point the chain starts at the first
        // node nothing points to.
        let entry = match &self.entry_point {
            Some(name) => lookup(name.as_str())?,
            None => (0..self.nodes.len())
                .find(|i| !has_incoming.contains(i))
                .ok_or_else(|| {
                    ScrapeGraphError::wiring(format!(
                        "cycle detected: graph '{}' has no node without an incoming edge",
                        self.name
                    ))
                })?,
        };

        let mut order = vec![entry];
        let mut visited = HashSet::from([entry]);
        let mut current = entry;
        while let Some(&following) = next.get(&current) {
            if !visited.insert(following) {
                return Err(ScrapeGraphError::wiring(format!(
                    "cycle detected at node '{}'",
                    self.nodes[following].name()
                )));
            }
            order.push(following);
            current = following;
        }

        if order.len() != self.nodes.len() {
            let unreachable: Vec<&str> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| !visited.contains(i))
                .map(|(_, n)| n.name())
                .collect();
            return Err(ScrapeGraphError::wiring(format!(
                "nodes not reachable from '{}': {}",
                self.nodes[entry].name(),
                unreachable.join(", ")
            )));
        }

        Ok(order)
    }
}

/// A node may add or overwrite keys but never drop one, and a node that
/// continues must have written every key it declares as output.
fn check_state_contract(
    node: &dyn Node,
    before: &[String],
    outcome: NodeOutcome,
) -> Result<NodeOutcome> {
    let state = outcome.state();
    let removed: Vec<&str> = before
        .iter()
        .map(String::as_str)
        .filter(|key| !state.contains(key))
        .collect();
    if !removed.is_empty() {
        return Err(ScrapeGraphError::wiring(format!(
            "node '{}' removed state keys [{}]",
            node.name(),
            removed.join(", ")
        )));
    }

    if !outcome.is_halt() {
        let missing: Vec<&str> = node
            .output()
            .iter()
            .map(String::as_str)
            .filter(|key| !state.contains(key))
            .collect();
        if !missing.is_empty() {
            return Err(ScrapeGraphError::wiring(format!(
                "node '{}' did not write declared outputs [{}]",
                node.name(),
                missing.join(", ")
            )));
        }
    }

    Ok(outcome)
}

/// Check that each node's input is satisfiable by the seed plus earlier outputs.
fn validate_wiring(nodes: &[Arc<dyn Node>], seed_keys: &[String]) -> Result<()> {
    let mut available: HashSet<String> = seed_keys.iter().cloned().collect();

    for node in nodes {
        if !node.input().is_satisfied_by(&|key| available.contains(key)) {
            let mut known: Vec<&str> = available.iter().map(String::as_str).collect();
            known.sort_unstable();
            return Err(ScrapeGraphError::wiring(format!(
                "node '{}' reads '{}' but only [{}] are guaranteed before it",
                node.name(),
                node.input(),
                known.join(", ")
            )));
        }
        available.extend(node.output().iter().cloned());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A validated, straight-line chain of nodes.
///
/// Immutable once built; every [`Graph::execute`] call works on a fresh
/// [`State`], so one graph can serve repeated and concurrent runs.
pub struct Graph {
    name: String,
    nodes: Vec<Arc<dyn Node>>,
    seed_keys: Vec<String>,
}

impl Graph {
    pub fn builder(name: impl Into<String>) -> GraphBuilder {
        GraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node names in execution order.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    pub fn seed_keys(&self) -> &[String] {
        &self.seed_keys
    }

    /// Run every node in order starting from `seed`.
    pub async fn execute(&self, seed: State) -> Result<(State, ExecutionInfo)> {
        self.execute_with(seed, &RunOptions::default()).await
    }

    /// Run with cancellation and progress reporting.
    ///
    /// A node error fails the run and is returned unchanged; nothing is
    /// retried. A node returning `Halt` completes the run early.
    #[instrument(skip_all, fields(graph = %self.name, run_id = tracing::field::Empty))]
    pub async fn execute_with(
        &self,
        seed: State,
        options: &RunOptions,
    ) -> Result<(State, ExecutionInfo)> {
        let run_id = RunId::new();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let silent = SilentObserver;
        let observer: &dyn GraphObserver = match options.observer.as_deref() {
            Some(observer) => observer,
            None => &silent,
        };

        let mut status = GraphStatus::Built;
        let mut state = State::new();
        state.merge(seed);

        let mut info = ExecutionInfo::new(run_id, &self.name);
        let started = Instant::now();
        transition(&mut status, GraphStatus::Running);
        info!(nodes = self.nodes.len(), seed_keys = state.len(), "graph execution started");

        let total = self.nodes.len();
        for (index, node) in self.nodes.iter().enumerate() {
            if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                transition(&mut status, GraphStatus::Failed);
                observer.run_finished(status);
                info!(next_node = node.name(), "graph execution cancelled");
                return Err(ScrapeGraphError::Cancelled {
                    next_node: node.name().to_string(),
                });
            }

            observer.node_started(node.name(), index, total);
            let mut ctx = NodeContext::new(run_id);
            let node_started = Instant::now();

            let before: Vec<String> = state.keys().map(String::from).collect();
            let result = node
                .execute(state, &mut ctx)
                .await
                .and_then(|outcome| check_state_contract(node.as_ref(), &before, outcome));
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    transition(&mut status, GraphStatus::Failed);
                    observer.run_finished(status);
                    error!(node = node.name(), error = %e, "node failed");
                    return Err(e);
                }
            };

            let elapsed = node_started.elapsed();
            let usage = ctx.into_usage();
            info.record(node.name(), elapsed, usage);
            observer.node_finished(node.name(), elapsed);
            info!(
                node = node.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                tokens = usage.total_tokens,
                "node finished"
            );

            let halted = outcome.is_halt();
            state = outcome.into_state();
            if halted {
                info!(node = node.name(), "node halted the run");
                info.halted_at = Some(node.name().to_string());
                break;
            }
        }

        info.finish(started.elapsed());
        transition(&mut status, GraphStatus::Completed);
        observer.run_finished(status);
        info!(
            elapsed_ms = info.elapsed_ms,
            total_tokens = info.total_usage().total_tokens,
            "graph execution completed"
        );

        Ok((state, info))
    }
}

fn transition(status: &mut GraphStatus, to: GraphStatus) {
    let from = *status;
    debug!(?from, ?to, "graph status");
    *status = to;
}
