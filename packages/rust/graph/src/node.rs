//! The node abstraction: one step of a pipeline with a declared key contract.

use async_trait::async_trait;

use scrapegraph_shared::{Result, RunId, ScrapeGraphError, Usage};

use crate::keys::KeyExpr;
use crate::state::State;

/// What a node hands back to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// Proceed to the next node with this state.
    Continue(State),
    /// Stop the run here; this state becomes the final state.
    Halt(State),
}

impl NodeOutcome {
    pub fn state(&self) -> &State {
        match self {
            Self::Continue(state) | Self::Halt(state) => state,
        }
    }

    pub fn into_state(self) -> State {
        match self {
            Self::Continue(state) | Self::Halt(state) => state,
        }
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt(_))
    }
}

/// Per-invocation context handed to a node by the graph.
#[derive(Debug)]
pub struct NodeContext {
    run_id: RunId,
    usage: Usage,
}

impl NodeContext {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            usage: Usage::default(),
        }
    }

    /// Identifier of the run this invocation belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Add backend token usage to this node's execution record.
    pub fn record_usage(&mut self, usage: Usage) {
        self.usage += usage;
    }

    pub(crate) fn into_usage(self) -> Usage {
        self.usage
    }
}

/// One unit of work in a graph.
///
/// Capability handles are injected at construction; `execute` only sees the
/// run's state. A node must only read keys its [`Node::input`] expression
/// names and only write keys listed in [`Node::output`].
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within a graph (e.g. `"fetch"`).
    fn name(&self) -> &str;

    /// Keys this node reads.
    fn input(&self) -> &KeyExpr;

    /// Keys this node writes.
    fn output(&self) -> &[String];

    async fn execute(&self, state: State, ctx: &mut NodeContext) -> Result<NodeOutcome>;
}

/// Resolve `node`'s input expression against `state`.
///
/// Nodes call this at the start of `execute` to learn which alternative
/// keys are actually present.
pub fn resolve_inputs(node: &dyn Node, state: &State) -> Result<Vec<String>> {
    node.input()
        .resolve(&|key| state.contains(key))
        .ok_or_else(|| {
            ScrapeGraphError::wiring(format!(
                "node '{}' input '{}' not satisfied by state keys [{}]",
                node.name(),
                node.input(),
                state.keys().collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        input: KeyExpr,
        output: Vec<String>,
    }

    #[async_trait]
    impl Node for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn input(&self) -> &KeyExpr {
            &self.input
        }

        fn output(&self) -> &[String] {
            &self.output
        }

        async fn execute(&self, mut state: State, ctx: &mut NodeContext) -> Result<NodeOutcome> {
            let keys = resolve_inputs(self, &state)?;
            state.insert("echo", keys.join(","));
            ctx.record_usage(Usage {
                requests: 1,
                ..Default::default()
            });
            Ok(NodeOutcome::Continue(state))
        }
    }

    fn echo() -> Echo {
        Echo {
            input: KeyExpr::parse("user_prompt & (json | json_dir)").unwrap(),
            output: vec!["echo".into()],
        }
    }

    #[tokio::test]
    async fn resolves_present_alternative() {
        let node = echo();
        let mut ctx = NodeContext::new(RunId::new());
        let state = State::new().with("user_prompt", "q").with("json_dir", "data/");

        let outcome = node.execute(state, &mut ctx).await.unwrap();
        assert!(!outcome.is_halt());
        assert_eq!(outcome.state().get_str("echo"), Some("user_prompt,json_dir"));
        assert_eq!(ctx.into_usage().requests, 1);
    }

    #[tokio::test]
    async fn missing_input_is_wiring_error() {
        let node = echo();
        let mut ctx = NodeContext::new(RunId::new());
        let state = State::new().with("json", "data.json");

        let err = node.execute(state, &mut ctx).await.unwrap_err();
        assert!(matches!(err, ScrapeGraphError::Wiring { .. }));
        assert!(err.to_string().contains("node 'echo'"));
    }

    #[test]
    fn outcome_accessors() {
        let halted = NodeOutcome::Halt(State::new().with("answer", "done"));
        assert!(halted.is_halt());
        assert_eq!(halted.into_state().get_str("answer"), Some("done"));
    }
}
