//! Handlers for the parallel fan-out/fan-in node types.
//!
//! These handlers themselves are pass-through: the actual concurrent branch
//! execution, context-snapshot isolation, and deterministic merge live in the
//! engine's scheduler, which detects `node.is_parallel()` (fan-out) and the
//! `parallel.fan_in` handler type (join) directly from the graph rather than
//! routing through `Outcome::suggested_next_ids` — a single routing decision
//! cannot represent "advance to N branches at once".

use async_trait::async_trait;
use attractor_types::{Context, Outcome, Result};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::NodeHandler;

/// Marks a parallel fan-out point. The engine reads this node's outgoing
/// edges itself to determine the branch set; this handler only logs and
/// acknowledges the stage.
pub struct ParallelHandler;

#[async_trait]
impl NodeHandler for ParallelHandler {
    fn handler_type(&self) -> &str {
        "parallel"
    }

    async fn execute(&self, node: &PipelineNode, _context: &Context, graph: &PipelineGraph) -> Result<Outcome> {
        let branch_count = graph.outgoing_edges(&node.id).len();
        tracing::info!(node = %node.id, branches = branch_count, "parallel fan-out");
        Ok(Outcome::success(format!("fan-out to {branch_count} branches")))
    }
}

/// Marks a fan-in join point. The engine merges branch contexts before
/// invoking the next stage; this handler only acknowledges the join.
pub struct FanInHandler;

#[async_trait]
impl NodeHandler for FanInHandler {
    fn handler_type(&self) -> &str {
        "parallel.fan_in"
    }

    async fn execute(&self, node: &PipelineNode, _context: &Context, _graph: &PipelineGraph) -> Result<Outcome> {
        tracing::info!(node = %node.id, "fan-in merge point");
        Ok(Outcome::success("fan-in merge completed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attractor_types::StageStatus;

    fn make_node(id: &str) -> PipelineNode {
        crate::handlers::tests::make_node(id, Some("parallel.fan_in"), std::collections::HashMap::new())
    }

    #[tokio::test]
    async fn parallel_handler_reports_branch_count() {
        let handler = ParallelHandler;
        let dot = r#"digraph G {
            fork [type="parallel"]
            branch_a [type="codergen"]
            branch_b [type="codergen"]
            fork -> branch_a
            fork -> branch_b
        }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = graph.node("fork").unwrap().clone();
        let ctx = Context::default();

        let outcome = handler.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert!(outcome.notes.contains("2 branches"));
    }

    #[tokio::test]
    async fn fan_in_handler_returns_success() {
        let handler = FanInHandler;
        let dot = r#"digraph G { A -> B }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let node = make_node("merge");
        let ctx = Context::default();

        let outcome = handler.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.notes, "fan-in merge completed");
    }
}
