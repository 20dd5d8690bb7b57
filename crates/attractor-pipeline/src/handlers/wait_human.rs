//! WaitHumanHandler — suspends the pipeline on a human gate.
//!
//! Choices are derived from outgoing edges: each edge's `label` supplies both
//! the display text and, if it carries an `&`-marked accelerator letter, the
//! selection key. `human.default_choice` on the node names the edge to take
//! on TIMEOUT, matched by key, label, or target node-id in that order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use attractor_types::{Context, ContextValue, Outcome, Result};

use crate::graph::{PipelineEdge, PipelineGraph, PipelineNode};
use crate::handler::NodeHandler;
use crate::interviewer::{Interviewer, Question, QuestionOption, QuestionType};

pub struct WaitHumanHandler {
    interviewer: Arc<dyn Interviewer>,
}

impl WaitHumanHandler {
    pub fn new(interviewer: Arc<dyn Interviewer>) -> Self {
        Self { interviewer }
    }
}

/// Extract the accelerator key (the letter following `&`) from an edge label,
/// if any.
fn accelerator_key(label: &str) -> Option<String> {
    let mut chars = label.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '&' {
            return label[i + 1..].chars().next().map(|c| c.to_string());
        }
    }
    None
}

fn normalize(s: &str) -> String {
    s.replace('&', "").trim().to_lowercase()
}

fn edge_matches(edge: &PipelineEdge, candidate: &str) -> bool {
    let label = edge.label().unwrap_or("");
    if let Some(key) = accelerator_key(label) {
        if key.eq_ignore_ascii_case(candidate) {
            return true;
        }
    }
    normalize(label) == normalize(candidate) || edge.to.eq_ignore_ascii_case(candidate)
}

fn context_updates_for(edge: &PipelineEdge) -> HashMap<String, ContextValue> {
    let label = edge.label().unwrap_or("").to_string();
    let selected = accelerator_key(&label).unwrap_or_else(|| label.clone());
    let mut updates = HashMap::new();
    updates.insert("human.gate.selected".to_string(), ContextValue::String(selected));
    updates.insert("human.gate.label".to_string(), ContextValue::String(label));
    updates
}

#[async_trait]
impl NodeHandler for WaitHumanHandler {
    fn handler_type(&self) -> &str {
        "wait.human"
    }

    async fn execute(
        &self,
        node: &PipelineNode,
        _ctx: &Context,
        graph: &PipelineGraph,
    ) -> Result<Outcome> {
        let edges: Vec<&PipelineEdge> = graph.outgoing_edges(&node.id).iter().collect();

        let options: Vec<QuestionOption> = if edges.is_empty() {
            vec![QuestionOption {
                key: "continue".to_string(),
                label: "Continue".to_string(),
            }]
        } else {
            edges
                .iter()
                .map(|e| {
                    let label = e.label().unwrap_or(e.to.as_str()).to_string();
                    let key = accelerator_key(&label).unwrap_or_else(|| label.clone());
                    QuestionOption { key, label }
                })
                .collect()
        };

        let question = Question {
            text: node.label(),
            question_type: QuestionType::MultipleChoice,
            options,
            stage: node.id.clone(),
            default_answer: None,
            timeout_seconds: node.timeout_ms().map(|ms| ms.div_ceil(1000)),
        };

        let answer = self.interviewer.ask(&question).await?;

        if answer.is_skipped() {
            return Ok(Outcome::fail("human gate skipped"));
        }

        if answer.is_timeout() {
            let default_choice = node.attr_string("human.default_choice");
            if !default_choice.is_empty() {
                if let Some(edge) = edges.iter().find(|e| edge_matches(e, &default_choice)) {
                    let mut outcome = Outcome::success("human gate timed out, using default choice");
                    outcome.preferred_label = edge.label().map(str::to_string);
                    outcome.context_updates = context_updates_for(edge);
                    return Ok(outcome);
                }
            }
            return Ok(Outcome::fail("human gate timed out with no usable default choice"));
        }

        if edges.is_empty() {
            return Ok(Outcome::success("human responded"));
        }

        match edges.iter().find(|e| edge_matches(e, &answer.value)) {
            Some(edge) => {
                let mut outcome = Outcome::success("human responded");
                outcome.preferred_label = edge.label().map(str::to_string);
                outcome.context_updates = context_updates_for(edge);
                Ok(outcome)
            }
            None => Ok(Outcome::fail(format!(
                "human gate answer '{}' did not match any choice",
                answer.value
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interviewer::{Answer, Interviewer, QueueInterviewer};
    use attractor_types::StageStatus;

    fn make_graph_with_labeled_edges(node_id: &str, labels: &[&str]) -> PipelineGraph {
        let mut dot = format!("digraph G {{\n  {node_id} [type=\"wait.human\"]\n");
        for (i, label) in labels.iter().enumerate() {
            let target = format!("target_{i}");
            dot.push_str(&format!("  {target} [type=\"codergen\"]\n"));
            dot.push_str(&format!("  {node_id} -> {target} [label=\"{label}\"]\n"));
        }
        dot.push_str("}\n");
        let parsed = attractor_dot::parse(&dot).unwrap();
        PipelineGraph::from_dot(parsed).unwrap()
    }

    fn node(id: &str, attrs: &[(&str, &str)]) -> PipelineNode {
        let mut attributes = HashMap::new();
        for (k, v) in attrs {
            attributes.insert(k.to_string(), crate::graph::Attribute::String(v.to_string()));
        }
        PipelineNode {
            id: id.to_string(),
            attributes,
        }
    }

    #[tokio::test]
    async fn derives_accelerator_keys_from_labels() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::from_value("Y")]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("review", &["&Yes", "&No"]);
        let n = node("review", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.preferred_label, Some("&Yes".to_string()));
        assert_eq!(
            outcome.context_updates.get("human.gate.selected"),
            Some(&ContextValue::String("Y".to_string()))
        );
        assert_eq!(
            outcome.context_updates.get("human.gate.label"),
            Some(&ContextValue::String("&Yes".to_string()))
        );
    }

    #[tokio::test]
    async fn timeout_with_default_choice_routes_to_no() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::timeout()]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("gate", &["&Yes", "&No"]);
        let n = node("gate", &[("type", "wait.human"), ("human.default_choice", "no")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.preferred_label, Some("&No".to_string()));
        assert_eq!(
            outcome.context_updates.get("human.gate.selected"),
            Some(&ContextValue::String("N".to_string()))
        );
        assert_eq!(
            outcome.context_updates.get("human.gate.label"),
            Some(&ContextValue::String("&No".to_string()))
        );
    }

    #[tokio::test]
    async fn timeout_without_default_fails() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::timeout()]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("gate", &["&Yes", "&No"]);
        let n = node("gate", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Fail);
    }

    #[tokio::test]
    async fn skipped_produces_fail() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::skipped()]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("gate", &["&Yes", "&No"]);
        let n = node("gate", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Fail);
    }

    #[tokio::test]
    async fn answer_matched_case_insensitively_against_label() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::from_value("approve")]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("gate", &["Approve", "Reject"]);
        let n = node("gate", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.preferred_label, Some("Approve".to_string()));
    }

    #[tokio::test]
    async fn unmatched_answer_fails() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::from_value("nonsense")]));
        let handler = WaitHumanHandler::new(interviewer);
        let graph = make_graph_with_labeled_edges("gate", &["Approve", "Reject"]);
        let n = node("gate", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Fail);
    }

    #[tokio::test]
    async fn no_outgoing_edges_uses_continue_option() {
        let interviewer = Arc::new(QueueInterviewer::new(vec![Answer::from_value("continue")]));
        let handler = WaitHumanHandler::new(interviewer);
        let dot = r#"digraph G { gate [type="wait.human"] }"#;
        let parsed = attractor_dot::parse(dot).unwrap();
        let graph = PipelineGraph::from_dot(parsed).unwrap();
        let n = node("gate", &[("type", "wait.human")]);
        let ctx = Context::default();

        let outcome = handler.execute(&n, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
    }
}
