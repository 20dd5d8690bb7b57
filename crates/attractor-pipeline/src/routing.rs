//! Routing protocol: selects the next node after a stage completes.
//!
//! Order of precedence (see the component design notes for the full
//! rationale):
//!
//! 1. `outcome.suggestedNextIds`, first id that exists as a node, wins outright.
//! 2. Candidate edges = outgoing edges filtered by condition evaluation.
//! 3. `outcome.preferredLabel`, matched case-insensitively/whitespace-normalized
//!    against candidate labels.
//! 4. Highest `priority` among candidates, ties broken by edge insertion order.
//! 5. No candidate remains: terminate the branch.

use crate::condition::{evaluate_condition, parse_condition};
use crate::graph::{PipelineEdge, PipelineGraph};

/// The result of routing after a stage completes.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    /// Advance to this node id.
    Next(String),
    /// The current node is an exit node and no edge routing applies: the run
    /// completes successfully.
    Completed,
    /// No candidate edge exists and the current node is not an exit node:
    /// the run fails with this reason.
    NoRouting(String),
}

/// Select the next node to advance to after `node_id` produces `outcome`.
pub fn select_next(
    node_id: &str,
    outcome: &attractor_types::Outcome,
    resolve: &dyn Fn(&str) -> String,
    graph: &PipelineGraph,
) -> RoutingDecision {
    // Step 1: suggestedNextIds, first that exists as a node, wins outright.
    for suggested in &outcome.suggested_next_ids {
        if graph.node(suggested).is_some() {
            return RoutingDecision::Next(suggested.clone());
        }
    }

    // Step 2: candidate edges, filtered by condition.
    let edges = graph.outgoing_edges(node_id);
    let candidates: Vec<&PipelineEdge> = edges
        .iter()
        .filter(|e| {
            let expr = parse_condition(e.condition().unwrap_or(""));
            evaluate_condition(&expr, resolve)
        })
        .collect();

    // Step 3: preferredLabel match among candidates.
    if let Some(label) = outcome.preferred_label.as_deref() {
        if !label.is_empty() {
            let normalized = normalize_label(label);
            for edge in &candidates {
                if let Some(elabel) = edge.label() {
                    if normalize_label(elabel) == normalized {
                        return RoutingDecision::Next(edge.to.clone());
                    }
                }
            }
        }
    }

    // Step 4: highest priority, ties broken by insertion order (candidates
    // preserves the graph's insertion order since it's a stable filter).
    if let Some(best) = best_by_priority(&candidates) {
        return RoutingDecision::Next(best.to.clone());
    }

    // Step 5: terminate the branch.
    if graph.is_exit_node(node_id) {
        RoutingDecision::Completed
    } else {
        RoutingDecision::NoRouting(format!("no routing from {node_id}"))
    }
}

/// Normalize a label for comparison: lowercase, strip accelerator prefixes
/// like `&Yes`, `[Y]`, `Y)`, `Y-`.
fn normalize_label(label: &str) -> String {
    let s = label.trim().to_lowercase();
    let without_amp = s.replacen('&', "", 1);
    regex::Regex::new(r"^(?:\[\w\]\s*|\w\)\s*|\w-\s*)")
        .unwrap()
        .replace(&without_amp, "")
        .to_string()
}

/// Pick the candidate with the highest priority; first occurrence wins ties
/// (candidates are already in edge insertion order).
fn best_by_priority<'a>(candidates: &[&'a PipelineEdge]) -> Option<&'a PipelineEdge> {
    let mut best: Option<&PipelineEdge> = None;
    for edge in candidates.iter().copied() {
        best = match best {
            None => Some(edge),
            Some(b) if edge.priority() > b.priority() => Some(edge),
            other => other,
        };
    }
    best
}
