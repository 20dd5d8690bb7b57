//! Pipeline execution engine — the frontier-driven scheduling loop.
//!
//! A single scheduler owns an ordered frontier (a work list, not a set —
//! duplicates are meaningful for retries) and the context store. Handlers
//! may suspend on I/O; between suspension points no other mutation of
//! context occurs. See the routing protocol (`routing.rs`) for next-node
//! selection and the status file / checkpoint modules for persistence.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use attractor_types::{AttractorError, Context, ContextValue, Outcome, Result, StageStatus};

use crate::checkpoint::{self, PipelineCheckpoint};
use crate::events::{EventEmitter, PipelineEvent};
use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::{default_registry, HandlerRegistry};
use crate::routing::{select_next, RoutingDecision};
use crate::status_file;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configuration for a single pipeline run.
pub struct PipelineConfig {
    pub logs_root: PathBuf,
    pub pipeline_id: String,
    /// Resume from an on-disk checkpoint whose graph identity matches, if one
    /// exists. Set to `false` to always start fresh.
    pub resume: bool,
    /// Checked once per frontier iteration; a run observed as cancelled
    /// terminates with `PIPELINE_FAILED` and reason `"cancelled"`.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl PipelineConfig {
    pub fn new(logs_root: impl Into<PathBuf>) -> Self {
        Self {
            logs_root: logs_root.into(),
            pipeline_id: "pipeline".to_string(),
            resume: true,
            cancel_flag: None,
        }
    }
}

/// The result of a pipeline run, successful or not: `{ outcome, completedNodes, context }`.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub outcome: Outcome,
    pub completed_nodes: Vec<String>,
    pub context: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn status_to_string(status: StageStatus) -> String {
    match status {
        StageStatus::Success => "success".to_string(),
        StageStatus::Fail => "fail".to_string(),
        StageStatus::Retry => "retry".to_string(),
        StageStatus::Skip => "skip".to_string(),
    }
}

fn context_value_to_json(v: &ContextValue) -> serde_json::Value {
    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
}

fn context_snapshot_to_json(
    snapshot: &HashMap<String, ContextValue>,
) -> HashMap<String, serde_json::Value> {
    snapshot
        .iter()
        .map(|(k, v)| (k.clone(), context_value_to_json(v)))
        .collect()
}

fn json_snapshot_to_context_values(
    snapshot: HashMap<String, serde_json::Value>,
) -> HashMap<String, ContextValue> {
    snapshot
        .into_iter()
        .filter_map(|(k, v)| serde_json::from_value::<ContextValue>(v).ok().map(|cv| (k, cv)))
        .collect()
}

/// Breadth-first reachable set from `start`, including `start` itself.
fn reachable_set(graph: &PipelineGraph, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    seen.insert(start.to_string());
    while let Some(id) = queue.pop_front() {
        for edge in graph.outgoing_edges(&id) {
            if seen.insert(edge.to.clone()) {
                queue.push_back(edge.to.clone());
            }
        }
    }
    seen
}

/// Find the join node for a fan-out: the node reachable from every branch
/// that is nearest to the branches, by summed BFS distance. Approximates
/// "a node reachable from each branch whose incoming edges all belong to
/// the fan-out".
fn find_join_node(graph: &PipelineGraph, branch_starts: &[String]) -> Option<String> {
    if branch_starts.is_empty() {
        return None;
    }

    let mut distances: Vec<HashMap<String, usize>> = Vec::new();
    for start in branch_starts {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::from([(start.clone(), 0usize)]);
        dist.insert(start.clone(), 0);
        while let Some((id, d)) = queue.pop_front() {
            for edge in graph.outgoing_edges(&id) {
                if !dist.contains_key(&edge.to) {
                    dist.insert(edge.to.clone(), d + 1);
                    queue.push_back((edge.to.clone(), d + 1));
                }
            }
        }
        distances.push(dist);
    }

    let mut candidates: Option<HashSet<String>> = None;
    for dist in &distances {
        let keys: HashSet<String> = dist.keys().cloned().collect();
        candidates = Some(match candidates {
            Some(prev) => prev.intersection(&keys).cloned().collect(),
            None => keys,
        });
    }

    candidates?
        .into_iter()
        .min_by_key(|id| distances.iter().filter_map(|d| d.get(id)).sum::<usize>())
}

struct BranchOutcome {
    status: StageStatus,
    context_updates: HashMap<String, ContextValue>,
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// The core pipeline executor. Owns a handler registry and an event stream,
/// and drives frontier-based graph traversal.
pub struct PipelineExecutor {
    registry: HandlerRegistry,
    events: EventEmitter,
}

impl PipelineExecutor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            events: EventEmitter::default(),
        }
    }

    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    /// A cloneable handle to this executor's event stream. Subscribe before
    /// calling [`run`](Self::run) to observe every emitted event.
    pub fn events(&self) -> EventEmitter {
        self.events.clone()
    }

    pub async fn run(&self, graph: &PipelineGraph, config: &PipelineConfig) -> Result<PipelineResult> {
        let graph_identity = graph.identity();

        let start = match graph.start_node() {
            Some(n) => n,
            None => {
                self.events
                    .emit(PipelineEvent::pipeline_failed(&config.pipeline_id, "no start node"));
                return Ok(PipelineResult {
                    outcome: Outcome::fail("no start node"),
                    completed_nodes: Vec::new(),
                    context: HashMap::new(),
                });
            }
        };

        let (context, mut frontier, mut completed_nodes) = match self.restore_or_init(config, &graph_identity, start).await? {
            Some((ctx, frontier, completed)) => (ctx, frontier, completed),
            None => (Context::new(), VecDeque::from([start.id.clone()]), Vec::new()),
        };

        self.events
            .emit(PipelineEvent::pipeline_started(&config.pipeline_id, graph.all_nodes().count()));

        let started_at = Instant::now();
        let mut retry_counts: HashMap<String, usize> = HashMap::new();

        loop {
            if config.cancel_flag.as_ref().is_some_and(|f| f.load(Ordering::SeqCst)) {
                self.events
                    .emit(PipelineEvent::pipeline_failed(&config.pipeline_id, "cancelled"));
                return Ok(PipelineResult {
                    outcome: Outcome::fail("cancelled"),
                    completed_nodes,
                    context: context_snapshot_to_json(&context.snapshot().await),
                });
            }

            let Some(node_id) = frontier.pop_front() else {
                break;
            };

            let node = graph.node(&node_id).ok_or_else(|| {
                AttractorError::Other(format!(
                    "runner invariant violated: frontier references unknown node '{node_id}'"
                ))
            })?;

            let handler_type = self.registry.resolve_type(node);
            self.events
                .emit(PipelineEvent::stage_started(&config.pipeline_id, &node_id, &handler_type));

            if node.is_parallel() || graph.outgoing_edges(&node_id).iter().any(|e| e.is_parallel()) {
                let fan_out_started_at = Instant::now();
                let (ack_outcome, join) = self
                    .run_parallel(node, &context, graph, &config.pipeline_id)
                    .await?;
                self.apply_and_persist(&node_id, &ack_outcome, &context, config).await?;
                completed_nodes.push(node_id.clone());

                match ack_outcome.status {
                    StageStatus::Fail => {
                        self.events.emit(PipelineEvent::stage_failed(
                            &config.pipeline_id,
                            &node_id,
                            ack_outcome.failure_reason.clone().unwrap_or_default(),
                        ));
                    }
                    _ => {
                        self.events.emit(PipelineEvent::stage_completed(
                            &config.pipeline_id,
                            &node_id,
                            &status_to_string(ack_outcome.status),
                            fan_out_started_at.elapsed().as_millis() as u64,
                        ));
                    }
                }

                self.checkpoint(config, &graph_identity, &completed_nodes, &frontier, &context)
                    .await?;

                match join {
                    Some(join_id) => frontier.push_back(join_id),
                    None => {
                        for edge in graph.outgoing_edges(&node_id) {
                            frontier.push_back(edge.to.clone());
                        }
                    }
                }
                continue;
            }

            let mut outcome = match self.registry.get(&handler_type) {
                Some(handler) => match handler.execute(node, &context, graph).await {
                    Ok(o) => o,
                    Err(e) => Outcome::fail(e.to_string()),
                },
                None => {
                    let message = format!("no handler for type {handler_type}");
                    self.events
                        .emit(PipelineEvent::stage_failed(&config.pipeline_id, &node_id, message.clone()));
                    Outcome::fail(message)
                }
            };

            if outcome.status == StageStatus::Retry {
                let attempts = retry_counts.entry(node_id.clone()).or_insert(0);
                if *attempts < node.max_retries() {
                    *attempts += 1;
                    self.apply_and_persist(&node_id, &outcome, &context, config).await?;
                    self.events
                        .emit(PipelineEvent::stage_retrying(&config.pipeline_id, &node_id, *attempts));
                    frontier.push_front(node_id.clone());
                    self.checkpoint(config, &graph_identity, &completed_nodes, &frontier, &context)
                        .await?;
                    continue;
                }
                outcome = Outcome::fail(format!(
                    "retries exhausted for node '{node_id}' after {} attempts",
                    *attempts
                ));
            }

            let stage_duration_ms = started_at.elapsed().as_millis() as u64;
            self.apply_and_persist(&node_id, &outcome, &context, config).await?;
            completed_nodes.push(node_id.clone());

            match outcome.status {
                StageStatus::Fail => {
                    self.events.emit(PipelineEvent::stage_failed(
                        &config.pipeline_id,
                        &node_id,
                        outcome.failure_reason.clone().unwrap_or_default(),
                    ));
                }
                _ => {
                    self.events.emit(PipelineEvent::stage_completed(
                        &config.pipeline_id,
                        &node_id,
                        &status_to_string(outcome.status),
                        stage_duration_ms,
                    ));
                }
            }

            self.checkpoint(config, &graph_identity, &completed_nodes, &frontier, &context)
                .await?;

            let snapshot = context.snapshot().await;
            let resolve = |key: &str| -> String { resolve_key(key, &outcome, &snapshot) };

            match select_next(&node_id, &outcome, &resolve, graph) {
                RoutingDecision::Next(next_id) => frontier.push_back(next_id),
                RoutingDecision::Completed => {
                    checkpoint::clear_checkpoint(&config.logs_root).await?;
                    let duration_ms = started_at.elapsed().as_millis() as u64;
                    self.events.emit(PipelineEvent::pipeline_completed(
                        &config.pipeline_id,
                        &completed_nodes,
                        duration_ms,
                    ));
                    return Ok(PipelineResult {
                        outcome,
                        completed_nodes,
                        context: context_snapshot_to_json(&context.snapshot().await),
                    });
                }
                RoutingDecision::NoRouting(reason) => {
                    self.events
                        .emit(PipelineEvent::pipeline_failed(&config.pipeline_id, reason.clone()));
                    return Ok(PipelineResult {
                        outcome: Outcome::fail(reason),
                        completed_nodes,
                        context: context_snapshot_to_json(&context.snapshot().await),
                    });
                }
            }
        }

        // Frontier drained without reaching an exit node or a NoRouting
        // failure — treat as a clean completion of whatever ran.
        checkpoint::clear_checkpoint(&config.logs_root).await?;
        let duration_ms = started_at.elapsed().as_millis() as u64;
        self.events
            .emit(PipelineEvent::pipeline_completed(&config.pipeline_id, &completed_nodes, duration_ms));
        Ok(PipelineResult {
            outcome: Outcome::success("pipeline completed"),
            completed_nodes,
            context: context_snapshot_to_json(&context.snapshot().await),
        })
    }

    async fn restore_or_init(
        &self,
        config: &PipelineConfig,
        graph_identity: &str,
        start: &PipelineNode,
    ) -> Result<Option<(Context, VecDeque<String>, Vec<String>)>> {
        if !config.resume {
            return Ok(None);
        }
        let Some(cp) = checkpoint::load_matching_checkpoint(&config.logs_root, graph_identity).await? else {
            return Ok(None);
        };
        self.events
            .emit(PipelineEvent::pipeline_restarted(&config.pipeline_id, &cp.frontier));
        let frontier = if cp.frontier.is_empty() {
            VecDeque::from([start.id.clone()])
        } else {
            VecDeque::from(cp.frontier)
        };
        let context = Context::from_values(json_snapshot_to_context_values(cp.context));
        Ok(Some((context, frontier, cp.completed_node_ids)))
    }

    /// Applies the outcome-application rule (§4.2 steps 1-3): merge context
    /// updates for SUCCESS/SKIP, then persist the status file.
    async fn apply_and_persist(
        &self,
        node_id: &str,
        outcome: &Outcome,
        context: &Context,
        config: &PipelineConfig,
    ) -> Result<()> {
        if matches!(outcome.status, StageStatus::Success | StageStatus::Skip) {
            context.apply_updates(outcome.context_updates.clone()).await;
        }
        status_file::write_status(&config.logs_root, node_id, outcome).await?;
        Ok(())
    }

    async fn checkpoint(
        &self,
        config: &PipelineConfig,
        graph_identity: &str,
        completed_nodes: &[String],
        frontier: &VecDeque<String>,
        context: &Context,
    ) -> Result<()> {
        let cp = PipelineCheckpoint::new(
            completed_nodes.to_vec(),
            context_snapshot_to_json(&context.snapshot().await),
            frontier.iter().cloned().collect(),
            graph_identity.to_string(),
        );
        checkpoint::save_checkpoint(&cp, &config.logs_root).await?;
        self.events
            .emit(PipelineEvent::checkpoint_saved(&config.pipeline_id, completed_nodes.last().map(String::as_str).unwrap_or("")));
        Ok(())
    }

    /// Run a fan-out region rooted at `node`. Returns the acknowledging
    /// Outcome for the parallel node itself (already merged with the
    /// branches' aggregated context updates) and the resolved join node, if
    /// any.
    async fn run_parallel(
        &self,
        node: &PipelineNode,
        context: &Context,
        graph: &PipelineGraph,
        pipeline_id: &str,
    ) -> Result<(Outcome, Option<String>)> {
        let handler_type = self.registry.resolve_type(node);
        let ack = match self.registry.get(&handler_type) {
            Some(handler) => handler
                .execute(node, context, graph)
                .await
                .unwrap_or_else(|e| Outcome::fail(e.to_string())),
            None => Outcome::success(format!("fan-out from {}", node.id)),
        };

        let branches: Vec<String> = graph.outgoing_edges(&node.id).iter().map(|e| e.to.clone()).collect();
        if branches.is_empty() {
            return Ok((ack, None));
        }

        let join = find_join_node(graph, &branches);
        self.events
            .emit(PipelineEvent::parallel_started(pipeline_id, &node.id, &branches));

        let mut branch_futures = Vec::with_capacity(branches.len());
        for branch_start in &branches {
            self.events.emit(PipelineEvent::parallel_branch_started(pipeline_id, branch_start));
            let isolated = context.clone_isolated().await;
            branch_futures.push(run_branch(
                &self.registry,
                graph,
                isolated,
                branch_start.clone(),
                join.clone(),
            ));
        }

        let branch_results = futures::future::join_all(branch_futures).await;

        let mut aggregate_status = StageStatus::Success;
        let mut merged_updates = HashMap::new();
        for (branch_id, branch) in branches.iter().zip(branch_results.into_iter()) {
            self.events.emit(PipelineEvent::parallel_branch_completed(
                pipeline_id,
                branch_id,
                &status_to_string(branch.status),
            ));
            if branch.status == StageStatus::Fail {
                aggregate_status = StageStatus::Fail;
            }
            merged_updates.extend(branch.context_updates);
        }

        context.apply_updates(merged_updates.clone()).await;

        self.events
            .emit(PipelineEvent::parallel_completed(pipeline_id, &node.id, &status_to_string(aggregate_status)));

        let mut outcome = ack;
        outcome.status = aggregate_status;
        outcome.context_updates.extend(merged_updates);
        Ok((outcome, join))
    }
}

fn resolve_key(key: &str, outcome: &Outcome, snapshot: &HashMap<String, ContextValue>) -> String {
    match key {
        "outcome" => status_to_string(outcome.status),
        "preferred_label" => outcome.preferred_label.clone().unwrap_or_default(),
        k if k.starts_with("context.") => {
            let rest = &k["context.".len()..];
            snapshot
                .get(k)
                .and_then(ContextValue::as_str)
                .map(str::to_string)
                .filter(|s| !s.is_empty())
                .or_else(|| snapshot.get(rest).and_then(ContextValue::as_str).map(str::to_string))
                .unwrap_or_default()
        }
        other => snapshot.get(other).and_then(ContextValue::as_str).map(str::to_string).unwrap_or_default(),
    }
}

/// Drive a single fan-out branch from `start` to `join` (exclusive),
/// applying each step's Outcome to the branch's isolated context and
/// accumulating context updates in traversal order (later wins).
async fn run_branch(
    registry: &HandlerRegistry,
    graph: &PipelineGraph,
    context: Context,
    start: String,
    join: Option<String>,
) -> BranchOutcome {
    let mut node_id = start;
    let mut accumulated = HashMap::new();
    let mut last_status = StageStatus::Success;

    loop {
        if join.as_deref() == Some(node_id.as_str()) {
            break;
        }
        let Some(node) = graph.node(&node_id) else {
            last_status = StageStatus::Fail;
            break;
        };

        let handler_type = registry.resolve_type(node);
        let outcome = match registry.get(&handler_type) {
            Some(handler) => handler
                .execute(node, &context, graph)
                .await
                .unwrap_or_else(|e| Outcome::fail(e.to_string())),
            None => Outcome::fail(format!("no handler for type {handler_type}")),
        };

        last_status = outcome.status;
        if matches!(outcome.status, StageStatus::Success | StageStatus::Skip) {
            context.apply_updates(outcome.context_updates.clone()).await;
            accumulated.extend(outcome.context_updates.clone());
        }

        if outcome.status == StageStatus::Fail {
            break;
        }

        let snapshot = context.snapshot().await;
        let resolve = |key: &str| -> String { resolve_key(key, &outcome, &snapshot) };
        match select_next(&node_id, &outcome, &resolve, graph) {
            RoutingDecision::Next(next_id) => node_id = next_id,
            RoutingDecision::Completed | RoutingDecision::NoRouting(_) => break,
        }
    }

    BranchOutcome {
        status: last_status,
        context_updates: accumulated,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
