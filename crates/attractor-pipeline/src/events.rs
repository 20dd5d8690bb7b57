//! Pipeline event system for observability.
//!
//! Every state transition emits a [`PipelineEvent`]: a generic envelope of
//! `{ kind, timestamp, pipelineId, data }`. The event stream is the
//! authoritative observability surface — persistence (status files,
//! checkpoints) is incidental. Events are broadcast via a
//! [`tokio::sync::broadcast`] channel so loggers, the SSE adaptor, and tests
//! can all subscribe without coupling to the engine internals.

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    PipelineStarted,
    PipelineCompleted,
    PipelineFailed,
    PipelineRestarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    StageRetrying,
    ParallelStarted,
    ParallelBranchStarted,
    ParallelBranchCompleted,
    ParallelCompleted,
    CheckpointSaved,
    EdgeSelected,
    ContextUpdated,
}

/// A single observability event: `{ kind, timestamp, pipelineId, data }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub kind: EventKind,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    pub pipeline_id: String,
    pub data: serde_json::Value,
}

impl PipelineEvent {
    pub fn new(kind: EventKind, pipeline_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now().to_rfc3339(),
            pipeline_id: pipeline_id.into(),
            data,
        }
    }

    pub fn pipeline_started(pipeline_id: impl Into<String>, node_count: usize) -> Self {
        Self::new(
            EventKind::PipelineStarted,
            pipeline_id,
            serde_json::json!({ "nodeCount": node_count }),
        )
    }

    pub fn pipeline_completed(
        pipeline_id: impl Into<String>,
        completed_nodes: &[String],
        duration_ms: u64,
    ) -> Self {
        Self::new(
            EventKind::PipelineCompleted,
            pipeline_id,
            serde_json::json!({ "completedNodes": completed_nodes, "durationMs": duration_ms }),
        )
    }

    pub fn pipeline_failed(pipeline_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            EventKind::PipelineFailed,
            pipeline_id,
            serde_json::json!({ "reason": reason.into() }),
        )
    }

    pub fn pipeline_restarted(pipeline_id: impl Into<String>, frontier: &[String]) -> Self {
        Self::new(
            EventKind::PipelineRestarted,
            pipeline_id,
            serde_json::json!({ "frontier": frontier }),
        )
    }

    pub fn stage_started(pipeline_id: impl Into<String>, node_id: &str, handler_type: &str) -> Self {
        Self::new(
            EventKind::StageStarted,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "handlerType": handler_type }),
        )
    }

    pub fn stage_completed(pipeline_id: impl Into<String>, node_id: &str, status: &str, duration_ms: u64) -> Self {
        Self::new(
            EventKind::StageCompleted,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "status": status, "durationMs": duration_ms }),
        )
    }

    pub fn stage_failed(pipeline_id: impl Into<String>, node_id: &str, error: impl Into<String>) -> Self {
        Self::new(
            EventKind::StageFailed,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "error": error.into() }),
        )
    }

    pub fn stage_retrying(pipeline_id: impl Into<String>, node_id: &str, attempt: usize) -> Self {
        Self::new(
            EventKind::StageRetrying,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "attempt": attempt }),
        )
    }

    pub fn parallel_started(pipeline_id: impl Into<String>, node_id: &str, branches: &[String]) -> Self {
        Self::new(
            EventKind::ParallelStarted,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "branches": branches }),
        )
    }

    pub fn parallel_branch_started(pipeline_id: impl Into<String>, branch_id: &str) -> Self {
        Self::new(
            EventKind::ParallelBranchStarted,
            pipeline_id,
            serde_json::json!({ "branchId": branch_id }),
        )
    }

    pub fn parallel_branch_completed(pipeline_id: impl Into<String>, branch_id: &str, status: &str) -> Self {
        Self::new(
            EventKind::ParallelBranchCompleted,
            pipeline_id,
            serde_json::json!({ "branchId": branch_id, "status": status }),
        )
    }

    pub fn parallel_completed(pipeline_id: impl Into<String>, node_id: &str, status: &str) -> Self {
        Self::new(
            EventKind::ParallelCompleted,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "status": status }),
        )
    }

    pub fn checkpoint_saved(pipeline_id: impl Into<String>, node_id: &str) -> Self {
        Self::new(
            EventKind::CheckpointSaved,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id }),
        )
    }

    pub fn edge_selected(pipeline_id: impl Into<String>, from: &str, to: &str, label: Option<&str>) -> Self {
        Self::new(
            EventKind::EdgeSelected,
            pipeline_id,
            serde_json::json!({ "from": from, "to": to, "label": label }),
        )
    }

    pub fn context_updated(pipeline_id: impl Into<String>, node_id: &str, keys: &[String]) -> Self {
        Self::new(
            EventKind::ContextUpdated,
            pipeline_id,
            serde_json::json!({ "nodeId": node_id, "keys": keys }),
        )
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers. If there are no active
    /// receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
