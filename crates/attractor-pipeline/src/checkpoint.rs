//! Checkpoint save/restore and crash recovery for pipeline execution.
//!
//! After each applied [`Outcome`](attractor_types::Outcome) the runner writes
//! a [`PipelineCheckpoint`] to `<logsRoot>/checkpoint.json`. On startup, if a
//! checkpoint exists and its `graph_identity` matches the graph being run,
//! the runner resumes by restoring the frontier instead of starting over.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Snapshot of pipeline execution state for crash recovery.
///
/// Mirrors `{ completedNodeIds, context, frontier, graphIdentity }` on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineCheckpoint {
    /// IDs of nodes that have already finished successfully.
    pub completed_node_ids: Vec<String>,
    /// Serialised snapshot of the pipeline [`Context`](attractor_types::Context).
    pub context: HashMap<String, serde_json::Value>,
    /// The active frontier: an ordered work list of node IDs awaiting
    /// execution. Not a set — duplicates are allowed and meaningful for
    /// retries.
    pub frontier: Vec<String>,
    /// Identity of the graph this checkpoint was taken against
    /// ([`PipelineGraph::identity`](crate::graph::PipelineGraph::identity)).
    /// A checkpoint only resumes a run whose graph identity matches.
    pub graph_identity: String,
}

impl PipelineCheckpoint {
    pub fn new(
        completed_node_ids: Vec<String>,
        context: HashMap<String, serde_json::Value>,
        frontier: Vec<String>,
        graph_identity: String,
    ) -> Self {
        Self {
            completed_node_ids,
            context,
            frontier,
            graph_identity,
        }
    }
}

/// Save a checkpoint to the given directory.
///
/// The directory is created if it does not already exist. The checkpoint is
/// written to `<logs_root>/checkpoint.json`.
pub async fn save_checkpoint(
    checkpoint: &PipelineCheckpoint,
    logs_root: &Path,
) -> attractor_types::Result<PathBuf> {
    tokio::fs::create_dir_all(logs_root).await?;
    let path = logs_root.join("checkpoint.json");
    let json = serde_json::to_string_pretty(checkpoint)?;
    tokio::fs::write(&path, json).await?;
    tracing::debug!(path = %path.display(), "checkpoint saved");
    Ok(path)
}

/// Load the checkpoint from a directory.
///
/// Returns `Ok(None)` when no checkpoint file exists (first run, or after
/// [`clear_checkpoint`]).
pub async fn load_checkpoint(
    logs_root: &Path,
) -> attractor_types::Result<Option<PipelineCheckpoint>> {
    let path = logs_root.join("checkpoint.json");
    if !tokio::fs::try_exists(&path).await? {
        return Ok(None);
    }
    let json = tokio::fs::read_to_string(&path).await?;
    let checkpoint: PipelineCheckpoint = serde_json::from_str(&json)?;
    Ok(Some(checkpoint))
}

/// Load a checkpoint only if it matches `graph_identity`. A checkpoint taken
/// against a different graph is not a valid resume point.
pub async fn load_matching_checkpoint(
    logs_root: &Path,
    graph_identity: &str,
) -> attractor_types::Result<Option<PipelineCheckpoint>> {
    Ok(load_checkpoint(logs_root)
        .await?
        .filter(|cp| cp.graph_identity == graph_identity))
}

/// Delete checkpoint after successful pipeline completion.
pub async fn clear_checkpoint(logs_root: &Path) -> attractor_types::Result<()> {
    let path = logs_root.join("checkpoint.json");
    if tokio::fs::try_exists(&path).await? {
        tokio::fs::remove_file(&path).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_checkpoint() -> PipelineCheckpoint {
        let mut ctx = HashMap::new();
        ctx.insert("key".into(), serde_json::json!("value"));

        PipelineCheckpoint::new(
            vec!["node_a".into()],
            ctx,
            vec!["node_b".into(), "node_c".into()],
            "G:node_a,node_b,node_c:2".into(),
        )
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cp = sample_checkpoint();

        let path = save_checkpoint(&cp, dir.path()).await.unwrap();
        assert!(path.exists());

        let loaded = load_checkpoint(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded.completed_node_ids, vec!["node_a".to_string()]);
        assert_eq!(loaded.frontier, vec!["node_b".to_string(), "node_c".to_string()]);
        assert_eq!(loaded.context.get("key").unwrap(), "value");
    }

    #[tokio::test]
    async fn on_disk_shape_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cp = sample_checkpoint();

        let path = save_checkpoint(&cp, dir.path()).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert!(value.get("completedNodeIds").is_some());
        assert!(value.get("context").is_some());
        assert!(value.get("frontier").is_some());
        assert!(value.get("graphIdentity").is_some());
    }

    #[tokio::test]
    async fn load_from_nonexistent_directory_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does_not_exist");

        let result = load_checkpoint(&missing).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn matching_checkpoint_resumes_only_on_identity_match() {
        let dir = tempfile::tempdir().unwrap();
        let cp = sample_checkpoint();
        save_checkpoint(&cp, dir.path()).await.unwrap();

        let matched = load_matching_checkpoint(dir.path(), &cp.graph_identity).await.unwrap();
        assert!(matched.is_some());

        let mismatched = load_matching_checkpoint(dir.path(), "different:graph:0").await.unwrap();
        assert!(mismatched.is_none());
    }

    #[tokio::test]
    async fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let cp = sample_checkpoint();

        save_checkpoint(&cp, dir.path()).await.unwrap();
        assert!(dir.path().join("checkpoint.json").exists());

        clear_checkpoint(dir.path()).await.unwrap();
        assert!(!dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn serialization_preserves_all_fields() {
        let cp = sample_checkpoint();
        let json = serde_json::to_string(&cp).unwrap();
        let restored: PipelineCheckpoint = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.completed_node_ids, cp.completed_node_ids);
        assert_eq!(restored.frontier, cp.frontier);
        assert_eq!(restored.graph_identity, cp.graph_identity);
        assert_eq!(restored.context.get("key"), cp.context.get("key"));
    }
}
