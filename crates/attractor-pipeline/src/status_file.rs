//! Status file persistence: `<logsRoot>/<nodeId>/status.json`.
//!
//! The canonical (public) keys are snake_case; legacy camelCase keys are
//! also emitted for backward compatibility and accepted on read. On read,
//! canonical keys win over legacy, unknown keys are ignored, and invalid
//! JSON falls back to a caller-supplied fallback outcome.

use std::path::{Path, PathBuf};

use attractor_types::{ContextValue, Outcome, StageStatus};
use serde_json::{json, Map, Value};

fn status_str(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "success",
        StageStatus::Fail => "fail",
        StageStatus::Retry => "retry",
        StageStatus::Skip => "skip",
    }
}

fn parse_status_str(s: &str) -> Option<StageStatus> {
    match s {
        "success" => Some(StageStatus::Success),
        "fail" => Some(StageStatus::Fail),
        "retry" => Some(StageStatus::Retry),
        "skip" => Some(StageStatus::Skip),
        _ => None,
    }
}

/// Serialize an [`Outcome`] to the dual-key (canonical + legacy) status-file
/// shape.
pub fn to_json(outcome: &Outcome) -> Value {
    let context_updates = serde_json::to_value(&outcome.context_updates).unwrap_or(Value::Object(Map::new()));

    let mut obj = Map::new();
    let status = status_str(outcome.status);
    obj.insert("outcome".into(), json!(status));
    obj.insert("status".into(), json!(status));

    if let Some(label) = outcome.preferred_label.as_deref().filter(|l| !l.is_empty()) {
        obj.insert("preferred_next_label".into(), json!(label));
        obj.insert("preferredLabel".into(), json!(label));
    }

    obj.insert("suggested_next_ids".into(), json!(outcome.suggested_next_ids));
    obj.insert("suggestedNextIds".into(), json!(outcome.suggested_next_ids));

    obj.insert("context_updates".into(), context_updates.clone());
    obj.insert("contextUpdates".into(), context_updates);

    obj.insert("notes".into(), json!(outcome.notes));

    if let Some(reason) = outcome.failure_reason.as_deref().filter(|r| !r.is_empty()) {
        obj.insert("failure_reason".into(), json!(reason));
        obj.insert("failureReason".into(), json!(reason));
    }

    Value::Object(obj)
}

/// Parse a status-file JSON value into an [`Outcome`]. Canonical keys win
/// over legacy ones; unknown keys are ignored.
pub fn from_json(value: &Value) -> Option<Outcome> {
    let obj = value.as_object()?;

    let status_raw = obj
        .get("outcome")
        .or_else(|| obj.get("status"))
        .and_then(Value::as_str)?;
    let status = parse_status_str(status_raw)?;

    let preferred_label = obj
        .get("preferred_next_label")
        .or_else(|| obj.get("preferredLabel"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let suggested_next_ids = obj
        .get("suggested_next_ids")
        .or_else(|| obj.get("suggestedNextIds"))
        .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
        .unwrap_or_default();

    let context_updates = obj
        .get("context_updates")
        .or_else(|| obj.get("contextUpdates"))
        .and_then(|v| serde_json::from_value::<std::collections::HashMap<String, ContextValue>>(v.clone()).ok())
        .unwrap_or_default();

    let notes = obj.get("notes").and_then(Value::as_str).unwrap_or_default().to_string();

    let failure_reason = obj
        .get("failure_reason")
        .or_else(|| obj.get("failureReason"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(Outcome {
        status,
        preferred_label,
        suggested_next_ids,
        context_updates,
        notes,
        failure_reason,
    })
}

fn status_path(logs_root: &Path, node_id: &str) -> PathBuf {
    logs_root.join(node_id).join("status.json")
}

/// Write a node's outcome to its status file, creating the stage's log
/// directory if it does not already exist. Idempotent: overwrites.
pub async fn write_status(logs_root: &Path, node_id: &str, outcome: &Outcome) -> attractor_types::Result<PathBuf> {
    let dir = logs_root.join(node_id);
    tokio::fs::create_dir_all(&dir).await?;
    let path = status_path(logs_root, node_id);
    let json = serde_json::to_string_pretty(&to_json(outcome))?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

/// Read a node's status file, falling back to `fallback` if the file is
/// missing, unreadable, or contains invalid JSON / an unrecognized shape.
pub async fn read_status(logs_root: &Path, node_id: &str, fallback: Outcome) -> Outcome {
    let path = status_path(logs_root, node_id);
    let Ok(raw) = tokio::fs::read_to_string(&path).await else {
        return fallback;
    };
    let Ok(value) = serde_json::from_str::<Value>(&raw) else {
        return fallback;
    };
    from_json(&value).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_success_outcome() {
        let mut outcome = Outcome::success("done");
        outcome.context_updates.insert("k".into(), ContextValue::String("v".into()));
        outcome.suggested_next_ids = vec!["next".into()];

        let json = to_json(&outcome);
        let restored = from_json(&json).unwrap();

        assert_eq!(restored.status, StageStatus::Success);
        assert_eq!(restored.notes, "done");
        assert_eq!(restored.suggested_next_ids, vec!["next".to_string()]);
        assert_eq!(restored.context_updates.get("k"), Some(&ContextValue::String("v".into())));
    }

    #[test]
    fn serialized_form_carries_both_canonical_and_legacy_keys() {
        let mut outcome = Outcome::with_label(StageStatus::Retry, "try_again");
        outcome.failure_reason = Some("timed out".into());

        let json = to_json(&outcome);
        assert_eq!(json["outcome"], "retry");
        assert_eq!(json["status"], "retry");
        assert_eq!(json["preferred_next_label"], "try_again");
        assert_eq!(json["preferredLabel"], "try_again");
        assert_eq!(json["failure_reason"], "timed out");
        assert_eq!(json["failureReason"], "timed out");
    }

    #[test]
    fn empty_preferred_label_and_failure_reason_are_omitted() {
        let outcome = Outcome::success("ok");
        let json = to_json(&outcome);
        assert!(json.get("preferredLabel").is_none());
        assert!(json.get("failureReason").is_none());
    }

    #[test]
    fn canonical_key_wins_over_legacy_on_read() {
        let value = json!({
            "outcome": "success",
            "status": "fail",
        });
        let outcome = from_json(&value).unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
    }

    #[test]
    fn legacy_key_read_without_canonical() {
        let value = json!({"status": "success", "preferredLabel": "yes"});
        let outcome = from_json(&value).unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.preferred_label, Some("yes".to_string()));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let value = json!({"outcome": "success", "notes": "fine", "mysteryField": 42});
        let outcome = from_json(&value).unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.notes, "fine");
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Outcome::success("all good");

        write_status(dir.path(), "node_a", &outcome).await.unwrap();
        let read_back = read_status(dir.path(), "node_a", Outcome::fail("unused")).await;

        assert_eq!(read_back.status, StageStatus::Success);
        assert_eq!(read_back.notes, "all good");
    }

    #[tokio::test]
    async fn missing_file_returns_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = Outcome::fail("no status file");

        let result = read_status(dir.path(), "missing_node", fallback.clone()).await;
        assert_eq!(result.status, StageStatus::Fail);
        assert_eq!(result.failure_reason, Some("no status file".to_string()));
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_caller_supplied_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let node_dir = dir.path().join("broken_node");
        tokio::fs::create_dir_all(&node_dir).await.unwrap();
        tokio::fs::write(node_dir.join("status.json"), b"{not valid json")
            .await
            .unwrap();

        let fallback = Outcome::fail("fallback reason");
        let result = read_status(dir.path(), "broken_node", fallback.clone()).await;
        assert_eq!(result.failure_reason, Some("fallback reason".to_string()));
    }
}
