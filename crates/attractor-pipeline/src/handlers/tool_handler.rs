//! ToolHandler — executes a shell command named by the `tool_command`
//! attribute.
//!
//! A concrete example of a handler implementation beyond the core runner's
//! interface contract (subprocess execution is an external collaborator per
//! the component design).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use attractor_types::{AttractorError, Context, ContextValue, Outcome, Result, StageStatus};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::NodeHandler;

pub struct ToolHandler;

#[async_trait]
impl NodeHandler for ToolHandler {
    fn handler_type(&self) -> &str {
        "tool"
    }

    async fn execute(&self, node: &PipelineNode, context: &Context, _graph: &PipelineGraph) -> Result<Outcome> {
        let command = node.attr_string("tool_command");
        if command.is_empty() {
            return Err(AttractorError::HandlerError {
                handler: "tool".into(),
                node: node.id.clone(),
                message: "Missing tool_command attribute".into(),
            });
        }

        tracing::info!(node = %node.id, label = %node.label(), %command, "executing tool command");

        let dry_run = matches!(context.get("dry_run").await, Some(ContextValue::Boolean(true)));

        if dry_run {
            tracing::info!(node = %node.id, "dry run, skipping command execution");
            let mut outcome = Outcome::success(format!("Dry run — command not executed: {command}"));
            outcome
                .context_updates
                .insert("last_tool_command".into(), ContextValue::String(command.clone()));
            outcome
                .context_updates
                .insert(format!("{}.completed", node.id), ContextValue::Boolean(true));
            outcome
                .context_updates
                .insert(format!("{}.dry_run", node.id), ContextValue::Boolean(true));
            return Ok(outcome);
        }

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&command);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let snapshot = context.snapshot().await;
        if let Some(ContextValue::String(dir)) = snapshot.get("workdir") {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| AttractorError::HandlerError {
            handler: "tool".into(),
            node: node.id.clone(),
            message: format!("Failed to spawn command: {e}"),
        })?;

        let timeout_dur = node
            .timeout_ms()
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(300));
        let output = tokio::time::timeout(timeout_dur, child.wait_with_output())
            .await
            .map_err(|_| AttractorError::CommandTimeout {
                timeout_ms: timeout_dur.as_millis() as u64,
            })?
            .map_err(|e| AttractorError::HandlerError {
                handler: "tool".into(),
                node: node.id.clone(),
                message: format!("Command execution failed: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        tracing::info!(
            node = %node.id,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "tool command completed"
        );

        let status = if output.status.success() {
            StageStatus::Success
        } else {
            StageStatus::Fail
        };

        let mut updates: HashMap<String, ContextValue> = HashMap::new();
        updates.insert("last_tool_command".into(), ContextValue::String(command.clone()));
        updates.insert(format!("{}.completed", node.id), ContextValue::Boolean(true));
        updates.insert(format!("{}.exit_code", node.id), ContextValue::Integer(exit_code as i64));
        updates.insert(format!("{}.stdout", node.id), ContextValue::String(stdout.clone()));
        if !stderr.is_empty() {
            updates.insert(format!("{}.stderr", node.id), ContextValue::String(stderr.clone()));
        }

        let combined = if stderr.is_empty() {
            stdout
        } else {
            format!("{stdout}\n--- stderr ---\n{stderr}")
        };
        let notes = if combined.len() > 4096 {
            let truncate_at = combined
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|&i| i <= 4096)
                .last()
                .unwrap_or(0);
            format!("{}...(truncated)", &combined[..truncate_at])
        } else {
            combined
        };

        Ok(Outcome {
            status,
            preferred_label: None,
            suggested_next_ids: vec![],
            context_updates: updates,
            notes,
            failure_reason: if status == StageStatus::Fail {
                Some(format!("Command exited with code {exit_code}"))
            } else {
                None
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Attribute;
    use crate::handlers::tests::{make_minimal_graph, make_node};

    fn node_with_command(id: &str, command: &str) -> PipelineNode {
        let mut attrs = HashMap::new();
        attrs.insert("tool_command".to_string(), Attribute::String(command.to_string()));
        make_node(id, Some("tool"), attrs)
    }

    #[tokio::test]
    async fn tool_handler_dry_run_skips_execution() {
        let handler = ToolHandler;
        let node = node_with_command("t", "cargo test");
        let ctx = Context::default();
        ctx.set("dry_run", ContextValue::Boolean(true)).await;
        let graph = make_minimal_graph();

        let outcome = handler.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(
            outcome.context_updates.get("last_tool_command"),
            Some(&ContextValue::String("cargo test".into()))
        );
        assert_eq!(
            outcome.context_updates.get("t.completed"),
            Some(&ContextValue::Boolean(true))
        );
        assert_eq!(outcome.context_updates.get("t.dry_run"), Some(&ContextValue::Boolean(true)));
        assert!(outcome.notes.contains("Dry run"));
    }

    #[tokio::test]
    async fn tool_handler_errors_on_missing_command() {
        let handler = ToolHandler;
        let node = make_node("t", Some("tool"), HashMap::new());
        let ctx = Context::default();
        let graph = make_minimal_graph();

        let result = handler.execute(&node, &ctx, &graph).await;
        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("Missing tool_command"),
            "Expected error about missing tool_command, got: {err}"
        );
    }

    #[tokio::test]
    async fn tool_handler_executes_command() {
        let handler = ToolHandler;
        let node = node_with_command("run_echo", "echo hello");
        let ctx = Context::default();
        let graph = make_minimal_graph();

        let outcome = handler.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Success);
        assert!(outcome.failure_reason.is_none());
        assert!(outcome.notes.contains("hello"));
        assert_eq!(
            outcome.context_updates.get("run_echo.exit_code"),
            Some(&ContextValue::Integer(0))
        );
        assert!(matches!(
            outcome.context_updates.get("run_echo.stdout"),
            Some(ContextValue::String(s)) if s.contains("hello")
        ));
    }

    #[tokio::test]
    async fn tool_handler_captures_failure() {
        let handler = ToolHandler;
        let node = node_with_command("fail_cmd", "exit 42");
        let ctx = Context::default();
        let graph = make_minimal_graph();

        let outcome = handler.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(outcome.status, StageStatus::Fail);
        assert!(outcome.failure_reason.as_ref().unwrap().contains("42"));
        assert_eq!(
            outcome.context_updates.get("fail_cmd.exit_code"),
            Some(&ContextValue::Integer(42))
        );
    }
}
