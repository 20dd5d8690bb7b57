//! CodergenHandler — the LLM coding-agent handler.
//!
//! Builds a single-turn request from the node's `prompt` attribute and the
//! shared context, dispatches it through a [`DynProvider`], and folds the
//! response back into an `Outcome`. A concrete example of a handler
//! implementation beyond the core runner's interface contract — LLM session
//! backends are external collaborators per the component design.

use std::sync::Arc;

use async_trait::async_trait;
use attractor_llm::{DynProvider, FinishReason, Message, Request};
use attractor_types::{AttractorError, Context, ContextValue, Outcome, Result};

use crate::graph::{PipelineGraph, PipelineNode};
use crate::handler::NodeHandler;

pub struct CodergenHandler {
    provider: Arc<DynProvider>,
}

impl CodergenHandler {
    pub fn new(provider: Arc<DynProvider>) -> Self {
        Self { provider }
    }
}

/// A provider that answers every request with its prompt verbatim. Used as
/// the zero-configuration default so `default_registry()` yields a runnable
/// `codergen` handler without requiring a real LLM backend to be wired up.
pub struct EchoProvider;

#[async_trait]
impl attractor_llm::ProviderAdapter for EchoProvider {
    async fn complete(
        &self,
        request: &Request,
    ) -> std::result::Result<attractor_llm::Response, AttractorError> {
        let text = request
            .messages
            .last()
            .and_then(|m| m.content.first())
            .map(|part| match part {
                attractor_llm::ContentPart::Text { text } => text.clone(),
                _ => String::new(),
            })
            .unwrap_or_default();
        Ok(attractor_llm::Response {
            id: "echo".into(),
            text,
            tool_calls: vec![],
            reasoning: None,
            usage: attractor_llm::Usage::default(),
            model: request.model.clone(),
            finish_reason: FinishReason::EndTurn,
        })
    }

    fn stream(
        &self,
        _request: &Request,
    ) -> std::pin::Pin<Box<dyn futures_core::Stream<Item = attractor_llm::StreamEvent> + Send + '_>> {
        Box::pin(tokio_stream::empty())
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn default_model(&self) -> &str {
        "echo-model"
    }

    fn supports_tools(&self) -> bool {
        false
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_reasoning(&self) -> bool {
        false
    }

    fn context_window_size(&self) -> usize {
        8192
    }
}

#[async_trait]
impl NodeHandler for CodergenHandler {
    fn handler_type(&self) -> &str {
        "codergen"
    }

    async fn execute(&self, node: &PipelineNode, context: &Context, _graph: &PipelineGraph) -> Result<Outcome> {
        let prompt = node.attr_string("prompt");
        let prompt = if prompt.is_empty() { node.label() } else { prompt };

        let model = node.attr_string("llm_model");
        let model = if model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            model
        };

        let history = context.get_string(&format!("{}.history", node.id)).await;
        let mut messages = Vec::new();
        if !history.is_empty() {
            messages.push(Message::system(history));
        }
        messages.push(Message::user(prompt.clone()));

        let request = Request {
            model,
            messages,
            tools: vec![],
            tool_choice: None,
            max_tokens: None,
            temperature: None,
            stop_sequences: vec![],
            reasoning_effort: None,
            provider: None,
            provider_options: None,
        };

        tracing::info!(node = %node.id, provider = %self.provider.name(), "codergen request dispatched");

        let response = self.provider.complete(&request).await.map_err(|e| AttractorError::HandlerError {
            handler: "codergen".into(),
            node: node.id.clone(),
            message: e.to_string(),
        })?;

        let mut outcome = Outcome::success(response.text.clone());
        outcome
            .context_updates
            .insert(format!("{}.response", node.id), ContextValue::String(response.text));
        outcome.context_updates.insert(
            format!("{}.finish_reason", node.id),
            ContextValue::String(finish_reason_str(response.finish_reason).to_string()),
        );
        Ok(outcome)
    }
}

fn finish_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::EndTurn => "end_turn",
        FinishReason::MaxTokens => "max_tokens",
        FinishReason::StopSequence => "stop_sequence",
        FinishReason::ToolUse => "tool_use",
    }
}
