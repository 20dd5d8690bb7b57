//! Shared types, errors, context, and outcome for the Attractor pipeline engine.
//!
//! This crate provides the foundational types used across all other Attractor crates:
//! - `AttractorError` — unified error taxonomy
//! - `Context` / `ContextValue` — thread-safe typed key-value store for pipeline state
//! - `StageStatus` / `Outcome` — result of executing a node handler

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Unified error type for all Attractor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AttractorError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Context length exceeded for {provider}: {message}")]
    ContextLengthExceeded { provider: String, message: String },

    // === Parser Errors ===
    #[error("DOT parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Pipeline Errors ===
    #[error("Pipeline validation failed: {0}")]
    ValidationError(String),

    #[error("Handler '{handler}' failed on node '{node}': {message}")]
    HandlerError {
        handler: String,
        node: String,
        message: String,
    },

    #[error("Max retries exhausted for node '{node}' after {attempts} attempts")]
    RetriesExhausted { node: String, attempts: usize },

    #[error("No routing from node '{node}'")]
    NoRouting { node: String },

    // === Tool Errors ===
    #[error("Tool '{tool}' error: {message}")]
    ToolError { tool: String, message: String },

    #[error("Command timed out after {timeout_ms}ms")]
    CommandTimeout { timeout_ms: u64 },

    // === Interview Errors ===
    #[error("Interviewer queue exhausted")]
    QueueEmpty,

    #[error("Web interviewer contract violation: {0}")]
    InterviewContractViolation(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AttractorError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AttractorError::RateLimited { .. }
                | AttractorError::CommandTimeout { .. }
                | AttractorError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttractorError::AuthError { .. }
                | AttractorError::ValidationError(_)
                | AttractorError::ContextLengthExceeded { .. }
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AttractorError::RateLimited { .. } => Some(429),
            AttractorError::AuthError { .. } => Some(401),
            AttractorError::ProviderError { status, .. } => Some(*status),
            AttractorError::RequestTimeout { .. } | AttractorError::CommandTimeout { .. } => {
                Some(504)
            }
            AttractorError::ValidationError(_) => Some(400),
            AttractorError::ContextLengthExceeded { .. } => Some(413),
            AttractorError::InterviewContractViolation(_) => Some(409),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, AttractorError>`.
pub type Result<T> = std::result::Result<T, AttractorError>;

// ---------------------------------------------------------------------------
// ContextValue — tagged union stored in the Context map
// ---------------------------------------------------------------------------

/// A typed value stored under a dotted-path key in [`Context`].
///
/// Unlike a loose `serde_json::Value`, only the shapes the runner actually
/// reasons about are representable: scalars, string lists, and one level of
/// nested record. Anything else fails to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
    Record(HashMap<String, ContextValue>),
}

impl ContextValue {
    /// Borrow as a string, if this value is the `String` variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_owned())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<i64> for ContextValue {
    fn from(v: i64) -> Self {
        ContextValue::Integer(v)
    }
}

impl From<bool> for ContextValue {
    fn from(v: bool) -> Self {
        ContextValue::Boolean(v)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(v: Vec<String>) -> Self {
        ContextValue::StringList(v)
    }
}

// ---------------------------------------------------------------------------
// Context — thread-safe key-value store for pipeline state
// ---------------------------------------------------------------------------

/// Thread-safe key-value store shared across pipeline nodes.
///
/// Cloning a `Context` yields another handle to the **same** inner state.
/// Use [`clone_isolated`](Context::clone_isolated) to get a deep copy for
/// parallel branch isolation.
#[derive(Clone)]
pub struct Context {
    inner: Arc<tokio::sync::RwLock<ContextInner>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextInner {
    values: HashMap<String, ContextValue>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(ContextInner::default())),
        }
    }

    /// Build a context pre-populated from a snapshot map (e.g. graph-level
    /// initial attributes).
    pub fn from_values(values: HashMap<String, ContextValue>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(ContextInner { values })),
        }
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: ContextValue) {
        self.inner.write().await.values.insert(key.into(), value);
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<ContextValue> {
        self.inner.read().await.values.get(key).cloned()
    }

    /// Returns the string at `key`, or `""` if missing or not a string.
    ///
    /// Routing depends on this fallback: missing and empty are intentionally
    /// indistinguishable.
    pub async fn get_string(&self, key: &str) -> String {
        self.inner
            .read()
            .await
            .values
            .get(key)
            .and_then(ContextValue::as_str)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Shallow copy of the current values map.
    pub async fn snapshot(&self) -> HashMap<String, ContextValue> {
        self.inner.read().await.values.clone()
    }

    /// Deep copy that is fully independent of the original context, used to
    /// isolate parallel fan-out branches from each other.
    pub async fn clone_isolated(&self) -> Context {
        let guard = self.inner.read().await;
        Context {
            inner: Arc::new(tokio::sync::RwLock::new(guard.clone())),
        }
    }

    /// Merge `updates` into the context, shallow-overwrite by key. Existing
    /// keys not present in `updates` are preserved.
    pub async fn apply_updates(&self, updates: HashMap<String, ContextValue>) {
        let mut guard = self.inner.write().await;
        guard.values.extend(updates);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// StageStatus — outcome status of a pipeline node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Fail,
    Retry,
    Skip,
}

// ---------------------------------------------------------------------------
// Outcome — result of executing a node handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: StageStatus,
    pub preferred_label: Option<String>,
    pub suggested_next_ids: Vec<String>,
    pub context_updates: HashMap<String, ContextValue>,
    pub notes: String,
    pub failure_reason: Option<String>,
}

impl Outcome {
    /// Create a successful outcome with the given notes.
    pub fn success(notes: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Success,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: notes.into(),
            failure_reason: None,
        }
    }

    /// Create a failed outcome with the given reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: Some(reason.into()),
        }
    }

    /// Create an outcome with a specific status and preferred label.
    pub fn with_label(status: StageStatus, label: impl Into<String>) -> Self {
        Self {
            status,
            preferred_label: Some(label.into()),
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: String::new(),
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = AttractorError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_rate_limited() {
        let err = AttractorError::RateLimited {
            provider: "anthropic".into(),
            retry_after_ms: 3000,
        };
        assert_eq!(
            err.to_string(),
            "Rate limited by anthropic, retry after 3000ms"
        );
    }

    #[test]
    fn error_display_handler_error() {
        let err = AttractorError::HandlerError {
            handler: "llm".into(),
            node: "summarize".into(),
            message: "prompt too long".into(),
        };
        assert_eq!(
            err.to_string(),
            "Handler 'llm' failed on node 'summarize': prompt too long"
        );
    }

    #[test]
    fn error_display_no_routing() {
        let err = AttractorError::NoRouting {
            node: "review".into(),
        };
        assert_eq!(err.to_string(), "No routing from node 'review'");
    }

    #[test]
    fn error_display_retries_exhausted() {
        let err = AttractorError::RetriesExhausted {
            node: "compile".into(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Max retries exhausted for node 'compile' after 3 attempts"
        );
    }

    #[test]
    fn error_display_other() {
        let err = AttractorError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }

    // --- is_retryable ---

    #[test]
    fn retryable_rate_limited() {
        let err = AttractorError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_provider_error_when_flagged() {
        let err = AttractorError::ProviderError {
            provider: "x".into(),
            status: 503,
            message: "unavailable".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_retryable_provider_error_when_not_flagged() {
        let err = AttractorError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
            retryable: false,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_command_timeout() {
        let err = AttractorError::CommandTimeout { timeout_ms: 5000 };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_retryable_auth_error() {
        let err = AttractorError::AuthError {
            provider: "x".into(),
        };
        assert!(!err.is_retryable());
    }

    // --- is_terminal ---

    #[test]
    fn terminal_auth_error() {
        let err = AttractorError::AuthError {
            provider: "x".into(),
        };
        assert!(err.is_terminal());
    }

    #[test]
    fn terminal_validation_error() {
        let err = AttractorError::ValidationError("bad".into());
        assert!(err.is_terminal());
    }

    #[test]
    fn not_terminal_rate_limited() {
        let err = AttractorError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        assert!(!err.is_terminal());
    }

    // --- http_status ---

    #[test]
    fn http_status_rate_limited_429() {
        let err = AttractorError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0,
        };
        assert_eq!(err.http_status(), Some(429));
    }

    #[test]
    fn http_status_auth_401() {
        let err = AttractorError::AuthError {
            provider: "x".into(),
        };
        assert_eq!(err.http_status(), Some(401));
    }

    #[test]
    fn http_status_interview_contract_violation_409() {
        let err = AttractorError::InterviewContractViolation("already pending".into());
        assert_eq!(err.http_status(), Some(409));
    }

    #[test]
    fn http_status_none_for_other() {
        let err = AttractorError::Other("something".into());
        assert_eq!(err.http_status(), None);
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AttractorError = io_err.into();
        assert!(matches!(err, AttractorError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: AttractorError = json_err.into();
        assert!(matches!(err, AttractorError::Json(_)));
    }

    // --- Context / ContextValue ---

    #[tokio::test]
    async fn context_set_and_get_round_trip() {
        let ctx = Context::new();
        ctx.set("key", ContextValue::from("hello")).await;
        let val = ctx.get("key").await;
        assert_eq!(val, Some(ContextValue::String("hello".into())));
    }

    #[tokio::test]
    async fn context_get_string_defaults_to_empty_when_missing() {
        let ctx = Context::new();
        assert_eq!(ctx.get_string("missing").await, "");
    }

    #[tokio::test]
    async fn context_get_string_defaults_to_empty_when_non_string() {
        let ctx = Context::new();
        ctx.set("n", ContextValue::Integer(42)).await;
        assert_eq!(ctx.get_string("n").await, "");
    }

    #[tokio::test]
    async fn context_clone_isolated_is_independent() {
        let ctx = Context::new();
        ctx.set("a", ContextValue::Integer(1)).await;

        let isolated = ctx.clone_isolated().await;
        isolated.set("a", ContextValue::Integer(999)).await;
        isolated.set("b", ContextValue::Integer(2)).await;

        assert_eq!(ctx.get("a").await, Some(ContextValue::Integer(1)));
        assert_eq!(ctx.get("b").await, None);
    }

    #[tokio::test]
    async fn context_apply_updates_merges() {
        let ctx = Context::new();
        ctx.set("keep", ContextValue::from("old")).await;
        ctx.set("overwrite", ContextValue::from("old")).await;

        let mut updates = HashMap::new();
        updates.insert("overwrite".into(), ContextValue::from("new"));
        updates.insert("added".into(), ContextValue::from("fresh"));
        ctx.apply_updates(updates).await;

        assert_eq!(ctx.get_string("keep").await, "old");
        assert_eq!(ctx.get_string("overwrite").await, "new");
        assert_eq!(ctx.get_string("added").await, "fresh");
    }

    #[tokio::test]
    async fn context_snapshot_returns_current_values() {
        let ctx = Context::new();
        ctx.set("x", ContextValue::Integer(10)).await;
        ctx.set("y", ContextValue::Integer(20)).await;

        let snap = ctx.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("x"), Some(&ContextValue::Integer(10)));
        assert_eq!(snap.get("y"), Some(&ContextValue::Integer(20)));
    }

    // --- StageStatus ---

    #[test]
    fn stage_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Retry).unwrap(),
            "\"retry\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Fail).unwrap(),
            "\"fail\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Skip).unwrap(),
            "\"skip\""
        );
    }

    #[test]
    fn stage_status_deserializes_from_snake_case() {
        let status: StageStatus = serde_json::from_str("\"retry\"").unwrap();
        assert_eq!(status, StageStatus::Retry);
    }

    // --- Outcome ---

    #[test]
    fn outcome_success_constructor() {
        let o = Outcome::success("all good");
        assert_eq!(o.status, StageStatus::Success);
        assert_eq!(o.notes, "all good");
        assert!(o.preferred_label.is_none());
        assert!(o.failure_reason.is_none());
        assert!(o.suggested_next_ids.is_empty());
        assert!(o.context_updates.is_empty());
    }

    #[test]
    fn outcome_fail_constructor() {
        let o = Outcome::fail("something broke");
        assert_eq!(o.status, StageStatus::Fail);
        assert_eq!(o.failure_reason, Some("something broke".to_string()));
        assert!(o.notes.is_empty());
    }

    #[test]
    fn outcome_with_label_constructor() {
        let o = Outcome::with_label(StageStatus::Retry, "try_again");
        assert_eq!(o.status, StageStatus::Retry);
        assert_eq!(o.preferred_label, Some("try_again".to_string()));
    }
}
