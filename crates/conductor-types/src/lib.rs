//! Shared types for the Conductor pipeline engine.
//!
//! This crate provides the foundational types used across the other Conductor
//! crates:
//! - `ConductorError`: unified error taxonomy, plus error-text sanitization
//! - `Context`: keyed store threaded through a pipeline run
//! - `Outcome`: result of executing a node handler
//! - `AgentTurn`: per-turn agent telemetry record
//! - `Diagnostic` / `DiagnosticCollection`: validation output

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for all Conductor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// Graph validation found error-severity diagnostics. Carries the full
    /// collection so callers can render every finding, not just the first.
    #[error("{0}")]
    Validation(DiagnosticCollection),

    #[error("handler '{handler}' failed on node '{node}': {message}")]
    Handler {
        handler: String,
        node: String,
        message: String,
    },

    /// Connection or auth failure talking to an agent backend. Retriable by
    /// failure routing.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("'{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Internal bug surfaced at runtime (e.g. an edge referencing a missing
    /// node after validation passed). Fatal; aborts the pipeline.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("prompt file '{file}': {message}")]
    PromptLayer { file: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ConductorError {
    /// Returns `true` if failure routing may reasonably re-run the node.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConductorError::BackendUnavailable(_) | ConductorError::Timeout { .. }
        )
    }
}

/// A convenience alias for `Result<T, ConductorError>`.
pub type Result<T> = std::result::Result<T, ConductorError>;

/// Strip API keys and bearer tokens from error text before it crosses any
/// boundary (event, log, user-facing message). Idempotent.
pub fn sanitize_error(message: &str) -> String {
    let key_pattern = regex::Regex::new(r"(sk-|key-)[A-Za-z0-9_-]+").unwrap();
    let bearer_pattern = regex::Regex::new(r"Bearer\s+[A-Za-z0-9_-]+").unwrap();
    let pass = key_pattern.replace_all(message, "[REDACTED]");
    bearer_pattern.replace_all(&pass, "Bearer [REDACTED]").into_owned()
}

// ---------------------------------------------------------------------------
// Context: keyed store threaded through a pipeline run
// ---------------------------------------------------------------------------

/// Keyed store shared across the nodes of one pipeline run.
///
/// Cloning a `Context` yields another handle to the **same** inner state.
/// Use [`clone_isolated`](Context::clone_isolated) for a deep copy whose
/// nested values are fully independent of the original.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<tokio::sync::RwLock<HashMap<String, serde_json::Value>>>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a key.
    pub async fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.write().await.insert(key.into(), value);
    }

    /// Read a value by key (cloned).
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.read().await.get(key).cloned()
    }

    /// Accessor that returns a `String`, falling back to `default` when the
    /// key is absent or not a JSON string.
    pub async fn get_string(&self, key: &str, default: &str) -> String {
        self.inner
            .read()
            .await
            .get(key)
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| default.to_owned())
    }

    /// Shallow copy of the current key/value map.
    pub async fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.inner.read().await.clone()
    }

    /// Deep copy that is fully independent of the original context.
    pub async fn clone_isolated(&self) -> Context {
        let guard = self.inner.read().await;
        Context {
            inner: Arc::new(tokio::sync::RwLock::new(guard.clone())),
        }
    }

    /// Merge `updates` into the context. Existing keys absent from `updates`
    /// are preserved.
    pub async fn apply_updates(&self, updates: HashMap<String, serde_json::Value>) {
        self.inner.write().await.extend(updates);
    }
}

// ---------------------------------------------------------------------------
// OutcomeStatus / Outcome: result of executing a node handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Fail,
    PartialSuccess,
    Retry,
}

impl OutcomeStatus {
    /// The lowercase name used by the edge-condition grammar
    /// (`outcome=success` etc.).
    pub fn as_condition_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Fail => "fail",
            OutcomeStatus::PartialSuccess => "partial_success",
            OutcomeStatus::Retry => "retry",
        }
    }

    /// Whether edge selection should treat this as the success path.
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success | OutcomeStatus::PartialSuccess)
    }
}

/// The result a node handler returns to the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    /// Hint for edge-label matching. Carried through but not consulted by
    /// edge selection.
    pub preferred_label: Option<String>,
    /// Handler routing bias. Carried through but not consulted by edge
    /// selection.
    pub suggested_next_ids: Vec<String>,
    /// Applied to the run context after the node completes.
    pub context_updates: HashMap<String, serde_json::Value>,
    pub notes: String,
    pub failure_reason: Option<String>,
}

impl Outcome {
    fn with_status(status: OutcomeStatus, notes: impl Into<String>) -> Self {
        Self {
            status,
            preferred_label: None,
            suggested_next_ids: Vec::new(),
            context_updates: HashMap::new(),
            notes: notes.into(),
            failure_reason: None,
        }
    }

    pub fn success(notes: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Success, notes)
    }

    pub fn partial(notes: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::PartialSuccess, notes)
    }

    pub fn retry(notes: impl Into<String>) -> Self {
        Self::with_status(OutcomeStatus::Retry, notes)
    }

    /// A failed outcome. The reason is sanitized here so no caller can leak
    /// credentials through `failure_reason`.
    pub fn fail(reason: impl Into<String>) -> Self {
        let mut outcome = Self::with_status(OutcomeStatus::Fail, "");
        outcome.failure_reason = Some(sanitize_error(&reason.into()));
        outcome
    }

    pub fn with_context_update(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.context_updates.insert(key.into(), value);
        self
    }
}

// ---------------------------------------------------------------------------
// AgentTurn: per-turn agent telemetry
// ---------------------------------------------------------------------------

/// Telemetry record for one completed back-and-forth with an agent backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTurn {
    /// 1-based turn counter within a node's conversation.
    pub turn_number: u32,
    pub model: String,
    pub provider: String,
    /// Ordered conversation messages, in provider-neutral JSON form.
    pub messages: Vec<serde_json::Value>,
    pub tool_calls: Vec<serde_json::Value>,
    /// Deduplicated paths written during the turn, in first-write order.
    pub files_written: Vec<String>,
    pub token_usage: HashMap<String, u64>,
    pub agent_state: serde_json::Map<String, serde_json::Value>,
    pub git_sha: String,
    pub commit_message: String,
}

impl AgentTurn {
    pub fn new(turn_number: u32) -> Self {
        Self {
            turn_number,
            ..Default::default()
        }
    }

    /// Flatten the record for observers that demand primitive fields:
    /// `messages`, `tool_calls`, and `agent_state` become JSON strings
    /// (empty string when empty), everything else keeps its shape.
    pub fn primitive_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        fn stringify<T: Serialize>(value: &T, is_empty: bool) -> serde_json::Value {
            if is_empty {
                serde_json::Value::String(String::new())
            } else {
                serde_json::Value::String(
                    serde_json::to_string(value).unwrap_or_default(),
                )
            }
        }

        let mut fields = serde_json::Map::new();
        fields.insert("turn_number".into(), self.turn_number.into());
        fields.insert("model".into(), self.model.clone().into());
        fields.insert("provider".into(), self.provider.clone().into());
        fields.insert(
            "messages".into(),
            stringify(&self.messages, self.messages.is_empty()),
        );
        fields.insert(
            "tool_calls".into(),
            stringify(&self.tool_calls, self.tool_calls.is_empty()),
        );
        fields.insert(
            "files_written".into(),
            serde_json::Value::Array(
                self.files_written.iter().map(|p| p.clone().into()).collect(),
            ),
        );
        fields.insert(
            "token_usage".into(),
            serde_json::to_value(&self.token_usage).unwrap_or_default(),
        );
        fields.insert(
            "agent_state".into(),
            stringify(&self.agent_state, self.agent_state.is_empty()),
        );
        fields.insert("git_sha".into(), self.git_sha.clone().into());
        fields.insert("commit_message".into(), self.commit_message.clone().into());
        fields
    }
}

// ---------------------------------------------------------------------------
// Diagnostics: validation output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single finding from a validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub edge: Option<(String, String)>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
            node_id: None,
            edge: None,
            suggestion: None,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn for_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edge = Some((from.into(), to.into()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// All findings from one validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticCollection {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

impl fmt::Display for DiagnosticCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors();
        write!(f, "validation failed with {} error(s):", errors.len())?;
        for d in errors {
            write!(f, "\n  [{}] {}", d.rule, d.message)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
