//! Core data model for a council run
//!
//! These types flow from the dispatcher through clustering into the
//! synthesizer. They are immutable once produced and serializable so the
//! presentation layer can render or export them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of one worker within a batch (zero-based submission index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent-{:03}", self.0)
    }
}

/// The shared input every worker in a batch receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// The user question.
    pub question: String,
    /// Prior answers folded in during recall, if any.
    pub context: Option<String>,
}

impl Signal {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
        }
    }

    /// Attach recalled context. Blank context is dropped.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }
}

/// One unit of dispatch: a worker identity, its role, and the shared signal.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkerId,
    pub role: String,
    pub signal: Arc<Signal>,
}

/// Terminal status of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Success,
    Error,
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Classification of a worker failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkErrorKind {
    /// Generation call exceeded the per-worker timeout.
    Timeout,
    /// Network, HTTP status or quota failure from a provider.
    Transport,
    /// Provider answered but the payload was unusable.
    MalformedResponse,
    /// Anything raised by the runtime itself (closed limiter, panicked task).
    Internal,
}

impl std::fmt::Display for WorkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Error payload recorded on an `ERROR` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkFailure {
    pub kind: WorkErrorKind,
    pub message: String,
}

/// Outcome payload of a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOutcome {
    Success { content: String, vector: Vec<f64> },
    Error(WorkFailure),
}

/// Produced exactly once per `WorkItem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResult {
    pub id: WorkerId,
    pub role: String,
    pub outcome: WorkOutcome,
}

impl WorkResult {
    pub fn success(id: WorkerId, role: impl Into<String>, content: String, vector: Vec<f64>) -> Self {
        Self {
            id,
            role: role.into(),
            outcome: WorkOutcome::Success { content, vector },
        }
    }

    pub fn error(
        id: WorkerId,
        role: impl Into<String>,
        kind: WorkErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            role: role.into(),
            outcome: WorkOutcome::Error(WorkFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn status(&self) -> WorkStatus {
        match self.outcome {
            WorkOutcome::Success { .. } => WorkStatus::Success,
            WorkOutcome::Error(_) => WorkStatus::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == WorkStatus::Success
    }

    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            WorkOutcome::Success { content, .. } => Some(content),
            WorkOutcome::Error(_) => None,
        }
    }

    pub fn vector(&self) -> Option<&[f64]> {
        match &self.outcome {
            WorkOutcome::Success { vector, .. } => Some(vector),
            WorkOutcome::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkFailure> {
        match &self.outcome {
            WorkOutcome::Success { .. } => None,
            WorkOutcome::Error(failure) => Some(failure),
        }
    }

    /// One-line summary for previews, content truncated to `max_chars`.
    pub fn preview(&self, max_chars: usize) -> String {
        match &self.outcome {
            WorkOutcome::Success { content, .. } => truncate_chars(content, max_chars),
            WorkOutcome::Error(failure) => format!("{}: {}", failure.kind, failure.message),
        }
    }
}

/// All results of one batch, in completion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSet {
    results: Vec<WorkResult>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: WorkResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[WorkResult] {
        &self.results
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn error_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// The SUCCESS-only working set, preserving completion order.
    pub fn valid(&self) -> Vec<WorkResult> {
        self.results.iter().filter(|r| r.is_success()).cloned().collect()
    }

    pub fn into_inner(self) -> Vec<WorkResult> {
        self.results
    }
}

impl FromIterator<WorkResult> for ResultSet {
    fn from_iter<I: IntoIterator<Item = WorkResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

/// Final answer of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRecord {
    pub answer: String,
    /// 0-100. Zero marks a degraded synthesis.
    pub confidence: u8,
    pub representative_count: usize,
    pub total_workers: usize,
}

impl SynthesisRecord {
    pub fn is_degraded(&self) -> bool {
        self.confidence == 0
    }
}

/// A point of the visualization scatter.
///
/// `x`/`y` are raw vector dimensions 0 and 1. This is a lossy debug
/// projection, not a dimensionality reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub worker_id: WorkerId,
    pub role: String,
    pub cluster: usize,
    pub content_preview: String,
    pub x: f64,
    pub y: f64,
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
