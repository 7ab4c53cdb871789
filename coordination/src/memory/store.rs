//! Long-term memory of past syntheses.
//!
//! Stores (question, answer, score) triples and recalls the answers of the
//! most similar past questions. The in-process store ranks by word-set
//! Jaccard similarity; a vector-backed store can implement the same trait.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::errors::{MemoryError, MemoryResult};

/// Default number of lessons returned by recall.
pub const DEFAULT_RECALL_LIMIT: usize = 2;

/// A persisted synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub question: String,
    pub answer: String,
    /// Synthesis confidence, 0-100.
    pub score: u8,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, score: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            answer: answer.into(),
            score,
            recorded_at: Utc::now(),
        }
    }
}

/// Memory collaborator seam.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Answers of up to `limit` past questions most similar to `question`,
    /// best first. An empty store returns an empty list.
    async fn recall(&self, question: &str, limit: usize) -> MemoryResult<Vec<String>>;

    /// Persist one entry. The store serializes its own writes.
    async fn persist(&self, entry: MemoryEntry) -> MemoryResult<()>;

    fn is_available(&self) -> bool;
}

/// Process-local store behind a tokio `RwLock`.
pub struct InMemoryStore {
    entries: RwLock<Vec<MemoryEntry>>,
    available: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: true,
        }
    }

    /// A store that refuses every call, for the degraded path.
    pub fn offline() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            available: false,
        }
    }

    pub fn with_entries(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            available: true,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn recall(&self, question: &str, limit: usize) -> MemoryResult<Vec<String>> {
        if !self.available {
            return Err(MemoryError::Unavailable);
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = word_set(question);
        let entries = self.entries.read().await;
        let mut scored: Vec<(f64, &MemoryEntry)> = entries
            .iter()
            .map(|e| (jaccard(&query, &word_set(&e.question)), e))
            .filter(|(sim, _)| *sim > 0.0)
            .collect();

        // Ties go to the newer entry.
        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.recorded_at.cmp(&a.1.recorded_at))
        });

        let lessons: Vec<String> = scored
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.answer.clone())
            .collect();
        debug!(candidates = entries.len(), recalled = lessons.len(), "memory recall");
        Ok(lessons)
    }

    async fn persist(&self, entry: MemoryEntry) -> MemoryResult<()> {
        if !self.available {
            return Err(MemoryError::Unavailable);
        }
        if entry.answer.trim().is_empty() {
            return Err(MemoryError::InvalidEntry("answer is empty".into()));
        }
        if entry.score > 100 {
            return Err(MemoryError::InvalidEntry(format!(
                "score {} exceeds 100",
                entry.score
            )));
        }

        let mut entries = self.entries.write().await;
        debug!(id = %entry.id, score = entry.score, "memory persist");
        entries.push(entry);
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Join recalled lessons into the context string handed to workers.
pub fn fold_lessons(lessons: &[String]) -> String {
    lessons.join("\n")
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
