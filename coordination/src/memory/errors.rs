//! Memory collaborator errors.
//!
//! Callers treat every variant as non-fatal: recall degrades to an empty
//! context and persistence is best-effort.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The store was never reachable (offline, failed to open).
    #[error("memory store unavailable")]
    Unavailable,

    /// A read or write failed after the store was opened.
    #[error("memory storage failure: {0}")]
    Storage(String),

    /// The entry was rejected before reaching storage.
    #[error("invalid memory entry: {0}")]
    InvalidEntry(String),
}

impl MemoryError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
