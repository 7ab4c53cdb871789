//! Hive Memory: long-term recall of past council answers.
//!
//! # Modules
//!
//! - [`store`]: MemoryStore trait, MemoryEntry, in-process implementation
//! - [`errors`]: Error taxonomy (all non-fatal to a run)

pub mod errors;
pub mod store;

pub use errors::{MemoryError, MemoryResult};
pub use store::{fold_lessons, InMemoryStore, MemoryEntry, MemoryStore, DEFAULT_RECALL_LIMIT};
