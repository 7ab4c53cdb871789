//! Hive Coordination Library
//!
//! LLM-free building blocks for the agent council:
//! - [`types`]: the data model shared by every stage (work items, results,
//!   synthesis records, chart points)
//! - [`cluster`]: k-means partitioning and representative selection
//! - [`events`]: presentation events, broadcast bus, monotonic progress
//! - [`capacity`]: concurrency budget estimation from available RAM
//! - [`memory`]: recall/persist of past answers
//!
//! Everything here is deterministic once a seed is fixed, which is what the
//! orchestration crate relies on in its tests.

#![allow(clippy::uninlined_format_args)]

pub mod capacity;
pub mod cluster;
pub mod events;
pub mod memory;
pub mod types;

pub use capacity::{CapacityEstimator, FixedCapacity, SystemCapacityEstimator};
pub use cluster::{ClusterError, ClusterOutcome, ClusterSummary, Clusterer};
pub use events::{EventBus, HiveEvent, PipelineStage, ProgressEvent, ProgressReporter, SharedEventBus};
pub use memory::{InMemoryStore, MemoryEntry, MemoryError, MemoryStore};
pub use types::{
    ChartPoint, ResultSet, Signal, SynthesisRecord, WorkErrorKind, WorkFailure, WorkItem,
    WorkOutcome, WorkResult, WorkStatus, WorkerId,
};
