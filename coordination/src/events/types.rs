//! Event types for a council run
//!
//! These events are the only channel between the pipeline and whatever
//! presents it (CLI, UI, test harness).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChartPoint, SynthesisRecord, WorkStatus, WorkerId};

/// Pipeline stage. Doubles as the controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Init,
    Recall,
    Dispatch,
    Cluster,
    Synthesize,
    Memorize,
    Done,
    /// Absorbing failure state, reachable only from `Dispatch`.
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal forward transitions. Optional stages may be skipped.
    pub fn can_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        matches!(
            (self, next),
            (Init, Recall)
                | (Init, Dispatch)
                | (Recall, Dispatch)
                | (Dispatch, Cluster)
                | (Dispatch, Failed)
                | (Cluster, Synthesize)
                | (Synthesize, Memorize)
                | (Synthesize, Done)
                | (Memorize, Done)
        )
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Recall => write!(f, "recall"),
            Self::Dispatch => write!(f, "dispatch"),
            Self::Cluster => write!(f, "cluster"),
            Self::Synthesize => write!(f, "synthesize"),
            Self::Memorize => write!(f, "memorize"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A (stage, percent) checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: PipelineStage,
    /// 0-100, non-decreasing within a run.
    pub percent: u8,
}

/// Everything the pipeline tells the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HiveEvent {
    /// Progress checkpoint with a human-readable status line
    Progress {
        progress: ProgressEvent,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Recall finished; `lessons` prior answers were folded into the context
    RecallCompleted {
        lessons: usize,
        timestamp: DateTime<Utc>,
    },

    /// One of the first few worker completions
    WorkerPreview {
        worker_id: WorkerId,
        role: String,
        status: WorkStatus,
        preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A cluster and its representative
    ClusterFormed {
        label: usize,
        representative_id: WorkerId,
        representative_role: String,
        members: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run reached DONE
    RunCompleted {
        record: SynthesisRecord,
        chart: Vec<ChartPoint>,
        timestamp: DateTime<Utc>,
    },

    /// The run reached FAILED
    RunFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl HiveEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HiveEvent::Progress { timestamp, .. } => *timestamp,
            HiveEvent::RecallCompleted { timestamp, .. } => *timestamp,
            HiveEvent::WorkerPreview { timestamp, .. } => *timestamp,
            HiveEvent::ClusterFormed { timestamp, .. } => *timestamp,
            HiveEvent::RunCompleted { timestamp, .. } => *timestamp,
            HiveEvent::RunFailed { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            HiveEvent::Progress { .. } => "progress",
            HiveEvent::RecallCompleted { .. } => "recall_completed",
            HiveEvent::WorkerPreview { .. } => "worker_preview",
            HiveEvent::ClusterFormed { .. } => "cluster_formed",
            HiveEvent::RunCompleted { .. } => "run_completed",
            HiveEvent::RunFailed { .. } => "run_failed",
        }
    }

    /// The progress payload, if this is a progress event.
    pub fn progress(&self) -> Option<ProgressEvent> {
        match self {
            HiveEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HiveEvent::RunCompleted { .. } | HiveEvent::RunFailed { .. })
    }
}
