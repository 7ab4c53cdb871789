//! Monotonic progress reporting
//!
//! Stages own fixed percentage checkpoints. The dispatch band is
//! interpolated per completion. Every percent passes through
//! [`ProgressReporter::report`], which never lets the sequence go
//! backwards.

use chrono::Utc;
use tracing::debug;

use super::bus::SharedEventBus;
use super::types::{HiveEvent, PipelineStage, ProgressEvent};

/// Fixed checkpoints of a run.
pub mod checkpoints {
    pub const INIT: u8 = 5;
    pub const RECALL: u8 = 8;
    pub const DISPATCH_START: u8 = 10;
    pub const DISPATCH_END: u8 = 60;
    pub const COLLECTED: u8 = 65;
    pub const CLUSTERED: u8 = 80;
    pub const SYNTHESIZED: u8 = 95;
    pub const DONE: u8 = 100;
}

/// Percent for `completed` of `total` inside `[start, end]`.
///
/// `total == 0` reads as a finished band.
pub fn interpolate(start: u8, end: u8, completed: usize, total: usize) -> u8 {
    if total == 0 || completed >= total {
        return end.max(start);
    }
    let span = end.saturating_sub(start) as usize;
    start + (completed * span / total) as u8
}

/// Publishes `Progress` events with clamped, non-decreasing percentages.
pub struct ProgressReporter {
    bus: SharedEventBus,
    stage: PipelineStage,
    percent: u8,
    emitted: usize,
}

impl ProgressReporter {
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            bus,
            stage: PipelineStage::Init,
            percent: 0,
            emitted: 0,
        }
    }

    /// Emit a checkpoint. Values above 100 or below the last emitted
    /// percent are clamped. Returns the event actually published.
    pub fn report(
        &mut self,
        stage: PipelineStage,
        percent: u8,
        message: impl Into<String>,
    ) -> ProgressEvent {
        let clamped = percent.min(100).max(self.percent);
        if clamped != percent {
            debug!(requested = percent, clamped, %stage, "progress clamped");
        }
        self.stage = stage;
        self.percent = clamped;
        self.emitted += 1;

        let progress = ProgressEvent {
            stage,
            percent: clamped,
        };
        self.bus.publish(HiveEvent::Progress {
            progress,
            message: message.into(),
            timestamp: Utc::now(),
        });
        progress
    }

    /// Re-emit the current percent under a new stage.
    pub fn hold(&mut self, stage: PipelineStage, message: impl Into<String>) -> ProgressEvent {
        let percent = self.percent;
        self.report(stage, percent, message)
    }

    /// Forward a non-progress event on the same bus.
    pub fn publish(&self, event: HiveEvent) {
        self.bus.publish(event);
    }

    pub fn current(&self) -> ProgressEvent {
        ProgressEvent {
            stage: self.stage,
            percent: self.percent,
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }
}
