//! Presentation events for a council run
//!
//! The pipeline never talks to a terminal or UI directly. It publishes
//! [`HiveEvent`]s on a broadcast bus and whoever presents the run
//! subscribes.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Pipeline   │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │  (CLI, tests)│
//! └──────┬───────┘     └──────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ ProgressReporter │  clamps percent to a non-decreasing sequence
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use coordination::events::{EventBus, PipelineStage, ProgressReporter};
//!
//! let bus = EventBus::new().shared();
//! let mut receiver = bus.subscribe();
//!
//! let mut progress = ProgressReporter::new(bus.clone());
//! progress.report(PipelineStage::Init, 5, "waking the hive");
//!
//! let event = receiver.recv().await?;
//! ```

pub mod bus;
pub mod progress;
pub mod types;

pub use bus::{drain, EventBus, SharedEventBus};
pub use progress::{checkpoints, interpolate, ProgressReporter};
pub use types::{HiveEvent, PipelineStage, ProgressEvent};
