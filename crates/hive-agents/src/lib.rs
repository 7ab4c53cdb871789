//! Agent council: fan a question out to many role-conditioned workers,
//! cluster their opinions and synthesize one answer from the
//! representatives.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod limiter;
pub mod pipeline;
pub mod provider;
pub mod roles;
pub mod synthesizer;
pub mod worker;

pub use config::{ConfigOverrides, HiveConfig, MemoryConfig, ProviderConfig, SimulationProfile};
pub use dispatcher::Dispatcher;
pub use errors::{ConfigError, ProviderError, WorkerError};
pub use limiter::ConcurrencyLimiter;
pub use pipeline::{Pipeline, PipelineOutcome, RunStats};
pub use provider::{EmbeddingProvider, GenerationProvider, GenerationRequest, Providers};
pub use roles::{CatalogName, CyclingRoleSelector, RandomRoleSelector, RoleCatalog, RoleSelector};
pub use synthesizer::{SynthesisMode, Synthesizer};
pub use worker::{LiveSettings, Worker, WorkerMode};
