//! Pipeline controller.
//!
//! ```text
//! INIT ─▶ RECALL? ─▶ DISPATCH ─┬─▶ CLUSTER ─▶ SYNTHESIZE ─▶ MEMORIZE? ─▶ DONE
//!                              └─▶ FAILED   (no valid result)
//! ```
//!
//! Progress bands: INIT/RECALL 0-10, DISPATCH 10-65, CLUSTER 65-80,
//! SYNTHESIZE 80-95, MEMORIZE/DONE 95-100. Memory problems and synthesis
//! failures degrade the run; only an empty valid set fails it.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use coordination::capacity::{CapacityEstimator, FixedCapacity, SystemCapacityEstimator};
use coordination::cluster::Clusterer;
use coordination::events::{
    checkpoints, EventBus, HiveEvent, PipelineStage, ProgressReporter, SharedEventBus,
};
use coordination::memory::{fold_lessons, MemoryEntry, MemoryStore};
use coordination::types::{ChartPoint, ResultSet, Signal, SynthesisRecord, WorkResult};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::HiveConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::ConfigError;
use crate::limiter::ConcurrencyLimiter;
use crate::provider::Providers;
use crate::roles::{RandomRoleSelector, RoleCatalog, RoleSelector};
use crate::synthesizer::{SynthesisMode, Synthesizer};
use crate::worker::{LiveSettings, Worker, WorkerMode};

/// Failure message when no worker produced a usable answer.
pub const NO_VALID_RESULTS: &str = "No agent answered successfully.";

/// Counters for one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub requested_workers: usize,
    pub concurrency: usize,
    pub succeeded: usize,
    /// ERROR records plus successes excluded from clustering.
    pub failed: usize,
    pub clusters: usize,
    pub elapsed_ms: u64,
}

/// Terminal result of [`Pipeline::run`]. Never an `Err`.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed {
        record: SynthesisRecord,
        /// Lossy scatter of the valid results (dimensions 0/1).
        chart: Vec<ChartPoint>,
        stats: RunStats,
    },
    Failed {
        reason: String,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn record(&self) -> Option<&SynthesisRecord> {
        match self {
            Self::Completed { record, .. } => Some(record),
            Self::Failed { .. } => None,
        }
    }

    pub fn stats(&self) -> Option<&RunStats> {
        match self {
            Self::Completed { stats, .. } => Some(stats),
            Self::Failed { .. } => None,
        }
    }
}

pub struct Pipeline {
    config: HiveConfig,
    catalog: RoleCatalog,
    worker: Worker,
    synthesizer: Synthesizer,
    capacity: Arc<dyn CapacityEstimator>,
    selector: Arc<dyn RoleSelector>,
    memory: Option<Arc<dyn MemoryStore>>,
    clusterer: Clusterer,
    bus: SharedEventBus,
}

impl Pipeline {
    /// Validate `config` and wire default collaborators. Live mode builds
    /// HTTP providers from `config.provider`.
    pub fn new(config: HiveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let catalog = config.role_catalog()?;

        let providers = if config.simulation {
            None
        } else {
            Some(
                Providers::live(&config.provider)
                    .map_err(|e| ConfigError::invalid("provider", e.to_string()))?,
            )
        };
        let (worker, synthesizer) = build_executors(&config, providers);

        let capacity: Arc<dyn CapacityEstimator> = match config.concurrency {
            Some(n) => Arc::new(FixedCapacity(n)),
            None => Arc::new(SystemCapacityEstimator::new()),
        };
        let selector: Arc<dyn RoleSelector> = match config.seed {
            Some(seed) => Arc::new(RandomRoleSelector::seeded(seed)),
            None => Arc::new(RandomRoleSelector::new()),
        };
        let clusterer = match config.seed {
            Some(seed) => Clusterer::new().with_seed(seed),
            None => Clusterer::new(),
        };

        Ok(Self {
            config,
            catalog,
            worker,
            synthesizer,
            capacity,
            selector,
            memory: None,
            clusterer,
            bus: EventBus::new().shared(),
        })
    }

    /// Replace the generation/embedding providers (live mode only).
    pub fn with_providers(mut self, providers: Providers) -> Self {
        let (worker, synthesizer) = build_executors(&self.config, Some(providers));
        self.worker = worker;
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_capacity(mut self, capacity: Arc<dyn CapacityEstimator>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_role_selector(mut self, selector: Arc<dyn RoleSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HiveEvent> {
        self.bus.subscribe()
    }

    /// Run one question end to end.
    pub async fn run(&self, question: &str) -> PipelineOutcome {
        let started = Instant::now();
        let mut progress = ProgressReporter::new(self.bus.clone());
        let requested = self.config.workers;

        // INIT
        let concurrency = self.capacity.estimate(requested).max(1);
        let limiter = ConcurrencyLimiter::new(concurrency);
        info!(workers = requested, concurrency, simulation = self.config.simulation, "run starting");
        progress.report(
            PipelineStage::Init,
            checkpoints::INIT,
            format!("Optimizing resources... running {} workers in parallel.", concurrency),
        );
        let mut stage = PipelineStage::Init;

        // RECALL
        let mut signal = Signal::new(question);
        if let Some(memory) = self.configured_memory() {
            stage = transition(stage, PipelineStage::Recall);
            let lessons = self.recall(memory.as_ref(), question).await;
            progress.publish(HiveEvent::RecallCompleted {
                lessons: lessons.len(),
                timestamp: Utc::now(),
            });
            if !lessons.is_empty() {
                signal = signal.with_context(fold_lessons(&lessons));
            }
            progress.report(
                PipelineStage::Recall,
                checkpoints::RECALL,
                format!("Recalled {} lessons from past runs.", lessons.len()),
            );
        }

        // DISPATCH
        stage = transition(stage, PipelineStage::Dispatch);
        let results = self
            .dispatcher()
            .run(signal, requested, &limiter, &mut progress)
            .await;
        let (valid, excluded) = clusterable(&results);

        if valid.is_empty() {
            transition(stage, PipelineStage::Failed);
            return self.fail(&mut progress, NO_VALID_RESULTS);
        }
        progress.report(
            PipelineStage::Dispatch,
            checkpoints::COLLECTED,
            format!("Collected {} opinions. Analyzing...", valid.len()),
        );

        // CLUSTER
        stage = transition(stage, PipelineStage::Cluster);
        let clustered = match self.clusterer.cluster(&valid, self.config.keep_clusters) {
            Ok(outcome) => outcome,
            Err(e) => {
                // clusterable() upholds every precondition; reaching this is a bug.
                error!(error = %e, "clustering rejected a filtered result set");
                return self.fail(&mut progress, &format!("Clustering failed: {e}"));
            }
        };
        for summary in clustered.summaries(&valid) {
            progress.publish(HiveEvent::ClusterFormed {
                label: summary.label,
                representative_id: summary.representative_id,
                representative_role: summary.representative_role,
                members: summary.members,
                timestamp: Utc::now(),
            });
        }
        progress.report(
            PipelineStage::Cluster,
            checkpoints::CLUSTERED,
            format!(
                "Condensed into {} main lines of thought.",
                clustered.representatives.len()
            ),
        );

        // SYNTHESIZE
        stage = transition(stage, PipelineStage::Synthesize);
        let record = self
            .synthesizer
            .synthesize(&clustered.representatives, question, requested)
            .await;
        progress.report(
            PipelineStage::Synthesize,
            checkpoints::SYNTHESIZED,
            "The council has reached a decision.",
        );

        // MEMORIZE
        if let Some(memory) = self.configured_memory() {
            stage = transition(stage, PipelineStage::Memorize);
            self.memorize(memory.as_ref(), question, &record).await;
        }

        // DONE
        transition(stage, PipelineStage::Done);
        let stats = RunStats {
            requested_workers: requested,
            concurrency,
            succeeded: valid.len(),
            failed: results.error_count() + excluded,
            clusters: clustered.representatives.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            requested_workers = stats.requested_workers,
            concurrency = stats.concurrency,
            succeeded = stats.succeeded,
            failed = stats.failed,
            clusters = stats.clusters,
            elapsed_ms = stats.elapsed_ms,
            confidence = record.confidence,
            "run completed"
        );
        progress.report(PipelineStage::Done, checkpoints::DONE, "Done!");
        progress.publish(HiveEvent::RunCompleted {
            record: record.clone(),
            chart: clustered.projection.clone(),
            timestamp: Utc::now(),
        });

        PipelineOutcome::Completed {
            record,
            chart: clustered.projection,
            stats,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.worker.clone(), self.catalog.clone(), self.selector.clone())
            .with_preview_limit(self.config.preview_limit)
    }

    fn configured_memory(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.memory.as_ref().filter(|_| self.config.memory.enabled)
    }

    async fn recall(&self, memory: &dyn MemoryStore, question: &str) -> Vec<String> {
        if !memory.is_available() {
            warn!("memory unavailable, continuing without recalled context");
            return Vec::new();
        }
        match memory.recall(question, self.config.memory.recall_limit).await {
            Ok(lessons) => {
                debug!(lessons = lessons.len(), "recall complete");
                lessons
            }
            Err(e) => {
                warn!(error = %e, "recall failed, continuing without recalled context");
                Vec::new()
            }
        }
    }

    async fn memorize(&self, memory: &dyn MemoryStore, question: &str, record: &SynthesisRecord) {
        let threshold = self.config.memory.persist_threshold;
        if record.confidence < threshold {
            debug!(confidence = record.confidence, threshold, "below persistence threshold");
            return;
        }
        if !memory.is_available() {
            warn!("memory unavailable, synthesis not persisted");
            return;
        }
        let entry = MemoryEntry::new(question, record.answer.clone(), record.confidence);
        match memory.persist(entry).await {
            Ok(()) => info!(confidence = record.confidence, "synthesis persisted"),
            Err(e) => warn!(error = %e, "failed to persist synthesis"),
        }
    }

    fn fail(&self, progress: &mut ProgressReporter, reason: &str) -> PipelineOutcome {
        warn!(reason, "run failed");
        progress.hold(PipelineStage::Failed, reason);
        progress.publish(HiveEvent::RunFailed {
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        PipelineOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

fn build_executors(config: &HiveConfig, providers: Option<Providers>) -> (Worker, Synthesizer) {
    match providers {
        Some(providers) if !config.simulation => {
            let synthesizer = Synthesizer::new(SynthesisMode::Live {
                generation: providers.generation.clone(),
                model: config.provider.model.clone(),
            });
            let worker = Worker::new(WorkerMode::Live(LiveSettings {
                providers,
                model: config.provider.model.clone(),
                embedding_model: config.provider.embedding_model.clone(),
                temperature: config.provider.temperature,
                timeout: config.provider.timeout(),
            }));
            (worker, synthesizer)
        }
        _ => (
            Worker::new(WorkerMode::Simulated(config.sim.clone())),
            Synthesizer::new(SynthesisMode::Simulated {
                delay: config.sim.synthesis_delay(),
            }),
        ),
    }
}

fn transition(from: PipelineStage, to: PipelineStage) -> PipelineStage {
    if !from.can_advance_to(to) {
        warn!(%from, %to, "unexpected stage transition");
    }
    debug!(%from, %to, "stage transition");
    to
}

/// SUCCESS results whose vectors share the first valid dimension.
/// Returns the kept results and how many were excluded.
pub fn clusterable(results: &ResultSet) -> (Vec<WorkResult>, usize) {
    let mut expected: Option<usize> = None;
    let mut kept = Vec::with_capacity(results.success_count());
    let mut excluded = 0;

    for result in results.iter().filter(|r| r.is_success()) {
        let dim = result.vector().map_or(0, <[f64]>::len);
        if dim == 0 {
            warn!(worker_id = %result.id, "excluding result with empty vector");
            excluded += 1;
            continue;
        }
        match expected {
            None => expected = Some(dim),
            Some(want) if want != dim => {
                warn!(worker_id = %result.id, expected = want, found = dim, "excluding result with mismatched vector dimension");
                excluded += 1;
                continue;
            }
            Some(_) => {}
        }
        kept.push(result.clone());
    }
    (kept, excluded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::types::{WorkErrorKind, WorkerId};

    fn ok(id: usize, dim: usize) -> WorkResult {
        WorkResult::success(WorkerId(id), "Economist", format!("o{id}"), vec![0.5; dim])
    }

    #[test]
    fn clusterable_drops_errors_and_odd_dimensions() {
        let set: ResultSet = vec![
            WorkResult::error(WorkerId(0), "x", WorkErrorKind::Timeout, "slow"),
            ok(1, 4),
            ok(2, 3),
            ok(3, 0),
            ok(4, 4),
        ]
        .into_iter()
        .collect();

        let (kept, excluded) = clusterable(&set);
        let ids: Vec<usize> = kept.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 4]);
        assert_eq!(excluded, 2);
    }

    #[test]
    fn live_mode_without_providers_still_validates_key() {
        let mut config = HiveConfig::from_lookup(|_| None);
        config.simulation = false;
        assert!(matches!(
            Pipeline::new(config),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_single_worker_run_completes() {
        let mut config = HiveConfig::from_lookup(|_| None);
        config.workers = 1;
        config.concurrency = Some(1);
        let pipeline = Pipeline::new(config).unwrap();

        let outcome = pipeline.run("Should we expand to Europe?").await;
        let stats = outcome.stats().unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.clusters, 1);
        assert_eq!(outcome.record().unwrap().representative_count, 1);
    }
}
