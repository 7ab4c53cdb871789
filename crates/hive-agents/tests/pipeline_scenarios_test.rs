//! End-to-end pipeline scenarios with mock providers.
//!
//! Live mode is driven through hand-written `GenerationProvider` /
//! `EmbeddingProvider` mocks so every test is deterministic and offline.
//! Worker calls carry a system message; the synthesis call does not.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordination::events::{drain, HiveEvent};
use coordination::memory::{InMemoryStore, MemoryEntry, MemoryStore};
use hive_agents::{
    CyclingRoleSelector, EmbeddingProvider, GenerationProvider, GenerationRequest, HiveConfig,
    Pipeline, PipelineOutcome, ProviderError, Providers,
};

// ---------------------------------------------------------------------------
// Mocks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockGeneration {
    worker_calls: AtomicUsize,
    synthesis_prompts: Mutex<Vec<String>>,
    system_prompts: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    /// Latency of each worker call.
    delay: Duration,
    fail_workers: bool,
    fail_synthesis: bool,
    /// Every n-th worker call (1-based) hangs for ten minutes.
    hang_every: Option<usize>,
}

impl MockGeneration {
    fn synthesis_calls(&self) -> usize {
        self.synthesis_prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationProvider for MockGeneration {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let system = request.system_text();
        if system.is_empty() {
            self.synthesis_prompts
                .lock()
                .unwrap()
                .push(request.user_text());
            return if self.fail_synthesis {
                Err(ProviderError::status(500, "synthesis down"))
            } else {
                Ok("Resolution: phased rollout.".to_string())
            };
        }

        let call = self.worker_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.system_prompts.lock().unwrap().push(system);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let hang = self.hang_every.is_some_and(|n| call % n == 0);
        let wait = if hang {
            Duration::from_secs(600)
        } else {
            self.delay
        };
        tokio::time::sleep(wait).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_workers {
            Err(ProviderError::Transport("connection refused".into()))
        } else {
            Ok(format!("opinion #{call}"))
        }
    }
}

/// Three well-separated groups, assigned round-robin.
#[derive(Default)]
struct GroupedEmbedding {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for GroupedEmbedding {
    async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f64>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let group = (call % 3) as f64;
        let jitter = (call as f64) * 0.001;
        Ok(vec![group * 100.0 + jitter, group * 100.0 - jitter, 1.0])
    }
}

fn live_config(workers: usize, keep: usize, concurrency: usize) -> HiveConfig {
    let mut config = HiveConfig::from_lookup(|_| None);
    config.simulation = false;
    config.provider.api_key = Some("sk-test".to_string());
    config.provider.timeout_secs = 5;
    config.workers = workers;
    config.keep_clusters = keep;
    config.concurrency = Some(concurrency);
    config.seed = Some(7);
    config
}

fn live_pipeline(config: HiveConfig, generation: Arc<MockGeneration>) -> Pipeline {
    Pipeline::new(config)
        .unwrap()
        .with_providers(Providers::new(
            generation,
            Arc::new(GroupedEmbedding::default()),
        ))
        .with_role_selector(Arc::new(CyclingRoleSelector))
}

fn percents(events: &[HiveEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| e.progress())
        .map(|p| p.percent)
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn ten_workers_reduce_to_three_representatives() {
    let generation = Arc::new(MockGeneration {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let pipeline = live_pipeline(live_config(10, 3, 4), generation.clone());

    let outcome = pipeline.run("Should we open a second factory?").await;

    let PipelineOutcome::Completed { record, chart, stats } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(stats.requested_workers, 10);
    assert_eq!(stats.succeeded, 10);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.clusters, 3);
    assert_eq!(record.representative_count, 3);
    assert_eq!(record.total_workers, 10);
    assert_eq!(record.confidence, 95);
    assert_eq!(record.answer, "Resolution: phased rollout.");
    assert_eq!(chart.len(), 10);

    assert_eq!(generation.worker_calls.load(Ordering::SeqCst), 10);
    let prompts = generation.synthesis_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let listed = prompts[0].lines().filter(|l| l.starts_with("- [")).count();
    assert_eq!(listed, 3, "synthesizer must see exactly the representatives");
    assert!(prompts[0].contains("from 10 experts"));
}

#[tokio::test(start_paused = true)]
async fn all_workers_failing_ends_in_failed_without_synthesis() {
    let generation = Arc::new(MockGeneration {
        fail_workers: true,
        ..Default::default()
    });
    let pipeline = live_pipeline(live_config(5, 3, 5), generation.clone());
    let mut rx = pipeline.subscribe();

    let outcome = pipeline.run("q").await;

    assert!(!outcome.is_success());
    assert!(matches!(outcome, PipelineOutcome::Failed { ref reason } if reason.contains("No agent")));
    assert_eq!(generation.worker_calls.load(Ordering::SeqCst), 5);
    assert_eq!(generation.synthesis_calls(), 0);

    let events = drain(&mut rx);
    let last = events.last().unwrap();
    assert_eq!(last.event_type(), "run_failed");
    let progress = percents(&events);
    assert_eq!(progress.last(), Some(&60), "FAILED holds the dispatch percent");
    assert!(!events.iter().any(|e| e.event_type() == "cluster_formed"));
}

#[tokio::test(start_paused = true)]
async fn single_worker_is_its_own_representative() {
    let generation = Arc::new(MockGeneration::default());
    let pipeline = live_pipeline(live_config(1, 5, 1), generation.clone());

    let outcome = pipeline.run("q").await;

    let stats = outcome.stats().unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.clusters, 1);
    assert_eq!(outcome.record().unwrap().representative_count, 1);
    let prompts = generation.synthesis_prompts.lock().unwrap();
    assert!(prompts[0].contains("- [Systems Engineer]: opinion #1"));
}

#[tokio::test(start_paused = true)]
async fn progress_is_monotonic_and_ends_at_one_hundred() {
    let mut config = HiveConfig::from_lookup(|_| None);
    config.workers = 12;
    config.concurrency = Some(4);
    config.seed = Some(3);
    let pipeline = Pipeline::new(config).unwrap();
    let mut rx = pipeline.subscribe();

    let outcome = pipeline.run("How do we price the new plan?").await;
    assert!(outcome.is_success());

    let events = drain(&mut rx);
    let progress = percents(&events);
    assert_eq!(progress.first(), Some(&5));
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    for checkpoint in [10u8, 60, 65, 80, 95] {
        assert!(progress.contains(&checkpoint), "missing {checkpoint}");
    }

    assert_eq!(events.last().unwrap().event_type(), "run_completed");
    let previews = events
        .iter()
        .filter(|e| e.event_type() == "worker_preview")
        .count();
    assert_eq!(previews, 5);
    let clusters = events
        .iter()
        .filter(|e| e.event_type() == "cluster_formed")
        .count();
    assert_eq!(clusters, 5);
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_limit() {
    for limit in [1usize, 3, 8] {
        let generation = Arc::new(MockGeneration {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let pipeline = live_pipeline(live_config(16, 4, limit), generation.clone());

        let outcome = pipeline.run("q").await;
        assert_eq!(outcome.stats().unwrap().concurrency, limit);

        let peak = generation.peak.load(Ordering::SeqCst);
        assert!(peak <= limit, "peak {peak} exceeded limit {limit}");
        assert!(peak >= 1);
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_workers_are_counted_as_failed() {
    let generation = Arc::new(MockGeneration {
        hang_every: Some(4),
        ..Default::default()
    });
    let pipeline = live_pipeline(live_config(8, 3, 8), generation.clone());

    let outcome = pipeline.run("q").await;

    let stats = outcome.stats().unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 6);
    assert_eq!(generation.synthesis_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn chart_points_have_unique_worker_ids() {
    let mut config = HiveConfig::from_lookup(|_| None);
    config.workers = 30;
    config.concurrency = Some(30);
    let pipeline = Pipeline::new(config).unwrap();

    let PipelineOutcome::Completed { chart, stats, .. } = pipeline.run("q").await else {
        panic!("simulated run must complete");
    };
    assert_eq!(chart.len(), stats.succeeded);
    let ids: HashSet<_> = chart.iter().map(|p| p.worker_id).collect();
    assert_eq!(ids.len(), chart.len());
    assert!(chart.iter().all(|p| p.cluster < stats.clusters));
}

#[tokio::test(start_paused = true)]
async fn recalled_lessons_reach_workers_and_result_is_persisted() {
    let question = "Should we expand to Europe next year?";
    let store = Arc::new(InMemoryStore::with_entries(vec![MemoryEntry::new(
        "Should we expand to Asia next year?",
        "Expand slowly through local partners.",
        90,
    )]));
    let generation = Arc::new(MockGeneration::default());
    let pipeline =
        live_pipeline(live_config(4, 2, 4), generation.clone()).with_memory(store.clone());
    let mut rx = pipeline.subscribe();

    let outcome = pipeline.run(question).await;
    assert!(outcome.is_success());

    let systems = generation.system_prompts.lock().unwrap();
    assert_eq!(systems.len(), 4);
    assert!(systems
        .iter()
        .all(|s| s.contains("Reference past experience: Expand slowly through local partners.")));

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, HiveEvent::RecallCompleted { lessons: 1, .. })));

    assert_eq!(store.len().await, 2);
    let entries = store.entries().await;
    assert!(entries
        .iter()
        .any(|e| e.question == question && e.score == 95));
}

#[tokio::test(start_paused = true)]
async fn offline_memory_degrades_to_empty_context() {
    let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::offline());
    let generation = Arc::new(MockGeneration::default());
    let pipeline = live_pipeline(live_config(3, 2, 3), generation.clone()).with_memory(store);
    let mut rx = pipeline.subscribe();

    let outcome = pipeline.run("q").await;
    assert!(outcome.is_success());

    let systems = generation.system_prompts.lock().unwrap();
    assert!(systems.iter().all(|s| !s.contains("Reference past experience")));
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, HiveEvent::RecallCompleted { lessons: 0, .. })));
}

#[tokio::test(start_paused = true)]
async fn degraded_synthesis_completes_but_is_not_persisted() {
    let store = Arc::new(InMemoryStore::new());
    let generation = Arc::new(MockGeneration {
        fail_synthesis: true,
        ..Default::default()
    });
    let pipeline =
        live_pipeline(live_config(4, 2, 4), generation.clone()).with_memory(store.clone());

    let outcome = pipeline.run("q").await;

    let record = outcome.record().unwrap();
    assert_eq!(record.confidence, 0);
    assert!(record.answer.starts_with("Synthesis failed:"));
    assert!(store.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn disabled_memory_skips_recall() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = live_config(2, 2, 2);
    config.memory.enabled = false;
    let generation = Arc::new(MockGeneration::default());
    let pipeline = live_pipeline(config, generation).with_memory(store.clone());
    let mut rx = pipeline.subscribe();

    assert!(pipeline.run("q").await.is_success());

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| e.event_type() == "recall_completed"));
    assert!(store.is_empty().await);
}
