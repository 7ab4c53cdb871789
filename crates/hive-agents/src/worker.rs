//! A single opinion-generating worker.
//!
//! `Worker::process` never fails: every provider error, timeout or
//! limiter failure becomes an `ERROR` [`WorkResult`]. The concurrency slot
//! is held for the whole body and released by drop on every path.

use std::time::{Duration, Instant};

use coordination::types::{Signal, WorkItem, WorkResult};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::SimulationProfile;
use crate::errors::WorkerError;
use crate::limiter::ConcurrencyLimiter;
use crate::provider::{ChatMessage, GenerationRequest, Providers};

/// Settings for provider-backed workers.
#[derive(Clone)]
pub struct LiveSettings {
    pub providers: Providers,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f64,
    /// Bounds the generation call only.
    pub timeout: Duration,
}

/// Pipeline-wide worker mode.
#[derive(Clone)]
pub enum WorkerMode {
    Simulated(SimulationProfile),
    Live(LiveSettings),
}

impl WorkerMode {
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

/// Stateless executor shared by all tasks of a batch.
#[derive(Clone)]
pub struct Worker {
    mode: WorkerMode,
}

impl Worker {
    pub fn new(mode: WorkerMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &WorkerMode {
        &self.mode
    }

    /// Acquire a slot, produce one opinion, release the slot.
    pub async fn process(&self, item: WorkItem, limiter: &ConcurrencyLimiter) -> WorkResult {
        let _permit = match limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => return failure(&item, e),
        };

        let start = Instant::now();
        let outcome = match &self.mode {
            WorkerMode::Simulated(profile) => Ok(simulate(&item, profile).await),
            WorkerMode::Live(settings) => run_live(&item, settings).await,
        };

        match outcome {
            Ok((content, vector)) => {
                debug!(
                    worker_id = %item.id,
                    role = %item.role,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "worker succeeded"
                );
                WorkResult::success(item.id, item.role, content, vector)
            }
            Err(e) => failure(&item, e),
        }
    }
}

fn failure(item: &WorkItem, error: WorkerError) -> WorkResult {
    warn!(worker_id = %item.id, role = %item.role, kind = %error.kind(), error = %error, "worker failed");
    WorkResult::error(item.id, item.role.clone(), error.kind(), error.to_string())
}

/// System + user messages for a role-conditioned opinion.
pub fn build_messages(role: &str, signal: &Signal) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are {role}. Task: analyze the problem and give a short, incisive solution."
    );
    if let Some(context) = &signal.context {
        system.push_str("\nReference past experience: ");
        system.push_str(context);
    }
    vec![ChatMessage::system(system), ChatMessage::user(signal.question.clone())]
}

async fn run_live(item: &WorkItem, settings: &LiveSettings) -> Result<(String, Vec<f64>), WorkerError> {
    let request = GenerationRequest::new(&settings.model, build_messages(&item.role, &item.signal))
        .with_temperature(settings.temperature);

    let content = tokio::time::timeout(
        settings.timeout,
        settings.providers.generation.generate(&request),
    )
    .await
    .map_err(|_| WorkerError::Timeout(settings.timeout))?
    .map_err(WorkerError::Generation)?;

    let vector = settings
        .providers
        .embedding
        .embed(&settings.embedding_model, &content)
        .await
        .map_err(WorkerError::Embedding)?;

    Ok((content, vector))
}

async fn simulate(item: &WorkItem, profile: &SimulationProfile) -> (String, Vec<f64>) {
    let latency = rand::rng().random_range(profile.latency_range());
    if latency > 0 {
        tokio::time::sleep(Duration::from_millis(latency)).await;
    }

    let mut rng = rand::rng();
    let content = simulated_opinion(&item.role, &item.signal.question, &mut rng);
    let vector = (0..profile.vector_dim).map(|_| rng.random::<f64>()).collect();
    (content, vector)
}

const DEFECT_KEYWORDS: [&str; 3] = ["defect", "burr", "bavia"];
const FINANCE_MARKERS: [&str; 2] = ["Financial", "Finance"];
const QUALITY_MARKERS: [&str; 2] = ["QC", "Quality"];
const FOCUS_AREAS: [&str; 3] = ["cost optimization", "security", "user experience"];
const RISK_AREAS: [&str; 3] = ["legal", "infrastructure", "staffing"];

/// Role-flavored placeholder text for simulation mode.
pub fn simulated_opinion<R: Rng>(role: &str, question: &str, rng: &mut R) -> String {
    let lowered = question.to_lowercase();
    if DEFECT_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return if FINANCE_MARKERS.iter().any(|m| role.contains(m)) {
            format!(
                "[{role}] Cash flow comes first. Ship the batch to get paid and settle compensation claims later."
            )
        } else if QUALITY_MARKERS.iter().any(|m| role.contains(m)) {
            format!(
                "[{role}] Do not ship a single unit. Reputation is our biggest asset; hold everything for 100% rework."
            )
        } else {
            format!("[{role}] We need a hybrid: filter out the worst 20% and ship the remaining 80%.")
        };
    }

    let code = rng.random_range(1000..=9999);
    let focus = FOCUS_AREAS[rng.random_range(0..FOCUS_AREAS.len())];
    let risk = RISK_AREAS[rng.random_range(0..RISK_AREAS.len())];
    format!(
        "[{role}] I propose solution #{code}. My view centers on {focus}. Watch out for {risk} risk."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use coordination::types::{WorkErrorKind, WorkerId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::errors::ProviderError;
    use crate::provider::{EmbeddingProvider, GenerationProvider};

    fn item(role: &str, question: &str) -> WorkItem {
        WorkItem {
            id: WorkerId(0),
            role: role.to_string(),
            signal: Arc::new(Signal::new(question)),
        }
    }

    struct SlowGeneration;

    #[async_trait]
    impl GenerationProvider for SlowGeneration {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".into())
        }
    }

    struct EchoGeneration;

    #[async_trait]
    impl GenerationProvider for EchoGeneration {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
            Ok(request.system_text())
        }
    }

    struct FixedEmbedding(Result<Vec<f64>, ()>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f64>, ProviderError> {
            self.0
                .clone()
                .map_err(|_| ProviderError::Malformed("no vector".into()))
        }
    }

    fn live(generation: Arc<dyn GenerationProvider>, embedding: FixedEmbedding) -> Worker {
        Worker::new(WorkerMode::Live(LiveSettings {
            providers: Providers::new(generation, Arc::new(embedding)),
            model: "m".into(),
            embedding_model: "e".into(),
            temperature: 0.7,
            timeout: Duration::from_secs(45),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_worker_fills_vector() {
        let worker = Worker::new(WorkerMode::Simulated(SimulationProfile::default()));
        let limiter = ConcurrencyLimiter::new(1);

        let result = worker.process(item("Economist", "Price a SaaS?"), &limiter).await;
        assert!(result.is_success());
        assert_eq!(result.vector().unwrap().len(), 128);
        assert!(result.content().unwrap().starts_with("[Economist]"));
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn generation_timeout_becomes_error_record() {
        let worker = live(Arc::new(SlowGeneration), FixedEmbedding(Ok(vec![1.0])));
        let limiter = ConcurrencyLimiter::new(1);

        let result = worker.process(item("Risk Lawyer", "q"), &limiter).await;
        let failure = result.failure().unwrap();
        assert_eq!(failure.kind, WorkErrorKind::Timeout);
        assert_eq!(limiter.available(), 1, "slot must be released on timeout");
    }

    #[tokio::test]
    async fn embedding_failure_becomes_malformed_record() {
        let worker = live(Arc::new(EchoGeneration), FixedEmbedding(Err(())));
        let limiter = ConcurrencyLimiter::new(1);

        let result = worker.process(item("Risk Lawyer", "q"), &limiter).await;
        assert_eq!(result.failure().unwrap().kind, WorkErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn live_worker_uses_role_prompt() {
        let worker = live(Arc::new(EchoGeneration), FixedEmbedding(Ok(vec![0.1, 0.2])));
        let limiter = ConcurrencyLimiter::new(1);

        let result = worker.process(item("AI Ethicist", "q"), &limiter).await;
        assert_eq!(
            result.content().unwrap(),
            "You are AI Ethicist. Task: analyze the problem and give a short, incisive solution."
        );
        assert_eq!(result.vector().unwrap(), &[0.1, 0.2]);
    }

    #[tokio::test]
    async fn closed_limiter_becomes_internal_error() {
        let worker = Worker::new(WorkerMode::Simulated(SimulationProfile::instant(4)));
        let limiter = ConcurrencyLimiter::new(1);
        limiter.close();

        let result = worker.process(item("Economist", "q"), &limiter).await;
        assert_eq!(result.failure().unwrap().kind, WorkErrorKind::Internal);
    }

    #[test]
    fn context_appended_to_system_prompt() {
        let signal = Signal::new("Ship?").with_context("Hold the batch last time");
        let messages = build_messages("QC Manager", &signal);
        assert_eq!(messages.len(), 2);
        assert!(messages[0]
            .content
            .ends_with("\nReference past experience: Hold the batch last time"));
        assert_eq!(messages[1].content, "Ship?");
    }

    #[test]
    fn defect_scenario_splits_by_role() {
        let mut rng = StdRng::seed_from_u64(1);
        let q = "A batch has a burr defect. Ship or hold?";

        let cfo = simulated_opinion("Chief Financial Officer", q, &mut rng);
        let qc = simulated_opinion("QC Manager", q, &mut rng);
        let other = simulated_opinion("Process Engineer", q, &mut rng);

        assert!(cfo.contains("Cash flow"));
        assert!(qc.contains("100% rework"));
        assert!(other.contains("worst 20%"));
    }

    #[test]
    fn generic_opinion_has_solution_number() {
        let mut rng = StdRng::seed_from_u64(9);
        let text = simulated_opinion("Startup CEO", "How do we grow?", &mut rng);
        assert!(text.starts_with("[Startup CEO] I propose solution #"));
        let digits: String = text
            .split('#')
            .nth(1)
            .unwrap()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let code: u32 = digits.parse().unwrap();
        assert!((1000..=9999).contains(&code));
    }
}
