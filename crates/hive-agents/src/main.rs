use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::events::HiveEvent;
use coordination::memory::InMemoryStore;
use hive_agents::{ConfigOverrides, HiveConfig, Pipeline, PipelineOutcome};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask a council of AI agents and get one synthesized answer", long_about = None)]
struct Args {
    /// The question put to the council
    question: String,

    /// Simulated workers and synthesis, no provider calls
    #[arg(long, conflicts_with = "live")]
    simulate: bool,

    /// Call the configured generation and embedding endpoints
    #[arg(long)]
    live: bool,

    /// Number of workers to dispatch
    #[arg(long)]
    agents: Option<usize>,

    /// Maximum number of clusters (representatives)
    #[arg(long)]
    keep: Option<usize>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    embedding_model: Option<String>,

    /// OpenAI-compatible base URL (e.g. http://localhost:8080/v1)
    #[arg(long)]
    base_url: Option<String>,

    /// Per-worker generation timeout
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Fixed concurrency budget instead of the RAM estimate
    #[arg(long)]
    concurrency: Option<usize>,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for role selection and clustering
    #[arg(long)]
    seed: Option<u64>,

    /// Write the chart records as JSON
    #[arg(long)]
    chart_out: Option<PathBuf>,

    /// Skip recall and persistence
    #[arg(long)]
    no_memory: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let simulation = match (self.simulate, self.live) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigOverrides {
            simulation,
            workers: self.agents,
            keep_clusters: self.keep,
            concurrency: self.concurrency,
            seed: self.seed,
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            disable_memory: self.no_memory,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = HiveConfig::load(args.config.as_deref())?.with_overrides(args.overrides());
    info!(
        simulation = config.simulation,
        workers = config.workers,
        keep_clusters = config.keep_clusters,
        model = %config.provider.model,
        "council starting"
    );

    let mut pipeline = Pipeline::new(config).context("invalid configuration")?;
    if pipeline.config().memory.enabled {
        pipeline = pipeline.with_memory(Arc::new(InMemoryStore::new()));
    }

    let renderer = tokio::spawn(render(pipeline.subscribe()));
    let outcome = pipeline.run(&args.question).await;
    if let Err(e) = renderer.await {
        warn!(error = %e, "event renderer stopped unexpectedly");
    }

    match outcome {
        PipelineOutcome::Completed { record, chart, stats } => {
            println!();
            println!("{}", record.answer);
            println!();
            println!(
                "Confidence: {}% | {} of {} agents answered | {} clusters | {} ms",
                record.confidence,
                stats.succeeded,
                stats.requested_workers,
                stats.clusters,
                stats.elapsed_ms
            );

            if let Some(path) = &args.chart_out {
                let json = serde_json::to_string_pretty(&chart)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write chart to {}", path.display()))?;
                info!(path = %path.display(), points = chart.len(), "chart written");
            }
            Ok(ExitCode::SUCCESS)
        }
        PipelineOutcome::Failed { reason } => {
            eprintln!("Run failed: {reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print bus events until the run reaches a terminal event.
async fn render(mut events: broadcast::Receiver<HiveEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "renderer lagged behind the event bus");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match &event {
            HiveEvent::Progress { progress, message, .. } => {
                println!("[{:>3}%] {}", progress.percent, message);
            }
            HiveEvent::RecallCompleted { lessons, .. } if *lessons > 0 => {
                println!("       recalled {} past lessons", lessons);
            }
            HiveEvent::WorkerPreview {
                worker_id,
                role,
                status,
                preview,
                ..
            } => {
                println!("       {} ({}) {}: {}", worker_id, role, status, preview);
            }
            HiveEvent::ClusterFormed {
                label,
                representative_id,
                representative_role,
                members,
                ..
            } => {
                println!(
                    "       cluster {}: {} opinions, voiced by {} ({})",
                    label, members, representative_role, representative_id
                );
            }
            _ => {}
        }

        if event.is_terminal() {
            break;
        }
    }
}
