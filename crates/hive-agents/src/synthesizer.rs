//! Reduction step: representatives + question → one answer.
//!
//! The only place where upstream parallelism converges. Provider failure
//! degrades into a record with confidence 0 instead of an error.

use std::sync::Arc;
use std::time::Duration;

use coordination::types::{SynthesisRecord, WorkResult};
use rand::Rng;
use tracing::{info, warn};

use crate::provider::{ChatMessage, GenerationProvider, GenerationRequest};

/// Confidence reported for a successful live synthesis.
pub const LIVE_CONFIDENCE: u8 = 95;
/// Range of simulated confidence scores.
pub const SIMULATED_CONFIDENCE: std::ops::RangeInclusive<u8> = 88..=98;

#[derive(Clone)]
pub enum SynthesisMode {
    Simulated {
        delay: Duration,
    },
    Live {
        generation: Arc<dyn GenerationProvider>,
        model: String,
    },
}

#[derive(Clone)]
pub struct Synthesizer {
    mode: SynthesisMode,
}

impl Synthesizer {
    pub fn new(mode: SynthesisMode) -> Self {
        Self { mode }
    }

    pub async fn synthesize(
        &self,
        representatives: &[WorkResult],
        question: &str,
        total_workers: usize,
    ) -> SynthesisRecord {
        let (answer, confidence) = match &self.mode {
            SynthesisMode::Simulated { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                let confidence = rand::rng().random_range(SIMULATED_CONFIDENCE);
                (
                    simulated_answer(representatives, total_workers),
                    confidence,
                )
            }
            SynthesisMode::Live { generation, model } => {
                let request = GenerationRequest::new(
                    model,
                    vec![ChatMessage::user(synthesis_prompt(
                        representatives,
                        question,
                        total_workers,
                    ))],
                );
                match generation.generate(&request).await {
                    Ok(answer) => (answer, LIVE_CONFIDENCE),
                    Err(e) => {
                        warn!(error = %e, "synthesis failed, returning degraded record");
                        (format!("Synthesis failed: {e}"), 0)
                    }
                }
            }
        };

        info!(
            representatives = representatives.len(),
            total_workers, confidence, "synthesis complete"
        );
        SynthesisRecord {
            answer,
            confidence,
            representative_count: representatives.len(),
            total_workers,
        }
    }
}

/// `- [role]: content` per representative.
pub fn context_block(representatives: &[WorkResult]) -> String {
    representatives
        .iter()
        .map(|r| format!("- [{}]: {}", r.role, r.content().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn synthesis_prompt(representatives: &[WorkResult], question: &str, total_workers: usize) -> String {
    format!(
        "You are the chair of an AI council. Below are the representative lines of thought \
         distilled from {total_workers} experts on the question: \"{question}\"\n\n\
         {context}\n\n\
         TASKS:\n\
         1. Summarize the common ground.\n\
         2. Resolve the disagreements between groups.\n\
         3. Issue one definitive, detailed and actionable recommendation.\n\
         4. Format the answer in Markdown.",
        context = context_block(representatives),
    )
}

fn simulated_answer(representatives: &[WorkResult], total_workers: usize) -> String {
    let first = representatives.first().map_or("the council", |r| r.role.as_str());
    let last = representatives.last().map_or("the council", |r| r.role.as_str());
    format!(
        "### COUNCIL RESOLUTION\n\n\
         **1. Multi-perspective analysis:**\n\
         The system recorded {total_workers} opinions, condensed into {count} main viewpoints.\n\n\
         **2. Core solution:**\n\
         Building on the {first} group's proposal, we recommend a hybrid approach.\n\n\
         **3. Risk control:**\n\
         Warnings from the {last} group are integrated to reduce operational risk.\n\n\
         *(Generated in simulation mode. Provide an API key to run live.)*",
        count = representatives.len(),
    )
}
