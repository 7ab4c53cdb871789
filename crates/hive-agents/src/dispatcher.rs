//! Fan-out: one task per worker, results collected in completion order.
//!
//! ```text
//!   JoinSet::spawn(worker.process(item_i)) × N   (limiter caps the running set)
//!            │
//!   join_next() ──▶ ResultSet (completion order) + progress 10 → 60
//!            │
//!   first few completions ──▶ WorkerPreview events
//! ```
//!
//! The batch always runs to completion. A worker task that panics is
//! recorded as an `internal` ERROR result so the set still has exactly
//! one entry per worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use coordination::events::{checkpoints, interpolate, HiveEvent, PipelineStage, ProgressReporter};
use coordination::types::{ResultSet, Signal, WorkErrorKind, WorkItem, WorkResult, WorkerId};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::limiter::ConcurrencyLimiter;
use crate::roles::{RoleCatalog, RoleSelector};
use crate::worker::Worker;

/// Characters of content shown in a preview line.
pub const PREVIEW_CHARS: usize = 100;

pub struct Dispatcher {
    worker: Worker,
    catalog: RoleCatalog,
    selector: Arc<dyn RoleSelector>,
    preview_limit: usize,
}

impl Dispatcher {
    pub fn new(worker: Worker, catalog: RoleCatalog, selector: Arc<dyn RoleSelector>) -> Self {
        Self {
            worker,
            catalog,
            selector,
            preview_limit: 5,
        }
    }

    pub fn with_preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit;
        self
    }

    /// Assign roles for a batch of `worker_count` items sharing `signal`.
    pub fn plan(&self, signal: Arc<Signal>, worker_count: usize) -> Vec<WorkItem> {
        (0..worker_count)
            .map(|i| WorkItem {
                id: WorkerId(i),
                role: self.selector.select(&self.catalog, i),
                signal: signal.clone(),
            })
            .collect()
    }

    /// Run `worker_count` workers under `limiter` and return every result.
    pub async fn run(
        &self,
        signal: Signal,
        worker_count: usize,
        limiter: &ConcurrencyLimiter,
        progress: &mut ProgressReporter,
    ) -> ResultSet {
        let items = self.plan(Arc::new(signal), worker_count);
        let mut pending: BTreeMap<WorkerId, String> =
            items.iter().map(|i| (i.id, i.role.clone())).collect();

        info!(
            workers = worker_count,
            concurrency = limiter.capacity(),
            "dispatching batch"
        );
        progress.report(
            PipelineStage::Dispatch,
            checkpoints::DISPATCH_START,
            format!(
                "Activating {} agents ({} at a time)...",
                worker_count,
                limiter.capacity()
            ),
        );

        let mut join_set: JoinSet<WorkResult> = JoinSet::new();
        for item in items {
            let worker = self.worker.clone();
            let limiter = limiter.clone();
            join_set.spawn(async move { worker.process(item, &limiter).await });
        }

        let mut results = ResultSet::new();
        let mut completed = 0usize;
        while let Some(joined) = join_set.join_next().await {
            completed += 1;
            match joined {
                Ok(result) => {
                    pending.remove(&result.id);
                    debug!(worker_id = %result.id, status = %result.status(), completed, "worker reported");
                    if completed <= self.preview_limit {
                        progress.publish(HiveEvent::WorkerPreview {
                            worker_id: result.id,
                            role: result.role.clone(),
                            status: result.status(),
                            preview: result.preview(PREVIEW_CHARS),
                            timestamp: Utc::now(),
                        });
                    }
                    results.push(result);
                }
                Err(e) => {
                    warn!(error = %e, "worker task panicked");
                }
            }

            let percent = interpolate(
                checkpoints::DISPATCH_START,
                checkpoints::DISPATCH_END,
                completed,
                worker_count,
            );
            progress.report(
                PipelineStage::Dispatch,
                percent,
                format!("{}/{} agents reported", completed, worker_count),
            );
        }

        // Tasks lost to a panic still owe one record each.
        for (id, role) in pending {
            results.push(WorkResult::error(
                id,
                role,
                WorkErrorKind::Internal,
                "worker task panicked",
            ));
        }

        info!(
            total = results.len(),
            succeeded = results.success_count(),
            failed = results.error_count(),
            "batch collected"
        );
        results
    }
}
