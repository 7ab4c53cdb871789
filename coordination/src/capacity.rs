//! Concurrency budget estimation
//!
//! Picks how many workers may run at once. The system estimator derives
//! the budget from available RAM; the fixed estimator is used for
//! overrides and tests.

use sysinfo::System;
use tracing::{debug, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// RAM kept free for the OS.
pub const SYSTEM_BUFFER_GB: f64 = 1.5;
/// Assumed footprint of one in-flight worker (task + network buffers).
pub const RAM_PER_WORKER_GB: f64 = 0.06;
/// Below this much usable RAM the estimator drops to survival mode.
pub const SURVIVAL_THRESHOLD_GB: f64 = 0.2;
/// Hard ceiling regardless of RAM.
pub const MAX_CONCURRENCY: usize = 50;
/// Floor once RAM is known.
pub const MIN_CONCURRENCY: usize = 2;
/// Used when memory cannot be measured.
pub const FALLBACK_CONCURRENCY: usize = 5;

/// Produces a concurrency budget for a batch of `requested` workers.
///
/// Implementations must return at least 1.
pub trait CapacityEstimator: Send + Sync {
    fn estimate(&self, requested: usize) -> usize;
}

/// RAM-based estimator backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCapacityEstimator;

impl SystemCapacityEstimator {
    pub fn new() -> Self {
        Self
    }

    fn available_bytes() -> u64 {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.available_memory()
    }
}

impl CapacityEstimator for SystemCapacityEstimator {
    fn estimate(&self, requested: usize) -> usize {
        let available = Self::available_bytes();
        let budget = concurrency_for_available(available, requested);
        debug!(available_bytes = available, requested, budget, "estimated concurrency");
        budget
    }
}

/// Always returns the same budget (never below 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCapacity(pub usize);

impl CapacityEstimator for FixedCapacity {
    fn estimate(&self, _requested: usize) -> usize {
        self.0.max(1)
    }
}

/// The RAM policy, separated from measurement.
///
/// `available_bytes == 0` means the measurement failed.
pub fn concurrency_for_available(available_bytes: u64, requested: usize) -> usize {
    if available_bytes == 0 {
        warn!(
            fallback = FALLBACK_CONCURRENCY,
            "could not measure available memory, using fallback concurrency"
        );
        return FALLBACK_CONCURRENCY;
    }

    let usable_gb = available_bytes as f64 / GIB - SYSTEM_BUFFER_GB;
    if usable_gb <= SURVIVAL_THRESHOLD_GB {
        warn!(usable_gb, "low memory, running in survival mode");
        return MIN_CONCURRENCY;
    }

    let by_ram = (usable_gb / RAM_PER_WORKER_GB) as usize;
    by_ram.min(MAX_CONCURRENCY).min(requested).max(MIN_CONCURRENCY)
}
