//! Counting limiter shared by every worker of a batch.
//!
//! A thin wrapper over `tokio::sync::Semaphore`. The permit is an RAII
//! guard, so release happens exactly once on every exit path of the
//! worker body, including early returns and panics.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::WorkerError;

#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Held for the whole worker body; dropping it frees the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// A zero capacity is raised to 1 so a batch can always make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait (cooperatively) for a free slot.
    pub async fn acquire(&self) -> Result<LimiterPermit, WorkerError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkerError::LimiterClosed)?;
        Ok(LimiterPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available().min(self.capacity)
    }

    /// Pending and future `acquire` calls fail with `LimiterClosed`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
