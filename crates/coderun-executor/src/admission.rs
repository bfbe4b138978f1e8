//! Concurrency limiting and deadline enforcement.
//!
//! Every submission waits for a semaphore slot, then runs the coordinator
//! under the task timeout. The coordinator enforces the deadline itself so
//! it can kill the engine and remove the workspace before reporting; the
//! slot is only released after that. A second, looser bound here catches a
//! teardown that never finishes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use coderun_core::{ErrorKind, ExecutionResult, TaskRequest};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::coordinator::ExecutionCoordinator;
use crate::metrics::Metrics;

/// Extra time allowed past the task timeout for killing the engine and
/// removing the workspace.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// Submission errors. Execution problems are reported in the result, not here.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Executor is shutting down")]
    Closed,
}

/// Admits tasks into the coordinator, at most `max_slots` at a time.
pub struct AdmissionController {
    coordinator: Arc<ExecutionCoordinator>,
    slots: Arc<Semaphore>,
    max_slots: usize,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl AdmissionController {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        max_slots: usize,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            coordinator,
            slots: Arc::new(Semaphore::new(max_slots)),
            max_slots,
            timeout,
            metrics,
        }
    }

    /// Run `request` once a slot is free, bounded by the task timeout.
    ///
    /// Waits indefinitely for a slot. Returns `Err` only after [`close`].
    ///
    /// [`close`]: AdmissionController::close
    pub async fn submit(&self, request: TaskRequest) -> Result<ExecutionResult, AdmissionError> {
        let waiting_since = Instant::now();
        let _permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Closed)?;
        debug!(
            waited_ms = waiting_since.elapsed().as_millis() as u64,
            available = self.available_slots(),
            "Slot acquired"
        );

        let _in_flight = self.metrics.track_in_flight();
        let start = Instant::now();
        let run = self.coordinator.run_with_timeout(
            &request.task,
            &request.context_id,
            request.task_id,
            self.timeout,
        );

        let result = match tokio::time::timeout(self.timeout + TEARDOWN_GRACE, run).await {
            Ok(result) => result,
            Err(_) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                error!(
                    error_kind = %ErrorKind::Timeout,
                    timeout_secs = self.timeout.as_secs(),
                    duration_ms,
                    "Task teardown overran its deadline"
                );
                ExecutionResult::timeout(self.timeout, duration_ms)
            }
        };

        self.metrics.record_outcome(result.outcome());
        info!(
            outcome = result.outcome().as_str(),
            duration_ms = result.duration_ms,
            "Task finished"
        );
        Ok(result)
    }

    /// Slots not currently held.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_slots.saturating_sub(self.available_slots())
    }

    /// Stop admitting work. Waiting submissions fail with [`AdmissionError::Closed`].
    pub fn close(&self) {
        info!("Closing admission");
        self.slots.close();
    }
}
