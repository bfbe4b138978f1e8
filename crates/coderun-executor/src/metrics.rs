//! Prometheus metrics collection and formatting.
//!
//! Counters are process-local atomics rendered in Prometheus text
//! exposition format by [`Metrics::render`].

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coderun_core::Outcome;

/// Executor counters.
#[derive(Debug, Default)]
pub struct Metrics {
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    artifacts_uploaded: AtomicU64,
    artifacts_failed: AtomicU64,
    in_flight: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count a finished task.
    pub fn record_outcome(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Success => &self.succeeded,
            Outcome::Failure => &self.failed,
            Outcome::Timeout => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count upload results for one task.
    pub fn record_uploads(&self, uploaded: usize, failed: usize) {
        self.artifacts_uploaded
            .fetch_add(uploaded as u64, Ordering::Relaxed);
        self.artifacts_failed
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    /// Mark a task as executing until the guard is dropped.
    pub fn track_in_flight(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn tasks(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Success => self.succeeded.load(Ordering::Relaxed),
            Outcome::Failure => self.failed.load(Ordering::Relaxed),
            Outcome::Timeout => self.timed_out.load(Ordering::Relaxed),
        }
    }

    /// Format all metrics as Prometheus text.
    pub fn render(&self, available_slots: usize) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "# HELP coderun_tasks_total Finished tasks by outcome"
        )
        .ok();
        writeln!(output, "# TYPE coderun_tasks_total counter").ok();
        for outcome in [Outcome::Success, Outcome::Failure, Outcome::Timeout] {
            writeln!(
                output,
                "coderun_tasks_total{{outcome=\"{}\"}} {}",
                outcome.as_str(),
                self.tasks(outcome)
            )
            .ok();
        }

        writeln!(output).ok();
        writeln!(output, "# HELP coderun_tasks_in_flight Tasks currently executing").ok();
        writeln!(output, "# TYPE coderun_tasks_in_flight gauge").ok();
        writeln!(output, "coderun_tasks_in_flight {}", self.in_flight()).ok();

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP coderun_admission_slots_available Free execution slots"
        )
        .ok();
        writeln!(output, "# TYPE coderun_admission_slots_available gauge").ok();
        writeln!(output, "coderun_admission_slots_available {available_slots}").ok();

        writeln!(output).ok();
        writeln!(
            output,
            "# HELP coderun_artifacts_total Artifact uploads by result"
        )
        .ok();
        writeln!(output, "# TYPE coderun_artifacts_total counter").ok();
        writeln!(
            output,
            "coderun_artifacts_total{{result=\"uploaded\"}} {}",
            self.artifacts_uploaded.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(
            output,
            "coderun_artifacts_total{{result=\"failed\"}} {}",
            self.artifacts_failed.load(Ordering::Relaxed)
        )
        .ok();

        output
    }
}

/// Decrements the in-flight gauge on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    metrics: Arc<Metrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
