//! Single-task execution pipeline.
//!
//! provision workspace → run engine → collect and upload artifacts →
//! tear down workspace. Every failure is folded into an
//! [`ExecutionResult`]; nothing here returns an error to the caller.
//!
//! When a deadline is given it bounds the engine run and the artifact
//! handling. On expiry that work is dropped first, which kills the engine
//! process, and the workspace is then torn down before returning.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use coderun_core::{preview, Artifact, ErrorKind, ExecutionResult, TaskId};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::artifacts::{self, ArtifactUploader};
use crate::metrics::Metrics;
use crate::runner::{EngineError, TaskRunner};
use crate::workspace::WorkspaceManager;

/// Errors that abort a task after its workspace exists.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to list artifacts: {0}")]
    Collect(#[from] walkdir::Error),

    #[error("Artifact listing task failed: {0}")]
    CollectTask(#[from] JoinError),
}

/// Runs one task end to end inside its own workspace.
pub struct ExecutionCoordinator {
    workspaces: WorkspaceManager,
    runner: TaskRunner,
    uploader: ArtifactUploader,
    metrics: Arc<Metrics>,
    active: Arc<Mutex<HashSet<TaskId>>>,
}

impl ExecutionCoordinator {
    pub fn new(
        workspaces: WorkspaceManager,
        runner: TaskRunner,
        uploader: ArtifactUploader,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            workspaces,
            runner,
            uploader,
            metrics,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Execute `task_content` and report how it ended.
    ///
    /// A task id is generated when none is given. The workspace is removed
    /// before this returns, and also if the returned future is dropped.
    pub async fn run(
        &self,
        task_content: &str,
        context_id: &str,
        task_id: Option<TaskId>,
    ) -> ExecutionResult {
        self.run_until(task_content, context_id, task_id, None).await
    }

    /// Like [`run`], but gives up after `timeout` with a timeout result.
    ///
    /// The workspace is gone and the engine process killed by the time the
    /// result is returned.
    ///
    /// [`run`]: ExecutionCoordinator::run
    pub async fn run_with_timeout(
        &self,
        task_content: &str,
        context_id: &str,
        task_id: Option<TaskId>,
        timeout: Duration,
    ) -> ExecutionResult {
        self.run_until(task_content, context_id, task_id, Some(timeout))
            .await
    }

    async fn run_until(
        &self,
        task_content: &str,
        context_id: &str,
        task_id: Option<TaskId>,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let task_id = task_id.unwrap_or_else(TaskId::generate);
        let start = Instant::now();

        let Some(_claim) = ActiveClaim::acquire(&self.active, &task_id) else {
            warn!(task_id = %task_id, "Rejected duplicate task id");
            return ExecutionResult::failure(
                format!("Task '{}' is already running", task_id),
                elapsed_ms(start),
            );
        };

        let workspace = match self.workspaces.provision(&task_id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Workspace setup failed");
                return ExecutionResult::failure(e.to_string(), elapsed_ms(start));
            }
        };
        info!(task_id = %task_id, path = %workspace.path().display(), "Workspace ready");

        let execution = self.execute(&task_id, task_content, context_id, workspace.path());
        let outcome = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                tokio::time::timeout(remaining, execution)
                    .await
                    .map_err(|_| limit)
            }
            None => Ok(execution.await),
        };
        let duration_ms = elapsed_ms(start);
        self.workspaces.teardown(workspace).await;

        match outcome {
            Err(limit) => {
                warn!(
                    task_id = %task_id,
                    error_kind = %ErrorKind::Timeout,
                    timeout_secs = limit.as_secs(),
                    duration_ms,
                    "Task timed out"
                );
                ExecutionResult::timeout(limit, duration_ms)
            }
            Ok(Ok((text, artifacts))) => {
                info!(
                    task_id = %task_id,
                    duration_ms,
                    artifacts = artifacts.len(),
                    result = %preview(&text, 60),
                    "Task completed"
                );
                ExecutionResult::success(text, artifacts, duration_ms)
            }
            Ok(Err(e)) => {
                error!(
                    task_id = %task_id,
                    error_kind = %ErrorKind::ExecutionFailure,
                    duration_ms,
                    error = %e,
                    "Task failed"
                );
                ExecutionResult::failure(e.to_string(), duration_ms)
            }
        }
    }

    async fn execute(
        &self,
        task_id: &TaskId,
        task_content: &str,
        context_id: &str,
        workspace: &Path,
    ) -> Result<(String, Vec<Artifact>), ExecutionError> {
        let text = self.runner.run(task_content, workspace).await?;

        let root = workspace.to_path_buf();
        let files = tokio::task::spawn_blocking(move || artifacts::collect(&root)).await??;
        if files.is_empty() {
            return Ok((text, Vec::new()));
        }
        info!(task_id = %task_id, files = files.len(), "Uploading artifacts");

        let report = self.uploader.upload_all(&files, context_id).await;
        self.metrics
            .record_uploads(report.artifacts.len(), report.failed);
        Ok((text, report.artifacts))
    }
}

/// Membership of a task id in the in-flight set, released on drop.
struct ActiveClaim {
    active: Arc<Mutex<HashSet<TaskId>>>,
    task_id: TaskId,
}

impl ActiveClaim {
    fn acquire(active: &Arc<Mutex<HashSet<TaskId>>>, task_id: &TaskId) -> Option<Self> {
        let mut set = active.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(task_id.clone()) {
            return None;
        }
        Some(Self {
            active: active.clone(),
            task_id: task_id.clone(),
        })
    }
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        let mut set = self.active.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.task_id);
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
