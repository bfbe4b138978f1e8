//! Shared application state.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::artifacts::ArtifactUploader;
use crate::config::Config;
use crate::coordinator::ExecutionCoordinator;
use crate::metrics::Metrics;
use crate::runner::{ClaudeEngine, Engine, TaskRunner};
use crate::workspace::WorkspaceManager;

/// State shared by all HTTP handlers.
pub struct AppState {
    /// Entry point for task execution.
    pub admission: AdmissionController,

    /// Process-wide counters.
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the execution pipeline around `engine`.
    pub fn new(config: &Config, engine: Arc<dyn Engine>) -> Result<Arc<Self>, reqwest::Error> {
        let metrics = Metrics::new();
        let runner = TaskRunner::new(engine).with_max_turns(config.max_turns);
        let uploader = ArtifactUploader::new(&config.file_handler_url)?;
        let coordinator = ExecutionCoordinator::new(
            WorkspaceManager::new(&config.workspace_base),
            runner,
            uploader,
            metrics.clone(),
        );
        let admission = AdmissionController::new(
            Arc::new(coordinator),
            config.max_concurrent_tasks,
            config.task_timeout(),
            metrics.clone(),
        );

        Ok(Arc::new(Self { admission, metrics }))
    }

    /// Build state backed by the Claude Code CLI.
    pub fn from_config(config: &Config) -> Result<Arc<Self>, reqwest::Error> {
        let mut engine = ClaudeEngine::new(&config.claude_path, &config.api_key);
        if let Some(model) = &config.model {
            engine = engine.with_model(model);
        }
        Self::new(config, Arc::new(engine))
    }

    /// Current metrics in Prometheus text format.
    pub fn render_metrics(&self) -> String {
        self.metrics.render(self.admission.available_slots())
    }
}
