//! coderun Executor Library
//!
//! Runs coding tasks through the Claude Code engine, one isolated workspace
//! per task, with bounded concurrency and a per-task deadline. Files the
//! engine leaves in the workspace are uploaded as artifacts.

pub mod admission;
pub mod artifacts;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod metrics;
pub mod runner;
pub mod state;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use admission::{AdmissionController, AdmissionError};
pub use artifacts::{ArtifactUploader, UploadError, UploadReport};
pub use config::{Config, ConfigError};
pub use coordinator::{ExecutionCoordinator, ExecutionError};
pub use runner::{ClaudeEngine, Engine, EngineError, EngineEvent, EngineRequest, TaskRunner};
pub use state::AppState;
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};
