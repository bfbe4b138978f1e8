//! Executor configuration.
//!
//! Every setting can be given as a command-line flag or through the
//! environment variable named next to it. A `.env` file in the working
//! directory (or a parent) fills in variables that are not already set.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// Configuration errors detected before the server starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY must not be empty")]
    MissingApiKey,

    #[error("MAX_CONCURRENT_TASKS must be at least 1")]
    NoConcurrency,

    #[error("TASK_TIMEOUT_SECONDS must be at least 1")]
    NoTimeout,

    #[error("MAX_TURNS must be at least 1")]
    NoTurns,
}

/// coderun executor service.
#[derive(Parser, Debug, Clone)]
#[command(name = "coderun-executor", about = "Runs coding tasks in isolated workspaces")]
pub struct Config {
    /// Anthropic API credential handed to the engine
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Artifact storage endpoint
    #[arg(long, env = "FILE_HANDLER_URL", default_value = "http://localhost:3000")]
    pub file_handler_url: String,

    /// Per-task deadline in seconds
    #[arg(long, env = "TASK_TIMEOUT_SECONDS", default_value_t = 300)]
    pub task_timeout_secs: u64,

    /// Engine turn budget per task
    #[arg(long, env = "MAX_TURNS", default_value_t = 50)]
    pub max_turns: u32,

    /// Directory under which per-task workspaces are created
    #[arg(long, env = "WORKSPACE_BASE", default_value_os_t = default_workspace_base())]
    pub workspace_base: PathBuf,

    /// Maximum number of tasks executing at once
    #[arg(long, env = "MAX_CONCURRENT_TASKS", default_value_t = 5)]
    pub max_concurrent_tasks: usize,

    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Path to the Claude Code CLI
    #[arg(long, env = "CLAUDE_PATH", default_value = "claude")]
    pub claude_path: String,

    /// Model override for the engine
    #[arg(long, env = "CLAUDE_MODEL")]
    pub model: Option<String>,
}

impl Config {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::NoConcurrency);
        }
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::NoTimeout);
        }
        if self.max_turns == 0 {
            return Err(ConfigError::NoTurns);
        }
        Ok(())
    }

    /// Per-task deadline.
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// Load the nearest `.env` into the process environment, without
/// overriding variables that are already set.
///
/// Returns the file that was read, or `None` when there is no such file.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    found(dotenvy::dotenv())
}

fn found(loaded: Result<PathBuf, dotenvy::Error>) -> Result<Option<PathBuf>, dotenvy::Error> {
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn default_workspace_base() -> PathBuf {
    std::env::temp_dir().join("claude-workspaces")
}
