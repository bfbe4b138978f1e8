//! Task execution via the solving engine.
//!
//! The engine is consumed as a lazy, finite stream of [`EngineEvent`]s. The
//! runner folds over it and keeps only the most recent text block: later
//! assistant text supersedes earlier text within a run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use coderun_claude_sdk::{
    ClaudeExecutor, ClaudeMessage, ContentItem, PermissionMode, SdkError,
    DEFAULT_MAX_BUFFER_SIZE,
};
use coderun_core::preview;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Behavioral instructions given to the engine for every task.
pub const SYSTEM_PROMPT: &str = "You are a fast code executor. Complete tasks with minimal steps.

RULES:
- Be FAST: Take the shortest path to completion
- If the task is a simple question/calculation, just compute and respond - no files needed
- For complex outputs (charts, documents, data), save files to current directory
- NEVER read binary files you just created
- Be concise: short responses, no fluff";

/// Appended to every task so the final answer is self-contained.
const PROMPT_SUFFIX: &str =
    "If this creates files, list them at the end. If it's just a calculation/answer, just give the answer.";

/// Tools the engine may use without asking.
pub const ALLOWED_TOOLS: &[&str] = &["Read", "Write", "Edit", "Bash", "WebSearch", "WebFetch"];

/// Default turn budget per task.
pub const DEFAULT_MAX_TURNS: u32 = 50;

/// Errors raised by an engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Sdk(#[from] SdkError),

    #[error("{0}")]
    Failed(String),
}

/// One observable step of an engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A complete assistant text block.
    Text(String),
    /// The engine invoked a tool.
    ToolInvocation { name: String },
}

/// Everything the engine needs to run one task.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub working_dir: PathBuf,
    pub max_turns: u32,
    pub max_buffer_size: usize,
}

/// Stream of engine events for one run. Dropping it abandons the run.
pub type EventStream = BoxStream<'static, Result<EngineEvent, EngineError>>;

/// The external solving capability.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Start a run and return its event stream.
    async fn stream(&self, request: EngineRequest) -> Result<EventStream, EngineError>;
}

/// [`Engine`] backed by the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeEngine {
    claude_path: String,
    api_key: String,
    model: Option<String>,
}

impl ClaudeEngine {
    /// Create an engine invoking the CLI at `claude_path`.
    pub fn new(claude_path: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            api_key: api_key.into(),
            model: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl Engine for ClaudeEngine {
    async fn stream(&self, request: EngineRequest) -> Result<EventStream, EngineError> {
        let mut executor = ClaudeExecutor::new(&self.claude_path)
            .with_permission_mode(request.permission_mode)
            .with_system_prompt(request.system_prompt)
            .with_allowed_tools(request.allowed_tools)
            .with_max_turns(request.max_turns)
            .with_max_buffer_size(request.max_buffer_size)
            .with_env("ANTHROPIC_API_KEY", &self.api_key);
        if let Some(model) = &self.model {
            executor = executor.with_model(model);
        }

        let messages = executor.execute(&request.working_dir, &request.prompt)?;
        Ok(messages
            .flat_map(|item| stream::iter(message_events(item)))
            .boxed())
    }
}

/// Translate one Claude message into engine events.
fn message_events(item: Result<ClaudeMessage, SdkError>) -> Vec<Result<EngineEvent, EngineError>> {
    let message = match item {
        Ok(message) => message,
        Err(e) => return vec![Err(e.into())],
    };

    match message {
        ClaudeMessage::Assistant { message, .. } => message
            .content
            .into_iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(Ok(EngineEvent::Text(text))),
                ContentItem::ToolUse { tool_data, .. } => Some(Ok(EngineEvent::ToolInvocation {
                    name: tool_data.name().to_string(),
                })),
                _ => None,
            })
            .collect(),
        ClaudeMessage::Result {
            subtype,
            is_error,
            num_turns,
            duration_ms,
            ..
        } => {
            if is_error == Some(true) {
                warn!(subtype = ?subtype, num_turns = ?num_turns, "Engine reported an error result");
            } else {
                debug!(subtype = ?subtype, num_turns = ?num_turns, duration_ms = ?duration_ms, "Engine result");
            }
            Vec::new()
        }
        other => {
            debug!(message_type = other.kind(), "Ignoring engine message");
            Vec::new()
        }
    }
}

/// Fold state over an engine run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Most recent text block, empty if none was produced.
    pub final_text: String,
    /// Number of events observed.
    pub events: usize,
    /// Number of tool invocations observed.
    pub tool_invocations: usize,
}

impl RunSummary {
    /// Apply one event. Text replaces, it never concatenates.
    pub fn apply(mut self, event: EngineEvent) -> Self {
        self.events += 1;
        match event {
            EngineEvent::Text(text) => self.final_text = text,
            EngineEvent::ToolInvocation { name } => {
                self.tool_invocations += 1;
                info!(tool = %name, "Engine tool invocation");
            }
        }
        self
    }
}

/// Runs one task through an [`Engine`] inside a workspace.
#[derive(Clone)]
pub struct TaskRunner {
    engine: Arc<dyn Engine>,
    max_turns: u32,
    max_buffer_size: usize,
}

impl TaskRunner {
    /// Create a runner with default turn budget and buffer size.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            max_turns: DEFAULT_MAX_TURNS,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Set the turn budget.
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    /// Set the per-message buffer cap.
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// Build the engine request for `task_content` in `workspace`.
    pub fn build_request(&self, task_content: &str, workspace: &Path) -> EngineRequest {
        EngineRequest {
            prompt: build_prompt(task_content),
            system_prompt: SYSTEM_PROMPT.to_string(),
            allowed_tools: ALLOWED_TOOLS.iter().map(|t| t.to_string()).collect(),
            permission_mode: PermissionMode::AcceptEdits,
            working_dir: workspace.to_path_buf(),
            max_turns: self.max_turns,
            max_buffer_size: self.max_buffer_size,
        }
    }

    /// Run the task and return the final text block (possibly empty).
    pub async fn run(&self, task_content: &str, workspace: &Path) -> Result<String, EngineError> {
        let request = self.build_request(task_content, workspace);
        let events = self.engine.stream(request).await?;

        let summary = events
            .try_fold(RunSummary::default(), |summary, event| async move {
                Ok(summary.apply(event))
            })
            .await?;

        info!(
            events = summary.events,
            tool_invocations = summary.tool_invocations,
            result = %preview(&summary.final_text, 80),
            "Engine run finished"
        );
        Ok(summary.final_text)
    }
}

/// Full prompt sent to the engine for `task_content`.
pub fn build_prompt(task_content: &str) -> String {
    format!("{}\n\n{}", task_content, PROMPT_SUFFIX)
}
