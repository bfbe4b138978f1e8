//! Task request type.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::TaskId;

/// A validated request to execute one coding task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// The task description handed to the engine.
    pub task: String,

    /// Requester/tenant identifier, used to route uploaded artifacts.
    pub context_id: String,

    /// Caller-chosen identifier; generated at execution time when absent.
    pub task_id: Option<TaskId>,
}

impl TaskRequest {
    /// Create a request, rejecting empty task content or context id.
    pub fn new(task: impl Into<String>, context_id: impl Into<String>) -> Result<Self, CoreError> {
        let task = task.into();
        let context_id = context_id.into();

        if task.is_empty() {
            return Err(CoreError::MissingField("task"));
        }
        if context_id.is_empty() {
            return Err(CoreError::MissingField("contextId"));
        }

        Ok(Self {
            task,
            context_id,
            task_id: None,
        })
    }

    /// Build a request from loosely-typed inbound fields.
    ///
    /// Fields are checked in wire order: `task`, then `contextId`, then
    /// `taskId`. An empty `taskId` is treated as absent.
    pub fn from_parts(
        task: Option<String>,
        context_id: Option<String>,
        task_id: Option<String>,
    ) -> Result<Self, CoreError> {
        let task = task
            .filter(|t| !t.is_empty())
            .ok_or(CoreError::MissingField("task"))?;
        let context_id = context_id
            .filter(|c| !c.is_empty())
            .ok_or(CoreError::MissingField("contextId"))?;

        let mut request = Self::new(task, context_id)?;
        if let Some(id) = task_id.filter(|id| !id.is_empty()) {
            let id = TaskId::parse(id).map_err(|e| CoreError::InvalidField {
                field: "taskId",
                reason: e.to_string(),
            })?;
            request = request.with_task_id(id);
        }
        Ok(request)
    }

    /// Builder method to set the task id.
    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Short single-line preview of the task text for logging.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.task, max_chars)
    }
}

/// Truncate `text` to `max_chars` characters, appending `...` when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
