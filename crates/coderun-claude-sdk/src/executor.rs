//! Claude Code executor for running agents via subprocess.
//!
//! This module provides the main `ClaudeExecutor` type for executing
//! Claude Code agents using one-shot mode with streaming JSON output.
//! Output is exposed as a [`MessageStream`]; dropping the stream kills the
//! subprocess and, on unix, everything it started.

use std::io::ErrorKind;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, trace, warn};

use crate::error::SdkError;
use crate::types::{ClaudeMessage, PermissionMode};

/// Default cap on a single stdout message (10 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Messages buffered between the stdout reader and the consumer.
const CHANNEL_CAPACITY: usize = 32;

/// How often the reader checks for process exit after stdout closes.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Child handle shared between the reader task and the stream, so the
/// stream can kill the process synchronously when dropped.
type SharedChild = Arc<Mutex<Child>>;

/// Executor for Claude Code agents.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use coderun_claude_sdk::{ClaudeExecutor, PermissionMode};
/// use tokio_stream::StreamExt;
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let executor = ClaudeExecutor::new("claude")
///         .with_permission_mode(PermissionMode::AcceptEdits)
///         .with_max_turns(10);
///
///     let mut stream = executor.execute(Path::new("."), "What is 2 + 2?")?;
///     while let Some(message) = stream.next().await {
///         println!("{:?}", message?);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeExecutor {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Permission mode to use.
    permission_mode: PermissionMode,

    /// Model to use (optional).
    model: Option<String>,

    /// System prompt (optional).
    system_prompt: Option<String>,

    /// Tools the agent may use without asking. Empty means CLI default.
    allowed_tools: Vec<String>,

    /// Maximum agentic turns (optional).
    max_turns: Option<u32>,

    /// Largest single stdout message accepted, in bytes.
    max_buffer_size: usize,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl ClaudeExecutor {
    /// Create a new executor with the given path to the Claude CLI.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            permission_mode: PermissionMode::Default,
            model: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
            max_turns: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            env_vars: Vec::new(),
        }
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set a system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Set the allowed tool list.
    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set the turn budget.
    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    /// Set the largest accepted stdout message, in bytes.
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Command-line arguments for a one-shot run of `prompt`.
    fn build_args(&self, prompt: &str) -> Vec<String> {
        // stream-json output in print mode requires --verbose
        let mut args = vec![
            "--output-format=stream-json".to_string(),
            "--verbose".to_string(),
            "--permission-mode".to_string(),
            self.permission_mode.to_string(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(turns) = self.max_turns {
            args.push("--max-turns".to_string());
            args.push(turns.to_string());
        }

        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.allowed_tools.join(","));
        }

        if let Some(system) = &self.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(system.clone());
        }

        // The prompt itself
        args.push("--print".to_string());
        args.push(prompt.to_string());
        args
    }

    /// Execute a prompt with Claude Code.
    ///
    /// Spawns a new Claude process in `working_dir` and returns the stream of
    /// parsed stdout messages. The stream ends after the process exits; a
    /// non-zero exit is delivered as a final `Err` item.
    pub fn execute(&self, working_dir: &Path, prompt: &str) -> Result<MessageStream, SdkError> {
        info!(
            claude_path = %self.claude_path,
            working_dir = %working_dir.display(),
            prompt_len = prompt.len(),
            permission_mode = %self.permission_mode,
            max_turns = ?self.max_turns,
            "Preparing Claude execution"
        );

        let mut cmd = Command::new(&self.claude_path);
        cmd.args(self.build_args(prompt));

        // Configure stdio - no stdin needed for one-shot mode
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(working_dir)
            .kill_on_drop(true);

        // Own process group, so tools the agent starts die with it
        #[cfg(unix)]
        cmd.process_group(0);

        // Add environment variables
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!("Full command: {:?}", cmd.as_std().get_program());

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn Claude process");
            if e.kind() == ErrorKind::NotFound {
                SdkError::ClaudeNotFound(self.claude_path.clone())
            } else {
                SdkError::SpawnError(e)
            }
        })?;

        info!(pid = ?child.id(), "Claude process spawned successfully");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SdkError::ProtocolError("Failed to get stderr".to_string()))?;

        // Spawn stderr reader for logging
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            warn!(stderr = %trimmed, "Claude stderr");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading Claude stderr");
                        break;
                    }
                }
            }
        });

        let child: SharedChild = Arc::new(Mutex::new(child));
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let max_buffer_size = self.max_buffer_size;
        let reader = tokio::spawn({
            let child = Arc::clone(&child);
            async move {
                pump_stdout(child, stdout, max_buffer_size, tx).await;
            }
        });

        Ok(MessageStream {
            inner: ReceiverStream::new(rx),
            reader,
            child,
        })
    }
}

impl Default for ClaudeExecutor {
    fn default() -> Self {
        Self::new("claude")
    }
}

/// Lazy, finite stream of messages from one Claude process.
///
/// Dropping the stream sends SIGKILL before `drop` returns, so a caller that
/// removes the working directory afterwards does not race the process.
pub struct MessageStream {
    inner: ReceiverStream<Result<ClaudeMessage, SdkError>>,
    reader: JoinHandle<()>,
    child: SharedChild,
}

impl Stream for MessageStream {
    type Item = Result<ClaudeMessage, SdkError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if !self.reader.is_finished() {
            debug!("Message stream dropped early, killing Claude process");
            self.reader.abort();
        }
        // No-op once the reader has reaped the process
        kill_process_tree(&mut lock_child(&self.child));
    }
}

fn lock_child(child: &SharedChild) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kill an un-reaped child and its process group.
fn kill_process_tree(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    signal_process_group(pid);
    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "Failed to kill Claude process");
    }
}

#[cfg(unix)]
fn signal_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions. The group was
    // created for this child at spawn and the child is not yet reaped.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "Failed to signal Claude process group");
    }
}

#[cfg(not(unix))]
fn signal_process_group(_pid: u32) {}

/// Wait for the child to exit without holding the lock across an await.
async fn wait_for_exit(child: &SharedChild) -> std::io::Result<ExitStatus> {
    loop {
        let polled = lock_child(child).try_wait();
        match polled? {
            Some(status) => return Ok(status),
            None => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
        }
    }
}

/// Forward parsed stdout lines to `tx`, then report the exit status.
async fn pump_stdout(
    child: SharedChild,
    stdout: ChildStdout,
    max_buffer_size: usize,
    tx: mpsc::Sender<Result<ClaudeMessage, SdkError>>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut message_count = 0u64;

    loop {
        match read_message_line(&mut reader, &mut buf, max_buffer_size).await {
            Ok(None) => {
                info!(total_messages = message_count, "Claude stdout closed (EOF)");
                break;
            }
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                message_count += 1;
                trace!(message_num = message_count, bytes = trimmed.len(), "Received message from Claude");

                match serde_json::from_str::<ClaudeMessage>(trimmed) {
                    Ok(message) => {
                        if tx.send(Ok(message)).await.is_err() {
                            debug!("Message receiver dropped, stopping stdout reader");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to parse Claude message");
                        // Log first 200 chars for debugging
                        let preview: String = trimmed.chars().take(200).collect();
                        warn!(preview = %preview, "Message preview");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Error reading Claude stdout");
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }

    match wait_for_exit(&child).await {
        Ok(status) if status.success() => {
            info!(exit_code = ?status.code(), "Claude process exited");
        }
        Ok(status) => {
            let exit_code = status.code().unwrap_or(-1);
            warn!(exit_code, "Claude process exited with failure");
            let _ = tx
                .send(Err(SdkError::ProcessError(format!(
                    "Claude exited with code {}",
                    exit_code
                ))))
                .await;
        }
        Err(e) => {
            let _ = tx.send(Err(SdkError::Io(e))).await;
        }
    }
}

/// Read one newline-terminated message of at most `limit` bytes.
///
/// Returns `Ok(None)` at EOF.
async fn read_message_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> Result<Option<String>, SdkError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read_cap = limit as u64 + 1;
    let n = (&mut *reader)
        .take(read_cap)
        .read_until(b'\n', buf)
        .await
        .map_err(SdkError::Io)?;

    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && n as u64 == read_cap {
        return Err(SdkError::BufferOverflow { limit });
    }

    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
