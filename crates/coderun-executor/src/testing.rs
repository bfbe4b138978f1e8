//! Scripted engine for tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, StreamExt};

use crate::runner::{Engine, EngineError, EngineEvent, EngineRequest, EventStream};

/// Engine that replays a fixed script and optionally writes files into the
/// working directory when a run starts.
#[derive(Default)]
pub struct ScriptedEngine {
    events: Vec<Result<EngineEvent, String>>,
    files: Vec<(String, Vec<u8>)>,
    locked_dirs: Vec<String>,
    delay: Duration,
    hang: bool,
    start_error: Option<String>,
    requests: Mutex<Vec<EngineRequest>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new(events: Vec<Result<EngineEvent, String>>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Replies with a single text block.
    pub fn answering(text: &str) -> Self {
        Self::new(vec![Ok(EngineEvent::Text(text.to_string()))])
    }

    /// Write `name` (relative to the workspace) before emitting events.
    pub fn with_file(mut self, name: &str, contents: &[u8]) -> Self {
        self.files.push((name.to_string(), contents.to_vec()));
        self
    }

    /// Create an empty directory nobody may list, before emitting events.
    #[cfg(unix)]
    pub fn with_locked_dir(mut self, name: &str) -> Self {
        self.locked_dirs.push(name.to_string());
        self
    }

    /// Wait this long before emitting anything.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never finish after the scripted events.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Fail before producing a stream.
    pub fn failing_to_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn requests(&self) -> Vec<EngineRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Highest number of simultaneously live runs.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Runs currently live.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether any run stream has been dropped.
    pub fn stream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct RunGuard {
    running: Arc<AtomicUsize>,
    dropped: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn write_files(dir: &Path, files: &[(String, Vec<u8>)]) -> std::io::Result<()> {
    for (name, contents) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
    }
    Ok(())
}

#[cfg(unix)]
fn lock_dirs(dir: &Path, names: &[String]) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for name in names {
        let path = dir.join(name);
        std::fs::create_dir_all(&path)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o000))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_dirs(_dir: &Path, _names: &[String]) -> std::io::Result<()> {
    Ok(())
}

/// Whether a mode 000 directory is actually unreadable here (false as root).
#[cfg(unix)]
pub fn permissions_enforced() -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(tmp) = tempfile::tempdir() else {
        return false;
    };
    let locked = tmp.path().join("locked");
    if std::fs::create_dir(&locked).is_err()
        || std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).is_err()
    {
        return false;
    }
    let enforced = std::fs::read_dir(&locked).is_err();
    let _ = std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700));
    enforced
}

/// Poll until `path` is gone, for removals handed to the blocking pool.
pub async fn wait_for_removal(path: &Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn stream(&self, request: EngineRequest) -> Result<EventStream, EngineError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(message) = &self.start_error {
            return Err(EngineError::Failed(message.clone()));
        }
        write_files(&request.working_dir, &self.files)
            .and_then(|()| lock_dirs(&request.working_dir, &self.locked_dirs))
            .map_err(|e| EngineError::Failed(e.to_string()))?;

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = RunGuard {
            running: self.running.clone(),
            dropped: self.dropped.clone(),
        };

        let delay = self.delay;
        let lead = stream::once(tokio::time::sleep(delay))
            .filter_map(|()| future::ready(None::<Result<EngineEvent, EngineError>>));
        let events = stream::iter(
            self.events
                .clone()
                .into_iter()
                .map(|e| e.map_err(EngineError::Failed)),
        );
        let tail: EventStream = if self.hang {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };

        Ok(lead
            .chain(events)
            .chain(tail)
            .map(move |item| {
                let _ = &guard;
                item
            })
            .boxed())
    }
}
