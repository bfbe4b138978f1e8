//! Per-task workspace directories.
//!
//! A [`Workspace`] is an owning guard over `<base>/<task_id>`. Every exit
//! path of the coordinator, the deadline included, awaits
//! [`Workspace::teardown`]. If the guard is dropped without it (the caller
//! abandoned the request) the removal is handed to the blocking pool, or
//! done inline when no runtime is around.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coderun_core::TaskId;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Attempts at removing a tree before giving up. A process killed just
/// before teardown can still be finishing a file write.
const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Workspace provisioning errors.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates and destroys per-task working directories.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Unresolved path of the workspace for `task_id`.
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.base.join(task_id.as_str())
    }

    /// Create the workspace for `task_id`, including missing parents.
    ///
    /// Succeeds if the directory already exists. The returned guard holds
    /// the canonical absolute path.
    pub async fn provision(&self, task_id: &TaskId) -> Result<Workspace, WorkspaceError> {
        let path = self.path_for(task_id);

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| WorkspaceError::Create {
                path: path.clone(),
                source,
            })?;

        // Guard first so the directory is removed if canonicalizing fails.
        let mut workspace = Workspace::new(path);
        let resolved = tokio::fs::canonicalize(workspace.path())
            .await
            .map_err(|source| WorkspaceError::Create {
                path: workspace.path().to_path_buf(),
                source,
            })?;
        workspace.path = resolved;

        debug!(task_id = %task_id, path = %workspace.path().display(), "Workspace provisioned");
        Ok(workspace)
    }

    /// Recursively delete a workspace. Never fails; errors are logged.
    pub async fn teardown(&self, workspace: Workspace) {
        workspace.teardown().await;
    }
}

/// Exclusively owned task working directory.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively delete the directory. A missing directory is fine.
    pub async fn teardown(mut self) {
        self.released = true;
        let path = self.path.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || remove_tree(&path)).await {
            warn!(path = %self.path.display(), error = %e, "Workspace removal task failed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let path = std::mem::take(&mut self.path);
        debug!(path = %path.display(), "Workspace abandoned, removing");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_tree(&path));
            }
            Err(_) => remove_tree(&path),
        }
    }
}

/// Blocking recursive removal with a few retries.
fn remove_tree(path: &Path) {
    let mut attempt = 1;
    loop {
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                info!(path = %path.display(), "Workspace removed");
                return;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Workspace already gone");
                return;
            }
            Err(e) if attempt < REMOVE_ATTEMPTS => {
                debug!(path = %path.display(), attempt, error = %e, "Workspace removal failed, retrying");
                if e.kind() == io::ErrorKind::PermissionDenied {
                    unlock_tree(path);
                }
                attempt += 1;
                std::thread::sleep(REMOVE_RETRY_DELAY);
            }
            Err(e) => {
                warn!(path = %path.display(), attempts = attempt, error = %e, "Failed to remove workspace");
                return;
            }
        }
    }
}

/// Give the owner back access to directories the task locked down.
#[cfg(unix)]
fn unlock_tree(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(path) {
        let dir = match &entry {
            Ok(e) if e.file_type().is_dir() => e.path(),
            Ok(_) => continue,
            Err(e) => match e.path() {
                Some(p) => p,
                None => continue,
            },
        };
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            debug!(path = %dir.display(), error = %e, "Could not unlock directory");
        }
    }
}

#[cfg(not(unix))]
fn unlock_tree(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::wait_for_removal;

    fn task(id: &str) -> TaskId {
        TaskId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_provision_creates_nested_base() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path().join("a").join("b"));

        let ws = manager.provision(&task("t1")).await.unwrap();

        assert!(ws.path().is_dir());
        assert!(ws.path().is_absolute());
        assert!(ws.path().ends_with("t1"));
        manager.teardown(ws).await;
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("t2")).unwrap();
        std::fs::write(tmp.path().join("t2").join("keep.txt"), "x").unwrap();

        let ws = manager.provision(&task("t2")).await.unwrap();
        assert!(ws.path().join("keep.txt").exists());
        manager.teardown(ws).await;
    }

    #[tokio::test]
    async fn test_teardown_removes_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let ws = manager.provision(&task("t3")).await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir_all(path.join("out").join("deep")).unwrap();
        std::fs::write(path.join("out").join("deep").join("f.bin"), [0u8; 16]).unwrap();

        manager.teardown(ws).await;
        assert!(!path.exists());
        assert!(tmp.path().exists());
    }

    #[tokio::test]
    async fn test_teardown_tolerates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let ws = manager.provision(&task("t4")).await.unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();

        // Must not panic or error.
        manager.teardown(ws).await;
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path());

        let ws = manager.provision(&task("t5")).await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("partial.txt"), "x").unwrap();

        drop(ws);
        assert!(wait_for_removal(&path).await);
    }

    #[test]
    fn test_drop_outside_runtime_removes_inline() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t7");
        std::fs::create_dir_all(path.join("nested")).unwrap();
        std::fs::write(path.join("nested").join("f.txt"), "x").unwrap();

        drop(Workspace::new(path.clone()));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_teardown_unlocks_restricted_directories() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(tmp.path());
        let ws = manager.provision(&task("t9")).await.unwrap();
        let path = ws.path().to_path_buf();
        let sealed = path.join("outer").join("inner");
        std::fs::create_dir_all(&sealed).unwrap();
        std::fs::write(sealed.join("f.txt"), "x").unwrap();
        std::fs::set_permissions(&sealed, std::fs::Permissions::from_mode(0o000)).unwrap();
        std::fs::set_permissions(path.join("outer"), std::fs::Permissions::from_mode(0o000)).unwrap();

        manager.teardown(ws).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_provision_fails_when_base_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("not-a-dir");
        std::fs::write(&base, "x").unwrap();
        let manager = WorkspaceManager::new(&base);

        let err = manager.provision(&task("t6")).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to create workspace"));
    }
}
