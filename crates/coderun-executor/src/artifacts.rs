//! Artifact collection and upload.
//!
//! After the engine finishes, every eligible regular file in the workspace
//! is uploaded to the storage endpoint. One failed upload never stops the
//! others.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use coderun_core::{Artifact, ErrorKind};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Per-upload HTTP timeout.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &["__pycache__"];

/// Compiled/cache file extensions never uploaded.
const EXCLUDED_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Longest error body kept from a failed upload response.
const MAX_ERROR_BODY: usize = 512;

/// Errors uploading a single artifact.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File not found: {0}")]
    FileMissing(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Storage endpoint response has no 'url'")]
    InvalidResponse,
}

/// List every eligible regular file under `workspace`, sorted by path.
///
/// Skips dot-prefixed files and anything under a dot-prefixed directory,
/// `__pycache__` directories, and `.pyc`/`.pyo` files. Symlinks are not
/// followed or returned. A missing workspace yields an empty list.
pub fn collect(workspace: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
    if !workspace.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(workspace)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded(e));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    if entry.file_type().is_dir() {
        return EXCLUDED_DIRS.contains(&name.as_ref());
    }
    entry
        .path()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXCLUDED_EXTENSIONS.contains(&ext))
}

/// Uploads files to the artifact storage endpoint.
#[derive(Debug, Clone)]
pub struct ArtifactUploader {
    client: Client,
    endpoint: String,
}

impl ArtifactUploader {
    /// Create an uploader posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Upload one file as multipart `file`, with `contextId` as a text field.
    pub async fn upload(&self, path: &Path, context_id: &str) -> Result<Artifact, UploadError> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let file = tokio::fs::File::open(path).await.map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                UploadError::FileMissing(path.to_path_buf())
            } else {
                UploadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|source| UploadError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let part = Part::stream_with_length(Body::from(file), len).file_name(filename.clone());
        let form = Form::new()
            .part("file", part)
            .text("contextId", context_id.to_string());

        debug!(file = %filename, bytes = len, endpoint = %self.endpoint, "Uploading artifact");
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(UploadError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let url = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| v.get("url").and_then(Value::as_str).map(str::to_owned))
            .ok_or(UploadError::InvalidResponse)?;

        Ok(Artifact::new(filename, url))
    }

    /// Upload every file in order, keeping successes and logging failures.
    pub async fn upload_all(&self, paths: &[PathBuf], context_id: &str) -> UploadReport {
        let mut report = UploadReport::default();

        for path in paths {
            match self.upload(path, context_id).await {
                Ok(artifact) => {
                    debug!(file = %artifact.filename, url = %artifact.url, "Artifact uploaded");
                    report.artifacts.push(artifact);
                }
                Err(e) => {
                    warn!(
                        error_kind = %ErrorKind::UploadFailure,
                        path = %path.display(),
                        error = %e,
                        "Failed to upload artifact"
                    );
                    report.failed += 1;
                }
            }
        }

        if !report.artifacts.is_empty() {
            info!(uploaded = report.artifacts.len(), failed = report.failed, "Uploaded artifacts");
        }
        report
    }
}

/// Outcome of uploading a batch of files.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Successfully uploaded artifacts, in input order.
    pub artifacts: Vec<Artifact>,
    /// Number of files that failed to upload.
    pub failed: usize,
}
