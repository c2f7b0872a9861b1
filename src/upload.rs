// Batch uploads of build artifacts to a storage bucket
//
// Every file in a target's output directory is uploaded with its own request.
// A failed file is recorded and logged; the batch always moves on to the next
// file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::AccessToken;
use crate::error::{PublishError, Result};
use crate::target::Target;
use crate::transport::{HttpRequest, HttpTransport};

/// One file to upload in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub path: PathBuf,
    pub object_name: String,
}

/// Result of uploading a single file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub object_name: String,
    /// Response body on success, error text on failure
    pub result: std::result::Result<String, String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-file outcomes of one upload batch
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub outcomes: Vec<FileOutcome>,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Uploads directories of artifacts into a bucket
pub struct UploadDispatcher {
    transport: Arc<dyn HttpTransport>,
    upload_base_url: String,
    bucket: String,
}

impl UploadDispatcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        upload_base_url: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            upload_base_url: upload_base_url.into(),
            bucket: bucket.into(),
        }
    }

    /// Media upload URL for an object, with the object name query-escaped
    pub fn upload_url(&self, object_name: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.upload_base_url.trim_end_matches('/'),
            urlencoding::encode(&self.bucket),
            urlencoding::encode(object_name)
        )
    }

    /// List the files of `directory` as upload tasks, ordered by file name
    pub fn plan(&self, target: Target, directory: &Path) -> Result<Vec<UploadTask>> {
        let entries =
            std::fs::read_dir(directory).map_err(|e| PublishError::io(directory, e))?;

        let mut tasks = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", directory.display(), e);
                    continue;
                }
            };

            // Follows symlinks, so linked artifacts are uploaded too
            let is_file = std::fs::metadata(entry.path())
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            tasks.push(UploadTask {
                path: entry.path(),
                object_name: target.object_name(&file_name),
            });
        }

        tasks.sort_by(|a, b| a.object_name.cmp(&b.object_name));
        Ok(tasks)
    }

    /// Upload every file in `directory` under the `<target>/` prefix
    pub async fn upload_all(
        &self,
        target: Target,
        directory: &Path,
        token: &AccessToken,
    ) -> UploadReport {
        let tasks = match self.plan(target, directory) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Nothing to upload for {}: {}", target, e);
                Vec::new()
            }
        };

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            info!("upload : {}", task.path.display());
            let result = self.upload_file(&task, token).await;
            match &result {
                Ok(body) => info!("Success: {}", body),
                Err(message) => warn!("Error : {}", message),
            }
            outcomes.push(FileOutcome {
                object_name: task.object_name,
                result,
            });
        }

        UploadReport { outcomes }
    }

    async fn upload_file(
        &self,
        task: &UploadTask,
        token: &AccessToken,
    ) -> std::result::Result<String, String> {
        let body = tokio::fs::read(&task.path)
            .await
            .map_err(|e| PublishError::io(&task.path, e).to_string())?;

        let url = self.upload_url(&task.object_name);
        info!("Upload url is {}", url);

        let request = HttpRequest::new(url.as_str(), body)
            .header("Authorization", format!("Bearer {}", token.token))
            .header("Content-Type", "application/octet-stream");

        let response = self
            .transport
            .post(request)
            .await
            .map_err(|e| e.to_string())?;

        if response.is_success() {
            Ok(response.text())
        } else {
            Err(format!(
                "Upload of {} returned status {}: {}",
                task.object_name,
                response.status,
                response.text()
            ))
        }
    }
}
