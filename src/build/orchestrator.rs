// Per-target build -> authenticate -> upload pipeline

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{prepare_output_dir, ArtifactBuilder};
use crate::auth::TokenExchanger;
use crate::error::{PublishError, Result};
use crate::target::Target;
use crate::upload::{UploadDispatcher, UploadReport};

/// Progress of a single target through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStage {
    Clean,
    Built,
    Authenticated,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for TargetStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetStage::Clean => "clean",
            TargetStage::Built => "built",
            TargetStage::Authenticated => "authenticated",
            TargetStage::Uploading => "uploading",
            TargetStage::Done => "done",
            TargetStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one target
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: Target,
    /// `Done` or `Failed` once the target has been processed
    pub stage: TargetStage,
    /// Last stage reached before failing
    pub failed_at: Option<TargetStage>,
    pub error: Option<String>,
    pub upload: Option<UploadReport>,
}

impl TargetReport {
    fn new(target: Target) -> Self {
        Self {
            target,
            stage: TargetStage::Clean,
            failed_at: None,
            error: None,
            upload: None,
        }
    }

    fn advance(&mut self, next: TargetStage) {
        debug!("{}: {} -> {}", self.target, self.stage, next);
        self.stage = next;
    }

    fn fail(mut self, operation: &str, error: PublishError) -> Self {
        warn!("{} failed for target {}: {}", operation, self.target, error);
        self.failed_at = Some(self.stage);
        self.stage = TargetStage::Failed;
        self.error = Some(error.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.stage == TargetStage::Done
            && self.upload.as_ref().map_or(true, UploadReport::is_success)
    }
}

/// Outcome of a whole run, one entry per target in run order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.targets.iter().all(TargetReport::is_success)
    }
}

/// Builds each target, fetches a fresh token, and uploads the artifacts.
///
/// Targets run strictly one after another. A failure in one target is
/// recorded in its report and the next target is still attempted.
pub struct BuildOrchestrator {
    builder: Arc<dyn ArtifactBuilder>,
    exchanger: TokenExchanger,
    dispatcher: UploadDispatcher,
    output_base: PathBuf,
}

impl BuildOrchestrator {
    pub fn new(
        builder: Arc<dyn ArtifactBuilder>,
        exchanger: TokenExchanger,
        dispatcher: UploadDispatcher,
        output_base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            builder,
            exchanger,
            dispatcher,
            output_base: output_base.into(),
        }
    }

    pub async fn run_all(&self, targets: &[Target]) -> RunReport {
        let mut report = RunReport::default();
        for &target in targets {
            report.targets.push(self.run_target(target).await);
        }
        report
    }

    async fn run_target(&self, target: Target) -> TargetReport {
        let mut report = TargetReport::new(target);
        let output_dir = target.output_dir(&self.output_base);

        let dir = output_dir.clone();
        if let Err(e) = run_blocking(target, move || prepare_output_dir(&dir)).await {
            return report.fail("Preparing output directory", e);
        }

        let builder = Arc::clone(&self.builder);
        let dir = output_dir.clone();
        if let Err(e) = run_blocking(target, move || builder.build(target, &dir)).await {
            return report.fail("Build", e);
        }
        report.advance(TargetStage::Built);

        let token = match self.exchanger.fetch_access_token().await {
            Ok(token) => token,
            Err(e) => return report.fail("Fetching access token", e),
        };
        report.advance(TargetStage::Authenticated);

        report.advance(TargetStage::Uploading);
        let upload = self
            .dispatcher
            .upload_all(target, &output_dir, &token)
            .await;
        info!(
            "{}: uploaded {} of {} files",
            target,
            upload.succeeded(),
            upload.outcomes.len()
        );
        report.upload = Some(upload);
        report.advance(TargetStage::Done);

        report
    }
}

/// Filesystem work and the external build tool run on the blocking pool
async fn run_blocking<F>(target: Target, work: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| {
            Err(PublishError::Build {
                target,
                message: format!("Build task did not complete: {}", e),
            })
        })
}
