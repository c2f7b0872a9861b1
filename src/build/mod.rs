// Build module - artifact building and publish orchestration
//
// The build tool itself is external: it is handed a target and an empty
// output directory and must leave the artifacts to upload in that directory.

mod command;
mod orchestrator;

pub use command::CommandBuilder;
pub use orchestrator::{BuildOrchestrator, RunReport, TargetReport, TargetStage};

use std::path::Path;
use tracing::debug;

use crate::error::{PublishError, Result};
use crate::target::Target;

/// Produces the artifact files for one target
pub trait ArtifactBuilder: Send + Sync {
    fn build(&self, target: Target, output_dir: &Path) -> Result<()>;
}

/// Remove `dir` if present and recreate it empty
pub(crate) fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        debug!("Removing previous output in {}", dir.display());
        std::fs::remove_dir_all(dir).map_err(|e| PublishError::io(dir, e))?;
    }
    std::fs::create_dir_all(dir).map_err(|e| PublishError::io(dir, e))
}
