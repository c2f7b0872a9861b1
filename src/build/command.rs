// External build tool invocation

use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use super::ArtifactBuilder;
use crate::error::{PublishError, Result};
use crate::target::Target;

/// Runs a configured build program once per target.
///
/// `{target}` and `{output_dir}` in the argument list are replaced with the
/// target's lowercase name and the directory the artifacts must be written to.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn expand_args(&self, target: Target, output_dir: &Path) -> Vec<String> {
        let output_dir = output_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{target}", target.as_str())
                    .replace("{output_dir}", &output_dir)
            })
            .collect()
    }
}

impl ArtifactBuilder for CommandBuilder {
    fn build(&self, target: Target, output_dir: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(target, output_dir));

        info!(
            "Building {} artifacts into {} with {}",
            target,
            output_dir.display(),
            self.program
        );
        debug!("Executing command: {:?}", cmd);

        let status = cmd.status().map_err(|e| PublishError::Build {
            target,
            message: format!("Failed to execute {}: {}", self.program, e),
        })?;

        if !status.success() {
            return Err(PublishError::Build {
                target,
                message: format!("{} exited with {}", self.program, status),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_substituted() {
        let builder = CommandBuilder::new(
            "unity",
            vec![
                "-buildTarget".to_string(),
                "{target}".to_string(),
                "-outputPath={output_dir}".to_string(),
            ],
        );
        let args = builder.expand_args(Target::Ios, Path::new("AssetBundles/ios"));
        assert_eq!(
            args,
            vec!["-buildTarget", "ios", "-outputPath=AssetBundles/ios"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_command_populates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandBuilder::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo bundle > \"$0/{target}.bundle\"".to_string(),
                "{output_dir}".to_string(),
            ],
        );

        builder.build(Target::Android, dir.path()).unwrap();
        assert!(dir.path().join("android.bundle").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_is_build_error() {
        let builder = CommandBuilder::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let err = builder
            .build(Target::Android, Path::new("."))
            .unwrap_err();
        assert!(matches!(err, PublishError::Build { target: Target::Android, .. }));
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn test_missing_program_is_build_error() {
        let builder = CommandBuilder::new("assetpub-no-such-build-tool", vec![]);
        let err = builder.build(Target::Ios, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("Failed to execute assetpub-no-such-build-tool"));
    }
}
