// Build targets and their canonical lowercase names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Platform an asset bundle set is built for.
///
/// The lowercase name returned by [`Target::as_str`] is the only mapping used
/// for both the local output directory and the remote object prefix, so the
/// two can never diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lower")]
pub enum Target {
    Ios,
    Android,
    StandaloneWindows64,
    StandaloneOsx,
    StandaloneLinux64,
    WebGl,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Ios => "ios",
            Target::Android => "android",
            Target::StandaloneWindows64 => "standalonewindows64",
            Target::StandaloneOsx => "standaloneosx",
            Target::StandaloneLinux64 => "standalonelinux64",
            Target::WebGl => "webgl",
        }
    }

    /// Local directory the build for this target writes into
    pub fn output_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.as_str())
    }

    /// Remote object name for a file produced by this target
    pub fn object_name(&self, file_name: &str) -> String {
        format!("{}/{}", self.as_str(), file_name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
