use std::path::PathBuf;
use std::time::Duration;

use crate::target::Target;

/// Failures raised while signing, exchanging, uploading or building.
///
/// The variants follow the failure taxonomy the publish flow acts on:
/// key and signing errors abort the current target, network/timeout/protocol
/// errors abort the current request, build errors abort the current target.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to load private key from {source_name}: {message}")]
    KeyLoad {
        source_name: String,
        message: String,
    },
    #[error("Failed to sign assertion: {0}")]
    Signing(String),
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("Request to {url} timed out after {}s", timeout.as_secs_f64())]
    Timeout { url: String, timeout: Duration },
    #[error("Unexpected response from {url}: {message}")]
    Protocol { url: String, message: String },
    #[error("Build for target '{target}' failed: {message}")]
    Build { target: Target, message: String },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub(crate) fn key_load(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::KeyLoad {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn protocol(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.into(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PublishError> = std::result::Result<T, E>;
