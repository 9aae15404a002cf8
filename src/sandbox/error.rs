//! Error types for the render sandbox.

use std::time::Duration;

use thiserror::Error;

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors raised while launching or hosting a sandboxed view.
///
/// The launcher never lets these escape: `SandboxRenderer::display` turns
/// them into `false` plus a warning.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// No rendering backend could be found at startup.
    #[error("Sandbox unavailable: {reason}")]
    Unavailable { reason: String },

    /// The sandbox process could not be started.
    #[error("Failed to spawn sandbox '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// Filesystem work for the session failed.
    #[error("Sandbox I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    /// No readiness marker within the timeout.
    #[error("Sandbox not ready within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    /// The sandbox process exited before it was expected to.
    #[error("Sandbox exited: {status}")]
    ChildExited { status: String },

    /// The native host's loopback server failed.
    #[error("Sandbox server error: {reason}")]
    Server { reason: String },

    /// The handoff environment is missing or malformed.
    #[error("Invalid sandbox handoff: {reason}")]
    Handoff { reason: String },
}

impl SandboxError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
