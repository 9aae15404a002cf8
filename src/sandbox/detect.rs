//! One-shot detection of the rendering backend.
//!
//! Detection runs once at startup. The resulting [`SandboxBackend`] is passed
//! to the renderer and never re-probed.

use std::path::{Path, PathBuf};

use crate::config::SandboxConfig;

/// How views get rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxBackend {
    /// Re-invoke this executable as the hidden `sandbox-host` subcommand.
    Native { exe: PathBuf },
    /// An operator-provided viewer that honors the handoff contract.
    External { program: PathBuf, args: Vec<String> },
    /// Nothing can render; every display attempt fails.
    Unavailable { reason: String },
}

impl SandboxBackend {
    pub fn is_available(&self) -> bool {
        !matches!(self, SandboxBackend::Unavailable { .. })
    }

    /// Human-readable backend name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxBackend::Native { .. } => "native",
            SandboxBackend::External { .. } => "external",
            SandboxBackend::Unavailable { .. } => "unavailable",
        }
    }

    /// Program and arguments to spawn, if any.
    pub fn command(&self) -> Option<(&Path, Vec<String>)> {
        match self {
            SandboxBackend::Native { exe } => Some((exe.as_path(), vec!["sandbox-host".to_string()])),
            SandboxBackend::External { program, args } => Some((program.as_path(), args.clone())),
            SandboxBackend::Unavailable { .. } => None,
        }
    }
}

/// Pick a backend.
///
/// 1. `SANDBOX_VIEWER_BIN`, when it names an existing file or a program on PATH
/// 2. The current executable, as the native host
/// 3. `Unavailable`
pub fn detect_backend(config: &SandboxConfig) -> SandboxBackend {
    if let Some(viewer) = config.viewer_bin.as_deref() {
        if let Some(program) = resolve_program(viewer) {
            tracing::debug!(program = %program.display(), "Using external sandbox viewer");
            return SandboxBackend::External {
                program,
                args: config.viewer_args.clone(),
            };
        }
        tracing::warn!(viewer = %viewer, "Configured sandbox viewer not found, falling back");
    }

    match std::env::current_exe() {
        Ok(exe) => SandboxBackend::Native { exe },
        Err(e) => SandboxBackend::Unavailable {
            reason: format!("cannot locate current executable: {e}"),
        },
    }
}

/// Resolve a program name to a path: a path as-is when it exists, otherwise
/// a PATH lookup.
fn resolve_program(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    program_on_path(name).then(|| candidate.to_path_buf())
}

/// Check if a binary exists on PATH.
fn program_on_path(name: &str) -> bool {
    #[cfg(unix)]
    let probe = "which";
    #[cfg(windows)]
    let probe = "where";

    std::process::Command::new(probe)
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
