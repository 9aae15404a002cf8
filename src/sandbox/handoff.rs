//! Launcher-to-sandbox handoff.
//!
//! The launcher sets these variables once, at spawn:
//!
//! | variable               | meaning                                 |
//! |------------------------|-----------------------------------------|
//! | `KIDGUARD_VIEW_FILE`   | payload to render                       |
//! | `KIDGUARD_POLICY_JSON` | serialized `Policy` snapshot            |
//! | `KIDGUARD_READY_FILE`  | where to write `READY` after first paint|
//! | `KIDGUARD_PARENT_PID`  | launcher pid, polled for liveness       |
//! | `KIDGUARD_VIEW_KIND`   | `embed`, `gallery`, or `page`           |

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::policy::Policy;
use crate::sandbox::error::{Result, SandboxError};

pub const ENV_VIEW_FILE: &str = "KIDGUARD_VIEW_FILE";
pub const ENV_POLICY_JSON: &str = "KIDGUARD_POLICY_JSON";
pub const ENV_READY_FILE: &str = "KIDGUARD_READY_FILE";
pub const ENV_PARENT_PID: &str = "KIDGUARD_PARENT_PID";
pub const ENV_VIEW_KIND: &str = "KIDGUARD_VIEW_KIND";

/// Contents of the readiness marker.
pub const READY_SENTINEL: &str = "READY";

/// What the payload is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Embed,
    Gallery,
    Page,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Embed => "embed",
            ViewKind::Gallery => "gallery",
            ViewKind::Page => "page",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embed" => Ok(ViewKind::Embed),
            "gallery" => Ok(ViewKind::Gallery),
            "page" => Ok(ViewKind::Page),
            other => Err(SandboxError::Handoff {
                reason: format!("unknown view kind '{other}'"),
            }),
        }
    }
}

/// The full handoff as seen by both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub view_file: PathBuf,
    pub policy: Policy,
    pub ready_file: PathBuf,
    pub parent_pid: u32,
    pub kind: ViewKind,
}

impl Handoff {
    /// Environment for the child process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_VIEW_FILE, self.view_file.display().to_string()),
            (ENV_POLICY_JSON, self.policy.to_json()),
            (ENV_READY_FILE, self.ready_file.display().to_string()),
            (ENV_PARENT_PID, self.parent_pid.to_string()),
            (ENV_VIEW_KIND, self.kind.to_string()),
        ]
    }

    /// Rebuild the handoff from a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| SandboxError::Handoff {
                    reason: format!("{key} is not set"),
                })
        };

        let policy = Policy::from_json(&require(ENV_POLICY_JSON)?).map_err(|e| SandboxError::Handoff {
            reason: format!("{ENV_POLICY_JSON} is not valid policy JSON: {e}"),
        })?;
        let parent_pid = require(ENV_PARENT_PID)?
            .parse()
            .map_err(|e| SandboxError::Handoff {
                reason: format!("{ENV_PARENT_PID} is not a pid: {e}"),
            })?;
        let kind = match lookup(ENV_VIEW_KIND) {
            Some(kind) if !kind.is_empty() => kind.parse()?,
            _ => ViewKind::Page,
        };

        Ok(Self {
            view_file: PathBuf::from(require(ENV_VIEW_FILE)?),
            policy,
            ready_file: PathBuf::from(require(ENV_READY_FILE)?),
            parent_pid,
            kind,
        })
    }

    /// Read the handoff from this process's environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Write the readiness marker. Only the first call creates it; later calls
/// return `Ok(false)`.
pub fn write_ready_marker(path: &Path) -> Result<bool> {
    let mut file = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(SandboxError::io(path, e)),
    };
    file.write_all(READY_SENTINEL.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| SandboxError::io(path, e))?;
    Ok(true)
}

/// Whether the marker exists and holds the sentinel.
pub fn is_ready(path: &Path) -> bool {
    std::fs::read_to_string(path).is_ok_and(|s| s.trim() == READY_SENTINEL)
}
