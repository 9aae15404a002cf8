//! One sandboxed view: its scratch directory and child process.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::policy::Policy;
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::handoff::{self, Handoff, ViewKind};

/// Readiness of a spawned sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    Pending,
    Ready,
    TimedOut,
    Failed { reason: String },
}

/// Scratch files plus the child rendering them.
///
/// Dropping the session kills the child and removes the scratch directory.
#[derive(Debug)]
pub struct SandboxSession {
    id: Uuid,
    dir: PathBuf,
    view_file: PathBuf,
    ready_file: PathBuf,
    kind: ViewKind,
    child: Option<Child>,
    state: ReadinessState,
}

impl SandboxSession {
    /// Write `payload` into a fresh scratch directory.
    pub fn create(payload: &str, kind: ViewKind) -> Result<Self> {
        let id = Uuid::new_v4();
        let dir = std::env::temp_dir().join(format!("kidguard-view-{id}"));
        std::fs::create_dir_all(&dir).map_err(|e| SandboxError::io(&dir, e))?;

        let view_file = dir.join("view.html");
        let ready_file = dir.join("ready");
        let session = Self {
            id,
            dir,
            view_file,
            ready_file,
            kind,
            child: None,
            state: ReadinessState::Pending,
        };
        std::fs::write(&session.view_file, payload)
            .map_err(|e| SandboxError::io(&session.view_file, e))?;
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ready_file(&self) -> &Path {
        &self.ready_file
    }

    pub fn state(&self) -> &ReadinessState {
        &self.state
    }

    pub fn handoff(&self, policy: &Policy) -> Handoff {
        Handoff {
            view_file: self.view_file.clone(),
            policy: policy.clone(),
            ready_file: self.ready_file.clone(),
            parent_pid: std::process::id(),
            kind: self.kind,
        }
    }

    /// Spawn the sandbox process. Its stdin stays open for the life of the
    /// session so the child sees EOF when the launcher goes away.
    pub fn spawn(&mut self, program: &Path, args: &[String], policy: &Policy) -> Result<()> {
        let child = Command::new(program)
            .args(args)
            .envs(self.handoff(policy).to_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Spawn {
                program: program.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(session = %self.id, pid = ?child.id(), "Sandbox spawned");
        self.child = Some(child);
        Ok(())
    }

    /// Poll for the readiness marker until it appears, the child exits, or
    /// `timeout` elapses. A timed-out child is killed.
    pub async fn wait_for_ready(&mut self, timeout: Duration, poll: Duration) -> ReadinessState {
        let started = Instant::now();

        let state = loop {
            if handoff::is_ready(&self.ready_file) {
                break ReadinessState::Ready;
            }

            let Some(child) = self.child.as_mut() else {
                break ReadinessState::Failed {
                    reason: "sandbox was never spawned".to_string(),
                };
            };
            match child.try_wait() {
                Ok(Some(_)) if handoff::is_ready(&self.ready_file) => break ReadinessState::Ready,
                Ok(Some(status)) => {
                    break ReadinessState::Failed {
                        reason: format!("exited before ready ({status})"),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    break ReadinessState::Failed {
                        reason: format!("cannot poll child: {e}"),
                    };
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                tracing::warn!(session = %self.id, ?timeout, "Sandbox not ready in time");
                self.terminate().await;
                break ReadinessState::TimedOut;
            }
            tokio::time::sleep(poll.min(timeout - elapsed)).await;
        };

        self.state = state.clone();
        state
    }

    /// Wait for the child to exit on its own.
    pub async fn wait_for_exit(&mut self) -> Result<ExitStatus> {
        let child = self.child.as_mut().ok_or_else(|| SandboxError::ChildExited {
            status: "sandbox was never spawned".to_string(),
        })?;
        child.wait().await.map_err(|e| SandboxError::ChildExited {
            status: format!("wait failed: {e}"),
        })
    }

    /// Kill the child if it is still running.
    pub async fn terminate(&mut self) {
        if let Some(child) = self.child.as_mut()
            && let Err(e) = child.kill().await
        {
            tracing::debug!(session = %self.id, error = %e, "Sandbox kill failed");
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "Failed to remove sandbox scratch dir");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const SH: &str = "/bin/sh";

    fn script(body: &str) -> Vec<String> {
        vec!["-c".to_string(), body.to_string()]
    }

    #[tokio::test]
    async fn test_create_writes_payload_and_drop_cleans_up() {
        let session = SandboxSession::create("<p>hi</p>", ViewKind::Page).unwrap();
        let dir = session.dir().to_path_buf();
        assert_eq!(std::fs::read_to_string(dir.join("view.html")).unwrap(), "<p>hi</p>");
        assert_eq!(session.state(), &ReadinessState::Pending);

        drop(session);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_ready_marker_resolves_ready() {
        let mut session = SandboxSession::create("x", ViewKind::Page).unwrap();
        session
            .spawn(
                Path::new(SH),
                &script(r#"printf READY > "$KIDGUARD_READY_FILE"; sleep 5"#),
                &Policy::new(["kids.example"], Vec::<String>::new()),
            )
            .unwrap();

        let state = session
            .wait_for_ready(Duration::from_secs(5), Duration::from_millis(20))
            .await;
        assert_eq!(state, ReadinessState::Ready);
        session.terminate().await;
    }

    #[tokio::test]
    async fn test_silent_child_times_out_and_is_killed() {
        let mut session = SandboxSession::create("x", ViewKind::Page).unwrap();
        session
            .spawn(Path::new(SH), &script("sleep 5"), &Policy::default())
            .unwrap();

        let started = Instant::now();
        let state = session
            .wait_for_ready(Duration::from_millis(200), Duration::from_millis(50))
            .await;
        assert_eq!(state, ReadinessState::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));

        let status = session.wait_for_exit().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_early_exit_fails_fast() {
        let mut session = SandboxSession::create("x", ViewKind::Page).unwrap();
        session
            .spawn(Path::new(SH), &script("exit 3"), &Policy::default())
            .unwrap();

        let started = Instant::now();
        let state = session
            .wait_for_ready(Duration::from_secs(5), Duration::from_millis(20))
            .await;
        assert!(matches!(state, ReadinessState::Failed { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_handoff_reaches_child() {
        let mut session = SandboxSession::create("x", ViewKind::Gallery).unwrap();
        let out = session.dir().join("env");
        let body = format!(
            r#"printf '%s' "$KIDGUARD_VIEW_KIND" > "{}"; printf READY > "$KIDGUARD_READY_FILE""#,
            out.display()
        );
        session
            .spawn(Path::new(SH), &script(&body), &Policy::default())
            .unwrap();
        let state = session
            .wait_for_ready(Duration::from_secs(5), Duration::from_millis(20))
            .await;
        assert_eq!(state, ReadinessState::Ready);
        assert_eq!(std::fs::read_to_string(out).unwrap(), "gallery");
    }
}
