//! The renderer tools hand their HTML to.

use std::future::Future;

use crate::config::SandboxConfig;
use crate::policy::Policy;
use crate::sandbox::detect::{SandboxBackend, detect_backend};
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::handoff::ViewKind;
use crate::sandbox::session::{ReadinessState, SandboxSession};

/// Displays payloads in an isolated process.
///
/// `display` never errors: any failure is logged and reported as `false`.
#[derive(Debug, Clone)]
pub struct SandboxRenderer {
    backend: SandboxBackend,
    config: SandboxConfig,
}

impl SandboxRenderer {
    pub fn new(backend: SandboxBackend, config: SandboxConfig) -> Self {
        Self { backend, config }
    }

    /// Detect the backend once and keep it.
    pub fn detect(config: SandboxConfig) -> Self {
        let backend = detect_backend(&config);
        tracing::debug!(backend = backend.as_str(), "Sandbox backend selected");
        Self::new(backend, config)
    }

    pub fn backend(&self) -> &SandboxBackend {
        &self.backend
    }

    /// Show `payload` until the sandbox exits or this process is asked to shut
    /// down. Returns `true` when the view became ready and closed cleanly.
    pub async fn display(&self, payload: &str, kind: ViewKind, policy: &Policy) -> bool {
        self.display_until(payload, kind, policy, shutdown_signal())
            .await
    }

    /// Like [`display`](Self::display), with an explicit shutdown future.
    pub async fn display_until<F>(
        &self,
        payload: &str,
        kind: ViewKind,
        policy: &Policy,
        shutdown: F,
    ) -> bool
    where
        F: Future<Output = ()>,
    {
        match self.run_session(payload, kind, policy, shutdown).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(backend = self.backend.as_str(), error = %e, "Sandbox display failed");
                false
            }
        }
    }

    async fn run_session<F>(
        &self,
        payload: &str,
        kind: ViewKind,
        policy: &Policy,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (program, args) = match &self.backend {
            SandboxBackend::Unavailable { reason } => {
                return Err(SandboxError::Unavailable {
                    reason: reason.clone(),
                });
            }
            backend => backend.command().ok_or_else(|| SandboxError::Unavailable {
                reason: "no command for backend".to_string(),
            })?,
        };

        let mut session = SandboxSession::create(payload, kind)?;
        session.spawn(program, &args, policy)?;

        match session
            .wait_for_ready(self.config.ready_timeout, self.config.ready_poll_interval)
            .await
        {
            ReadinessState::Ready => {}
            ReadinessState::Failed { reason } => {
                return Err(SandboxError::ChildExited { status: reason });
            }
            ReadinessState::TimedOut | ReadinessState::Pending => {
                return Err(SandboxError::ReadinessTimeout {
                    timeout: self.config.ready_timeout,
                });
            }
        }
        tracing::info!(session = %session.id(), %kind, "Sandbox view ready");

        let exited = tokio::select! {
            status = session.wait_for_exit() => Some(status),
            _ = shutdown => None,
        };

        match exited {
            Some(status) => {
                let status = status?;
                if !status.success() {
                    return Err(SandboxError::ChildExited {
                        status: status.to_string(),
                    });
                }
                tracing::debug!(session = %session.id(), "Sandbox closed");
            }
            None => {
                tracing::info!(session = %session.id(), "Shutdown requested, closing sandbox");
                session.terminate().await;
            }
        }
        Ok(())
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::debug!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Cannot listen for SIGTERM");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
