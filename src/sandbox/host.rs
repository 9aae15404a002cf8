//! Native sandbox host, run as the hidden `sandbox-host` subcommand.
//!
//! Serves the handed-off payload on a loopback port, optionally opens the
//! system browser on it, writes the readiness marker once, and exits when the
//! launcher disappears. The served page polls the host and blanks itself once
//! the host is gone.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::SandboxConfig;
use crate::providers::PageFetcher;
use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::filter::RequestFilter;
use crate::sandbox::handoff::{self, Handoff};
use crate::sandbox::http::ViewServer;
use crate::sandbox::launcher::shutdown_signal;

/// Why the host stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostExit {
    ParentGone,
    StdinClosed,
    Signal,
}

impl HostExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostExit::ParentGone => "parent gone",
            HostExit::StdinClosed => "stdin closed",
            HostExit::Signal => "signal",
        }
    }
}

/// Host a single view described by `handoff`.
pub async fn run_host(
    handoff: Handoff,
    config: &SandboxConfig,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<HostExit> {
    let payload = tokio::fs::read_to_string(&handoff.view_file)
        .await
        .map_err(|e| SandboxError::io(&handoff.view_file, e))?;

    let server = ViewServer::new(
        &payload,
        RequestFilter::new(handoff.policy.clone()),
        fetcher,
        config.liveness_interval,
    );
    let addr = server.start(0).await?;
    let url = format!("http://{addr}/");
    tracing::info!(%url, kind = %handoff.kind, "Sandbox host serving view");

    if config.open_browser {
        let target = url.clone();
        match tokio::task::spawn_blocking(move || open::that(target)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Could not open browser"),
            Err(e) => tracing::warn!(error = %e, "Browser launch task failed"),
        }
    }

    handoff::write_ready_marker(&handoff.ready_file)?;

    let exit = watch_parent(
        handoff.parent_pid,
        config.liveness_interval,
        tokio::io::stdin(),
    )
    .await;
    tracing::info!(
        reason = exit.as_str(),
        requests = server.request_count(),
        "Sandbox host exiting"
    );

    server.stop().await;
    Ok(exit)
}

/// Block until the parent dies, `stdin` reaches EOF, or a shutdown signal
/// arrives. The parent is checked every `interval`.
pub async fn watch_parent<R>(parent_pid: u32, interval: Duration, mut stdin: R) -> HostExit
where
    R: AsyncRead + Unpin,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut buf = [0u8; 256];
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !parent_alive(parent_pid) {
                    return HostExit::ParentGone;
                }
            }
            read = stdin.read(&mut buf), if stdin_open => {
                match read {
                    Ok(0) => return HostExit::StdinClosed,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "stdin unreadable, relying on pid checks");
                        stdin_open = false;
                    }
                }
            }
            _ = &mut shutdown => return HostExit::Signal,
        }
    }
}

/// Whether `pid` still names a live process.
#[cfg(unix)]
pub fn parent_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn parent_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use crate::sandbox::handoff::ViewKind;
    use crate::testing::StubFetcher;

    #[test]
    fn test_own_pid_is_alive() {
        assert!(parent_alive(std::process::id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_bogus_pids_are_dead() {
        assert!(!parent_alive(0));
        assert!(!parent_alive(u32::MAX));
        assert!(!parent_alive(2_147_483_000));
    }

    #[tokio::test]
    async fn test_stdin_eof_ends_watch() {
        let exit = watch_parent(
            std::process::id(),
            Duration::from_millis(50),
            tokio::io::empty(),
        )
        .await;
        assert_eq!(exit, HostExit::StdinClosed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dead_parent_ends_watch() {
        let (_keep, reader) = tokio::io::duplex(16);
        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            watch_parent(2_147_483_000, Duration::from_millis(20), reader),
        )
        .await
        .unwrap();
        assert_eq!(exit, HostExit::ParentGone);
    }

    #[tokio::test]
    async fn test_missing_view_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let handoff = Handoff {
            view_file: dir.path().join("missing.html"),
            policy: Policy::default(),
            ready_file: dir.path().join("ready"),
            parent_pid: std::process::id(),
            kind: ViewKind::Page,
        };
        let config = SandboxConfig {
            open_browser: false,
            ..Default::default()
        };
        let result = run_host(handoff, &config, Arc::new(StubFetcher::new())).await;
        assert!(matches!(result, Err(SandboxError::Io { .. })));
        assert!(!dir.path().join("ready").exists());
    }
}
