//! Launcher readiness against throwaway shell viewers.
#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use kidguard::config::SandboxConfig;
use kidguard::policy::Policy;
use kidguard::sandbox::{SandboxBackend, SandboxRenderer, ViewKind};

fn renderer(script: &str) -> SandboxRenderer {
    let config = SandboxConfig {
        ready_timeout: Duration::from_millis(200),
        ready_poll_interval: Duration::from_millis(50),
        ..SandboxConfig::default()
    };
    let backend = SandboxBackend::External {
        program: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string(), script.to_string()],
    };
    SandboxRenderer::new(backend, config)
}

fn policy() -> Policy {
    Policy::new(["kids.example"], std::iter::empty::<&str>())
}

#[tokio::test]
async fn viewer_that_never_signals_ready_times_out() {
    let renderer = renderer("sleep 5");
    let started = Instant::now();
    let shown = renderer
        .display_until("<p>hi</p>", ViewKind::Page, &policy(), std::future::pending::<()>())
        .await;
    assert!(!shown);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "gave up early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "kill was slow: {elapsed:?}");
}

#[tokio::test]
async fn viewer_that_signals_ready_and_exits_cleanly_succeeds() {
    let renderer = renderer(r#"printf READY > "$KIDGUARD_READY_FILE"; exit 0"#);
    let shown = renderer
        .display_until("<p>hi</p>", ViewKind::Embed, &policy(), std::future::pending::<()>())
        .await;
    assert!(shown);
}

#[tokio::test]
async fn viewer_that_exits_without_ready_fails() {
    let renderer = renderer("exit 3");
    let shown = renderer
        .display_until("<p>hi</p>", ViewKind::Gallery, &policy(), std::future::pending::<()>())
        .await;
    assert!(!shown);
}

#[tokio::test]
async fn unavailable_backend_never_displays() {
    let renderer = SandboxRenderer::new(
        SandboxBackend::Unavailable {
            reason: "no viewer".to_string(),
        },
        SandboxConfig::default(),
    );
    let shown = renderer
        .display_until("<p>hi</p>", ViewKind::Page, &policy(), std::future::pending::<()>())
        .await;
    assert!(!shown);
}
