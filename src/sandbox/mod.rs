//! Render sandbox for HTML produced by tools.
//!
//! The launcher writes the payload to a scratch directory and spawns an
//! isolated process with a fixed handoff. That process only loads URLs the
//! [`RequestFilter`] permits and reports readiness through a marker file.
//!
//! ```text
//!   SandboxRenderer::display
//!        │
//!        ├─► SandboxSession::create   (temp dir, view.html)
//!        ├─► spawn backend             (KIDGUARD_* env, piped stdin)
//!        ├─► wait_for_ready            (poll marker, timeout, early exit)
//!        └─► wait for exit or signal   (kill on drop, dir removed)
//!
//!   sandbox-host
//!        ├─► ViewServer on 127.0.0.1   (rewritten payload, CSP, /fetch)
//!        ├─► write READY once
//!        └─► watch parent pid + stdin EOF
//! ```

mod detect;
mod error;
pub mod filter;
pub mod handoff;
pub mod host;
mod http;
mod launcher;
mod session;

pub use detect::{SandboxBackend, detect_backend};
pub use error::{Result, SandboxError};
pub use filter::{FilterDecision, RequestFilter};
pub use handoff::{Handoff, ViewKind};
pub use host::{HostExit, run_host};
pub use http::ViewServer;
pub use launcher::{SandboxRenderer, shutdown_signal};
pub use session::{ReadinessState, SandboxSession};
