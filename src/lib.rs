//! kidguard: a child-safe, safety-gated LLM orchestration engine.
//!
//! Every tool call is restricted to an operator domain allowlist and screened
//! before anything reaches a child:
//!
//! ```text
//! query ─► policy ─► tool ─► provider ─► selector / reviewer ─► payload ─► sandbox
//! ```
//!
//! An empty allowlist disables every gated operation.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod policy;
pub mod prompts;
pub mod providers;
pub mod safety;
pub mod sandbox;
pub mod selector;
pub mod testing;
pub mod tools;
pub mod views;

pub use config::Config;
pub use error::{Error, Result};
