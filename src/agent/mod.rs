//! Agent loop: model turns, tool dispatch, and the conversation log.

mod agent_loop;
mod dispatcher;
pub mod event_log;
mod truncate;

pub use agent_loop::{AgentLoop, LoopOutcome, SAFE_REFUSAL};
pub use dispatcher::execute_tool_call;
pub use event_log::{Event, EventLog};
pub use truncate::{OMITTED_MARKER, truncate_tool_result};

use serde::Serialize;
use thiserror::Error;

use crate::error::LlmError;

/// Default byte budget for a tool result fed back to the model.
pub const DEFAULT_TOOL_RESULT_BUDGET: usize = 8000;

/// Where a conversation is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on the model for turn `step`.
    Running { step: usize },
    /// The model asked for `calls` tool invocations on turn `step`.
    AwaitingTool { step: usize, calls: usize },
    /// The model answered without tools.
    Done { answer: String },
    /// The step budget ran out. Holds the last text plus a trailer.
    Exhausted { partial: String },
}

/// A tool call the loop executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    /// Position among the conversation's tool calls, from 0.
    pub ordinal: usize,
    pub name: String,
    pub args: serde_json::Value,
    pub result: serde_json::Value,
}

/// Errors that end a conversation early.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("LLM request failed after {step} step(s): {source}")]
    Llm {
        step: usize,
        #[source]
        source: LlmError,
    },
}
