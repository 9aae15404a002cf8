//! Safety-gated tool system.
//!
//! Tools are the agent's only interface to the outside world. Each one:
//! - Refuses to run while the domain allowlist is empty
//! - Screens its query before contacting a provider
//! - Returns a `{safe, reason, action}` envelope instead of failing on rejection

pub mod builtin;
pub mod manifest;
pub mod redaction;

mod outcome;
mod registry;
mod tool;

pub use builtin::{AllowedVideo, load_video_allowlist};
pub use manifest::{canonical_tool_name, load_manifest, parse_manifest};
pub use outcome::{SafetyAction, ToolOutcome};
pub use registry::{ResolvedTools, ToolRegistry};
pub use tool::{
    Tool, ToolContext, ToolError, ToolOutput, ToolSchema, require_str, validate_arguments,
    validate_tool_schema,
};
