//! `kidguard run`: the tool-calling agent.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use tokio::io::AsyncReadExt;

use crate::agent::{AgentLoop, EventLog};
use crate::cli::direct::show;
use crate::cli::engine::Engine;
use crate::cli::{EXIT_UNSAFE, require_input};
use crate::config::AgentConfig;
use crate::error::ConfigError;
use crate::prompts::SystemPrompt;
use crate::sandbox::ViewKind;
use crate::tools::load_manifest;

/// Tools whose last output `--view` can display, with the payload key.
const VIEWABLE: &[(&str, &str, ViewKind)] = &[
    ("safe_video_search", "embed_html", ViewKind::Embed),
    ("open_safe_url", "embed_html", ViewKind::Embed),
    ("safe_image_gallery", "gallery_html", ViewKind::Gallery),
];

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// System prompt file (hierarchical XML recommended)
    #[arg(short, long)]
    pub prompt: PathBuf,

    /// Agents/personas file appended to the prompt
    #[arg(short, long)]
    pub agents: Option<PathBuf>,

    /// Tool manifest (JSON or YAML); all tools when omitted
    #[arg(short, long)]
    pub tools: Option<PathBuf>,

    /// User input (read from stdin when omitted)
    #[arg(short, long)]
    pub input: Option<String>,

    /// Maximum model turns
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Write the conversation as JSONL
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Write the final answer to a file
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Display the last video or gallery result in the sandbox
    #[arg(long)]
    pub view: bool,

    /// Resolve prompt and tools, then exit without calling the model
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run_agent_command(engine: &Engine, args: RunArgs) -> anyhow::Result<ExitCode> {
    let system = SystemPrompt::load(&args.prompt, args.agents.as_deref())?;
    let requested = args.tools.as_deref().map(load_manifest).transpose()?;
    let tools = engine.registry.resolve(requested.as_deref()).await;
    let agent_config = agent_config(&engine.config.agent, args.max_steps)?;

    if args.dry_run {
        println!("Prompt: {} bytes, {} override(s)", system.text.len(), system.overrides.len());
        println!("Tools: {}", tools.names().join(", "));
        println!("Max steps: {}", agent_config.max_steps);
        return Ok(ExitCode::SUCCESS);
    }

    engine.require_llm_credentials()?;
    let input = match args.input {
        Some(input) => require_input(Some(input), "--input")?,
        None => require_input(Some(read_stdin().await?), "--input")?,
    };

    let jsonl = args.jsonl.clone().or_else(|| args.view.then(default_jsonl_path));
    let event_log = match &jsonl {
        Some(path) => EventLog::open(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?,
        None => EventLog::disabled(),
    };

    let ctx = engine.context_with_overrides(system.overrides.clone());
    let outcome = AgentLoop::new(engine.llm(), tools, ctx, &agent_config)
        .with_event_log(event_log)
        .with_temperature(engine.config.llm.temperature)
        .run(&system.text, &input)
        .await?;

    println!("{}", outcome.text());
    if let Some(out) = &args.out {
        tokio::fs::write(out, outcome.text())
            .await
            .with_context(|| format!("failed to write {}", out.display()))?;
    }

    if args.view
        && let Some(path) = &jsonl
    {
        view_last_result(engine, path).await;
    }

    if let Some(decision) = &outcome.blocked {
        eprintln!("Error: answer withheld ({})", decision.reason);
        return Ok(ExitCode::from(EXIT_UNSAFE));
    }
    Ok(ExitCode::SUCCESS)
}

fn agent_config(base: &AgentConfig, max_steps: Option<usize>) -> Result<AgentConfig, ConfigError> {
    let mut config = base.clone();
    if let Some(max_steps) = max_steps {
        if max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "--max-steps".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        config.max_steps = max_steps;
    }
    Ok(config)
}

async fn read_stdin() -> Result<String, ConfigError> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .map_err(|e| ConfigError::Io {
            path: "<stdin>".to_string(),
            reason: e.to_string(),
        })?;
    Ok(input)
}

fn default_jsonl_path() -> PathBuf {
    std::env::temp_dir().join(format!(
        "kidguard_{}.jsonl",
        chrono::Utc::now().timestamp_millis()
    ))
}

/// Replay the log and display the most relevant renderable tool output.
async fn view_last_result(engine: &Engine, log: &Path) {
    for (tool, key, kind) in VIEWABLE {
        match EventLog::last_tool_output(log, tool) {
            Ok(Some(out)) => {
                if let Some(html) = out.get(*key).and_then(|v| v.as_str()) {
                    show(engine, Some(html), *kind).await;
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %log.display(), error = %e, "Cannot replay event log");
                return;
            }
        }
    }
    eprintln!("No video or gallery result to display.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_steps_override() {
        let base = AgentConfig::default();
        assert_eq!(agent_config(&base, None).unwrap().max_steps, base.max_steps);
        assert_eq!(agent_config(&base, Some(3)).unwrap().max_steps, 3);
        assert!(matches!(
            agent_config(&base, Some(0)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_default_jsonl_in_temp_dir() {
        let path = default_jsonl_path();
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jsonl"));
    }
}
