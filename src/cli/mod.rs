//! CLI command handling.
//!
//! Provides subcommands for:
//! - Cited-answer search (`search`)
//! - Curated video and image lookups (`video`, `gallery`)
//! - Opening a single allowlisted link (`open`)
//! - Running the tool-calling agent (`run`)
//! - The hidden native sandbox host (`sandbox-host`)
//!
//! Exit codes: 0 on success, 1 when the request was rejected as unsafe, 2 for
//! configuration problems (missing allowlist, input or credentials).

mod direct;
mod engine;
mod run;

pub use direct::{run_gallery_command, run_open_command, run_search_command, run_video_command};
pub use engine::{Engine, EngineOptions};
pub use run::{RunArgs, run_agent_command};

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ColorChoice, Parser, Subcommand};

use crate::config::Config;
use crate::error::ConfigError;
use crate::providers::HttpPageFetcher;
use crate::sandbox::{Handoff, run_host};

/// Exit code for a request rejected by a safety gate.
pub const EXIT_UNSAFE: u8 = 1;
/// Exit code for configuration problems.
pub const EXIT_CONFIG: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "kidguard")]
#[command(about = "Child-safe assistant with a fail-closed domain allowlist")]
#[command(
    long_about = "kidguard answers children's questions using only allowlisted sources.\nExamples:\n  kidguard --domains domains.json search --input \"why does it rain\"\n  kidguard --domains domains.json video --input \"water cycle\" --view\n  kidguard --domains domains.json run --prompt prompt.xml --tools tools.json --input \"tell me about owls\""
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Allowed domains file ({"domains": [...]} or a JSON array)
    #[arg(long, global = true)]
    pub domains: Option<PathBuf>,

    /// Extra banned terms file
    #[arg(long, global = true)]
    pub banned: Option<PathBuf>,

    /// Model for the agent, curator and writer prompts
    #[arg(short, long, global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Cited answer from allowlisted web pages
    Search {
        /// The question
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Find one safe, allowlisted video
    Video {
        /// What to look for
        #[arg(short, long)]
        input: Option<String>,

        /// Show the video in the sandbox
        #[arg(long)]
        view: bool,
    },

    /// Build a gallery of allowlisted images
    Gallery {
        /// What to look for
        #[arg(short, long)]
        input: Option<String>,

        /// Show the gallery in the sandbox
        #[arg(long)]
        view: bool,
    },

    /// Open one allowlisted YouTube link
    Open {
        #[arg(long)]
        url: String,

        /// Title shown with the embed
        #[arg(long)]
        title: Option<String>,

        /// Show the embed in the sandbox
        #[arg(long)]
        view: bool,
    },

    /// Run the tool-calling agent
    Run(RunArgs),

    /// Native sandbox process (spawned by the renderer)
    #[command(hide = true)]
    SandboxHost,
}

/// Dispatch a parsed command.
pub async fn run_command(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let Cli {
        command,
        domains,
        banned,
        model,
    } = cli;

    if let Command::SandboxHost = command {
        return run_sandbox_host(&config).await;
    }

    let engine = Engine::build(
        config,
        EngineOptions {
            domains,
            banned,
            model,
        },
    )?;
    match command {
        Command::Search { input } => run_search_command(&engine, input).await,
        Command::Video { input, view } => run_video_command(&engine, input, view).await,
        Command::Gallery { input, view } => run_gallery_command(&engine, input, view).await,
        Command::Open { url, title, view } => run_open_command(&engine, url, title, view).await,
        Command::Run(args) => run_agent_command(&engine, args).await,
        Command::SandboxHost => run_sandbox_host(&engine.config).await,
    }
}

async fn run_sandbox_host(config: &Config) -> anyhow::Result<ExitCode> {
    let handoff = Handoff::from_env()?;
    let fetcher = Arc::new(HttpPageFetcher::new(&config.search)?);
    run_host(handoff, &config.sandbox, fetcher).await?;
    Ok(ExitCode::SUCCESS)
}

/// Map a failed command to its exit code.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_CONFIG
    } else {
        1
    }
}

/// Required text input, trimmed.
pub(crate) fn require_input(input: Option<String>, flag: &str) -> Result<String, ConfigError> {
    input
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingRequired {
            key: flag.to_string(),
            hint: format!("Pass {flag} \"<text>\"."),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kidguard",
            "video",
            "--input",
            "owls",
            "--domains",
            "d.json",
            "--view",
        ])
        .unwrap();
        assert_eq!(cli.domains, Some(PathBuf::from("d.json")));
        assert!(matches!(cli.command, Command::Video { view: true, .. }));
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "kidguard",
            "run",
            "--prompt",
            "p.xml",
            "--max-steps",
            "3",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.prompt, PathBuf::from("p.xml"));
                assert_eq!(args.max_steps, Some(3));
                assert!(args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_require_input() {
        assert_eq!(require_input(Some(" owls ".into()), "--input").unwrap(), "owls");
        assert!(matches!(
            require_input(Some("  ".into()), "--input"),
            Err(ConfigError::MissingRequired { .. })
        ));
        assert!(require_input(None, "--input").is_err());
    }

    #[test]
    fn test_config_errors_exit_two() {
        let err = anyhow::Error::from(ConfigError::MissingAllowlist);
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);
        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&other), 1);
    }
}
