//! Commands that call one built-in tool directly, without the agent loop.

use std::process::ExitCode;

use serde_json::{Value, json};

use crate::agent::execute_tool_call;
use crate::cli::engine::Engine;
use crate::cli::{EXIT_UNSAFE, require_input};
use crate::llm::ToolCall;
use crate::sandbox::ViewKind;

/// Run one tool with `args` and return its JSON result.
async fn invoke(engine: &Engine, tool: &str, args: Value) -> Value {
    let tools = engine.registry.resolve(Some(&[tool.to_string()][..])).await;
    let call = ToolCall {
        id: format!("cli-{tool}"),
        name: tool.to_string(),
        arguments: args,
    };
    execute_tool_call(&tools, &engine.ctx, &call).await
}

/// The rejection reason, when the result is not an approved payload.
pub(crate) fn rejection_reason(result: &Value) -> Option<String> {
    if result.get("safe").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    let reason = result
        .get("reason")
        .or_else(|| result.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    Some(reason.to_string())
}

fn reject(reason: &str) -> ExitCode {
    eprintln!("Error: {reason}");
    ExitCode::from(EXIT_UNSAFE)
}

/// Hand `html` to the sandbox. A failed display is reported but does not
/// change the exit code.
pub(crate) async fn show(engine: &Engine, html: Option<&str>, kind: ViewKind) {
    let Some(html) = html.filter(|h| !h.trim().is_empty()) else {
        eprintln!("Nothing to display.");
        return;
    };
    if !engine.renderer.display(html, kind, &engine.ctx.policy).await {
        eprintln!("The sandbox could not display the {kind} view.");
    }
}

pub async fn run_search_command(engine: &Engine, input: Option<String>) -> anyhow::Result<ExitCode> {
    let query = require_input(input, "--input")?;
    engine.require_search_credentials()?;
    engine.require_llm_credentials()?;

    let result = invoke(engine, "answer_search", json!({ "query": query })).await;
    if let Some(reason) = rejection_reason(&result) {
        return Ok(reject(&reason));
    }

    if let Some(answer) = result.get("answer").and_then(Value::as_str) {
        println!("{}", answer.trim());
    }
    let sources = result
        .get("sources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if !sources.is_empty() {
        println!("\nSources:");
        for source in &sources {
            println!(
                "[{}] {} - {}",
                source.get("index").and_then(Value::as_u64).unwrap_or_default(),
                source.get("title").and_then(Value::as_str).unwrap_or_default(),
                source.get("domain").and_then(Value::as_str).unwrap_or_default(),
            );
            println!(
                "    {}",
                source.get("url").and_then(Value::as_str).unwrap_or_default()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn run_video_command(
    engine: &Engine,
    input: Option<String>,
    view: bool,
) -> anyhow::Result<ExitCode> {
    let query = require_input(input, "--input")?;

    let result = invoke(engine, "safe_video_search", json!({ "query": query })).await;
    if let Some(reason) = rejection_reason(&result) {
        return Ok(reject(&reason));
    }

    let video = result.get("video").cloned().unwrap_or_default();
    println!(
        "Video: {}",
        video.get("title").and_then(Value::as_str).unwrap_or_default()
    );
    println!("{}", video.get("url").and_then(Value::as_str).unwrap_or_default());

    if view {
        show(
            engine,
            result.get("embed_html").and_then(Value::as_str),
            ViewKind::Embed,
        )
        .await;
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn run_gallery_command(
    engine: &Engine,
    input: Option<String>,
    view: bool,
) -> anyhow::Result<ExitCode> {
    let query = require_input(input, "--input")?;
    engine.require_search_credentials()?;

    let result = invoke(engine, "safe_image_gallery", json!({ "query": query })).await;
    if let Some(reason) = rejection_reason(&result) {
        return Ok(reject(&reason));
    }

    println!("Gallery images:");
    for image in result
        .get("images")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        println!(
            "- {} ({})",
            image.get("title").and_then(Value::as_str).unwrap_or_default(),
            image.get("domain").and_then(Value::as_str).unwrap_or_default(),
        );
    }

    if view {
        show(
            engine,
            result.get("gallery_html").and_then(Value::as_str),
            ViewKind::Gallery,
        )
        .await;
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn run_open_command(
    engine: &Engine,
    url: String,
    title: Option<String>,
    view: bool,
) -> anyhow::Result<ExitCode> {
    let mut args = json!({ "url": url });
    if let Some(title) = title {
        args["title"] = Value::String(title);
    }

    let result = invoke(engine, "open_safe_url", args).await;
    if let Some(reason) = rejection_reason(&result) {
        return Ok(reject(&reason));
    }

    println!(
        "Video id: {}",
        result.get("video_id").and_then(Value::as_str).unwrap_or_default()
    );
    if view {
        show(
            engine,
            result.get("embed_html").and_then(Value::as_str),
            ViewKind::Embed,
        )
        .await;
    }
    Ok(ExitCode::SUCCESS)
}
