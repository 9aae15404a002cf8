//! The bounded tool-calling conversation loop.

use std::sync::Arc;

use crate::agent::dispatcher::{execute_tool_call, normalize_arguments};
use crate::agent::event_log::{Event, EventLog};
use crate::agent::truncate::truncate_tool_result;
use crate::agent::{LoopError, LoopState, ToolCallRecord};
use crate::config::AgentConfig;
use crate::llm::provider::sanitize_tool_messages;
use crate::llm::{ChatMessage, FinishReason, LlmProvider, ToolCompletionRequest};
use crate::safety::{ArtifactKind, SafetyDecision};
use crate::tools::{ResolvedTools, ToolContext};

/// Shown instead of a final answer that failed review.
pub const SAFE_REFUSAL: &str =
    "I can't help with that one. Let's find something fun and safe to explore instead!";

/// Result of a finished conversation.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// `Done` or `Exhausted`.
    pub state: LoopState,
    /// Model turns taken.
    pub steps: usize,
    /// Tool calls executed, in order.
    pub tool_calls: Vec<ToolCallRecord>,
    /// Review verdict when the final answer was replaced.
    pub blocked: Option<SafetyDecision>,
}

impl LoopOutcome {
    /// The text to show the child.
    pub fn text(&self) -> &str {
        match &self.state {
            LoopState::Done { answer } => answer,
            LoopState::Exhausted { partial } => partial,
            _ => "",
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, LoopState::Exhausted { .. })
    }
}

/// A single conversation driver.
///
/// Tool calls run sequentially in request order; at most one is in flight.
pub struct AgentLoop {
    llm: Arc<dyn LlmProvider>,
    tools: ResolvedTools,
    ctx: ToolContext,
    max_steps: usize,
    tool_result_budget: usize,
    temperature: f32,
    event_log: EventLog,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: ResolvedTools,
        ctx: ToolContext,
        config: &AgentConfig,
    ) -> Self {
        Self {
            llm,
            tools,
            ctx,
            max_steps: config.max_steps.max(1),
            tool_result_budget: config.tool_result_budget,
            temperature: 0.2,
            event_log: EventLog::disabled(),
        }
    }

    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Run the conversation to completion or until the step budget is spent.
    pub async fn run(&self, system_prompt: &str, input: &str) -> Result<LoopOutcome, LoopError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(input));

        self.event_log.record(Event::Start {
            model: self.llm.model_name().to_string(),
            tools: self.tools.names(),
        });
        let specs = self.tools.specs();

        let mut step = 0;
        let mut records = Vec::new();
        let mut last_text: Option<String> = None;

        loop {
            if step >= self.max_steps {
                tracing::info!(steps = step, "Step budget exhausted");
                self.event_log.record(Event::End { steps: step });
                let (mut partial, blocked) = match last_text {
                    Some(text) => self.review_answer(text).await,
                    None => (String::new(), None),
                };
                partial.push_str(&format!("\n\n[Stopped after {step} steps.]"));
                return Ok(LoopOutcome {
                    state: LoopState::Exhausted { partial },
                    steps: step,
                    tool_calls: records,
                    blocked,
                });
            }

            tracing::debug!(state = ?LoopState::Running { step }, "Requesting completion");
            sanitize_tool_messages(&mut messages);
            let mut request = ToolCompletionRequest::new(messages.clone(), specs.clone())
                .with_temperature(self.temperature);
            if !specs.is_empty() {
                request = request.with_tool_choice("auto");
            }

            let response = match self.llm.complete_with_tools(request).await {
                Ok(response) => response,
                Err(source) => {
                    tracing::warn!(step, error = %source, "LLM request failed");
                    self.event_log.record(Event::End { steps: step });
                    return Err(LoopError::Llm { step, source });
                }
            };
            step += 1;
            tracing::debug!(
                step,
                input_tokens = response.input_tokens,
                output_tokens = response.output_tokens,
                finish_reason = ?response.finish_reason,
                "Model turn"
            );

            self.event_log.record(Event::Assistant {
                msg: serde_json::json!({
                    "content": response.content,
                    "tool_calls": response.tool_calls,
                }),
            });
            if let Some(text) = response.content.as_ref().filter(|t| !t.trim().is_empty()) {
                last_text = Some(text.clone());
            }

            if response.tool_calls.is_empty() {
                let answer = response.content.unwrap_or_default();
                let (answer, blocked) = match response.finish_reason {
                    FinishReason::ContentFilter => {
                        tracing::info!(step, "Final answer withheld by the provider content filter");
                        (SAFE_REFUSAL.to_string(), Some(SafetyDecision::content_filtered()))
                    }
                    FinishReason::Length => {
                        tracing::warn!(step, "Final answer hit the model's length limit");
                        self.review_answer(answer).await
                    }
                    _ => self.review_answer(answer).await,
                };
                self.event_log.record(Event::End { steps: step });
                return Ok(LoopOutcome {
                    state: LoopState::Done { answer },
                    steps: step,
                    tool_calls: records,
                    blocked,
                });
            }

            tracing::debug!(
                state = ?LoopState::AwaitingTool { step, calls: response.tool_calls.len() },
                "Dispatching tool calls"
            );
            messages.push(ChatMessage::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                let out = execute_tool_call(&self.tools, &self.ctx, call).await;
                let args = normalize_arguments(&call.arguments);
                self.event_log.record(Event::Tool {
                    name: call.name.clone(),
                    args: args.clone(),
                    out: out.clone(),
                });

                let serialized =
                    serde_json::to_string_pretty(&out).unwrap_or_else(|_| out.to_string());
                let content = truncate_tool_result(&serialized, self.tool_result_budget);
                messages.push(ChatMessage::tool_result(&call.id, &call.name, content));
                records.push(ToolCallRecord {
                    ordinal: records.len(),
                    name: call.name.clone(),
                    args,
                    result: out,
                });
            }
        }
    }

    async fn review_answer(&self, answer: String) -> (String, Option<SafetyDecision>) {
        let decision = self
            .ctx
            .reviewer
            .review(&answer, ArtifactKind::GeneratedAnswer, Some(&self.ctx.policy))
            .await;
        if decision.is_allowed() {
            (answer, None)
        } else {
            tracing::info!(reason = %decision.reason, "Final answer replaced with refusal");
            (SAFE_REFUSAL.to_string(), Some(decision))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm::ToolCall;
    use crate::testing::{ScriptedLlm, ScriptedTurn, test_context};
    use crate::tools::ToolRegistry;

    async fn all_tools() -> ResolvedTools {
        let registry = ToolRegistry::new();
        registry.register_builtin_tools();
        registry.resolve(None).await
    }

    fn config(max_steps: usize) -> AgentConfig {
        AgentConfig {
            max_steps,
            ..Default::default()
        }
    }

    fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({"query": "rain"}),
        }
    }

    #[tokio::test]
    async fn test_exhausts_with_trailer() {
        let llm = Arc::new(ScriptedLlm::always_tool("launch_rockets"));
        let agent = AgentLoop::new(llm.clone(), all_tools().await, test_context(&["example.org"]), &config(2));

        let outcome = agent.run("Be kind.", "hi").await.unwrap();
        assert!(outcome.is_exhausted());
        assert!(outcome.text().ends_with("\n\n[Stopped after 2 steps.]"));
        assert_eq!(outcome.steps, 2);
        assert_eq!(llm.calls(), 2);
        assert_eq!(outcome.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_unsafe_partial_answer_is_replaced_on_exhaustion() {
        let turn = ScriptedTurn::TextWithTools(
            "Here is how to use a gun and drugs.".to_string(),
            vec![tool_call("c1", "launch_rockets")],
        );
        let llm = Arc::new(ScriptedLlm::new(vec![turn.clone(), turn]));
        let agent = AgentLoop::new(llm, all_tools().await, test_context(&["example.org"]), &config(2));

        let outcome = agent.run("", "hi").await.unwrap();
        assert!(outcome.is_exhausted());
        assert_eq!(
            outcome.text(),
            format!("{SAFE_REFUSAL}\n\n[Stopped after 2 steps.]")
        );
        assert!(!outcome.text().contains("gun"));
        assert!(outcome.blocked.is_some());
    }

    #[tokio::test]
    async fn test_content_filtered_answer_is_replaced() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedTurn::Filtered(
            "Rain comes from".to_string(),
        )]));
        let agent = AgentLoop::new(llm, all_tools().await, test_context(&["example.org"]), &config(3));

        let outcome = agent.run("", "why does it rain").await.unwrap();
        assert_eq!(outcome.text(), SAFE_REFUSAL);
        let blocked = outcome.blocked.unwrap();
        assert!(!blocked.is_allowed());
        assert!(blocked.reason.contains("content filter"));
    }

    #[tokio::test]
    async fn test_unknown_tool_result_is_fed_back() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedTurn::ToolCalls(vec![tool_call("c1", "launch_rockets")]),
            ScriptedTurn::Text("Rain comes from clouds.".to_string()),
        ]));
        let agent = AgentLoop::new(llm.clone(), all_tools().await, test_context(&["example.org"]), &config(5));

        let outcome = agent.run("", "why does it rain").await.unwrap();
        assert_eq!(outcome.text(), "Rain comes from clouds.");
        assert_eq!(
            outcome.tool_calls[0].result,
            serde_json::json!({"error": "Tool launch_rockets not implemented."})
        );

        let second = llm.request(1).unwrap();
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert!(tool_msg.content.contains("not implemented"));
    }

    #[tokio::test]
    async fn test_unsafe_final_answer_is_replaced() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedTurn::Text(
            "You could use a gun.".to_string(),
        )]));
        let agent = AgentLoop::new(llm, all_tools().await, test_context(&["example.org"]), &config(3));

        let outcome = agent.run("", "hi").await.unwrap();
        assert_eq!(outcome.text(), SAFE_REFUSAL);
        assert!(outcome.blocked.is_some());
    }

    #[tokio::test]
    async fn test_llm_failure_still_writes_end_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let agent = AgentLoop::new(
            Arc::new(ScriptedLlm::failing()),
            all_tools().await,
            test_context(&["example.org"]),
            &config(3),
        )
        .with_event_log(EventLog::open(&path).unwrap());

        let err = agent.run("", "hi").await.unwrap_err();
        assert!(matches!(err, LoopError::Llm { step: 0, .. }));

        let log = std::fs::read_to_string(&path).unwrap();
        let types: Vec<String> = log
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].to_string())
            .collect();
        assert_eq!(types, vec!["\"start\"", "\"end\""]);
    }

    #[tokio::test]
    async fn test_event_log_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedTurn::ToolCalls(vec![tool_call("c1", "safe_search")]),
            ScriptedTurn::Text("Done.".to_string()),
        ]));
        let agent = AgentLoop::new(llm, all_tools().await, test_context(&[]), &config(4))
            .with_event_log(EventLog::open(&path).unwrap());

        agent.run("", "rain").await.unwrap();

        let out = EventLog::last_tool_output(&path, "safe_search").unwrap().unwrap();
        assert_eq!(out["safe"], false);
        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(lines.lines().count(), 5);
    }
}
