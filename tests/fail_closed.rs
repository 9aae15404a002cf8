//! With an empty allowlist every gated tool refuses before touching a
//! provider or the model.

use std::sync::Arc;

use serde_json::{Value, json};

use kidguard::agent::execute_tool_call;
use kidguard::llm::ToolCall;
use kidguard::testing::{StubLlm, TestContextBuilder};
use kidguard::tools::ToolRegistry;

fn gated_calls() -> Vec<(&'static str, Value)> {
    vec![
        ("safe_search", json!({"query": "how do bees make honey"})),
        ("answer_search", json!({"query": "why does it rain"})),
        ("safe_video_search", json!({"query": "volcano for kids"})),
        ("safe_image_gallery", json!({"query": "red pandas"})),
        (
            "open_safe_url",
            json!({"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}),
        ),
        ("creative_helper", json!({"prompt": "a poem about the moon"})),
    ]
}

#[tokio::test]
async fn every_gated_tool_refuses_without_allowlist() {
    let llm = Arc::new(StubLlm::new("should never be called"));
    let ctx = TestContextBuilder::new(&[]).llm(llm.clone()).build();
    assert!(ctx.policy.is_fail_closed());

    let registry = ToolRegistry::new();
    registry.register_builtin_tools();
    let tools = registry.resolve(None).await;

    for (name, args) in gated_calls() {
        let call = ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments: args,
        };
        let out = execute_tool_call(&tools, &ctx, &call).await;
        assert_eq!(out["safe"], false, "{name} returned {out}");
        assert_eq!(
            out["reason"], "Allowlist required (provide --domains)",
            "{name} returned {out}"
        );
        assert_eq!(out["action"], "ASK_ALTERNATIVE", "{name} returned {out}");
    }

    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn allowlist_of_blank_entries_is_still_empty() {
    let ctx = TestContextBuilder::new(&["", "   "]).build();
    assert!(ctx.policy.is_fail_closed());

    let registry = ToolRegistry::new();
    registry.register_builtin_tools();
    let tools = registry.resolve(Some(&["safe_search".to_string()][..])).await;

    let call = ToolCall {
        id: "call-1".to_string(),
        name: "safe_search".to_string(),
        arguments: json!({"query": "dinosaurs"}),
    };
    let out = execute_tool_call(&tools, &ctx, &call).await;
    assert_eq!(out["safe"], false);
}
