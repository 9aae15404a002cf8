//! Test doubles for the LLM, classifier and data providers.
//!
//! Provides:
//! - [`StubLlm`]: fixed-reply LLM with call counting
//! - [`ScriptedLlm`]: replays a scripted sequence of tool calls and answers
//! - [`StubClassifier`]: canned safety verdicts, failures, and hangs
//! - [`StubSearch`], [`StubVideo`], [`StubFetcher`]: in-memory providers
//! - [`TestContextBuilder`]: wires a [`ToolContext`] from the above
//!
//! # Usage
//!
//! ```rust,no_run
//! use kidguard::testing::{StubSearch, TestContextBuilder};
//!
//! # async fn demo() {
//! let ctx = TestContextBuilder::new(&["kids.example.org"])
//!     .search(StubSearch::new(Vec::new()))
//!     .build();
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SafetyConfig;
use crate::error::{LlmError, ProviderError};
use crate::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolCompletionResponse,
};
use crate::policy::Policy;
use crate::prompts::PromptOverrides;
use crate::providers::{
    FetchedPage, ImageHit, PageFetcher, ProviderClients, SearchHit, SearchProvider, VideoHit,
    VideoProvider,
};
use crate::safety::{ContentSafetyReviewer, SafetyClassifier};
use crate::tools::{AllowedVideo, ToolContext};

fn stub_error(provider: &str) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: "server error".to_string(),
    }
}

/// A configurable LLM provider stub.
///
/// Both `complete` and `complete_with_tools` return the fixed response and
/// never request tools.
pub struct StubLlm {
    model_name: String,
    response: String,
    finish_reason: FinishReason,
    call_count: AtomicU32,
    should_fail: bool,
}

impl StubLlm {
    /// Create a new stub that returns the given response.
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model_name: "stub-model".to_string(),
            response: response.into(),
            finish_reason: FinishReason::Stop,
            call_count: AtomicU32::new(0),
            should_fail: false,
        }
    }

    /// Replies as if the provider content filter cut the output short.
    pub fn filtered(response: impl Into<String>) -> Self {
        Self {
            finish_reason: FinishReason::ContentFilter,
            ..Self::new(response)
        }
    }

    /// Create a stub that always fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            model_name: name.into(),
            response: String::new(),
            finish_reason: FinishReason::Stop,
            call_count: AtomicU32::new(0),
            should_fail: true,
        }
    }

    /// Number of times either completion method was called.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for StubLlm {
    fn default() -> Self {
        Self::new("OK")
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail {
            return Err(stub_error(&self.model_name));
        }
        Ok(CompletionResponse {
            content: self.response.clone(),
            finish_reason: self.finish_reason,
            input_tokens: 10,
            output_tokens: 5,
        })
    }

    async fn complete_with_tools(
        &self,
        _request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.should_fail {
            return Err(stub_error(&self.model_name));
        }
        Ok(ToolCompletionResponse {
            content: Some(self.response.clone()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    /// Assistant text sent alongside tool calls.
    TextWithTools(String, Vec<ToolCall>),
    /// Text cut short by the provider content filter.
    Filtered(String),
}

/// LLM that replays scripted turns for `complete_with_tools`.
///
/// Once the script runs out it answers with an empty text turn, unless it was
/// built with [`always_tool`](Self::always_tool).
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    always_tool: Option<String>,
    should_fail: bool,
    completion: String,
    call_count: AtomicU32,
    requests: Mutex<Vec<ToolCompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            always_tool: None,
            should_fail: false,
            completion: "ALLOW".to_string(),
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A model that requests `tool` on every turn.
    pub fn always_tool(tool: impl Into<String>) -> Self {
        Self {
            always_tool: Some(tool.into()),
            ..Self::new(Vec::new())
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new(Vec::new())
        }
    }

    /// Reply used for plain `complete` calls (curators, classifiers).
    pub fn with_completion(mut self, text: impl Into<String>) -> Self {
        self.completion = text.into();
        self
    }

    /// Number of `complete_with_tools` calls.
    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The `n`th tool-completion request received.
    pub fn request(&self, n: usize) -> Option<ToolCompletionRequest> {
        self.requests.lock().ok()?.get(n).cloned()
    }

    fn next_turn(&self, call_number: u32) -> ScriptedTurn {
        if let Some(tool) = &self.always_tool {
            return ScriptedTurn::ToolCalls(vec![ToolCall {
                id: format!("call_{call_number}"),
                name: tool.clone(),
                arguments: serde_json::json!({}),
            }]);
        }
        self.turns
            .lock()
            .ok()
            .and_then(|mut turns| turns.pop_front())
            .unwrap_or_else(|| ScriptedTurn::Text(String::new()))
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        if self.should_fail {
            return Err(stub_error("scripted-model"));
        }
        Ok(CompletionResponse {
            content: self.completion.clone(),
            finish_reason: FinishReason::Stop,
            input_tokens: 10,
            output_tokens: 5,
        })
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<ToolCompletionResponse, LlmError> {
        let call_number = self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if self.should_fail {
            return Err(stub_error("scripted-model"));
        }
        Ok(match self.next_turn(call_number) {
            ScriptedTurn::Text(text) => ToolCompletionResponse {
                content: Some(text),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
                input_tokens: 10,
                output_tokens: 5,
            },
            ScriptedTurn::ToolCalls(tool_calls) => ToolCompletionResponse {
                content: None,
                tool_calls,
                finish_reason: FinishReason::ToolUse,
                input_tokens: 10,
                output_tokens: 5,
            },
            ScriptedTurn::Filtered(text) => ToolCompletionResponse {
                content: Some(text),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::ContentFilter,
                input_tokens: 10,
                output_tokens: 5,
            },
            ScriptedTurn::TextWithTools(text, tool_calls) => ToolCompletionResponse {
                content: Some(text),
                tool_calls,
                finish_reason: FinishReason::ToolUse,
                input_tokens: 10,
                output_tokens: 5,
            },
        })
    }
}

enum ClassifierBehavior {
    Reply(String),
    BlockContaining(String),
    Fail,
    Hang,
}

/// Safety classifier with canned behavior.
pub struct StubClassifier {
    behavior: ClassifierBehavior,
    call_count: AtomicU32,
}

impl StubClassifier {
    fn with(behavior: ClassifierBehavior) -> Self {
        Self {
            behavior,
            call_count: AtomicU32::new(0),
        }
    }

    /// Always reply with `verdict`.
    pub fn replying(verdict: &str) -> Self {
        Self::with(ClassifierBehavior::Reply(verdict.to_string()))
    }

    /// Reply `BLOCK` when the text contains `needle`, `ALLOW` otherwise.
    pub fn blocking_containing(needle: &str) -> Self {
        Self::with(ClassifierBehavior::BlockContaining(needle.to_lowercase()))
    }

    pub fn failing() -> Self {
        Self::with(ClassifierBehavior::Fail)
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with(ClassifierBehavior::Hang)
    }

    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SafetyClassifier for StubClassifier {
    async fn classify(&self, _instruction: &str, text: &str) -> Result<String, LlmError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        match &self.behavior {
            ClassifierBehavior::Reply(verdict) => Ok(verdict.clone()),
            ClassifierBehavior::BlockContaining(needle) => {
                let verdict = if text.to_lowercase().contains(needle) {
                    "BLOCK"
                } else {
                    "ALLOW"
                };
                Ok(verdict.to_string())
            }
            ClassifierBehavior::Fail => Err(stub_error("stub-classifier")),
            ClassifierBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("ALLOW".to_string())
            }
        }
    }
}

/// In-memory web and image search.
#[derive(Default)]
pub struct StubSearch {
    hits: Vec<SearchHit>,
    images: Vec<ImageHit>,
    unconfigured: bool,
    call_count: AtomicU32,
}

impl StubSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn with_images(mut self, images: Vec<ImageHit>) -> Self {
        self.images = images;
        self
    }

    /// Every call fails as if credentials were missing.
    pub fn unconfigured() -> Self {
        Self {
            unconfigured: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), ProviderError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.unconfigured {
            return Err(ProviderError::NotConfigured {
                provider: "stub-search".to_string(),
                hint: "no credentials".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        self.check()?;
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn search_images(
        &self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<ImageHit>, ProviderError> {
        self.check()?;
        Ok(self.images.iter().take(limit).cloned().collect())
    }
}

/// In-memory video search with per-video comments.
#[derive(Default)]
pub struct StubVideo {
    hits: Vec<VideoHit>,
    comments: HashMap<String, Vec<String>>,
}

impl StubVideo {
    pub fn new(hits: Vec<VideoHit>) -> Self {
        Self {
            hits,
            comments: HashMap::new(),
        }
    }

    pub fn with_comments(mut self, video_id: &str, comments: &[&str]) -> Self {
        self.comments.insert(
            video_id.to_string(),
            comments.iter().map(|c| c.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl VideoProvider for StubVideo {
    async fn search_videos(
        &self,
        _query: &str,
        limit: usize,
    ) -> Result<Vec<VideoHit>, ProviderError> {
        Ok(self.hits.iter().take(limit.saturating_mul(2)).cloned().collect())
    }

    async fn sample_comments(
        &self,
        video_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .comments
            .get(video_id)
            .map(|c| c.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory page fetcher. Unknown URLs return HTTP 404.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, (Option<String>, Vec<u8>)>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` as `text/html` at `url`.
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            (Some("text/html".to_string()), html.as_bytes().to_vec()),
        );
        self
    }

    pub fn with_bytes(mut self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.pages
            .insert(url.to_string(), (Some(content_type.to_string()), body));
        self
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ProviderError> {
        match self.pages.get(url) {
            Some((content_type, body)) => Ok(FetchedPage {
                url: url.to_string(),
                content_type: content_type.clone(),
                body: body.clone(),
            }),
            None => Err(ProviderError::Http {
                provider: "stub-fetcher".to_string(),
                status: 404,
            }),
        }
    }
}

/// Builder for a [`ToolContext`] backed by test doubles.
///
/// Defaults: empty providers, [`StubLlm`] replying "OK", keyword-only review.
pub struct TestContextBuilder {
    policy: Policy,
    search: Arc<dyn SearchProvider>,
    video: Arc<dyn VideoProvider>,
    fetcher: Arc<dyn PageFetcher>,
    llm: Arc<dyn LlmProvider>,
    classifier: Option<Arc<dyn SafetyClassifier>>,
    prompt_overrides: PromptOverrides,
    video_allowlist: Vec<AllowedVideo>,
}

impl TestContextBuilder {
    pub fn new(domains: &[&str]) -> Self {
        Self {
            policy: Policy::new(domains.iter().copied(), std::iter::empty::<&str>()),
            search: Arc::new(StubSearch::default()),
            video: Arc::new(StubVideo::default()),
            fetcher: Arc::new(StubFetcher::default()),
            llm: Arc::new(StubLlm::default()),
            classifier: None,
            prompt_overrides: PromptOverrides::default(),
            video_allowlist: Vec::new(),
        }
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn search(mut self, search: impl SearchProvider + 'static) -> Self {
        self.search = Arc::new(search);
        self
    }

    pub fn video(mut self, video: impl VideoProvider + 'static) -> Self {
        self.video = Arc::new(video);
        self
    }

    pub fn fetcher(mut self, fetcher: impl PageFetcher + 'static) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = llm;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn SafetyClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn prompt_overrides(mut self, overrides: PromptOverrides) -> Self {
        self.prompt_overrides = overrides;
        self
    }

    pub fn video_allowlist(mut self, videos: Vec<AllowedVideo>) -> Self {
        self.video_allowlist = videos;
        self
    }

    pub fn build(self) -> ToolContext {
        let reviewer = match self.classifier {
            Some(classifier) => ContentSafetyReviewer::new(&SafetyConfig::default(), Some(classifier)),
            None => ContentSafetyReviewer::keyword_only(),
        };
        ToolContext {
            policy: self.policy,
            model: self.llm.model_name().to_string(),
            prompt_overrides: self.prompt_overrides,
            providers: ProviderClients {
                search: self.search,
                video: self.video,
                fetcher: self.fetcher,
            },
            llm: self.llm,
            reviewer,
            video_allowlist: Arc::new(self.video_allowlist),
        }
    }
}

/// A context with the given allowlist and every other default.
pub fn test_context(domains: &[&str]) -> ToolContext {
    TestContextBuilder::new(domains).build()
}
