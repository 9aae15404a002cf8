//! Content-safety review.
//!
//! Every outbound query, candidate, and generated answer passes through
//! [`ContentSafetyReviewer::review`] before it can reach a child:
//!
//! ```text
//!   artifact ──► keyword stage (policy::screen_text)
//!                   │ match ──────────────────────────────► Block (Keyword)
//!                   ▼
//!                classifier configured?
//!                   │ no ─────────────────────────────────► Allow (Keyword)
//!                   ▼
//!                classifier stage ──► "block" in reply ───► Block (Classifier)
//!                   │                  otherwise ─────────► Allow (Classifier)
//!                   └─ error/timeout ─► failure policy ───► Block | Allow
//! ```

mod classifier;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use self::classifier::{LlmSafetyClassifier, SafetyClassifier};

use crate::config::SafetyConfig;
use crate::policy::{Policy, screen_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Block,
}

/// Which stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    Keyword,
    Classifier,
}

/// Verdict on a single artifact. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyDecision {
    pub outcome: Outcome,
    pub reason: String,
    pub source: DecisionSource,
}

impl SafetyDecision {
    fn allow(reason: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            outcome: Outcome::Allow,
            reason: reason.into(),
            source,
        }
    }

    fn block(reason: impl Into<String>, source: DecisionSource) -> Self {
        Self {
            outcome: Outcome::Block,
            reason: reason.into(),
            source,
        }
    }

    /// The model provider stopped the output with its own content filter.
    pub(crate) fn content_filtered() -> Self {
        Self::block("stopped by the provider content filter", DecisionSource::Classifier)
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Outcome::Allow
    }
}

/// What is being reviewed. Drives the classifier instruction and the
/// behavior when the classifier is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A child's query before it leaves the process.
    Query,
    /// Metadata of a video, image, or page about to be surfaced.
    Candidate,
    /// Text written by the model for the child.
    GeneratedAnswer,
    /// Third-party data passed through untouched, such as sampled comments.
    ResurfacedData,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Candidate => "candidate",
            Self::GeneratedAnswer => "generated_answer",
            Self::ResurfacedData => "resurfaced_data",
        }
    }

    /// Whether the artifact reaches the child directly or was authored for them.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::ResurfacedData)
    }

    fn default_instruction(&self) -> &'static str {
        match self {
            Self::Query => {
                "You screen questions asked by children aged 4 to 15. Reply BLOCK if the question seeks violent, sexual, hateful, drug-related, self-harm, gambling, or otherwise age-inappropriate content. Otherwise reply ALLOW. Reply with one word."
            }
            Self::Candidate => {
                "You review search results and videos proposed for children aged 4 to 15. Reply BLOCK if the title, channel, description, or comments suggest scary, violent, sexual, hateful, or otherwise age-inappropriate content. Otherwise reply ALLOW. Reply with one word."
            }
            Self::GeneratedAnswer => {
                "You review answers written for children aged 4 to 15. Reply BLOCK if the answer contains age-inappropriate, frightening, or unsafe content or instructions. Otherwise reply ALLOW. Reply with one word."
            }
            Self::ResurfacedData => {
                "You moderate user comments shown next to children's content. Reply BLOCK if any comment is hostile, sexual, scary, or inappropriate for children. Otherwise reply ALLOW. Reply with one word."
            }
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior for user-facing artifacts when the classifier errors or times out.
///
/// [`ArtifactKind::ResurfacedData`] always fails open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierFailurePolicy {
    #[default]
    FailClosed,
    FailOpen,
}

impl FromStr for ClassifierFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" | "fail_closed" | "fail-closed" => Ok(Self::FailClosed),
            "open" | "fail_open" | "fail-open" => Ok(Self::FailOpen),
            other => Err(format!("must be 'closed' or 'open', got '{other}'")),
        }
    }
}

/// Map a free-form classifier reply onto an outcome.
///
/// Anything mentioning "block" (or a `REJECT_UNSAFE_*` marker from an operator
/// prompt) blocks. Everything else, including an empty reply, allows.
pub fn normalize_verdict(reply: &str) -> Outcome {
    let lowered = reply.to_ascii_lowercase();
    if lowered.contains("block") || lowered.contains("reject_unsafe") {
        Outcome::Block
    } else {
        Outcome::Allow
    }
}

/// Two-stage reviewer: deterministic term screen, then an optional classifier.
#[derive(Clone)]
pub struct ContentSafetyReviewer {
    classifier: Option<Arc<dyn SafetyClassifier>>,
    timeout: Duration,
    failure_policy: ClassifierFailurePolicy,
}

impl fmt::Debug for ContentSafetyReviewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSafetyReviewer")
            .field("classifier", &self.classifier.is_some())
            .field("timeout", &self.timeout)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

impl ContentSafetyReviewer {
    pub fn new(config: &SafetyConfig, classifier: Option<Arc<dyn SafetyClassifier>>) -> Self {
        let classifier = if config.classifier_enabled {
            classifier
        } else {
            None
        };
        Self {
            classifier,
            timeout: config.classifier_timeout,
            failure_policy: config.failure_policy,
        }
    }

    /// Reviewer with only the keyword stage.
    pub fn keyword_only() -> Self {
        Self {
            classifier: None,
            timeout: SafetyConfig::default().classifier_timeout,
            failure_policy: ClassifierFailurePolicy::default(),
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    /// Review an artifact with the default instruction for its kind.
    pub async fn review(
        &self,
        text: &str,
        kind: ArtifactKind,
        policy: Option<&Policy>,
    ) -> SafetyDecision {
        self.review_with_instruction(text, kind, policy, None).await
    }

    /// Review an artifact, optionally overriding the classifier instruction.
    pub async fn review_with_instruction(
        &self,
        text: &str,
        kind: ArtifactKind,
        policy: Option<&Policy>,
        instruction: Option<&str>,
    ) -> SafetyDecision {
        let decision = self.decide(text, kind, policy, instruction).await;
        tracing::info!(
            artifact = %kind,
            outcome = ?decision.outcome,
            source = ?decision.source,
            reason = %decision.reason,
            "Safety review"
        );
        decision
    }

    async fn decide(
        &self,
        text: &str,
        kind: ArtifactKind,
        policy: Option<&Policy>,
        instruction: Option<&str>,
    ) -> SafetyDecision {
        let screen = screen_text(text, policy);
        if screen.unsafe_ {
            let term = screen.matched_term.unwrap_or_default();
            return SafetyDecision::block(
                format!("matched banned term \"{term}\""),
                DecisionSource::Keyword,
            );
        }

        let Some(classifier) = &self.classifier else {
            return SafetyDecision::allow("no banned terms", DecisionSource::Keyword);
        };

        let instruction = instruction.unwrap_or_else(|| kind.default_instruction());
        let verdict = tokio::time::timeout(self.timeout, classifier.classify(instruction, text)).await;

        let failure = match verdict {
            Ok(Ok(reply)) => {
                return match normalize_verdict(&reply) {
                    Outcome::Block => {
                        SafetyDecision::block("classifier flagged content", DecisionSource::Classifier)
                    }
                    Outcome::Allow => {
                        SafetyDecision::allow("classifier approved", DecisionSource::Classifier)
                    }
                };
            }
            Ok(Err(e)) => format!("classifier error: {e}"),
            Err(_) => format!("classifier timed out after {:?}", self.timeout),
        };

        tracing::warn!(artifact = %kind, failure = %failure, "Safety classifier unavailable");

        let fail_closed = kind.is_user_facing()
            && self.failure_policy == ClassifierFailurePolicy::FailClosed;
        if fail_closed {
            SafetyDecision::block(failure, DecisionSource::Classifier)
        } else {
            SafetyDecision::allow(failure, DecisionSource::Classifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubClassifier;

    fn reviewer(classifier: StubClassifier) -> (ContentSafetyReviewer, Arc<StubClassifier>) {
        let classifier = Arc::new(classifier);
        let reviewer = ContentSafetyReviewer::new(
            &SafetyConfig {
                classifier_timeout: Duration::from_millis(200),
                ..Default::default()
            },
            Some(classifier.clone() as Arc<dyn SafetyClassifier>),
        );
        (reviewer, classifier)
    }

    #[tokio::test]
    async fn test_keyword_block_skips_classifier() {
        let (reviewer, classifier) = reviewer(StubClassifier::replying("ALLOW"));
        let decision = reviewer.review("a gun story", ArtifactKind::Query, None).await;
        assert_eq!(decision.outcome, Outcome::Block);
        assert_eq!(decision.source, DecisionSource::Keyword);
        assert!(decision.reason.contains("gun"));
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_classifier_block_and_allow() {
        let (blocking, _) = reviewer(StubClassifier::replying("BLOCK - scary"));
        let decision = blocking.review("a ghost story", ArtifactKind::GeneratedAnswer, None).await;
        assert_eq!(decision.outcome, Outcome::Block);
        assert_eq!(decision.source, DecisionSource::Classifier);

        let (allowing, classifier) = reviewer(StubClassifier::replying("ALLOW"));
        let decision = allowing.review("rain is water", ArtifactKind::GeneratedAnswer, None).await;
        assert!(decision.is_allowed());
        assert_eq!(classifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_allows() {
        let (reviewer, _) = reviewer(StubClassifier::replying(""));
        assert!(reviewer.review("clouds", ArtifactKind::Candidate, None).await.is_allowed());
    }

    #[tokio::test]
    async fn test_classifier_failure_blocks_user_facing() {
        let (reviewer, _) = reviewer(StubClassifier::failing());
        for kind in [ArtifactKind::Query, ArtifactKind::Candidate, ArtifactKind::GeneratedAnswer] {
            let decision = reviewer.review("clouds", kind, None).await;
            assert_eq!(decision.outcome, Outcome::Block, "{kind}");
        }
    }

    #[tokio::test]
    async fn test_classifier_failure_passes_resurfaced_data() {
        let (reviewer, _) = reviewer(StubClassifier::failing());
        let decision = reviewer.review("great video!", ArtifactKind::ResurfacedData, None).await;
        assert!(decision.is_allowed());
        assert_eq!(decision.source, DecisionSource::Classifier);
    }

    #[tokio::test]
    async fn test_classifier_timeout_fails_closed() {
        let (reviewer, _) = reviewer(StubClassifier::hanging());
        let decision = reviewer.review("clouds", ArtifactKind::GeneratedAnswer, None).await;
        assert_eq!(decision.outcome, Outcome::Block);
        assert!(decision.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fail_open_policy() {
        let reviewer = ContentSafetyReviewer::new(
            &SafetyConfig {
                failure_policy: ClassifierFailurePolicy::FailOpen,
                ..Default::default()
            },
            Some(Arc::new(StubClassifier::failing())),
        );
        assert!(reviewer.review("clouds", ArtifactKind::Query, None).await.is_allowed());
    }

    #[tokio::test]
    async fn test_disabled_classifier_is_keyword_only() {
        let reviewer = ContentSafetyReviewer::new(
            &SafetyConfig {
                classifier_enabled: false,
                ..Default::default()
            },
            Some(Arc::new(StubClassifier::replying("BLOCK"))),
        );
        assert!(!reviewer.has_classifier());
        let decision = reviewer.review("clouds", ArtifactKind::Query, None).await;
        assert_eq!(decision.source, DecisionSource::Keyword);
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_normalize_verdict() {
        assert_eq!(normalize_verdict("Block"), Outcome::Block);
        assert_eq!(normalize_verdict("REJECT_UNSAFE_COMMENTS"), Outcome::Block);
        assert_eq!(normalize_verdict("allow"), Outcome::Allow);
        assert_eq!(normalize_verdict("¯\\_(ツ)_/¯"), Outcome::Allow);
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!("closed".parse::<ClassifierFailurePolicy>().unwrap(), ClassifierFailurePolicy::FailClosed);
        assert_eq!("Fail-Open".parse::<ClassifierFailurePolicy>().unwrap(), ClassifierFailurePolicy::FailOpen);
        assert!("sometimes".parse::<ClassifierFailurePolicy>().is_err());
    }
}
