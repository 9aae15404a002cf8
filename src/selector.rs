//! First-fit candidate selection.
//!
//! Turns raw provider results into at most one approved candidate:
//!
//! 1. Deduplicate by id, keeping first-seen order.
//! 2. Cap to a shortlist of `2 * requested` entries.
//! 3. If the caller requires the operator allowlist, keep only allowlisted ids.
//! 4. Review shortlisted candidates in order and return the first that passes.
//!
//! Selection is first-fit: a later candidate is never reviewed once an
//! earlier one passes, so the number of classifier calls is bounded by the
//! position of the first safe candidate.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::policy::Policy;
use crate::safety::{ArtifactKind, ContentSafetyReviewer, SafetyDecision};
use crate::tools::{SafetyAction, ToolOutcome};

/// A result proposed by a provider, before review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub source_host: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Candidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, source_host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_host: source_host.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Reviews one candidate at a time.
#[async_trait]
pub trait CandidateReviewer: Send + Sync {
    async fn review(&self, candidate: &Candidate) -> SafetyDecision;
}

/// Default reviewer: the content-safety reviewer over `title + host`.
pub struct MetadataReviewer<'a> {
    reviewer: &'a ContentSafetyReviewer,
    policy: &'a Policy,
}

impl<'a> MetadataReviewer<'a> {
    pub fn new(reviewer: &'a ContentSafetyReviewer, policy: &'a Policy) -> Self {
        Self { reviewer, policy }
    }
}

#[async_trait]
impl CandidateReviewer for MetadataReviewer<'_> {
    async fn review(&self, candidate: &Candidate) -> SafetyDecision {
        let text = format!("{}\n{}", candidate.title, candidate.source_host);
        self.reviewer
            .review(&text, ArtifactKind::Candidate, Some(self.policy))
            .await
    }
}

/// Outcome of a selection pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Selected {
        candidate: Candidate,
        decision: SafetyDecision,
        /// How many candidates were reviewed, including the selected one.
        reviewed: usize,
    },
    Rejected {
        reason: String,
        action: SafetyAction,
    },
}

impl Selection {
    fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            action: SafetyAction::AskAlternative,
        }
    }

    /// Convert a rejection into the tool envelope. `None` when selected.
    pub fn rejection(&self) -> Option<ToolOutcome> {
        match self {
            Self::Selected { .. } => None,
            Self::Rejected { reason, action } => Some(ToolOutcome::reject(reason.clone(), *action)),
        }
    }
}

pub const NO_CANDIDATES: &str = "No candidates found.";
pub const NO_ALLOWLISTED: &str = "No allowlisted candidates matched.";
pub const ALL_FAILED: &str = "All candidates failed safety review.";

/// Selection parameters for one request.
#[derive(Debug, Clone, Default)]
pub struct CandidateSelector {
    requested: usize,
    operator_allowlist: Option<HashSet<String>>,
    require_allowlist: bool,
}

impl CandidateSelector {
    pub fn new(requested: usize) -> Self {
        Self {
            requested: requested.max(1),
            ..Default::default()
        }
    }

    /// Restrict to operator-approved ids when `required` is set.
    pub fn with_operator_allowlist<I, S>(mut self, ids: I, required: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operator_allowlist = Some(ids.into_iter().map(Into::into).collect());
        self.require_allowlist = required;
        self
    }

    pub fn shortlist_size(&self) -> usize {
        self.requested * 2
    }

    /// Dedupe, cap, and filter, without reviewing.
    pub fn shortlist(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| !c.id.trim().is_empty() && seen.insert(c.id.clone()))
            .take(self.shortlist_size())
            .collect()
    }

    pub async fn select(
        &self,
        candidates: Vec<Candidate>,
        reviewer: &dyn CandidateReviewer,
    ) -> Selection {
        let mut shortlist = self.shortlist(candidates);
        if shortlist.is_empty() {
            return Selection::rejected(NO_CANDIDATES);
        }

        if self.require_allowlist
            && let Some(allowed) = &self.operator_allowlist
        {
            shortlist.retain(|c| allowed.contains(&c.id));
            if shortlist.is_empty() {
                return Selection::rejected(NO_ALLOWLISTED);
            }
        }

        for (idx, candidate) in shortlist.into_iter().enumerate() {
            let decision = reviewer.review(&candidate).await;
            if decision.is_allowed() {
                tracing::debug!(id = %candidate.id, reviewed = idx + 1, "Candidate selected");
                return Selection::Selected {
                    candidate,
                    decision,
                    reviewed: idx + 1,
                };
            }
            tracing::debug!(id = %candidate.id, reason = %decision.reason, "Candidate rejected");
        }

        Selection::rejected(ALL_FAILED)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::safety::{DecisionSource, Outcome};

    /// Reviewer that fails a fixed set of ids and records the call order.
    struct ScriptedReviewer {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedReviewer {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CandidateReviewer for ScriptedReviewer {
        async fn review(&self, candidate: &Candidate) -> SafetyDecision {
            self.calls.lock().unwrap().push(candidate.id.clone());
            let outcome = if self.failing.contains(&candidate.id) {
                Outcome::Block
            } else {
                Outcome::Allow
            };
            SafetyDecision {
                outcome,
                reason: "scripted".to_string(),
                source: DecisionSource::Classifier,
            }
        }
    }

    fn cands(ids: &[&str]) -> Vec<Candidate> {
        ids.iter()
            .map(|id| Candidate::new(*id, format!("Video {id}"), "youtube.com"))
            .collect()
    }

    #[tokio::test]
    async fn test_first_fit_stops_at_first_pass() {
        let reviewer = ScriptedReviewer::failing(&["A"]);
        let selection = CandidateSelector::new(3)
            .select(cands(&["A", "B", "C"]), &reviewer)
            .await;

        match selection {
            Selection::Selected { candidate, reviewed, .. } => {
                assert_eq!(candidate.id, "B");
                assert_eq!(reviewed, 2);
            }
            other => panic!("expected selection, got {other:?}"),
        }
        assert_eq!(reviewer.calls(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let reviewer = ScriptedReviewer::failing(&["A", "B"]);
        let selection = CandidateSelector::new(1).select(cands(&["A", "B"]), &reviewer).await;
        assert_eq!(
            selection,
            Selection::Rejected {
                reason: ALL_FAILED.to_string(),
                action: SafetyAction::AskAlternative
            }
        );
    }

    #[tokio::test]
    async fn test_empty_input() {
        let reviewer = ScriptedReviewer::failing(&[]);
        let selection = CandidateSelector::new(3).select(Vec::new(), &reviewer).await;
        let outcome = selection.rejection().unwrap().into_value();
        assert_eq!(outcome["reason"], NO_CANDIDATES);
        assert_eq!(outcome["action"], "ASK_ALTERNATIVE");
        assert!(reviewer.calls().is_empty());
    }

    #[test]
    fn test_shortlist_dedupes_and_caps() {
        let selector = CandidateSelector::new(2);
        let shortlist = selector.shortlist(cands(&["A", "A", "", "B", "C", "D", "E"]));
        let ids: Vec<_> = shortlist.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_required_allowlist_filters() {
        let reviewer = ScriptedReviewer::failing(&[]);
        let selection = CandidateSelector::new(3)
            .with_operator_allowlist(["C"], true)
            .select(cands(&["A", "B", "C"]), &reviewer)
            .await;
        assert!(matches!(selection, Selection::Selected { ref candidate, .. } if candidate.id == "C"));
        assert_eq!(reviewer.calls(), vec!["C"]);
    }

    #[tokio::test]
    async fn test_required_allowlist_without_match() {
        let reviewer = ScriptedReviewer::failing(&[]);
        let selection = CandidateSelector::new(3)
            .with_operator_allowlist(["Z"], true)
            .select(cands(&["A", "B"]), &reviewer)
            .await;
        assert!(matches!(selection, Selection::Rejected { ref reason, .. } if reason == NO_ALLOWLISTED));
    }

    #[tokio::test]
    async fn test_optional_allowlist_does_not_filter() {
        let reviewer = ScriptedReviewer::failing(&[]);
        let selection = CandidateSelector::new(3)
            .with_operator_allowlist(["Z"], false)
            .select(cands(&["A"]), &reviewer)
            .await;
        assert!(matches!(selection, Selection::Selected { .. }));
    }

    #[tokio::test]
    async fn test_metadata_reviewer_uses_keyword_stage() {
        let reviewer = ContentSafetyReviewer::keyword_only();
        let policy = Policy::new(["youtube.com"], ["scary"]);
        let meta = MetadataReviewer::new(&reviewer, &policy);
        let blocked = meta.review(&Candidate::new("1", "Scary clowns", "youtube.com")).await;
        assert!(!blocked.is_allowed());
        let allowed = meta.review(&Candidate::new("2", "Rain song", "youtube.com")).await;
        assert!(allowed.is_allowed());
    }
}
