//! Operator policy: the domain allowlist and banned-term screen.
//!
//! Every tool and the render sandbox consult the same [`Policy`] snapshot.
//! Both checks are pure functions and fail closed:
//!
//! ```text
//!   host ──► is_domain_allowed ──► allowlist empty? ──► deny
//!                                   │
//!                                   └─► host == entry || host ends with "." + entry
//!
//!   text ──► screen_text ──► baseline terms ──► operator terms ──► ScreenResult
//! ```

mod allowlist;
pub mod loader;

use std::collections::BTreeSet;

use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};

pub use self::allowlist::{DomainAllowlist, DomainDecision, DomainEntry, host_of};
pub use self::loader::{load_banned_terms, load_domains, load_policy};

/// Terms that are always screened, whatever the operator configures.
pub const BASELINE_TERMS: &[&str] = &[
    "violence",
    "blood",
    "kill",
    "sex",
    "porn",
    "nude",
    "drug",
    "alcohol",
    "hate",
    "suicide",
    "self-harm",
    "gambling",
    "weapon",
    "gun",
    "extremism",
];

/// Immutable policy snapshot shared by tools and the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    allow_domains: BTreeSet<String>,
    banned_terms: BTreeSet<String>,
}

impl Policy {
    /// Build a policy, trimming and lower-casing every entry.
    pub fn new<D, B>(allow_domains: D, banned_terms: B) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        B: IntoIterator,
        B::Item: AsRef<str>,
    {
        Self {
            allow_domains: allow_domains
                .into_iter()
                .filter_map(|d| DomainEntry::new(d.as_ref()))
                .map(|e| e.domain().to_string())
                .collect(),
            banned_terms: banned_terms
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Parse the serialized form used by the sandbox handoff.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: Policy = serde_json::from_str(raw)?;
        Ok(Self::new(parsed.allow_domains, parsed.banned_terms))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn allow_domains(&self) -> &BTreeSet<String> {
        &self.allow_domains
    }

    pub fn banned_terms(&self) -> &BTreeSet<String> {
        &self.banned_terms
    }

    /// True when no domain is allowed, which disables every gated operation.
    pub fn is_fail_closed(&self) -> bool {
        self.allow_domains.is_empty()
    }

    pub fn allowlist(&self) -> DomainAllowlist {
        DomainAllowlist::new(&self.allow_domains.iter().collect::<Vec<_>>())
    }
}

/// Check a host against the policy allowlist.
///
/// `None` and an empty allowlist both deny.
pub fn is_domain_allowed(host: &str, policy: Option<&Policy>) -> bool {
    let Some(policy) = policy else {
        return false;
    };
    if policy.allow_domains.is_empty() || host.trim().is_empty() {
        return false;
    }
    policy
        .allow_domains
        .iter()
        .filter_map(|d| DomainEntry::new(d))
        .any(|entry| entry.matches(host))
}

/// Check the host of an http(s) URL against the policy allowlist.
pub fn is_url_allowed(url: &str, policy: Option<&Policy>) -> bool {
    host_of(url).is_some_and(|host| is_domain_allowed(&host, policy))
}

/// Outcome of the banned-term screen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScreenResult {
    pub unsafe_: bool,
    pub matched_term: Option<String>,
}

impl ScreenResult {
    fn clean() -> Self {
        Self::default()
    }

    fn flagged(term: &str) -> Self {
        Self {
            unsafe_: true,
            matched_term: Some(term.to_string()),
        }
    }
}

/// Screen text against the baseline terms, then the operator's banned terms.
///
/// Matching is a case-insensitive substring match.
pub fn screen_text(text: &str, policy: Option<&Policy>) -> ScreenResult {
    let lowered = text.to_lowercase();

    if let Some(term) = first_match(&lowered, BASELINE_TERMS) {
        return ScreenResult::flagged(&term);
    }

    if let Some(policy) = policy {
        let extra: Vec<&str> = policy
            .banned_terms
            .iter()
            .map(String::as_str)
            .filter(|t| !BASELINE_TERMS.contains(t))
            .collect();
        if let Some(term) = first_match(&lowered, &extra) {
            return ScreenResult::flagged(&term);
        }
    }

    ScreenResult::clean()
}

fn first_match(haystack: &str, terms: &[&str]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }

    match AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostFirst)
        .build(terms)
    {
        Ok(matcher) => matcher
            .find(haystack)
            .map(|m| terms[m.pattern().as_usize()].to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Term matcher build failed, using linear scan");
            terms
                .iter()
                .find(|t| haystack.contains(&t.to_lowercase()))
                .map(|t| t.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(domains: &[&str], banned: &[&str]) -> Policy {
        Policy::new(domains.iter(), banned.iter())
    }

    #[test]
    fn test_domain_allowed_exact_and_subdomain() {
        let p = policy(&["youtube.com"], &[]);
        assert!(is_domain_allowed("youtube.com", Some(&p)));
        assert!(is_domain_allowed("www.youtube.com", Some(&p)));
        assert!(is_domain_allowed("WWW.YOUTUBE.COM", Some(&p)));
        assert!(!is_domain_allowed("evil-youtube.com", Some(&p)));
        assert!(!is_domain_allowed("youtube.com.evil.net", Some(&p)));
    }

    #[test]
    fn test_domain_denied_without_policy_or_entries() {
        assert!(!is_domain_allowed("youtube.com", None));
        let empty = policy(&[], &["anything"]);
        assert!(empty.is_fail_closed());
        assert!(!is_domain_allowed("youtube.com", Some(&empty)));
        assert!(!is_domain_allowed("", Some(&policy(&["a.com"], &[]))));
    }

    #[test]
    fn test_is_url_allowed() {
        let p = policy(&["nasa.gov"], &[]);
        assert!(is_url_allowed("https://spaceplace.nasa.gov/rain/", Some(&p)));
        assert!(!is_url_allowed("https://example.com/", Some(&p)));
        assert!(!is_url_allowed("file:///etc/passwd", Some(&p)));
    }

    #[test]
    fn test_screen_text_case_insensitive() {
        let result = screen_text("How do you Kill a process", None);
        assert!(result.unsafe_);
        assert_eq!(result.matched_term.as_deref(), Some("kill"));
    }

    #[test]
    fn test_screen_text_clean() {
        let result = screen_text("why does it rain", Some(&policy(&["a.com"], &["zombie"])));
        assert_eq!(result, ScreenResult::default());
    }

    #[test]
    fn test_screen_text_operator_terms() {
        let p = policy(&["a.com"], &["  Zombie "]);
        let result = screen_text("Zombies at school", Some(&p));
        assert!(result.unsafe_);
        assert_eq!(result.matched_term.as_deref(), Some("zombie"));
    }

    #[test]
    fn test_screen_text_baseline_wins_over_operator() {
        let p = policy(&["a.com"], &["school"]);
        let result = screen_text("gun at school", Some(&p));
        assert_eq!(result.matched_term.as_deref(), Some("gun"));
    }

    #[test]
    fn test_policy_normalizes_entries() {
        let p = policy(&[" YouTube.com ", "", "*.nasa.gov"], &["  ", "Scary"]);
        let domains: Vec<&str> = p.allow_domains().iter().map(String::as_str).collect();
        assert_eq!(domains, vec!["nasa.gov", "youtube.com"]);
        assert!(p.banned_terms().contains("scary"));
        assert_eq!(p.banned_terms().len(), 1);
    }

    #[test]
    fn test_policy_json_uses_camel_case() {
        let p = policy(&["youtube.com"], &["scary"]);
        let json = p.to_json();
        assert!(json.contains("allowDomains"));
        assert!(json.contains("bannedTerms"));
        assert_eq!(Policy::from_json(&json).unwrap(), p);
    }
}
