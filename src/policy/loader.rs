//! Policy file loading.
//!
//! Domain files are `{"domains": [...]}` or a bare JSON array. Banned-term
//! files are a bare array or an object with any of the keys `banned`,
//! `extra`, `terms`, `words`, `blocklist` (all of them are merged).
//!
//! A missing or malformed file yields an empty list. Callers decide what an
//! empty allowlist means, which is always "deny".

use std::path::Path;

use serde_json::Value;

use super::Policy;

const DOMAIN_KEYS: &[&str] = &["domains"];
const BANNED_KEYS: &[&str] = &["banned", "extra", "terms", "words", "blocklist"];

/// Load the allowed domains from a policy file.
pub fn load_domains(path: &Path) -> Vec<String> {
    read_list(path, DOMAIN_KEYS)
}

/// Load the operator's banned terms from a policy file.
pub fn load_banned_terms(path: &Path) -> Vec<String> {
    read_list(path, BANNED_KEYS)
}

/// Build a [`Policy`] from optional domain and banned-term files.
pub fn load_policy(domains: Option<&Path>, banned: Option<&Path>) -> Policy {
    let allow = domains.map(load_domains).unwrap_or_default();
    let terms = banned.map(load_banned_terms).unwrap_or_default();
    let policy = Policy::new(allow, terms);

    tracing::debug!(
        domains = policy.allow_domains().len(),
        banned_terms = policy.banned_terms().len(),
        "Loaded policy"
    );
    policy
}

fn read_list(path: &Path, keys: &[&str]) -> Vec<String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Policy file unreadable, treating as empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => extract_list(&value, keys),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Policy file is not valid JSON, treating as empty");
            Vec::new()
        }
    }
}

fn extract_list(value: &Value, keys: &[&str]) -> Vec<String> {
    match value {
        Value::Array(items) => strings(items),
        Value::Object(map) => keys
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_array))
            .flat_map(|items| strings(items))
            .collect(),
        _ => Vec::new(),
    }
}

fn strings(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
