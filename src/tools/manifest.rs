//! Tool manifests: which tools a conversation may use.
//!
//! Accepted shapes, in JSON or YAML:
//!
//! ```yaml
//! - safe_search
//! - open_safe_url
//! ```
//!
//! ```json
//! {"tools": ["answer_search", {"name": "safe_video_search"}]}
//! ```
//!
//! Legacy camelCase names (`safeYouTubeSearch`, `perplexSearch`, ...) map to
//! the current tool names.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<Entry>),
    Object { tools: Vec<Entry> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    Name(String),
    Spec { name: String },
}

impl Entry {
    fn into_name(self) -> String {
        match self {
            Entry::Name(name) | Entry::Spec { name } => name,
        }
    }
}

/// Map legacy tool names onto the registered names.
pub fn canonical_tool_name(name: &str) -> String {
    match name.trim() {
        "safeSearch" => "safe_search",
        "perplexSearch" | "perplexsearch" => "answer_search",
        "safeYouTubeSearch" | "safeVideoSearch" => "safe_video_search",
        "safeImageGallery" => "safe_image_gallery",
        "openSafeUrl" => "open_safe_url",
        "creativeHelper" => "creative_helper",
        other => other,
    }
    .to_string()
}

/// Parse manifest text. XML manifests are rejected.
pub fn parse_manifest(raw: &str, origin: &str) -> Result<Vec<String>, ConfigError> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('<') {
        return Err(ConfigError::Parse {
            path: origin.to_string(),
            reason: "XML tool manifests are not supported; use JSON or YAML".to_string(),
        });
    }

    let manifest: Manifest = match serde_json::from_str(trimmed) {
        Ok(m) => m,
        Err(json_err) => serde_yml::from_str(trimmed).map_err(|yaml_err| ConfigError::Parse {
            path: origin.to_string(),
            reason: format!("not valid JSON ({json_err}) or YAML ({yaml_err})"),
        })?,
    };

    let entries = match manifest {
        Manifest::List(entries) | Manifest::Object { tools: entries } => entries,
    };

    Ok(entries
        .into_iter()
        .map(Entry::into_name)
        .map(|n| canonical_tool_name(&n))
        .filter(|n| !n.is_empty())
        .collect())
}

/// Load a manifest file.
pub fn load_manifest(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_manifest(&raw, &path.display().to_string())
}
