//! System prompt loading and per-tool prompt overrides.
//!
//! A prompt document is plain text, optionally structured as XML-ish tags
//! inside a `<kuttyai>` root. Top-level tags become named sections. Four of
//! them override the built-in tool prompts:
//!
//! | tag                        | used by                          |
//! |----------------------------|----------------------------------|
//! | `curatorPrompt`            | `safe_search` result curator     |
//! | `commentsModerationPrompt` | video comment moderation         |
//! | `perplexSearchPrompt`      | `answer_search` answer writer    |
//! | `galleryPrompt`            | `safe_image_gallery` caption     |

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

static OPEN_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z0-9_-]+)>").ok());
static ROOT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<kuttyai[^>]*>(.*?)</kuttyai>").ok());

/// Named sections extracted from a prompt document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptOverrides {
    sections: BTreeMap<String, String>,
}

impl PromptOverrides {
    /// Extract the top-level tagged sections of `text`.
    pub fn from_text(text: &str) -> Self {
        let body = ROOT
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(text);

        let mut sections = BTreeMap::new();
        let Some(open_tag) = OPEN_TAG.as_ref() else {
            return Self { sections };
        };

        let mut cursor = 0;
        while let Some(caps) = open_tag.captures_at(body, cursor) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            let close = format!("</{}>", name.as_str());
            match body[whole.end()..].find(&close) {
                Some(offset) => {
                    let inner = &body[whole.end()..whole.end() + offset];
                    sections
                        .entry(name.as_str().to_string())
                        .or_insert_with(|| inner.trim().to_string());
                    cursor = whole.end() + offset + close.len();
                }
                None => cursor = whole.end(),
            }
        }

        Self { sections }
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.sections
            .get(tag)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn curator(&self) -> Option<&str> {
        self.get("curatorPrompt")
    }

    pub fn comments_moderation(&self) -> Option<&str> {
        self.get("commentsModerationPrompt")
    }

    pub fn answer_writer(&self) -> Option<&str> {
        self.get("perplexSearchPrompt")
    }

    pub fn gallery_caption(&self) -> Option<&str> {
        self.get("galleryPrompt")
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// A loaded system prompt with its extracted overrides.
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    pub text: String,
    pub overrides: PromptOverrides,
}

impl SystemPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let overrides = PromptOverrides::from_text(&text);
        Self { text, overrides }
    }

    /// Load a prompt file, appending an optional personas/agents file.
    pub fn load(prompt: &Path, agents: Option<&Path>) -> Result<Self, ConfigError> {
        let mut text = read(prompt)?;
        if let Some(agents) = agents {
            text.push_str("\n\n");
            text.push_str(&read(agents)?);
        }
        Ok(Self::new(text))
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"<?xml version="1.0"?>
<kuttyai version="1.4">
  <persona>You are a gentle guide for children.</persona>
  <curatorPrompt>
    Summarize only kind, factual results.
  </curatorPrompt>
  <commentsModerationPrompt>Reply REJECT_UNSAFE_COMMENTS if any comment is mean.</commentsModerationPrompt>
  <galleryPrompt></galleryPrompt>
</kuttyai>"#;

    #[test]
    fn test_extracts_top_level_sections() {
        let overrides = PromptOverrides::from_text(DOC);
        assert_eq!(overrides.curator(), Some("Summarize only kind, factual results."));
        assert_eq!(
            overrides.comments_moderation(),
            Some("Reply REJECT_UNSAFE_COMMENTS if any comment is mean.")
        );
        assert_eq!(overrides.get("persona"), Some("You are a gentle guide for children."));
        assert_eq!(overrides.gallery_caption(), None);
        assert_eq!(overrides.answer_writer(), None);
    }

    #[test]
    fn test_plain_text_has_no_sections() {
        let overrides = PromptOverrides::from_text("Be kind. Answer simply.");
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_unclosed_tag_is_skipped() {
        let overrides = PromptOverrides::from_text("<curatorPrompt>oops <galleryPrompt>Draw</galleryPrompt>");
        assert_eq!(overrides.curator(), None);
        assert_eq!(overrides.gallery_caption(), Some("Draw"));
    }

    #[test]
    fn test_load_appends_agents_file() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("prompt.xml");
        let agents = dir.path().join("agents.md");
        std::fs::write(&prompt, DOC).unwrap();
        std::fs::write(&agents, "Persona: Owl").unwrap();

        let loaded = SystemPrompt::load(&prompt, Some(&agents)).unwrap();
        assert!(loaded.text.ends_with("Persona: Owl"));
        assert!(loaded.overrides.curator().is_some());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = SystemPrompt::load(Path::new("/nonexistent/prompt.xml"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
