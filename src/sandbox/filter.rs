//! Request filtering for sandboxed views.
//!
//! Every URL a view references passes through [`RequestFilter`]. Local
//! schemes are always permitted; remote URLs must be http(s) on an allowlisted
//! host. The same decision runs twice: once when the payload is rewritten and
//! again when the loopback server is asked to fetch.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::policy::{DomainAllowlist, DomainDecision, Policy, host_of};

/// Path on the loopback server that proxies allowlisted resources.
pub const FETCH_PATH: &str = "/fetch";

const BLANK: &str = "about:blank";
/// Link target that keeps the reader on the loopback page.
const NO_NAVIGATION: &str = "#";

static TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)(\s[^>]*)?>").ok());
static URL_ATTR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(src|href|srcset)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).ok()
});

/// Outcome for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Permit,
    Cancel { reason: String },
}

impl FilterDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, FilterDecision::Permit)
    }
}

/// What a URL attribute makes the browser do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Loaded as part of the page: images, media, scripts, styles.
    Resource,
    /// Loaded into a nested frame, constrained by CSP `frame-src`.
    Frame,
    /// Navigates the whole view away from the loopback page.
    Link,
}

impl Target {
    fn of(tag: &str) -> Self {
        match tag {
            "iframe" | "frame" => Target::Frame,
            "a" | "area" => Target::Link,
            _ => Target::Resource,
        }
    }
}

/// Allowlist gate for everything a sandboxed view loads.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    policy: Policy,
    allowlist: DomainAllowlist,
}

impl RequestFilter {
    pub fn new(policy: Policy) -> Self {
        Self {
            allowlist: policy.allowlist(),
            policy,
        }
    }

    /// Decide whether `url` may load.
    pub fn decide(&self, url: &str) -> FilterDecision {
        let url = url.trim();
        let scheme = url
            .split_once(':')
            .map(|(s, _)| s.to_ascii_lowercase())
            .unwrap_or_default();

        if matches!(scheme.as_str(), "file" | "data" | "about") {
            return FilterDecision::Permit;
        }
        if !matches!(scheme.as_str(), "http" | "https") {
            return FilterDecision::Cancel {
                reason: format!("scheme not permitted: {url}"),
            };
        }

        match host_of(url) {
            Some(host) => match self.allowlist.check(&host) {
                DomainDecision::Allowed => FilterDecision::Permit,
                DomainDecision::Denied(reason) => FilterDecision::Cancel { reason },
            },
            None => FilterDecision::Cancel {
                reason: format!("unparseable URL: {url}"),
            },
        }
    }

    /// Rewrite every `src`, `href` and `srcset` in `html`.
    ///
    /// Denied URLs become `about:blank`. Allowed remote resources are routed
    /// through the loopback `/fetch` endpoint. Allowed `iframe` targets keep
    /// their original URL so embedded players work. Absolute link targets
    /// become `#`, so a click never leaves the filtered page. Relative and
    /// fragment URLs resolve against the loopback origin and stay as they are.
    pub fn rewrite_payload(&self, html: &str) -> String {
        let Some(tag_re) = TAG.as_ref() else {
            return html.to_string();
        };

        tag_re
            .replace_all(html, |caps: &Captures| {
                let name = caps[1].to_ascii_lowercase();
                match caps.get(2) {
                    Some(attrs) => {
                        format!("<{}{}>", &caps[1], self.rewrite_attrs(&name, attrs.as_str()))
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn rewrite_attrs(&self, tag: &str, attrs: &str) -> String {
        let Some(attr_re) = URL_ATTR.as_ref() else {
            return attrs.to_string();
        };
        let target = Target::of(tag);

        attr_re
            .replace_all(attrs, |caps: &Captures| {
                let attr = caps[2].to_ascii_lowercase();
                let (value, quote) = match (caps.get(4), caps.get(5)) {
                    (Some(v), _) => (v.as_str(), '"'),
                    (None, Some(v)) => (v.as_str(), '\''),
                    (None, None) => ("", '"'),
                };
                let rewritten = if attr == "srcset" {
                    self.rewrite_srcset(value)
                } else {
                    self.rewrite_url(value, target)
                };
                format!("{}{}{}{quote}{rewritten}{quote}", &caps[1], &caps[2], &caps[3])
            })
            .into_owned()
    }

    fn rewrite_srcset(&self, srcset: &str) -> String {
        srcset
            .split(',')
            .map(|candidate| {
                let candidate = candidate.trim();
                match candidate.split_once(char::is_whitespace) {
                    Some((url, descriptor)) => {
                        format!(
                            "{} {}",
                            self.rewrite_url(url, Target::Resource),
                            descriptor.trim()
                        )
                    }
                    None => self.rewrite_url(candidate, Target::Resource),
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn rewrite_url(&self, raw: &str, target: Target) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() || is_relative(trimmed) {
            return raw.to_string();
        }
        if target == Target::Link {
            tracing::debug!(url = %trimmed, "Disabled outbound link");
            return NO_NAVIGATION.to_string();
        }

        match self.decide(&unescape_attr(trimmed)) {
            FilterDecision::Cancel { reason } => {
                tracing::debug!(%reason, "Blocked view resource");
                BLANK.to_string()
            }
            FilterDecision::Permit if target == Target::Frame || !is_remote(trimmed) => {
                raw.to_string()
            }
            FilterDecision::Permit => proxied_url(&unescape_attr(trimmed)),
        }
    }

    /// Content-Security-Policy header for the loopback page.
    ///
    /// Frames may only come from allowlisted hosts over https. Everything
    /// else is limited to the loopback origin and `data:`.
    pub fn content_security_policy(&self) -> String {
        let frames = self
            .policy
            .allow_domains()
            .iter()
            .flat_map(|d| [format!("https://{d}"), format!("https://*.{d}")])
            .collect::<Vec<_>>();
        let frame_src = if frames.is_empty() {
            "'none'".to_string()
        } else {
            frames.join(" ")
        };
        format!(
            "default-src 'self' data:; img-src 'self' data:; media-src 'self' data:; \
             style-src 'self' 'unsafe-inline'; script-src 'self'; connect-src 'self'; \
             frame-src {frame_src}; frame-ancestors 'none'"
        )
    }
}

/// Loopback-relative URL that proxies `url` through `/fetch`.
pub fn proxied_url(url: &str) -> String {
    format!("{FETCH_PATH}?url={}", urlencoding::encode(url))
}

fn is_relative(url: &str) -> bool {
    url.starts_with('#') || (url.starts_with('/') && !url.starts_with("//")) || !url.contains(':')
}

fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
