//! HTML payloads handed to the render sandbox.
//!
//! Both documents carry their own `Content-Security-Policy` meta tag. The
//! sandbox host layers its own header on top, so these only have to be
//! correct for an external viewer that renders the file as-is.

use std::sync::LazyLock;

use regex::Regex;

const EMBED_CSP: &str = "default-src 'self' https://www.youtube.com https://www.youtube-nocookie.com; img-src 'self' data: https:; media-src https:; script-src 'self'; style-src 'self' 'unsafe-inline'; frame-ancestors 'none';";
const GALLERY_CSP: &str = "default-src 'self' data:; img-src 'self' data: https:; media-src 'none'; script-src 'self'; style-src 'self' 'unsafe-inline'; frame-ancestors 'none';";

static SCRIPT_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").ok());
static STYLE_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());
static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Escape text for an HTML text node or a double-quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether `id` looks like a YouTube video id.
pub fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Sandboxed YouTube player page.
pub fn embed_html(video_id: &str, title: &str, autoplay: bool) -> String {
    let id = urlencoding::encode(video_id);
    let title = escape_html(title);
    let autoplay = if autoplay { 1 } else { 0 };
    format!(
        r#"<!doctype html><html><head><meta charset="utf-8"><meta http-equiv="Content-Security-Policy" content="{EMBED_CSP}"><title>{title}</title></head>
<body style="margin:0;background:#000">
  <div style="position:fixed;inset:0;display:flex;align-items:center;justify-content:center">
    <iframe width="100%" height="100%" src="https://www.youtube.com/embed/{id}?rel=0&amp;modestbranding=1&amp;controls=1&amp;iv_load_policy=3&amp;autoplay={autoplay}" title="{title}" sandbox="allow-scripts allow-same-origin" allow="accelerometer; autoplay; encrypted-media; gyroscope; picture-in-picture" referrerpolicy="no-referrer" style="border:0"></iframe>
  </div>
</body></html>"#
    )
}

/// One image in a gallery page.
#[derive(Debug, Clone)]
pub struct GalleryImage {
    /// `data:` URI or remote URL.
    pub src: String,
    pub title: String,
}

/// Grid gallery page with a caption header.
pub fn gallery_html(images: &[GalleryImage], caption: &str) -> String {
    let items: String = images
        .iter()
        .enumerate()
        .map(|(i, im)| {
            format!(
                r#"<figure class="g-item"><img src="{}" alt="Image {}" referrerpolicy="no-referrer" draggable="false"/><figcaption>{}</figcaption></figure>"#,
                escape_html(&im.src),
                i + 1,
                escape_html(&im.title)
            )
        })
        .collect();
    let caption = escape_html(caption);
    format!(
        r#"<!doctype html><html><head><meta charset="utf-8"><meta http-equiv="Content-Security-Policy" content="{GALLERY_CSP}"><title>Gallery</title></head>
<body style="margin:0;background:#fff">
  <div style="position:fixed;inset:0;display:flex;flex-direction:column;overflow:hidden">
    <div style="padding:12px 16px;font-weight:700">{caption}</div>
    <div style="flex:1;overflow:auto;padding:12px;display:grid;gap:12px;grid-template-columns:repeat(auto-fill,minmax(160px,1fr))">{items}</div>
  </div>
</body></html>"#
    )
}

/// Reduce an HTML document to its visible text, whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let mut text = html.to_string();
    for re in [&SCRIPT_BLOCK, &STYLE_BLOCK] {
        if let Some(re) = re.as_ref() {
            text = re.replace_all(&text, " ").into_owned();
        }
    }
    if let Some(re) = TAG.as_ref() {
        text = re.replace_all(&text, " ").into_owned();
    }
    match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(&text, " ").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Cap `text` at `max` characters, ending with `...` when cut.
pub fn trim_len(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
