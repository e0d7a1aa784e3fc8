use once_cell::sync::Lazy;
use regex::Regex;

/// Longest excerpt handed to the notification collaborator.
pub const NOTIFICATION_EXCERPT_LENGTH: usize = 2048;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<\s*(head|script|style)[^>]*>.*?<\s*/\s*(head|script|style)\s*>").unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static NBSP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&nbsp;").unwrap());

/// Remove markup from a rich-text body, dropping `head`/`script`/`style`
/// blocks entirely.
pub fn strip_html_tags(text: &str) -> String {
    let without_blocks = BLOCK_RE.replace_all(text, "");
    TAG_RE.replace_all(&without_blocks, "").into_owned()
}

/// Plain-text copy of a message body as stored for search.
pub fn plaintext(body: &str) -> String {
    strip_html_tags(body).trim().to_string()
}

/// True when nothing readable is left once markup and `&nbsp;` are gone.
pub fn is_blank(body: &str) -> bool {
    NBSP_RE.replace_all(&strip_html_tags(body), "").trim().is_empty()
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Shorten a body for a notification and reduce it to plain text.
///
/// Tags are stripped twice: once from the raw body and again after entity
/// unescaping, since escaped markup becomes real markup at that point.
pub fn notification_excerpt(body: &str, max_chars: usize) -> String {
    let truncated = if body.chars().count() > max_chars {
        let mut s: String = body.chars().take(max_chars).collect();
        s.push('…');
        s
    } else {
        body.to_string()
    };
    let first = NBSP_RE.replace_all(&strip_html_tags(&truncated), "").into_owned();
    let second = NBSP_RE.replace_all(&strip_html_tags(&unescape(&first)), "").into_owned();
    second.trim().to_string()
}
