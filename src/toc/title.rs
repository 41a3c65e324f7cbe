//! Chapter title inference for synthesized TOC entries.

use memchr::memmem;

use crate::util::{href_stem, normalize_whitespace, strip_tags};

/// How far into a chapter file the heading scan looks.
const TITLE_SCAN_LIMIT: usize = 5000;

/// True if a title candidate looks auto-generated and a better one should
/// be pulled from the chapter's headings: a bare filename, a pure number,
/// a "part"/"section"/"chapter" prefix, or anything under 3 characters.
pub fn looks_autogenerated(title: &str, href: &str) -> bool {
    let t = title.trim();
    if t.chars().count() < 3 {
        return true;
    }
    if t.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    let stem = href_stem(href);
    let filename = href.rsplit('/').next().unwrap_or(href);
    if t.eq_ignore_ascii_case(stem) || t.eq_ignore_ascii_case(filename) {
        return true;
    }

    let lower = t.to_ascii_lowercase();
    for prefix in ["part", "section", "chapter", "chap", "split"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let rest = rest.trim_start_matches(['_', '-', ' ', '.']);
            if rest.is_empty() || rest.chars().all(|c| c.is_ascii_digit()) {
                return true;
            }
        }
    }

    false
}

/// Extract a display title from chapter HTML: the first `<h1>`, else
/// `<title>`, else `<h2>`. Only the first [`TITLE_SCAN_LIMIT`] characters
/// are scanned.
pub fn extract_chapter_title(content: &str) -> Option<String> {
    let window = head_window(content, TITLE_SCAN_LIMIT);
    let lower = window.to_ascii_lowercase();

    for tag in ["h1", "title", "h2"] {
        if let Some(text) = first_tag_text(window, &lower, tag) {
            return Some(text);
        }
    }
    None
}

/// A char-boundary-safe prefix of at most `limit` bytes.
fn head_window(content: &str, limit: usize) -> &str {
    if content.len() <= limit {
        return content;
    }
    let mut end = limit;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

/// Text content of the first `<tag ...>...</tag>` pair. `lower` is the
/// pre-lowercased copy of `html` used for case-insensitive search.
fn first_tag_text(html: &str, lower: &str, tag: &str) -> Option<String> {
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}");
    let lower_bytes = lower.as_bytes();

    let mut from = 0;
    while let Some(off) = memmem::find(&lower_bytes[from..], open_pat.as_bytes()) {
        let open_at = from + off;
        let after_name = open_at + open_pat.len();

        // Reject prefix matches like "<h1" inside "<header" is impossible,
        // but "<title" must not match "<titlepage".
        match lower_bytes.get(after_name) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
            _ => {
                from = after_name;
                continue;
            }
        }

        let gt = memchr::memchr(b'>', &lower_bytes[open_at..])? + open_at;
        if lower_bytes[gt - 1] == b'/' {
            // Self-closing heading carries no text; keep looking.
            from = gt + 1;
            continue;
        }

        let end = memmem::find(&lower_bytes[gt..], close_pat.as_bytes())? + gt;
        let text = normalize_whitespace(&strip_tags(&html[gt + 1..end]));
        if !text.is_empty() {
            return Some(text);
        }
        from = end + close_pat.len();
    }

    None
}
