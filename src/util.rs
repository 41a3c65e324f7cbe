//! Shared text and path utilities.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract the encoding name from an XML declaration
/// (`<?xml ... encoding="..."?>`), checking only the first ~100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let prefix = &bytes[..bytes.len().min(100)];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;

    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve XML entity references.
pub fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        "nbsp" => return Some(" ".to_string()),
        _ => {}
    }

    if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        if let Ok(code) = u32::from_str_radix(hex, 16)
            && let Some(c) = char::from_u32(code)
        {
            return Some(c.to_string());
        }
    } else if let Some(dec) = entity.strip_prefix('#')
        && let Ok(code) = dec.parse::<u32>()
        && let Some(c) = char::from_u32(code)
    {
        return Some(c.to_string());
    }

    None
}

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Strip markup from an HTML fragment, keeping text content.
///
/// Entity references are resolved; unresolvable ones are kept literally.
/// Tags contribute nothing (no implied whitespace), so inline markup like
/// `wo<b>rd</b>` yields `word`.
pub fn strip_tags(html: &str) -> String {
    let bytes = html.as_bytes();
    let mut out = String::with_capacity(html.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                // Skip to the end of the tag; unterminated tags swallow the rest.
                match memchr::memchr(b'>', &bytes[i..]) {
                    Some(off) => i += off + 1,
                    None => break,
                }
            }
            b'&' => {
                let rest = &bytes[i + 1..];
                let semi = memchr::memchr(b';', &rest[..rest.len().min(12)]);
                match semi {
                    Some(end) if end > 0 => {
                        let name = &html[i + 1..i + 1 + end];
                        match resolve_entity(name) {
                            Some(resolved) => out.push_str(&resolved),
                            None => out.push_str(&html[i..i + 2 + end]),
                        }
                        i += end + 2;
                    }
                    _ => {
                        out.push('&');
                        i += 1;
                    }
                }
            }
            _ => {
                let next = memchr::memchr2(b'<', b'&', &bytes[i..]).unwrap_or(bytes.len() - i);
                out.push_str(&html[i..i + next]);
                i += next;
            }
        }
    }

    out
}

/// Escape text for inclusion in an HTML attribute or text node.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-decode an href from a package document.
pub fn percent_decode(href: &str) -> String {
    percent_encoding::percent_decode_str(href)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string())
}

/// True if the href carries a URI scheme (http:, https:, data:, blob:,
/// mailto:, ...) and must not be treated as a relative path.
pub fn has_scheme(href: &str) -> bool {
    let bytes = href.as_bytes();
    if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b':' => return i > 0,
            b'/' | b'?' | b'#' => return false,
            b if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' => {}
            _ => return false,
        }
    }
    false
}

/// Join a relative href onto a base directory ("" for the root), collapsing
/// `.` and `..` segments. Both sides use `/` separators.
pub fn join_href(base_dir: &str, href: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for seg in base_dir.split('/').chain(href.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                // Best effort: a ".." that would escape the root is dropped.
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// The directory part of a `/`-separated href ("" when it has none).
pub fn href_dir(href: &str) -> &str {
    match href.rfind('/') {
        Some(i) => &href[..i],
        None => "",
    }
}

/// The filename stem of a `/`-separated href (no directory, no extension).
pub fn href_stem(href: &str) -> &str {
    let name = href.rsplit('/').next().unwrap_or(href);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(i) => &name[..i],
    }
}
