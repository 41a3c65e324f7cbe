//! Single-document assembly of spine-ordered chapters.
//!
//! Each spine item's body content is extracted, its relative asset
//! references rewritten against the package base directory, and the result
//! wrapped in an addressable `<section>` container. One unreadable chapter
//! yields a placeholder fragment instead of blanking the whole book.

use std::fs;

use memchr::memmem;

use crate::package::PackageDocument;
use crate::toc::TocNode;
use crate::util::{decode_text, escape_html, extract_xml_encoding, has_scheme, href_dir, join_href};

/// One spine entry's assembled content.
#[derive(Debug, Clone)]
pub struct ChapterContainer {
    /// Synthetic anchor derived from the spine index ("chapter-0", ...).
    pub anchor_id: String,
    /// Source document path relative to the package base directory; the
    /// join key for navigation and paragraph-identity chapter hashing.
    pub original_href: String,
    /// Body fragment with rewritten asset paths.
    pub content: String,
}

/// The merged virtual document handed to the rendering surface.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    pub chapters: Vec<ChapterContainer>,
    /// Stylesheet hrefs relative to the base directory, in manifest-id order.
    pub stylesheets: Vec<String>,
    /// The complete single-document HTML artifact.
    pub html: String,
}

/// Merge all spine chapters into one document.
///
/// Pure transform over already-extracted files: reading chapter files is
/// the only I/O, and a read failure degrades to a placeholder.
pub fn assemble(pkg: &PackageDocument, toc: &[TocNode]) -> AssembledDocument {
    let mut chapters = Vec::with_capacity(pkg.spine.len());

    for (index, item) in pkg.spine_items().enumerate() {
        let anchor_id = format!("chapter-{index}");
        let content = match fs::read(&item.path) {
            Ok(bytes) => {
                let text = decode_text(&bytes, extract_xml_encoding(&bytes));
                let body = extract_body(&text);
                rewrite_relative_paths(body, href_dir(&item.href))
            }
            Err(e) => {
                tracing::warn!(href = %item.href, error = %e, "chapter unreadable, emitting placeholder");
                format!(
                    "<p class=\"load-error\">Could not load {}</p>",
                    escape_html(&item.href)
                )
            }
        };

        chapters.push(ChapterContainer {
            anchor_id,
            original_href: item.href.clone(),
            content,
        });
    }

    let stylesheets: Vec<String> = pkg
        .stylesheets()
        .into_iter()
        .map(|item| item.href.clone())
        .collect();

    let title = pkg.metadata.title.clone();
    let author = pkg.metadata.author.clone();
    let html = render_document(title.as_deref(), &chapters, &stylesheets, toc);

    AssembledDocument {
        title,
        author,
        chapters,
        stylesheets,
        html,
    }
}

/// The fragment between `<body...>` and `</body>`, case-insensitive.
/// Documents without body tags are used whole.
pub fn extract_body(html: &str) -> &str {
    let bytes = html.as_bytes();
    let lower: Vec<u8> = bytes.iter().map(|b| b.to_ascii_lowercase()).collect();

    let Some(open) = memmem::find(&lower, b"<body") else {
        return html;
    };
    // "<body" must not match "<bodytext" or similar.
    match lower.get(open + 5) {
        Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {}
        _ => return html,
    }
    let Some(gt) = memchr::memchr(b'>', &lower[open..]) else {
        return html;
    };
    let start = open + gt + 1;

    let end = memmem::find(&lower[start..], b"</body")
        .map(|off| start + off)
        .unwrap_or(html.len());

    &html[start..end]
}

/// Rewrite every relative `src`/`href`/`xlink:href` attribute in the
/// fragment so it resolves against the final single-document context.
/// `chapter_dir` is the chapter's directory relative to the base directory.
/// Absolute URLs, `data:`/`blob:` URIs, and bare fragments are untouched.
pub fn rewrite_relative_paths(fragment: &str, chapter_dir: &str) -> String {
    let bytes = fragment.as_bytes();
    let mut out = String::with_capacity(fragment.len() + 64);
    let mut i = 0;

    while i < bytes.len() {
        let Some(off) = memchr::memchr(b'<', &bytes[i..]) else {
            out.push_str(&fragment[i..]);
            break;
        };
        let tag_start = i + off;
        out.push_str(&fragment[i..tag_start]);

        let Some(gt_off) = memchr::memchr(b'>', &bytes[tag_start..]) else {
            out.push_str(&fragment[tag_start..]);
            break;
        };
        let tag_end = tag_start + gt_off + 1;
        let tag = &fragment[tag_start..tag_end];

        if tag.starts_with("</") || tag.starts_with("<!") || tag.starts_with("<?") {
            out.push_str(tag);
        } else {
            out.push_str(&rewrite_tag(tag, chapter_dir));
        }
        i = tag_end;
    }

    out
}

/// Rewrite URL-bearing attribute values within a single `<tag ...>` slice.
fn rewrite_tag(tag: &str, chapter_dir: &str) -> String {
    let bytes = tag.as_bytes();
    // (value_start, value_end, replacement)
    let mut edits: Vec<(usize, usize, String)> = Vec::new();

    let mut i = 1; // past '<'
    // Skip the element name.
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
        i += 1;
    }

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'>' {
            break;
        }

        // Attribute name.
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'>'
        {
            i += 1;
        }
        let name = &tag[name_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue; // bare attribute
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let quote = bytes[i];
        if quote != b'"' && quote != b'\'' {
            // Unquoted value: runs to whitespace or '>'.
            let value_start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                i += 1;
            }
            maybe_edit(&mut edits, tag, name, value_start, i, chapter_dir);
            continue;
        }

        i += 1;
        let value_start = i;
        let Some(close) = memchr::memchr(quote, &bytes[i..]) else {
            break;
        };
        let value_end = i + close;
        maybe_edit(&mut edits, tag, name, value_start, value_end, chapter_dir);
        i = value_end + 1;
    }

    if edits.is_empty() {
        return tag.to_string();
    }

    let mut out = String::with_capacity(tag.len() + 32);
    let mut last = 0;
    for (start, end, replacement) in edits {
        out.push_str(&tag[last..start]);
        out.push_str(&replacement);
        last = end;
    }
    out.push_str(&tag[last..]);
    out
}

fn maybe_edit(
    edits: &mut Vec<(usize, usize, String)>,
    tag: &str,
    name: &str,
    value_start: usize,
    value_end: usize,
    chapter_dir: &str,
) {
    let is_url_attr = name.eq_ignore_ascii_case("src")
        || name.eq_ignore_ascii_case("href")
        || name.eq_ignore_ascii_case("xlink:href");
    if !is_url_attr {
        return;
    }

    let value = &tag[value_start..value_end];
    if let Some(rewritten) = resolve_relative(value, chapter_dir) {
        edits.push((value_start, value_end, rewritten));
    }
}

/// Resolve a possibly-relative href against the chapter directory.
/// Returns `None` when the value must be left untouched.
fn resolve_relative(value: &str, chapter_dir: &str) -> Option<String> {
    if value.is_empty() || value.starts_with('#') || has_scheme(value) {
        return None;
    }
    if chapter_dir.is_empty() {
        // Already relative to the document root; normalization only.
        return Some(split_fragment_join("", value));
    }
    Some(split_fragment_join(chapter_dir, value))
}

fn split_fragment_join(base: &str, value: &str) -> String {
    match value.split_once('#') {
        Some((path, fragment)) if !path.is_empty() => {
            format!("{}#{}", join_href(base, path), fragment)
        }
        _ => join_href(base, value),
    }
}

// ----------------------------------------------------------------------------
// Final document rendering
// ----------------------------------------------------------------------------

fn render_document(
    title: Option<&str>,
    chapters: &[ChapterContainer],
    stylesheets: &[String],
    toc: &[TocNode],
) -> String {
    let mut html = String::with_capacity(
        chapters.iter().map(|c| c.content.len() + 128).sum::<usize>() + 1024,
    );

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n");
    if let Some(title) = title {
        html.push_str("<title>");
        html.push_str(&escape_html(title));
        html.push_str("</title>\n");
    }
    for href in stylesheets {
        html.push_str("<link rel=\"stylesheet\" type=\"text/css\" href=\"");
        html.push_str(&escape_html(href));
        html.push_str("\"/>\n");
    }
    html.push_str("</head>\n<body>\n");

    if !toc.is_empty() {
        html.push_str("<nav class=\"book-outline\" id=\"outline\">\n");
        render_outline(&mut html, toc, chapters);
        html.push_str("</nav>\n");
    }

    for chapter in chapters {
        html.push_str("<section class=\"chapter\" id=\"");
        html.push_str(&chapter.anchor_id);
        html.push_str("\" data-href=\"");
        html.push_str(&escape_html(&chapter.original_href));
        html.push_str("\">\n");
        html.push_str(&chapter.content);
        html.push_str("\n</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_outline(html: &mut String, nodes: &[TocNode], chapters: &[ChapterContainer]) {
    html.push_str("<ol>\n");
    for node in nodes {
        html.push_str("<li>");
        match node.href.as_deref().and_then(|h| anchor_for(h, chapters)) {
            Some(anchor) => {
                html.push_str("<a href=\"");
                html.push_str(&escape_html(&anchor));
                html.push_str("\">");
                html.push_str(&escape_html(&node.title));
                html.push_str("</a>");
            }
            None => html.push_str(&escape_html(&node.title)),
        }
        if !node.children.is_empty() {
            html.push('\n');
            render_outline(html, &node.children, chapters);
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ol>\n");
}

/// Map a TOC href onto an in-document anchor: the fragment if it names one
/// (element ids survive assembly), else the chapter container's anchor.
fn anchor_for(href: &str, chapters: &[ChapterContainer]) -> Option<String> {
    let (path, fragment) = match href.split_once('#') {
        Some((p, f)) => (p, Some(f)),
        None => (href, None),
    };

    if let Some(fragment) = fragment
        && !fragment.is_empty()
    {
        return Some(format!("#{fragment}"));
    }

    chapters
        .iter()
        .find(|c| c.original_href == path)
        .map(|c| format!("#{}", c.anchor_id))
}
