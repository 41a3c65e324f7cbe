//! EPUB3 nav document parsing.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::toc::TocNode;
use crate::util::{local_name, normalize_whitespace, resolve_entity};

/// Parse the first `<ol>` of an EPUB3 nav document structurally.
///
/// Each `<li>` becomes a node; the title is the first anchor's inner text,
/// the href its `href` attribute, the level the nested-`<ol>` depth.
/// Subsequent lists (landmarks, page-list) are ignored. Never fails;
/// malformed documents yield whatever was parsed.
pub fn parse_nav(content: &str) -> Vec<TocNode> {
    let mut reader = Reader::from_str(content);
    // Raw text events; titles are whitespace-normalized when the frame
    // closes, so entity-adjacent spacing survives.
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    struct LiFrame {
        title: String,
        href: Option<String>,
        children: Vec<TocNode>,
        level: usize,
        got_anchor: bool,
    }

    let mut roots: Vec<TocNode> = Vec::new();
    let mut stack: Vec<LiFrame> = Vec::new();
    let mut ol_depth = 0usize;
    let mut in_anchor = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"ol" => ol_depth += 1,
                    b"li" if ol_depth > 0 => {
                        stack.push(LiFrame {
                            title: String::new(),
                            href: None,
                            children: Vec::new(),
                            level: ol_depth,
                            got_anchor: false,
                        });
                    }
                    b"a" => {
                        if let Some(frame) = stack.last_mut()
                            && !frame.got_anchor
                        {
                            in_anchor = true;
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"href" {
                                    frame.href =
                                        Some(String::from_utf8_lossy(&attr.value).into_owned());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"a"
                    && let Some(frame) = stack.last_mut()
                    && !frame.got_anchor
                {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"href" {
                            frame.href = Some(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                    frame.got_anchor = true;
                }
            }
            Ok(Event::Text(e)) => {
                if in_anchor && let Some(frame) = stack.last_mut() {
                    frame.title.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_anchor && let Some(frame) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        frame.title.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"a" => {
                        if in_anchor {
                            in_anchor = false;
                            if let Some(frame) = stack.last_mut() {
                                frame.got_anchor = true;
                            }
                        }
                    }
                    b"li" => {
                        if let Some(frame) = stack.pop() {
                            let title = normalize_whitespace(&frame.title);
                            if !title.is_empty() || !frame.children.is_empty() {
                                let mut node = TocNode::new(title, frame.href, frame.level);
                                node.children = frame.children;
                                match stack.last_mut() {
                                    Some(parent) => parent.children.push(node),
                                    None => roots.push(node),
                                }
                            }
                        }
                    }
                    b"ol" => {
                        if ol_depth > 0 {
                            ol_depth -= 1;
                            // Only the first top-level list contributes.
                            if ol_depth == 0 {
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping nav parse on malformed XML");
                break;
            }
            _ => {}
        }
    }

    roots
}
