//! EPUB2 NCX parsing.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::toc::TocNode;
use crate::util::{local_name, normalize_whitespace, resolve_entity};

/// Parse an NCX document into an outline tree.
///
/// Each `navPoint` becomes a node: `navLabel/text` is the title,
/// `content/@src` the href, nesting depth the level. Arbitrary depth is
/// handled with an explicit stack. Malformed input yields whatever was
/// parsed before the error; never fails.
pub fn parse_ncx(content: &str) -> Vec<TocNode> {
    let mut reader = Reader::from_str(content);
    // Text is collected raw and normalized at the end, so whitespace
    // around entity references survives ("Tom &amp; Jerry").
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    struct NavPointState {
        children: Vec<TocNode>,
        text: Option<String>,
        src: Option<String>,
        level: usize,
    }

    // Index 0 is the virtual root collecting top-level navPoints.
    let mut stack: Vec<NavPointState> = vec![NavPointState {
        children: Vec::new(),
        text: None,
        src: None,
        level: 0,
    }];
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"navPoint" => {
                        let level = stack.len();
                        stack.push(NavPointState {
                            children: Vec::new(),
                            text: None,
                            src: None,
                            level,
                        });
                    }
                    b"text" => in_text = true,
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if local == b"content" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"src"
                            && let Some(state) = stack.last_mut()
                        {
                            state.src = Some(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(e.as_ref());
                    match &mut state.text {
                        Some(existing) => existing.push_str(&raw),
                        None => state.text = Some(raw.into_owned()),
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text && let Some(state) = stack.last_mut() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        match &mut state.text {
                            Some(existing) => existing.push_str(&resolved),
                            None => state.text = Some(resolved),
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                match local {
                    b"text" => in_text = false,
                    b"navPoint" => {
                        // The virtual root never pops.
                        if stack.len() > 1
                            && let Some(state) = stack.pop()
                        {
                            let title = normalize_whitespace(state.text.as_deref().unwrap_or(""));
                            // Untitled leaves are noise; untitled branches
                            // still carry their children.
                            if !title.is_empty() || !state.children.is_empty() {
                                let mut node = TocNode::new(title, state.src, state.level);
                                node.children = state.children;
                                if let Some(parent) = stack.last_mut() {
                                    parent.children.push(node);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping NCX parse on malformed XML");
                break;
            }
            _ => {}
        }
    }

    stack.swap_remove(0).children
}
