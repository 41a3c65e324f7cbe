//! OPF package document parsing.
//!
//! The contract is "extract these facts even if the rest of the document
//! is malformed": the event loop skips anything it does not recognize and
//! a mid-document parse error keeps whatever was extracted up to that
//! point instead of failing the load.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::package::{ManifestItem, PackageDocument, PackageMetadata};
use crate::util::{join_href, local_name, percent_decode, resolve_entity};

/// Raw manifest row before href resolution.
#[derive(Default)]
struct RawItem {
    href: String,
    media_type: String,
    properties: Option<String>,
}

/// Parse an OPF document. `base_dir` is the directory containing the OPF,
/// used to resolve relative hrefs to on-disk paths.
pub fn parse_package(content: &str, base_dir: &Path) -> PackageDocument {
    let mut reader = Reader::from_str(content);
    // Metadata text is collected raw and normalized on the end tag, so
    // whitespace around entity references survives.
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut metadata = PackageMetadata::default();
    let mut raw_items: HashMap<String, RawItem> = HashMap::new();
    let mut item_order: Vec<String> = Vec::new();
    let mut spine_idrefs: Vec<String> = Vec::new();
    let mut toc_id: Option<String> = None;
    let mut epub2_cover_id: Option<String> = None;

    let mut in_metadata = false;
    let mut current_element: Option<&'static str> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                match local {
                    b"metadata" => in_metadata = true,
                    b"title" if in_metadata => {
                        current_element = Some("title");
                        buf_text.clear();
                    }
                    b"creator" if in_metadata => {
                        current_element = Some("creator");
                        buf_text.clear();
                    }
                    b"spine" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"toc" {
                                toc_id = Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    b"item" | b"itemref" | b"meta" => handle_structural_element(
                        local,
                        &e,
                        &mut raw_items,
                        &mut item_order,
                        &mut spine_idrefs,
                        &mut epub2_cover_id,
                    ),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());
                if matches!(local, b"item" | b"itemref" | b"meta") {
                    handle_structural_element(
                        local,
                        &e,
                        &mut raw_items,
                        &mut item_order,
                        &mut spine_idrefs,
                        &mut epub2_cover_id,
                    );
                }
            }
            Ok(Event::Text(e)) => {
                if current_element.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current_element.is_some() {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        buf_text.push_str(&resolved);
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let local = local_name(name.as_ref());

                if local == b"metadata" {
                    in_metadata = false;
                }

                if let Some(elem) = current_element.take() {
                    let text = crate::util::normalize_whitespace(&buf_text);
                    if !text.is_empty() {
                        match elem {
                            // Only the first title/creator counts.
                            "title" if metadata.title.is_none() => {
                                metadata.title = Some(text);
                            }
                            "creator" if metadata.author.is_none() => {
                                metadata.author = Some(text);
                            }
                            _ => {}
                        }
                    }
                    buf_text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(error = %e, "stopping OPF parse on malformed XML");
                break;
            }
            _ => {}
        }
    }

    // Cover detection: EPUB3 `cover-image` property wins over the EPUB2
    // `<meta name="cover">` indirection. Ordered scan keeps this
    // deterministic when (pathologically) several items claim the cover.
    let epub3_cover = item_order.iter().find(|id| {
        raw_items.get(*id).is_some_and(|item| {
            item.properties
                .as_deref()
                .is_some_and(|p| p.split_ascii_whitespace().any(|p| p == "cover-image"))
        })
    });
    if let Some(id) = epub3_cover {
        metadata.cover_href = raw_items.get(id).map(|item| percent_decode(&item.href));
    } else if let Some(id) = epub2_cover_id
        && let Some(item) = raw_items.get(&id)
    {
        metadata.cover_href = Some(percent_decode(&item.href));
    }

    // Resolve hrefs against the base directory.
    let manifest: HashMap<String, ManifestItem> = raw_items
        .into_iter()
        .map(|(id, raw)| {
            let href = join_href("", &percent_decode(&raw.href));
            let path = base_dir.join(&href);
            (
                id.clone(),
                ManifestItem {
                    id,
                    href,
                    path,
                    media_type: raw.media_type,
                    properties: raw.properties,
                },
            )
        })
        .collect();

    // Drop spine entries whose idref resolves to nothing; one bad itemref
    // must not abort the book.
    let spine: Vec<String> = spine_idrefs
        .into_iter()
        .filter(|id| {
            let known = manifest.contains_key(id);
            if !known {
                tracing::debug!(idref = %id, "dropping unresolvable spine idref");
            }
            known
        })
        .collect();

    PackageDocument {
        metadata,
        manifest,
        spine,
        toc_id,
        base_dir: base_dir.to_path_buf(),
    }
}

/// Shared handler for `<item>`, `<itemref>`, and `<meta>` — these appear
/// both self-closed and with explicit end tags in the wild.
fn handle_structural_element(
    local: &[u8],
    e: &BytesStart,
    raw_items: &mut HashMap<String, RawItem>,
    item_order: &mut Vec<String>,
    spine_idrefs: &mut Vec<String>,
    epub2_cover_id: &mut Option<String>,
) {
    match local {
        b"item" => {
            let mut id = String::new();
            let mut raw = RawItem::default();

            for attr in e.attributes().flatten() {
                let value = String::from_utf8_lossy(&attr.value).into_owned();
                match attr.key.as_ref() {
                    b"id" => id = value,
                    b"href" => raw.href = value,
                    b"media-type" => raw.media_type = value,
                    b"properties" => raw.properties = Some(value),
                    _ => {}
                }
            }

            if !id.is_empty() && !raw.href.is_empty() {
                if !raw_items.contains_key(&id) {
                    item_order.push(id.clone());
                }
                raw_items.insert(id, raw);
            }
        }
        b"itemref" => {
            for attr in e.attributes().flatten() {
                if attr.key.as_ref() == b"idref" {
                    spine_idrefs.push(String::from_utf8_lossy(&attr.value).into_owned());
                }
            }
        }
        b"meta" => {
            let mut is_cover = false;
            let mut cover_id = String::new();

            for attr in e.attributes().flatten() {
                match attr.key.as_ref() {
                    b"name" if attr.value.as_ref() == b"cover" => is_cover = true,
                    b"content" => cover_id = String::from_utf8_lossy(&attr.value).into_owned(),
                    _ => {}
                }
            }

            if is_cover && !cover_id.is_empty() && epub2_cover_id.is_none() {
                *epub2_cover_id = Some(cover_id);
            }
        }
        _ => {}
    }
}
