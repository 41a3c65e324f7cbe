//! Table-of-contents resolution.
//!
//! Resolution is tiered; the first tier yielding any nodes wins:
//!
//! 1. EPUB2 NCX (`spine@toc` or NCX media type)
//! 2. EPUB3 nav document (`properties="nav"`)
//! 3. Spine-order synthesis with title inference
//! 4. Manifest enumeration (HTML items sorted by id)
//!
//! This never errors: an empty outline is an acceptable terminal result
//! that only degrades navigation.

mod nav;
mod ncx;
mod title;

pub use nav::parse_nav;
pub use ncx::parse_ncx;
pub use title::{extract_chapter_title, looks_autogenerated};

use std::fs;

use crate::package::{ManifestItem, PackageDocument};
use crate::util::{decode_text, extract_xml_encoding, href_stem};

/// Deepest level the outline UI renders; deeper nodes display at this
/// level but keep their real `level` internally.
pub const MAX_DISPLAY_LEVEL: usize = 3;

/// One node of the navigable outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocNode {
    pub title: String,
    /// Target document path (relative to the package base directory),
    /// optionally with a `#fragment`.
    pub href: Option<String>,
    /// Nesting depth, 1-based, unclamped.
    pub level: usize,
    pub children: Vec<TocNode>,
}

impl TocNode {
    pub fn new(title: impl Into<String>, href: Option<String>, level: usize) -> Self {
        Self {
            title: title.into(),
            href,
            level,
            children: Vec::new(),
        }
    }

    /// Level clamped to what the outline UI can present.
    pub fn display_level(&self) -> usize {
        self.level.min(MAX_DISPLAY_LEVEL)
    }
}

/// Resolve the table of contents for a parsed package.
pub fn resolve_toc(pkg: &PackageDocument) -> Vec<TocNode> {
    if let Some(item) = pkg.ncx_item()
        && let Ok(bytes) = fs::read(&item.path)
    {
        let nodes = parse_ncx(&decode_text(&bytes, extract_xml_encoding(&bytes)));
        if !nodes.is_empty() {
            tracing::debug!(href = %item.href, nodes = nodes.len(), "TOC resolved from NCX");
            return nodes;
        }
    }

    if let Some(item) = pkg.nav_item()
        && let Ok(bytes) = fs::read(&item.path)
    {
        let nodes = parse_nav(&decode_text(&bytes, extract_xml_encoding(&bytes)));
        if !nodes.is_empty() {
            tracing::debug!(href = %item.href, nodes = nodes.len(), "TOC resolved from nav document");
            return nodes;
        }
    }

    let nodes = spine_outline(pkg);
    if !nodes.is_empty() {
        tracing::debug!(nodes = nodes.len(), "TOC synthesized from spine");
        return nodes;
    }

    let nodes = manifest_outline(pkg);
    tracing::debug!(nodes = nodes.len(), "TOC synthesized from manifest");
    nodes
}

/// Tier 3: one flat node per HTML spine item.
fn spine_outline(pkg: &PackageDocument) -> Vec<TocNode> {
    pkg.spine_items()
        .filter(|item| item.is_html())
        .map(|item| synthesized_node(item))
        .collect()
}

/// Tier 4: HTML manifest items sorted by id.
fn manifest_outline(pkg: &PackageDocument) -> Vec<TocNode> {
    let mut items: Vec<&ManifestItem> = pkg.manifest.values().filter(|i| i.is_html()).collect();
    items.sort_by(|a, b| a.id.cmp(&b.id));
    items.into_iter().map(synthesized_node).collect()
}

fn synthesized_node(item: &ManifestItem) -> TocNode {
    let candidate = href_stem(&item.href);

    let title = if looks_autogenerated(candidate, &item.href) {
        chapter_title_from_file(item).unwrap_or_else(|| candidate.to_string())
    } else {
        candidate.to_string()
    };

    TocNode::new(title, Some(item.href.clone()), 1)
}

fn chapter_title_from_file(item: &ManifestItem) -> Option<String> {
    let bytes = fs::read(&item.path).ok()?;
    extract_chapter_title(&decode_text(&bytes, extract_xml_encoding(&bytes)))
}
