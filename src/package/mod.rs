//! Package document (OPF) location and parsing.

mod locator;
mod parser;

pub use locator::locate_package;
pub use parser::parse_package;

use std::collections::HashMap;
use std::path::PathBuf;

/// One `<item>` from the package manifest.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    /// Percent-decoded href, relative to the package base directory.
    pub href: String,
    /// Absolute path on disk (base directory joined with `href`).
    pub path: PathBuf,
    pub media_type: String,
    /// Raw `properties` attribute (EPUB3: "nav", "cover-image", ...).
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == property))
    }

    /// True for content documents that can appear in the reading order.
    pub fn is_html(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html" | "application/html" | "application/x-dtbook+xml"
        )
    }
}

/// Title/author metadata extracted from the package document.
#[derive(Debug, Clone, Default)]
pub struct PackageMetadata {
    /// First `<dc:title>`, whitespace-trimmed. Absence is not fatal; the
    /// pipeline falls back to the archive filename.
    pub title: Option<String>,
    /// First `<dc:creator>`, whitespace-trimmed.
    pub author: Option<String>,
    /// Cover image href (EPUB3 `cover-image` property, else EPUB2
    /// `<meta name="cover">`), relative to the base directory.
    pub cover_href: Option<String>,
}

/// Parsed package document: manifest, spine, and metadata.
#[derive(Debug, Clone)]
pub struct PackageDocument {
    pub metadata: PackageMetadata,
    /// Manifest keyed by item id.
    pub manifest: HashMap<String, ManifestItem>,
    /// Reading order: manifest ids in document order. Every id resolves to
    /// a manifest entry; unresolvable idrefs were dropped during parse.
    pub spine: Vec<String>,
    /// `toc` attribute of `<spine>` (NCX manifest id), if present.
    pub toc_id: Option<String>,
    /// Directory containing the OPF file.
    pub base_dir: PathBuf,
}

impl PackageDocument {
    /// Spine entries resolved to manifest items, in reading order.
    pub fn spine_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.spine.iter().filter_map(|id| self.manifest.get(id))
    }

    /// The NCX document, located via `spine@toc` or by media type.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        if let Some(id) = &self.toc_id
            && let Some(item) = self.manifest.get(id)
        {
            return Some(item);
        }
        // Fallback: any manifest item declaring the NCX DTD media type.
        // Sorted by id so ties resolve deterministically.
        self.manifest
            .values()
            .filter(|item| item.media_type == "application/x-dtbncx+xml")
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// The EPUB3 navigation document (`properties="nav"`).
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .values()
            .filter(|item| item.has_property("nav"))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Stylesheet manifest items, sorted by id for deterministic output.
    pub fn stylesheets(&self) -> Vec<&ManifestItem> {
        let mut items: Vec<&ManifestItem> = self
            .manifest
            .values()
            .filter(|item| item.media_type == "text/css")
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}
