//! The book-load pipeline: extract, locate, parse, resolve, assemble,
//! identify.
//!
//! Each stage's output is a fresh, independently owned artifact, so an
//! in-flight load superseded by a newer one can simply be dropped; nothing
//! shared is mutated until the session object is handed back.

use std::fs;
use std::path::Path;

use tracing::info_span;

use crate::archive::extract_archive;
use crate::assemble::{AssembledDocument, assemble};
use crate::error::Result;
use crate::identity::{AnnotationRecord, DocumentIndex, MatchResult};
use crate::package::{PackageDocument, locate_package, parse_package};
use crate::toc::{TocNode, resolve_toc};
use crate::util::{decode_text, extract_xml_encoding};

/// Everything one loaded book owns: the assembled document, its outline,
/// and the paragraph index used for annotation matching.
///
/// Created per load and discarded on reload or unload — the explicit
/// replacement for any process-wide per-paragraph cache.
#[derive(Debug)]
pub struct BookSession {
    /// Display title: package metadata, falling back to the filename.
    pub title: String,
    pub author: Option<String>,
    pub toc: Vec<TocNode>,
    pub document: AssembledDocument,
    pub index: DocumentIndex,
}

impl BookSession {
    /// Re-attach externally stored annotation records to paragraphs of
    /// the current document. Pure read; safe to call repeatedly.
    pub fn attach_annotations(&self, records: &[AnnotationRecord]) -> Vec<MatchResult> {
        self.index.match_records(records)
    }
}

/// Load an EPUB into a fresh session. `work_dir` receives the extracted
/// archive and should be a fresh temp directory per load.
pub fn load_book(epub_path: &Path, work_dir: &Path) -> Result<BookSession> {
    let span = info_span!("load_book", path = %epub_path.display());
    let _guard = span.enter();

    {
        let _stage = info_span!("extract").entered();
        extract_archive(epub_path, work_dir)?;
    }

    let pkg = {
        let _stage = info_span!("parse_package").entered();
        let opf_path = locate_package(work_dir)?;
        let base_dir = opf_path.parent().unwrap_or(work_dir).to_path_buf();
        let opf_bytes = fs::read(&opf_path)?;
        parse_package(
            &decode_text(&opf_bytes, extract_xml_encoding(&opf_bytes)),
            &base_dir,
        )
    };
    tracing::debug!(
        manifest = pkg.manifest.len(),
        spine = pkg.spine.len(),
        "package parsed"
    );

    let toc = {
        let _stage = info_span!("resolve_toc").entered();
        resolve_toc(&pkg)
    };

    let document = {
        let _stage = info_span!("assemble").entered();
        assemble(&pkg, &toc)
    };

    let index = {
        let _stage = info_span!("identify").entered();
        DocumentIndex::build(&document)
    };
    tracing::debug!(
        chapters = document.chapters.len(),
        paragraphs = index.len(),
        "document assembled"
    );

    let title = session_title(&pkg, epub_path);
    let author = pkg.metadata.author.clone();

    Ok(BookSession {
        title,
        author,
        toc,
        document,
        index,
    })
}

/// Metadata title, else the archive filename stem.
fn session_title(pkg: &PackageDocument, epub_path: &Path) -> String {
    pkg.metadata.title.clone().unwrap_or_else(|| {
        epub_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    })
}
