//! # folio
//!
//! An EPUB ingestion pipeline for reader applications: unpack an EPUB,
//! parse its package structure (manifest, spine, table of contents),
//! merge the spine into one navigable document, and assign every
//! paragraph a stable identity that external annotations and chat records
//! can re-attach to across sessions.
//!
//! ## Quick Start
//!
//! ```no_run
//! use folio::{AnnotationRecord, load_book};
//!
//! let work_dir = tempfile::tempdir().unwrap();
//! let session = folio::load_book("book.epub".as_ref(), work_dir.path()).unwrap();
//!
//! println!("{} — {} chapters", session.title, session.document.chapters.len());
//!
//! // Re-attach stored annotations to the freshly assembled document.
//! let records = vec![AnnotationRecord {
//!     paragraph_id: Some("p-79e323a0-0-0a1b2c3d".into()),
//!     related_text: "highlighted passage".into(),
//! }];
//! for result in session.attach_annotations(&records) {
//!     match result.block_position {
//!         Some(pos) => println!("record {} -> paragraph {pos}", result.record_index),
//!         None => println!("record {} unmatched this session", result.record_index),
//!     }
//! }
//! ```
//!
//! Only two failure classes abort a load (unreadable archive, no package
//! document); everything else degrades to a partial-but-usable result.

pub mod archive;
pub mod assemble;
pub mod error;
pub mod identity;
pub mod package;
pub mod pipeline;
pub mod toc;
pub(crate) mod util;

pub use archive::extract_archive;
pub use assemble::{AssembledDocument, ChapterContainer, assemble};
pub use error::{Error, Result};
pub use identity::{AnnotationRecord, DocumentIndex, MatchResult, ParagraphBlock, hash8};
pub use package::{
    ManifestItem, PackageDocument, PackageMetadata, locate_package, parse_package,
};
pub use pipeline::{BookSession, load_book};
pub use toc::{TocNode, resolve_toc};
