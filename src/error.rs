//! Error types for folio operations.

use thiserror::Error;

/// Errors that can abort a book load.
///
/// Only two failure classes are fatal to a load: the archive itself being
/// unreadable, and no package document being locatable. Everything else
/// (bad chapters, missing TOC, unmatched annotations) degrades locally and
/// never surfaces as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("no package document found: {0}")]
    PackageNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
