//! EPUB container extraction.

use std::fs;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{Error, Result};

/// Extract every entry of an EPUB (ZIP) archive into `dest_dir`,
/// preserving relative paths.
///
/// Pre-existing files are silently replaced, so re-extraction into the
/// same directory is allowed; callers wanting a pristine tree should hand
/// in a fresh temp directory. Entries whose names would escape `dest_dir`
/// are skipped rather than written outside the root.
pub fn extract_archive(epub_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = fs::File::open(epub_path)
        .map_err(|e| Error::Extraction(format!("cannot open {}: {e}", epub_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::Extraction(format!("corrupt archive: {e}")))?;

    fs::create_dir_all(dest_dir)
        .map_err(|e| Error::Extraction(format!("cannot create {}: {e}", dest_dir.display())))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Extraction(format!("corrupt archive entry {i}: {e}")))?;

        let Some(rel_path) = entry.enclosed_name() else {
            tracing::debug!(name = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let out_path = dest_dir.join(rel_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| {
                Error::Extraction(format!("cannot create {}: {e}", out_path.display()))
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Extraction(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut out = fs::File::create(&out_path)
            .map_err(|e| Error::Extraction(format!("cannot write {}: {e}", out_path.display())))?;
        io::copy(&mut entry, &mut out)
            .map_err(|e| Error::Extraction(format!("cannot write {}: {e}", out_path.display())))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_test_zip(path: &Path) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        zip.start_file("mimetype", options).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        zip.start_file("OEBPS/text/ch1.html", options).unwrap();
        zip.write_all(b"<html><body><p>hi</p></body></html>").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn extracts_entries_preserving_paths() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("book.epub");
        write_test_zip(&epub);

        let dest = dir.path().join("out");
        extract_archive(&epub, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("mimetype")).unwrap(),
            "application/epub+zip"
        );
        assert!(dest.join("OEBPS/text/ch1.html").is_file());
    }

    #[test]
    fn re_extraction_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("book.epub");
        write_test_zip(&epub);

        let dest = dir.path().join("out");
        extract_archive(&epub, &dest).unwrap();
        fs::write(dest.join("mimetype"), "stale").unwrap();
        extract_archive(&epub, &dest).unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("mimetype")).unwrap(),
            "application/epub+zip"
        );
    }

    #[test]
    fn corrupt_archive_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.epub");
        fs::write(&bogus, b"this is not a zip file").unwrap();

        let err = extract_archive(&bogus, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
