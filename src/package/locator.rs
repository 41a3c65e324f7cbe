//! OPF package document location.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};
use crate::util::{decode_text, extract_xml_encoding};

/// Conventional OPF locations probed when container.xml is missing,
/// malformed, or points at a file that does not exist. EPUBs in the wild
/// frequently mis-specify container.xml, so these are tried in order.
const CONVENTIONAL_PATHS: &[&str] = &[
    "OEBPS/content.opf",
    "OPS/content.opf",
    "content.opf",
    "OEBPS/package.opf",
    "OPS/package.opf",
    "package.opf",
];

/// Locate the OPF package document under an extracted EPUB root.
///
/// Tries `META-INF/container.xml` first, then the conventional paths.
pub fn locate_package(root: &Path) -> Result<PathBuf> {
    if let Some(path) = container_rootfile(root) {
        if path.is_file() {
            return Ok(path);
        }
        tracing::debug!(
            path = %path.display(),
            "container.xml rootfile does not exist, probing conventional paths"
        );
    }

    for candidate in CONVENTIONAL_PATHS {
        let path = root.join(candidate);
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(Error::PackageNotFound(format!(
        "no OPF document under {}",
        root.display()
    )))
}

/// Read the `full-path` of the first `<rootfile>` in container.xml.
fn container_rootfile(root: &Path) -> Option<PathBuf> {
    let bytes = fs::read(root.join("META-INF/container.xml")).ok()?;
    let content = decode_text(&bytes, extract_xml_encoding(&bytes));

    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        let full_path = String::from_utf8_lossy(&attr.value).into_owned();
                        return Some(root.join(full_path));
                    }
                }
            }
            Ok(Event::Eof) => break,
            // Malformed container.xml falls back to the conventional probe.
            Err(_) => break,
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn locates_via_container_xml() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "META-INF/container.xml",
            r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="custom/book.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        );
        write(dir.path(), "custom/book.opf", "<package/>");

        let found = locate_package(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("custom/book.opf"));
    }

    #[test]
    fn falls_back_to_conventional_paths() {
        let dir = tempfile::tempdir().unwrap();
        // No container.xml at all.
        write(dir.path(), "OPS/content.opf", "<package/>");

        let found = locate_package(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("OPS/content.opf"));
    }

    #[test]
    fn container_pointing_at_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "META-INF/container.xml",
            r#"<container><rootfiles><rootfile full-path="nowhere.opf"/></rootfiles></container>"#,
        );
        write(dir.path(), "OEBPS/package.opf", "<package/>");

        let found = locate_package(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("OEBPS/package.opf"));
    }

    #[test]
    fn missing_everywhere_is_package_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_package(dir.path()).unwrap_err();
        assert!(matches!(err, Error::PackageNotFound(_)));
    }
}
