//! Benchmarks for the parse/identify pipeline stages.
//!
//! Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};

use folio::identity::DocumentIndex;
use folio::{AnnotationRecord, AssembledDocument, ChapterContainer, parse_package};
use folio::toc::parse_ncx;
use std::path::Path;

const CHAPTERS: usize = 40;
const PARAGRAPHS_PER_CHAPTER: usize = 120;

/// A synthetic book big enough to expose per-paragraph costs.
fn sample_document() -> AssembledDocument {
    let chapters = (0..CHAPTERS)
        .map(|c| {
            let mut content = String::new();
            content.push_str(&format!("<h1>Chapter {c}</h1>"));
            for p in 0..PARAGRAPHS_PER_CHAPTER {
                content.push_str(&format!(
                    "<p>Paragraph {p} of chapter {c}, with a sentence long \
                     enough to resemble prose from an actual book body.</p>"
                ));
            }
            ChapterContainer {
                anchor_id: format!("chapter-{c}"),
                original_href: format!("text/chap{c:03}.html"),
                content,
            }
        })
        .collect();

    AssembledDocument {
        title: Some("Benchmark Book".to_string()),
        author: None,
        chapters,
        stylesheets: Vec::new(),
        html: String::new(),
    }
}

fn sample_opf() -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for c in 0..CHAPTERS {
        manifest.push_str(&format!(
            r#"<item id="c{c}" href="text/chap{c:03}.html" media-type="application/xhtml+xml"/>"#
        ));
        spine.push_str(&format!(r#"<itemref idref="c{c}"/>"#));
    }
    format!(
        r#"<package><metadata><dc:title>Benchmark Book</dc:title></metadata>
<manifest>{manifest}</manifest><spine>{spine}</spine></package>"#
    )
}

fn sample_ncx() -> String {
    let mut points = String::new();
    for c in 0..CHAPTERS {
        points.push_str(&format!(
            r#"<navPoint><navLabel><text>Chapter {c}</text></navLabel>
<content src="text/chap{c:03}.html"/></navPoint>"#
        ));
    }
    format!("<ncx><navMap>{points}</navMap></ncx>")
}

fn bench_parse_package(c: &mut Criterion) {
    let opf = sample_opf();
    c.bench_function("parse_package", |b| {
        b.iter(|| parse_package(&opf, Path::new("OEBPS")));
    });
}

fn bench_parse_ncx(c: &mut Criterion) {
    let ncx = sample_ncx();
    c.bench_function("parse_ncx", |b| {
        b.iter(|| parse_ncx(&ncx));
    });
}

fn bench_identify(c: &mut Criterion) {
    let doc = sample_document();
    c.bench_function("identify", |b| {
        b.iter(|| DocumentIndex::build(&doc));
    });
}

fn bench_match_records(c: &mut Criterion) {
    let doc = sample_document();
    let index = DocumentIndex::build(&doc);

    // Worst case: every record forces a full fuzzy scan.
    let records: Vec<AnnotationRecord> = (0..50)
        .map(|i| AnnotationRecord {
            paragraph_id: None,
            related_text: format!("selection {i} that matches nothing in the book"),
        })
        .collect();

    c.bench_function("match_records_fuzzy_miss", |b| {
        b.iter(|| index.match_records(&records));
    });
}

criterion_group!(
    benches,
    bench_parse_package,
    bench_parse_ncx,
    bench_identify,
    bench_match_records
);
criterion_main!(benches);
