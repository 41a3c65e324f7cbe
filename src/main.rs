//! folio - EPUB inspection tool

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use folio::{AnnotationRecord, BookSession, TocNode};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Inspect an EPUB's structure and paragraph identities", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio book.epub                     Show metadata and counts
    folio book.epub --toc               Print the outline tree
    folio book.epub -o book.html        Write the assembled document
    folio book.epub -a notes.json       Match stored annotation records")]
struct Cli {
    /// Input EPUB file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Print the table of contents
    #[arg(long)]
    toc: bool,

    /// Machine-readable JSON summary
    #[arg(long)]
    json: bool,

    /// Write the assembled single-document HTML to a file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Match annotation records (JSON array) against the document
    #[arg(short, long, value_name = "FILE")]
    annotations: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let work_dir = tempfile::tempdir().map_err(|e| e.to_string())?;
    let session = folio::load_book(&cli.input, work_dir.path()).map_err(|e| e.to_string())?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary_json(&session)).map_err(|e| e.to_string())?
        );
    } else {
        println!("File: {}", cli.input.display());
        println!("Title: {}", session.title);
        if let Some(ref author) = session.author {
            println!("Author: {author}");
        }
        println!("Chapters: {}", session.document.chapters.len());
        println!("Paragraphs: {}", session.index.len());
        println!("TOC entries: {}", count_nodes(&session.toc));

        if cli.toc {
            println!("\nTable of contents:");
            print_toc(&session.toc);
        }
    }

    if let Some(ref path) = cli.output {
        fs::write(path, &session.document.html).map_err(|e| e.to_string())?;
        eprintln!("wrote {}", path.display());
    }

    if let Some(ref path) = cli.annotations {
        let data = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let records: Vec<AnnotationRecord> =
            serde_json::from_str(&data).map_err(|e| e.to_string())?;
        report_matches(&session, &records);
    }

    Ok(())
}

fn summary_json(session: &BookSession) -> serde_json::Value {
    serde_json::json!({
        "title": session.title,
        "author": session.author,
        "chapters": session.document.chapters.len(),
        "paragraphs": session.index.len(),
        "stylesheets": session.document.stylesheets,
        "toc": toc_json(&session.toc),
    })
}

fn toc_json(nodes: &[TocNode]) -> serde_json::Value {
    serde_json::Value::Array(
        nodes
            .iter()
            .map(|n| {
                serde_json::json!({
                    "title": n.title,
                    "href": n.href,
                    "level": n.level,
                    "children": toc_json(&n.children),
                })
            })
            .collect(),
    )
}

fn print_toc(nodes: &[TocNode]) {
    for node in nodes {
        let indent = "  ".repeat(node.display_level() - 1);
        match node.href.as_deref() {
            Some(href) => println!("{indent}{} ({href})", node.title),
            None => println!("{indent}{}", node.title),
        }
        print_toc(&node.children);
    }
}

fn count_nodes(nodes: &[TocNode]) -> usize {
    nodes.len() + nodes.iter().map(|n| count_nodes(&n.children)).sum::<usize>()
}

fn report_matches(session: &BookSession, records: &[AnnotationRecord]) {
    let results = session.attach_annotations(records);
    let matched = results.iter().filter(|r| r.block_position.is_some()).count();
    println!("\nAnnotations: {matched}/{} matched", records.len());

    for result in results {
        match result.block_position {
            Some(pos) => {
                let block = &session.index.blocks()[pos];
                println!(
                    "  [{}] -> {} ({})",
                    result.record_index,
                    block.id().unwrap_or("?"),
                    preview(&block.normalized_text)
                );
            }
            None => println!("  [{}] unmatched", result.record_index),
        }
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        out.push('…');
    }
    out
}
