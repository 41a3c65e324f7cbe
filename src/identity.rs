//! Stable paragraph identity and annotation matching.
//!
//! Every paragraph-level block in the assembled document gets a
//! deterministic identifier derived from its chapter, its position within
//! that chapter, and a hash of its normalized text:
//!
//! ```text
//! p-<hash8(chapter href)>-<index in chapter>-<hash8(normalized text)>
//! ```
//!
//! Chapter-relative indexing is deliberate: it stays stable when other
//! chapters are added or removed from view, where a global index would
//! not. Content is part of the identity, so editing a paragraph
//! invalidates previously stored identifiers — the known trade-off.
//!
//! A legacy format (`p-<32 hex>-<global index>`) predates this scheme.
//! It is never generated anymore but is still recognized and bridged when
//! read from old stored records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::assemble::AssembledDocument;
use crate::util::{normalize_whitespace, strip_tags};

/// Elements treated as paragraph-level blocks.
const PARAGRAPH_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "pre",
];

/// Selection-menu labels that legacy text snapshots sometimes captured at
/// the end of the stored text; stripped before fuzzy matching.
const TRAILING_ACTION_TOKENS: &[&str] = &["copy", "highlight", "explain", "translate", "ask ai"];

/// Fuzzy matching skips blocks with normalized text shorter than this.
const MIN_BLOCK_TEXT_LEN: usize = 5;
/// Fuzzy matching skips record text shorter than this.
const MIN_RECORD_TEXT_LEN: usize = 2;
/// Record text must exceed this length before the "record contains block"
/// direction is considered.
const SUPERSET_MIN_LEN: usize = 10;

/// First 8 lowercase hex characters of SHA-1.
pub fn hash8(input: &str) -> String {
    let digest = sha1_smol::Sha1::from(input.as_bytes()).digest().to_string();
    digest[..8].to_string()
}

/// One paragraph-level block in the assembled document.
///
/// Blocks live in a flat arena indexed by `position`; they are never
/// mutated after the identify pass, so matching over them is a pure read.
#[derive(Debug, Clone)]
pub struct ParagraphBlock {
    /// Arena index (document order across all chapters).
    pub position: usize,
    /// The owning chapter's `original_href` ("" for chapterless content).
    pub chapter_ref: String,
    /// Ordinal among paragraph blocks within this chapter only.
    pub index_in_chapter: usize,
    /// Whitespace-collapsed, trimmed text content.
    pub normalized_text: String,
    /// `hash8` of the normalized text.
    pub content_hash: String,
    /// Assigned identifier; `None` until the identify pass runs. The
    /// `Option` doubles as the presence marker that makes identification
    /// idempotent.
    id: Option<String>,
}

impl ParagraphBlock {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// An annotation or chat record as stored by the external persistence
/// collaborator. `paragraph_id` may be current-format, legacy-format,
/// foreign-format, or absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<String>,
    #[serde(default)]
    pub related_text: String,
}

/// Result of matching one record against the current document.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub record_index: usize,
    /// Arena position of the matched block, or `None` when unmatched
    /// (the record stays in the store for a future session).
    pub block_position: Option<usize>,
}

/// The per-session paragraph arena plus its identifier lookup table.
///
/// Owned by the document session: built once per assembly, discarded on
/// reload. Matching never mutates it.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    blocks: Vec<ParagraphBlock>,
    by_id: HashMap<String, usize>,
}

impl DocumentIndex {
    /// Extract paragraph blocks from an assembled document and run the
    /// identify pass over them.
    pub fn build(doc: &AssembledDocument) -> Self {
        let mut index = Self {
            blocks: extract_blocks(doc),
            by_id: HashMap::new(),
        };
        index.identify();
        index
    }

    /// Assign identifiers to blocks that do not have one yet.
    ///
    /// Idempotent: an already-identified block is left untouched, so
    /// re-running over the same arena is a no-op.
    pub fn identify(&mut self) {
        for block in &mut self.blocks {
            if block.id.is_some() {
                continue;
            }
            let chapter_hash = if block.chapter_ref.is_empty() {
                hash8("root")
            } else {
                hash8(&block.chapter_ref)
            };
            block.id = Some(format!(
                "p-{}-{}-{}",
                chapter_hash, block.index_in_chapter, block.content_hash
            ));
        }

        self.by_id = self
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(pos, b)| b.id.clone().map(|id| (id, pos)))
            .collect();
    }

    pub fn blocks(&self) -> &[ParagraphBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// O(1) lookup of a block by its current-format identifier.
    pub fn get(&self, id: &str) -> Option<&ParagraphBlock> {
        self.by_id.get(id).map(|&pos| &self.blocks[pos])
    }

    /// Match one external record to a block position.
    ///
    /// Priority: exact id lookup, then the legacy bridge, then fuzzy text.
    /// A structured identifier that fails to resolve (legacy with no
    /// bridge hit, or current-format with no exact hit) is treated as
    /// "wrong chapter" and does NOT fall through to text matching; only
    /// foreign-format or absent ids do.
    pub fn match_record(&self, record: &AnnotationRecord) -> Option<usize> {
        if let Some(id) = record.paragraph_id.as_deref() {
            if let Some(&pos) = self.by_id.get(id) {
                return Some(pos);
            }

            if let Some(bridge) = legacy_bridge_prefix(id) {
                return self
                    .blocks
                    .iter()
                    .position(|b| b.content_hash == bridge);
            }

            if is_current_format(id) {
                return None;
            }
            // Unknown/foreign scheme: retry via text.
        }

        self.match_by_text(&record.related_text)
    }

    /// Batch matching for a record set from the external store.
    pub fn match_records(&self, records: &[AnnotationRecord]) -> Vec<MatchResult> {
        records
            .iter()
            .enumerate()
            .map(|(record_index, record)| MatchResult {
                record_index,
                block_position: self.match_record(record),
            })
            .collect()
    }

    /// Fuzzy text matching, the lowest-priority tier.
    fn match_by_text(&self, text: &str) -> Option<usize> {
        let stripped = strip_action_tokens(text);
        let needle = normalize_whitespace(&stripped).to_lowercase();
        let needle_len = needle.chars().count();
        if needle_len < MIN_RECORD_TEXT_LEN {
            return None;
        }

        for (pos, block) in self.blocks.iter().enumerate() {
            if block.normalized_text.chars().count() < MIN_BLOCK_TEXT_LEN {
                continue;
            }
            let hay = block.normalized_text.to_lowercase();
            // The record is a sub-selection of the paragraph...
            if hay.contains(&needle) {
                return Some(pos);
            }
            // ...or captured the whole paragraph plus extra noise.
            if needle_len > SUPERSET_MIN_LEN && needle.contains(&hay) {
                return Some(pos);
            }
        }

        None
    }
}

/// If `id` is a legacy-format identifier (`p-<32 hex>-<digits>`), return
/// the bridge prefix: the first 8 hex characters of its hash, lowercased.
///
/// The legacy scheme hashed the full paragraph text; the current
/// `content_hash` derives from the same normalized text, so the prefix
/// overlap bridges records across the identity-scheme migration.
pub fn legacy_bridge_prefix(id: &str) -> Option<String> {
    let rest = id.strip_prefix("p-")?;
    let (hash, index) = rest.split_at_checked(32)?;
    if !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let index = index.strip_prefix('-')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(hash[..8].to_ascii_lowercase())
}

/// True for identifiers in the current format: `p-<8 hex>-<digits>-<8 hex>`.
pub fn is_current_format(id: &str) -> bool {
    let mut parts = id.split('-');
    let (Some(p), Some(chapter), Some(index), Some(content), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    p == "p"
        && chapter.len() == 8
        && chapter.bytes().all(|b| b.is_ascii_hexdigit())
        && !index.is_empty()
        && index.bytes().all(|b| b.is_ascii_digit())
        && content.len() == 8
        && content.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Strip known trailing UI-action labels from stored record text.
fn strip_action_tokens(text: &str) -> &str {
    let mut current = text.trim_end();
    loop {
        let mut stripped = false;
        for token in TRAILING_ACTION_TOKENS {
            let Some(cut) = current.len().checked_sub(token.len()) else {
                continue;
            };
            if current.is_char_boundary(cut) && current[cut..].eq_ignore_ascii_case(token) {
                current = current[..cut].trim_end();
                stripped = true;
                break;
            }
        }
        if !stripped {
            return current;
        }
    }
}

/// Walk every chapter's content and collect paragraph-level blocks into a
/// flat arena. Nested paragraph tags of a different kind are swallowed
/// into their enclosing block; same-tag nesting is depth-counted.
fn extract_blocks(doc: &AssembledDocument) -> Vec<ParagraphBlock> {
    let mut blocks = Vec::new();

    for chapter in &doc.chapters {
        let mut index_in_chapter = 0;
        let content = chapter.content.as_str();
        let lower: Vec<u8> = content.bytes().map(|b| b.to_ascii_lowercase()).collect();
        let mut cursor = 0;

        while let Some((inner_start, inner_end, after)) = next_block(content, &lower, cursor) {
            let normalized_text = normalize_whitespace(&strip_tags(&content[inner_start..inner_end]));
            let content_hash = hash8(&normalized_text);

            blocks.push(ParagraphBlock {
                position: blocks.len(),
                chapter_ref: chapter.original_href.clone(),
                index_in_chapter,
                normalized_text,
                content_hash,
                id: None,
            });

            index_in_chapter += 1;
            cursor = after;
        }
    }

    blocks
}

/// Find the next paragraph-level element at or after `from`.
/// Returns (inner_start, inner_end, scan_resume_offset).
fn next_block(content: &str, lower: &[u8], mut from: usize) -> Option<(usize, usize, usize)> {
    while from < lower.len() {
        let off = memchr::memchr(b'<', &lower[from..])?;
        let open_at = from + off;

        let Some(tag) = paragraph_tag_at(lower, open_at) else {
            from = open_at + 1;
            continue;
        };

        let gt = match memchr::memchr(b'>', &lower[open_at..]) {
            Some(g) => open_at + g,
            None => return None,
        };
        if lower[gt - 1] == b'/' {
            // Self-closing block: empty content.
            return Some((gt, gt, gt + 1));
        }

        let inner_start = gt + 1;
        let inner_end = find_matching_close(lower, tag, inner_start);
        let after = match inner_end {
            Some(end) => {
                // Past "</tag>".
                let close_gt = memchr::memchr(b'>', &lower[end..])
                    .map(|g| end + g + 1)
                    .unwrap_or(lower.len());
                return Some((inner_start, end, close_gt));
            }
            None => lower.len(),
        };
        return Some((inner_start, content.len(), after));
    }
    None
}

/// The paragraph-level tag opening at `at` (which points at '<'), if any.
fn paragraph_tag_at(lower: &[u8], at: usize) -> Option<&'static str> {
    for tag in PARAGRAPH_TAGS {
        let name = tag.as_bytes();
        let end = at + 1 + name.len();
        if lower.len() >= end && &lower[at + 1..end] == name {
            match lower.get(end) {
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/') => {
                    return Some(tag);
                }
                _ => {}
            }
        }
    }
    None
}

/// Offset of the matching `</tag` for a block opened just before `from`,
/// counting same-tag nesting (e.g. `<li>` lists inside `<li>`).
fn find_matching_close(lower: &[u8], tag: &str, mut from: usize) -> Option<usize> {
    let open_pat = format!("<{tag}");
    let close_pat = format!("</{tag}");
    let mut depth = 1usize;

    while from < lower.len() {
        let off = memchr::memchr(b'<', &lower[from..])?;
        let at = from + off;

        if lower[at..].starts_with(close_pat.as_bytes())
            && matches!(
                lower.get(at + close_pat.len()),
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')
            )
        {
            depth -= 1;
            if depth == 0 {
                return Some(at);
            }
            from = at + close_pat.len();
        } else if lower[at..].starts_with(open_pat.as_bytes())
            && matches!(
                lower.get(at + open_pat.len()),
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/')
            )
        {
            // Self-closing same-tag elements do not deepen nesting.
            let gt = memchr::memchr(b'>', &lower[at..]).map(|g| at + g)?;
            if lower[gt - 1] != b'/' {
                depth += 1;
            }
            from = gt + 1;
        } else {
            from = at + 1;
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::ChapterContainer;

    fn doc_with(chapters: Vec<(&str, &str)>) -> AssembledDocument {
        AssembledDocument {
            title: None,
            author: None,
            chapters: chapters
                .into_iter()
                .enumerate()
                .map(|(i, (href, content))| ChapterContainer {
                    anchor_id: format!("chapter-{i}"),
                    original_href: href.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            stylesheets: Vec::new(),
            html: String::new(),
        }
    }

    #[test]
    fn hash8_is_8_hex_chars() {
        let h = hash8("hello");
        assert_eq!(h.len(), 8);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(hash8("hello"), hash8("hello"));
        assert_ne!(hash8("hello"), hash8("world"));
    }

    #[test]
    fn assigns_chapter_relative_identifiers() {
        let doc = doc_with(vec![
            ("chap1.html", "<p>First one here.</p><p>Second one here.</p>"),
            ("chap2.html", "<p>Third paragraph text.</p>"),
        ]);
        let index = DocumentIndex::build(&doc);

        assert_eq!(index.len(), 3);
        let blocks = index.blocks();

        assert_eq!(blocks[0].index_in_chapter, 0);
        assert_eq!(blocks[1].index_in_chapter, 1);
        // Chapter-relative, not global.
        assert_eq!(blocks[2].index_in_chapter, 0);

        let expected = format!(
            "p-{}-0-{}",
            hash8("chap1.html"),
            hash8("First one here.")
        );
        assert_eq!(blocks[0].id(), Some(expected.as_str()));
        assert_eq!(index.get(&expected).unwrap().position, 0);
    }

    #[test]
    fn identify_is_idempotent() {
        let doc = doc_with(vec![("c.html", "<p>Alpha beta gamma.</p><p>Delta.</p>")]);
        let mut index = DocumentIndex::build(&doc);

        let before: Vec<String> = index
            .blocks()
            .iter()
            .map(|b| b.id().unwrap().to_string())
            .collect();
        index.identify();
        let after: Vec<String> = index
            .blocks()
            .iter()
            .map(|b| b.id().unwrap().to_string())
            .collect();

        assert_eq!(before, after);
    }

    #[test]
    fn normalization_collapses_whitespace() {
        let doc = doc_with(vec![
            ("a.html", "<p>hello   world\n\tagain</p>"),
            ("b.html", "<p>hello world again</p>"),
        ]);
        let index = DocumentIndex::build(&doc);
        assert_eq!(
            index.blocks()[0].content_hash,
            index.blocks()[1].content_hash
        );
    }

    #[test]
    fn headings_lists_and_quotes_are_blocks() {
        let doc = doc_with(vec![(
            "c.html",
            "<h1>Title Here</h1><ul><li>Item one text</li><li>Item two text</li></ul>\
             <blockquote>Quoted words here</blockquote><pre>code block</pre>",
        )]);
        let index = DocumentIndex::build(&doc);
        let texts: Vec<&str> = index
            .blocks()
            .iter()
            .map(|b| b.normalized_text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec![
                "Title Here",
                "Item one text",
                "Item two text",
                "Quoted words here",
                "code block"
            ]
        );
    }

    #[test]
    fn nested_same_tag_blocks_are_depth_counted() {
        let doc = doc_with(vec![(
            "c.html",
            "<li>outer start <ol><li>inner item</li></ol> outer end</li><li>sibling</li>",
        )]);
        let index = DocumentIndex::build(&doc);
        let texts: Vec<&str> = index
            .blocks()
            .iter()
            .map(|b| b.normalized_text.as_str())
            .collect();
        assert_eq!(texts, vec!["outer start inner item outer end", "sibling"]);
    }

    #[test]
    fn exact_id_match_wins() {
        let doc = doc_with(vec![("c.html", "<p>Target paragraph text.</p>")]);
        let index = DocumentIndex::build(&doc);
        let id = index.blocks()[0].id().unwrap().to_string();

        let record = AnnotationRecord {
            paragraph_id: Some(id),
            related_text: "totally unrelated".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn legacy_bridge_matches_content_hash_prefix() {
        let doc = doc_with(vec![(
            "c.html",
            "<p>Some filler paragraph.</p><p>The bridged paragraph.</p>",
        )]);
        let index = DocumentIndex::build(&doc);
        let target_hash = index.blocks()[1].content_hash.clone();

        // Legacy id whose 32-hex hash starts with the target's content hash.
        let legacy = format!("p-{}{}-7", target_hash, "0".repeat(24));
        let record = AnnotationRecord {
            paragraph_id: Some(legacy),
            related_text: String::new(),
        };
        assert_eq!(index.match_record(&record), Some(1));
    }

    #[test]
    fn failed_legacy_bridge_does_not_fall_through_to_text() {
        let doc = doc_with(vec![("c.html", "<p>The bridged paragraph.</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: Some(format!("p-{}-7", "f".repeat(32))),
            // Text that WOULD fuzzy-match if it were allowed to.
            related_text: "bridged paragraph".to_string(),
        };
        assert_eq!(index.match_record(&record), None);
    }

    #[test]
    fn unknown_format_falls_through_to_text() {
        let doc = doc_with(vec![("c.html", "<p>say hello world today</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: Some("annot:12345".to_string()),
            related_text: "hello world".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn fuzzy_block_contains_record() {
        let doc = doc_with(vec![("c.html", "<p>say hello world today</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "hello world".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn fuzzy_record_contains_block() {
        let doc = doc_with(vec![("c.html", "<p>hello world</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "say hello world today and more".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn fuzzy_skips_short_blocks_and_short_records() {
        let doc = doc_with(vec![("c.html", "<p>hi</p><p>a longer paragraph here</p>")]);
        let index = DocumentIndex::build(&doc);

        // "hi" block is too short to match against.
        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "hi".to_string(),
        };
        assert_eq!(index.match_record(&record), None);

        // Single char record is too ambiguous.
        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "a".to_string(),
        };
        assert_eq!(index.match_record(&record), None);
    }

    #[test]
    fn trailing_action_tokens_are_stripped() {
        let doc = doc_with(vec![("c.html", "<p>say hello world today</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "hello world Copy".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));

        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "hello world Translate Copy".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn match_is_case_insensitive() {
        let doc = doc_with(vec![("c.html", "<p>Say Hello World Today</p>")]);
        let index = DocumentIndex::build(&doc);

        let record = AnnotationRecord {
            paragraph_id: None,
            related_text: "HELLO world".to_string(),
        };
        assert_eq!(index.match_record(&record), Some(0));
    }

    #[test]
    fn legacy_format_recognition() {
        assert_eq!(
            legacy_bridge_prefix("p-79e323a007d0bf6d18abaf067bb5063d-64"),
            Some("79e323a0".to_string())
        );
        assert_eq!(
            legacy_bridge_prefix(&format!("p-{}-0", "A".repeat(32))),
            Some("aaaaaaaa".to_string())
        );
        // Current format is not legacy.
        assert_eq!(legacy_bridge_prefix("p-79e323a0-3-0a1b2c3d"), None);
        assert_eq!(legacy_bridge_prefix("p-nothex-64"), None);
        assert_eq!(legacy_bridge_prefix(&format!("p-{}-", "a".repeat(32))), None);
        assert_eq!(legacy_bridge_prefix(&format!("p-{}-x1", "a".repeat(32))), None);
        assert_eq!(legacy_bridge_prefix("q-whatever"), None);
    }

    #[test]
    fn current_format_recognition() {
        assert!(is_current_format("p-79e323a0-3-0a1b2c3d"));
        assert!(!is_current_format("p-79e323a007d0bf6d18abaf067bb5063d-64"));
        assert!(!is_current_format("p-short-3-0a1b2c3d"));
        assert!(!is_current_format("annot:123"));
    }

    #[test]
    fn unmatched_batch_records_are_reported_not_dropped() {
        let doc = doc_with(vec![("c.html", "<p>say hello world today</p>")]);
        let index = DocumentIndex::build(&doc);

        let records = vec![
            AnnotationRecord {
                paragraph_id: None,
                related_text: "hello world".to_string(),
            },
            AnnotationRecord {
                paragraph_id: None,
                related_text: "no such text anywhere".to_string(),
            },
        ];
        let results = index.match_records(&records);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].block_position, Some(0));
        assert_eq!(results[1].block_position, None);
    }
}
