//! # Notedex Markdown Chunker
//!
//! Splits a markdown note into passage-level chunks for embedding.
//!
//! ## Pipeline
//!
//! ```text
//! Note body
//!     │
//!     ├──> Markdown parser (pulldown-cmark event stream)
//!     │      └─> heading / paragraph / list-item boundaries
//!     │
//!     └──> Accumulator
//!            └─> MarkdownChunk[] (each tagged with its nearest heading)
//! ```
//!
//! ## Example
//!
//! ```
//! use notedex_md_chunker::chunk_markdown;
//!
//! let chunks = chunk_markdown("# Recipes\n\nPasta with garlic.", "food.md");
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].local_heading, "Recipes");
//! ```

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Kind of markdown boundary a chunk was opened at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// A heading chunk; carries the heading depth (1-6).
    Heading(u8),
    Paragraph,
    ListItem,
}

/// A passage extracted from a note, tagged with its nearest enclosing heading.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownChunk {
    pub kind: ChunkKind,
    pub content: String,
    pub path: String,
    pub local_heading: String,
}

impl MarkdownChunk {
    /// Text submitted to the embedding provider for this chunk.
    ///
    /// The path and nearest heading are prepended so that two identical
    /// passages in different notes embed differently.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.path, self.local_heading, self.content)
    }
}

/// Split a markdown body into heading, paragraph, and list-item chunks.
///
/// Walks the parser's event stream with a single accumulator: every
/// heading/paragraph/list-item start flushes the accumulated text as a
/// completed chunk, a heading's end event captures the heading text as the
/// `local_heading` attached to every chunk until the next heading, and
/// structural wrapper events (lists, emphasis, block quotes) are ignored.
/// Empty accumulators are never emitted, so an empty body yields no chunks
/// and a body with no markup at all yields exactly one paragraph chunk.
#[must_use]
pub fn chunk_markdown(body: &str, path: &str) -> Vec<MarkdownChunk> {
    let mut chunks = Vec::new();
    let mut kind = ChunkKind::Paragraph;
    let mut content = String::new();
    let mut heading = String::new();

    for event in Parser::new(body) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut chunks, kind, &mut content, &heading, path);
                kind = ChunkKind::Heading(heading_depth(level));
                heading.clear();
            }
            // The heading chunk itself keeps accumulating until the next
            // boundary; from here on its text is the tracked local heading.
            Event::End(TagEnd::Heading(_)) => {
                heading.clear();
                heading.push_str(&content);
            }
            Event::Start(Tag::Paragraph) => {
                flush(&mut chunks, kind, &mut content, &heading, path);
                kind = ChunkKind::Paragraph;
            }
            Event::Start(Tag::Item) => {
                flush(&mut chunks, kind, &mut content, &heading, path);
                kind = ChunkKind::ListItem;
            }
            Event::Text(text)
            | Event::Code(text)
            | Event::Html(text)
            | Event::InlineHtml(text) => {
                content.push_str(&text);
            }
            Event::SoftBreak | Event::HardBreak => {
                if !content.is_empty() {
                    content.push(' ');
                }
            }
            _ => {}
        }
    }

    flush(&mut chunks, kind, &mut content, &heading, path);
    chunks
}

fn flush(
    chunks: &mut Vec<MarkdownChunk>,
    kind: ChunkKind,
    content: &mut String,
    heading: &str,
    path: &str,
) {
    if content.is_empty() {
        return;
    }
    chunks.push(MarkdownChunk {
        kind,
        content: std::mem::take(content),
        path: path.to_string(),
        local_heading: heading.to_string(),
    });
}

const fn heading_depth(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_body_yields_no_chunks() {
        assert_eq!(chunk_markdown("", "empty.md"), Vec::new());
    }

    #[test]
    fn bare_text_yields_single_paragraph_chunk() {
        let chunks = chunk_markdown("just a line of text with no markers", "a.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Paragraph);
        assert_eq!(chunks[0].content, "just a line of text with no markers");
        assert_eq!(chunks[0].local_heading, "");
    }

    #[test]
    fn heading_text_becomes_local_heading_for_following_chunks() {
        let chunks = chunk_markdown("# Travel\n\nPack light.\n\nBook early.", "t.md");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind, ChunkKind::Heading(1));
        assert_eq!(chunks[0].content, "Travel");
        assert_eq!(chunks[0].local_heading, "Travel");
        assert_eq!(chunks[1].content, "Pack light.");
        assert_eq!(chunks[1].local_heading, "Travel");
        assert_eq!(chunks[2].local_heading, "Travel");
    }

    #[test]
    fn new_heading_replaces_local_heading() {
        let chunks = chunk_markdown("# One\n\ntext a\n\n## Two\n\ntext b", "h.md");
        let headings: Vec<&str> = chunks.iter().map(|c| c.local_heading.as_str()).collect();
        assert_eq!(headings, vec!["One", "One", "Two", "Two"]);
        assert_eq!(chunks[2].kind, ChunkKind::Heading(2));
    }

    #[test]
    fn list_items_become_individual_chunks() {
        let chunks = chunk_markdown("# Groceries\n- milk\n- eggs\n- bread", "g.md");
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[1].kind, ChunkKind::ListItem);
        assert_eq!(chunks[1].content, "milk");
        assert_eq!(chunks[3].content, "bread");
        assert!(chunks.iter().all(|c| c.local_heading == "Groceries"));
    }

    #[test]
    fn embedding_text_prepends_path_and_heading() {
        let chunks = chunk_markdown("# Plan\n\nShip it.", "work/q3.md");
        assert_eq!(chunks[1].embedding_text(), "work/q3.md Plan Ship it.");
    }

    #[test]
    fn soft_breaks_join_lines_with_a_space() {
        let chunks = chunk_markdown("first line\nsecond line", "s.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "first line second line");
    }
}
