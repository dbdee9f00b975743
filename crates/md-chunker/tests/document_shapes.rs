use notedex_md_chunker::{chunk_markdown, ChunkKind};
use pretty_assertions::assert_eq;

#[test]
fn plain_text_with_no_markers_is_one_chunk() {
    let chunks = chunk_markdown("a single inline string without any structure", "plain.md");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].kind, ChunkKind::Paragraph);
    assert_eq!(chunks[0].content, "a single inline string without any structure");
}

#[test]
fn empty_and_whitespace_documents_yield_nothing() {
    assert!(chunk_markdown("", "e.md").is_empty());
    assert!(chunk_markdown("\n\n   \n", "w.md").is_empty());
}

#[test]
fn mixed_document_splits_at_every_boundary() {
    let body = "\
# Projects

Current focus areas.

## Garden

- plant tomatoes
- fix the fence

The fence needs new posts.

## Reading

Finish the borrow checker chapter.";

    let chunks = chunk_markdown(body, "todo.md");
    let shapes: Vec<(ChunkKind, &str, &str)> = chunks
        .iter()
        .map(|c| (c.kind, c.content.as_str(), c.local_heading.as_str()))
        .collect();

    assert_eq!(
        shapes,
        vec![
            (ChunkKind::Heading(1), "Projects", "Projects"),
            (ChunkKind::Paragraph, "Current focus areas.", "Projects"),
            (ChunkKind::Heading(2), "Garden", "Garden"),
            (ChunkKind::ListItem, "plant tomatoes", "Garden"),
            (ChunkKind::ListItem, "fix the fence", "Garden"),
            (ChunkKind::Paragraph, "The fence needs new posts.", "Garden"),
            (ChunkKind::Heading(2), "Reading", "Reading"),
            (
                ChunkKind::Paragraph,
                "Finish the borrow checker chapter.",
                "Reading"
            ),
        ]
    );
}

#[test]
fn inline_formatting_does_not_split_chunks() {
    let chunks = chunk_markdown("Some **bold** and `code` inline.", "fmt.md");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "Some bold and code inline.");
}

#[test]
fn code_blocks_fold_into_the_current_chunk() {
    let body = "# Setup\n\nInstall with:\n\n```\ncargo install notedex\n```";
    let chunks = chunk_markdown(body, "setup.md");
    // The fenced block is not a boundary; its text joins the accumulator
    // opened by the paragraph before it.
    assert!(chunks
        .iter()
        .any(|c| c.content.contains("cargo install notedex")));
    assert!(chunks.iter().all(|c| c.local_heading == "Setup"));
}
