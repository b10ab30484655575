//! Paragraph-boundary chunker with word overlap.
//!
//! Splits a document body into [`Chunk`]s of roughly `chunk_size`
//! characters for fine-grained embedding. Splitting happens on blank-line
//! paragraph boundaries so each chunk stays readable.
//!
//! # Algorithm
//!
//! 1. If the body is at most `chunk_size` characters, return it whole as a
//!    single chunk with `is_full_document = true`.
//! 2. Split the body on `\n\n` and drop empty paragraphs.
//! 3. Accumulate paragraphs into a buffer. When adding the next paragraph
//!    would exceed `chunk_size` and the buffer is non-empty, emit the buffer.
//! 4. Seed the next buffer with the last `overlap / 5` words of the emitted
//!    one (about five characters per word), then the triggering paragraph.
//! 5. Emit whatever is left as the final chunk.
//!
//! A single paragraph longer than `chunk_size` is not split further; it
//! becomes an oversized chunk of its own.
//!
//! # Example
//!
//! ```rust
//! use notebook_rag_core::chunk::chunk_document;
//! use notebook_rag_core::models::Document;
//!
//! let doc = Document::new("doc-1", "Short", "Hello world.\n\nSecond paragraph.");
//! let chunks = chunk_document(&doc, 500, 100);
//! assert_eq!(chunks.len(), 1);
//! assert!(chunks[0].is_full_document);
//! ```

use crate::models::{Chunk, Document};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_OVERLAP: usize = 100;

/// Characters per word assumed when turning a character overlap into a word
/// count.
const CHARS_PER_WORD: usize = 5;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split a document body into overlapping chunks.
///
/// # Guarantees
///
/// - At least one chunk is always returned.
/// - Indices are contiguous from 0 in emission order.
/// - Every non-empty paragraph of the body appears in some chunk.
/// - The last chunk ends with the body's last non-empty paragraph.
pub fn chunk_document(doc: &Document, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let body = doc.body.as_str();
    if body.chars().count() <= chunk_size {
        return vec![full_chunk(doc)];
    }

    let overlap_words = overlap / CHARS_PER_WORD;
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_len = 0usize;

    for para in body.split(PARAGRAPH_SEPARATOR) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_len = para.chars().count();

        let would_be = if buf.is_empty() {
            para_len
        } else {
            buf_len + PARAGRAPH_SEPARATOR.len() + para_len
        };

        if would_be > chunk_size && !buf.is_empty() {
            let seed = trailing_words(&buf, overlap_words);
            chunks.push(make_chunk(doc, chunks.len(), std::mem::take(&mut buf)));
            buf_len = 0;
            if !seed.is_empty() {
                buf_len = seed.chars().count();
                buf = seed;
            }
        }

        if !buf.is_empty() {
            buf.push_str(PARAGRAPH_SEPARATOR);
            buf_len += PARAGRAPH_SEPARATOR.len();
        }
        buf.push_str(para);
        buf_len += para_len;
    }

    if !buf.is_empty() {
        chunks.push(make_chunk(doc, chunks.len(), buf));
    }

    if chunks.is_empty() {
        chunks.push(full_chunk(doc));
    }

    chunks
}

/// The last `n` whitespace-delimited words of `text`, joined by spaces.
fn trailing_words(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    words[start..].join(" ")
}

fn full_chunk(doc: &Document) -> Chunk {
    Chunk {
        document_id: doc.id.clone(),
        index: 0,
        text: doc.body.clone(),
        is_full_document: true,
    }
}

fn make_chunk(doc: &Document, index: usize, text: String) -> Chunk {
    Chunk {
        document_id: doc.id.clone(),
        index,
        text,
        is_full_document: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_body(body: &str) -> Document {
        Document::new("doc1", "Title", body)
    }

    /// Twenty 99-character paragraphs, about 2000 characters in total.
    fn long_body() -> String {
        (0..20)
            .map(|i| format!("Paragraph {i:02} {}", "lorem ipsum ".repeat(7).trim_end()))
            .map(|p| format!("{p:<99}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_short_body_single_full_chunk() {
        let chunks = chunk_document(&doc_with_body("Hello, world!"), 500, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert!(chunks[0].is_full_document);
    }

    #[test]
    fn test_exactly_chunk_size_is_full() {
        let body = "x".repeat(500);
        let chunks = chunk_document(&doc_with_body(&body), 500, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_full_document);
    }

    #[test]
    fn test_empty_body() {
        let chunks = chunk_document(&doc_with_body(""), 500, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_full_document);
    }

    #[test]
    fn test_two_thousand_chars_splits() {
        let body = long_body();
        assert!(body.chars().count() >= 2000);
        let chunks = chunk_document(&doc_with_body(&body), 500, 100);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| !c.is_full_document));
        let last_para = body.split("\n\n").last().unwrap().trim();
        assert!(chunks.last().unwrap().text.ends_with(last_para));
    }

    #[test]
    fn test_indices_contiguous() {
        let body = long_body();
        let chunks = chunk_document(&doc_with_body(&body), 300, 50);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "index mismatch at position {i}");
            assert_eq!(c.document_id, "doc1");
        }
    }

    #[test]
    fn test_every_paragraph_covered() {
        let body = long_body();
        let chunks = chunk_document(&doc_with_body(&body), 500, 100);
        for para in body.split("\n\n") {
            let para = para.trim();
            assert!(
                chunks.iter().any(|c| c.text.contains(para)),
                "paragraph not covered: {para}"
            );
        }
    }

    #[test]
    fn test_overlap_seeds_next_chunk() {
        let body = long_body();
        let chunks = chunk_document(&doc_with_body(&body), 500, 100);
        for pair in chunks.windows(2) {
            let expected = trailing_words(&pair[0].text, 20);
            assert!(
                pair[1].text.starts_with(&expected),
                "chunk {} does not start with overlap from chunk {}",
                pair[1].index,
                pair[0].index
            );
        }
    }

    #[test]
    fn test_zero_overlap_has_no_seed() {
        let body = "first paragraph here\n\nsecond paragraph here\n\nthird paragraph here";
        let chunks = chunk_document(&doc_with_body(body), 25, 0);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["first paragraph here", "second paragraph here", "third paragraph here"]
        );
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let big = "word ".repeat(200);
        let body = format!("intro\n\n{}\n\noutro", big.trim());
        let chunks = chunk_document(&doc_with_body(&body), 100, 0);
        assert!(chunks.iter().any(|c| c.text == big.trim()));
        assert_eq!(chunks.last().unwrap().text, "outro");
    }

    #[test]
    fn test_multibyte_utf8() {
        let para = "┌──────┐ ünïcödé ✓ ".repeat(10);
        let body = vec![para.trim(); 6].join("\n\n");
        let chunks = chunk_document(&doc_with_body(&body), 300, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn test_deterministic() {
        let body = long_body();
        let a = chunk_document(&doc_with_body(&body), 400, 80);
        let b = chunk_document(&doc_with_body(&body), 400, 80);
        assert_eq!(a, b);
    }

    #[test]
    fn test_trailing_words() {
        assert_eq!(trailing_words("a b c d", 2), "c d");
        assert_eq!(trailing_words("a b", 5), "a b");
        assert_eq!(trailing_words("a b", 0), "");
    }
}
