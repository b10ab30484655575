//! RAG context assembly.
//!
//! Turns a [`RetrievalResult`] into a citation-annotated text block plus a
//! machine-readable source list. Each source renders as:
//!
//! ```text
//! [Source 1: "Rust Ownership" (Tags: rust, memory) [High relevance]]
//! Rust uses ownership to manage memory.
//! ```
//!
//! Blocks are separated by a `---` line. Companion formatters produce the
//! system prompt for a downstream model and plain citation lines.

use std::collections::HashSet;

use crate::models::{RagContext, RetrievalResult, ScoredCandidate, Source};

/// Score above which a source is tagged `[High relevance]`.
pub const HIGH_RELEVANCE: f64 = 0.8;
/// Score above which a source is tagged `[Medium relevance]`.
pub const MEDIUM_RELEVANCE: f64 = 0.5;
/// Content longer than this is reduced to its best paragraphs when chunking.
pub const EXCERPT_THRESHOLD_CHARS: usize = 800;
/// Paragraphs kept per source when excerpting.
pub const EXCERPT_PARAGRAPHS: usize = 2;
/// Hard cap on rendered content per source.
pub const MAX_CONTENT_CHARS: usize = 1500;

const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
const ELISION: &str = "\n\n[...]\n\n";

/// Options for [`build_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    /// Excerpt long sources to their most query-relevant paragraphs.
    pub use_chunking: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self { use_chunking: true }
    }
}

/// Build a [`RagContext`] from ranked results.
///
/// Sources are numbered from 1 in rank order. A document id that already
/// produced a source is skipped. With no results the context is empty and
/// `has_context` is false, but `retrieval_method` is still reported.
pub fn build_context(result: &RetrievalResult, query: &str, options: &ContextOptions) -> RagContext {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    let mut sources = Vec::new();

    for candidate in &result.candidates {
        if !seen.insert(candidate.document_id.as_str()) {
            continue;
        }
        let index = sources.len() + 1;
        blocks.push(render_block(index, candidate, query, options));
        sources.push(Source {
            index,
            document_id: candidate.document_id.clone(),
            title: candidate.title.clone(),
            notebook_id: candidate.notebook_id.clone(),
            tags: candidate.tags.clone(),
            score: candidate.final_score,
        });
    }

    if sources.is_empty() {
        return RagContext::empty(result.method);
    }

    RagContext {
        context_text: blocks.join(BLOCK_SEPARATOR),
        result_count: sources.len(),
        sources,
        has_context: true,
        retrieval_method: result.method,
    }
}

fn render_block(index: usize, candidate: &ScoredCandidate, query: &str, options: &ContextOptions) -> String {
    let tags = if candidate.tags.is_empty() {
        String::new()
    } else {
        format!(" (Tags: {})", candidate.tags.join(", "))
    };
    let content = if options.use_chunking && candidate.text.chars().count() > EXCERPT_THRESHOLD_CHARS {
        excerpt(&candidate.text, query)
    } else {
        truncate_chars(&candidate.text, MAX_CONTENT_CHARS)
    };
    format!(
        "[Source {index}: \"{}\"{tags}{}]\n{content}",
        candidate.title,
        relevance_tag(candidate.final_score)
    )
}

/// `" [High relevance]"`, `" [Medium relevance]"`, or nothing.
pub fn relevance_tag(score: f64) -> &'static str {
    if score > HIGH_RELEVANCE {
        " [High relevance]"
    } else if score > MEDIUM_RELEVANCE {
        " [Medium relevance]"
    } else {
        ""
    }
}

/// The paragraphs of `content` sharing the most words with `query`, best
/// first, joined by an elision marker.
///
/// Ties keep document order. Each paragraph is capped at
/// [`MAX_CONTENT_CHARS`].
pub fn excerpt(content: &str, query: &str) -> String {
    let query_words: HashSet<String> = query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2)
        .collect();

    let mut scored: Vec<(&str, usize)> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let overlap = p
                .split_whitespace()
                .filter(|w| query_words.contains(&w.to_lowercase()))
                .count();
            (p, overlap)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(EXCERPT_PARAGRAPHS)
        .map(|(p, _)| truncate_chars(p, MAX_CONTENT_CHARS))
        .collect::<Vec<_>>()
        .join(ELISION)
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// System prompt for a downstream model, grounded on the assembled context.
pub fn format_system_prompt(context: &RagContext) -> String {
    if !context.has_context {
        return "The user has no relevant notes for this query. \
                Answer based on your general knowledge."
            .to_string();
    }

    format!(
        "You have access to the user's notes. Use the following sources to answer their question.\n\
         When referencing information from the sources, cite them using [1], [2], etc.\n\
         If the sources don't contain relevant information, say so clearly.\n\
         \n\
         Sources from user's notes:\n\
         {}\n\
         \n\
         ---\n\
         At the end of your response, include a \"Sources:\" section listing the notes you referenced.",
        context.context_text
    )
}

/// Citation lines: `[n] "title" (tag, tag)`, one per source.
pub fn format_citations(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|s| {
            if s.tags.is_empty() {
                format!("[{}] \"{}\"", s.index, s.title)
            } else {
                format!("[{}] \"{}\" ({})", s.index, s.title, s.tags.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
