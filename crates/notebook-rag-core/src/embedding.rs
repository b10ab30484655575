//! Embedding trait, vector helpers, and note-to-text formatting.
//!
//! Defines the [`Embedder`] trait that the retrieval engine consumes. The
//! lifecycle-managed implementation (lazy model load, idle unload) lives in
//! the application crate.
//!
//! Also provides:
//! - [`cosine_similarity`] and [`l2_normalize`] for vector math
//! - [`format_note_for_embedding`] and [`strip_markdown`] for turning a note
//!   into embedding input

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;

/// Text → fixed-length vector.
///
/// Outputs are L2-normalized, so the dot product of two outputs equals their
/// cosine similarity. Empty or whitespace-only input yields the zero vector
/// of [`dims`](Embedder::dims) without touching the model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or a zero vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale a vector to unit length in place. Zero vectors are left alone.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Element-wise mean of token vectors, for backends that return per-token
/// output.
pub fn mean_pool(rows: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let mut out = vec![0.0f32; first.len()];
    for row in rows {
        for (o, x) in out.iter_mut().zip(row) {
            *o += x;
        }
    }
    let n = rows.len() as f32;
    for o in &mut out {
        *o /= n;
    }
    out
}

struct MarkdownPatterns {
    code_block: Regex,
    header: Regex,
    image: Regex,
    link: Regex,
    horizontal_rule: Regex,
    emphasis: Regex,
    inline_code: Regex,
    blockquote: Regex,
    blank_runs: Regex,
}

fn markdown_patterns() -> &'static MarkdownPatterns {
    static PATTERNS: OnceLock<MarkdownPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).unwrap_or_else(|e| panic!("bad markdown pattern {p}: {e}"));
        MarkdownPatterns {
            code_block: re(r"(?s)```.*?```"),
            header: re(r"(?m)^#{1,6}\s+"),
            image: re(r"!\[([^\]]*)\]\([^)]+\)"),
            link: re(r"\[([^\]]+)\]\([^)]+\)"),
            horizontal_rule: re(r"(?m)^[-*_]{3,}[ \t]*$"),
            emphasis: re(r"[*_]{1,3}([^*_\n]+)[*_]{1,3}"),
            inline_code: re(r"`([^`]+)`"),
            blockquote: re(r"(?m)^>\s?"),
            blank_runs: re(r"\n{3,}"),
        }
    })
}

/// Strip markdown syntax, keeping the readable text.
///
/// Fenced code blocks are removed entirely; inline code, links, images and
/// emphasis keep their inner text; headers, blockquote markers and
/// horizontal rules are dropped; runs of three or more newlines collapse to
/// a blank line.
pub fn strip_markdown(text: &str) -> String {
    let p = markdown_patterns();
    let text = p.code_block.replace_all(text, "");
    let text = p.header.replace_all(&text, "");
    let text = p.image.replace_all(&text, "$1");
    let text = p.link.replace_all(&text, "$1");
    let text = p.horizontal_rule.replace_all(&text, "");
    let text = p.emphasis.replace_all(&text, "$1");
    let text = p.inline_code.replace_all(&text, "$1");
    let text = p.blockquote.replace_all(&text, "");
    let text = p.blank_runs.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Build embedding input for a note.
///
/// ```text
/// Title: {title}
///
/// {markdown-stripped body}
///
/// Tags: {tag, tag}
/// ```
///
/// Empty parts are omitted.
pub fn format_note_for_embedding(title: &str, body: &str, tags: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();

    let title = title.trim();
    if !title.is_empty() {
        parts.push(format!("Title: {title}"));
    }

    let clean = strip_markdown(body);
    if !clean.is_empty() {
        parts.push(clean);
    }

    if !tags.is_empty() {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }

    parts.join("\n\n")
}
