//! BM25 lexical scoring over an in-memory document set.
//!
//! The IDF term is a fixed heuristic that assumes every query term appears in
//! 10% of the corpus: `ln((N + 0.5) / (0.1·N + 0.5))`. It does not look at
//! real document frequencies. Rankings depend on it, so it is kept exactly.
//!
//! Searchable text is `title + " " + body + " " + tags`, lower-cased and
//! split on whitespace. Punctuation is left attached to tokens.

use std::collections::HashMap;

use tracing::warn;

use crate::models::Document;

/// Term-frequency saturation.
pub const K1: f64 = 1.5;
/// Length normalization strength.
pub const B: f64 = 0.75;
/// Average document length assumed for an empty corpus.
pub const DEFAULT_AVG_DOC_LENGTH: f64 = 500.0;

/// Query terms: lower-cased, whitespace-split, longer than two characters.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 2)
        .collect()
}

fn document_terms(doc: &Document) -> Vec<String> {
    let text = format!("{} {} {}", doc.title, doc.body, doc.tags.join(" ")).to_lowercase();
    text.split_whitespace().map(str::to_string).collect()
}

/// Heuristic IDF for a corpus of `n` documents.
pub fn heuristic_idf(n: usize) -> f64 {
    let n = n as f64;
    ((n + 0.5) / (0.1 * n + 0.5)).ln()
}

/// Score every document, returning `(corpus_index, score)` in corpus order
/// for documents with a positive score.
fn score_indexed(query: &str, corpus: &[Document]) -> Vec<(usize, f64)> {
    let terms = query_terms(query);
    if terms.is_empty() || corpus.is_empty() {
        return Vec::new();
    }

    let doc_terms: Vec<Vec<String>> = corpus.iter().map(document_terms).collect();
    let avg_doc_length = mean_term_count(&doc_terms);
    let idf = heuristic_idf(corpus.len());

    let mut scored = Vec::new();
    for (idx, tokens) in doc_terms.iter().enumerate() {
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for tok in tokens {
            *tf.entry(tok.as_str()).or_default() += 1;
        }
        let doc_len = tokens.len() as f64;

        let mut score = 0.0;
        for term in &terms {
            let freq = match tf.get(term.as_str()) {
                Some(&f) if f > 0 => f as f64,
                _ => continue,
            };
            let norm = 1.0 - B + B * (doc_len / avg_doc_length);
            score += idf * (freq * (K1 + 1.0)) / (freq + K1 * norm);
        }

        if !score.is_finite() {
            warn!(document_id = %corpus[idx].id, "skipping document with non-finite BM25 score");
            continue;
        }
        if score > 0.0 {
            scored.push((idx, score));
        }
    }
    scored
}

/// Average document length in terms, falling back to
/// [`DEFAULT_AVG_DOC_LENGTH`] for an empty corpus.
fn mean_term_count(doc_terms: &[Vec<String>]) -> f64 {
    if doc_terms.is_empty() {
        return DEFAULT_AVG_DOC_LENGTH;
    }
    let total: usize = doc_terms.iter().map(Vec::len).sum();
    total as f64 / doc_terms.len() as f64
}

/// BM25 score per document id. Documents scoring zero are absent.
pub fn score(query: &str, corpus: &[Document]) -> HashMap<String, f64> {
    score_indexed(query, corpus)
        .into_iter()
        .map(|(idx, s)| (corpus[idx].id.clone(), s))
        .collect()
}

/// The `k` best documents, highest score first.
///
/// The sort is stable, so equal scores keep corpus order.
pub fn top_k<'a>(query: &str, corpus: &'a [Document], k: usize) -> Vec<(&'a Document, f64)> {
    let mut scored = score_indexed(query, corpus);
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored.into_iter().map(|(idx, s)| (&corpus[idx], s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust_doc() -> Document {
        Document::new("a", "Rust Ownership", "Rust uses ownership to manage memory.")
            .with_tags(["rust", "memory"])
    }

    #[test]
    fn test_query_terms_filter_short() {
        assert_eq!(query_terms("To be OR not"), vec!["not"]);
        assert!(query_terms("a an of").is_empty());
    }

    #[test]
    fn test_heuristic_idf_single_doc() {
        let expected = (1.5f64 / 0.6).ln();
        assert!((heuristic_idf(1) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_mean_term_count() {
        assert_eq!(mean_term_count(&[]), DEFAULT_AVG_DOC_LENGTH);
        let corpus = vec![
            Document::new("a", "One", "two three"),
            Document::new("b", "One", "two three four five"),
        ];
        let doc_terms: Vec<Vec<String>> = corpus.iter().map(document_terms).collect();
        assert_eq!(mean_term_count(&doc_terms), 4.0);
    }

    #[test]
    fn test_length_normalization_uses_corpus_average() {
        // Same term frequency, shorter document scores higher.
        let corpus = vec![
            Document::new("short", "Note", "ownership"),
            Document::new("long", "Note", "ownership and many other unrelated words here"),
        ];
        let scores = score("ownership", &corpus);
        assert!(scores["short"] > scores["long"]);
    }

    #[test]
    fn test_ownership_scenario() {
        let corpus = vec![rust_doc()];
        let scores = score("ownership rules", &corpus);
        let s = scores["a"];
        assert!(s > 0.0);

        // tf("ownership") = 2, docLen = avg, so norm = 1.
        let idf = heuristic_idf(1);
        let expected = idf * (2.0 * (K1 + 1.0)) / (2.0 + K1);
        assert!((s - expected).abs() < 1e-9, "got {s}, want {expected}");
    }

    #[test]
    fn test_zero_overlap_excluded() {
        let corpus = vec![rust_doc(), Document::new("b", "Groceries", "eggs milk bread")];
        let scores = score("ownership", &corpus);
        assert!(scores.contains_key("a"));
        assert!(!scores.contains_key("b"));
        let top = top_k("ownership", &corpus, 10);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0.id, "a");
    }

    #[test]
    fn test_short_query_terms_score_nothing() {
        let corpus = vec![Document::new("a", "to do", "it is so")];
        assert!(score("it is", &corpus).is_empty());
    }

    #[test]
    fn test_empty_corpus() {
        assert!(score("anything", &[]).is_empty());
        assert!(top_k("anything", &[], 5).is_empty());
    }

    #[test]
    fn test_tags_are_searchable() {
        let corpus = vec![Document::new("a", "Untitled", "nothing here").with_tags(["gardening"])];
        assert!(score("gardening", &corpus)["a"] > 0.0);
    }

    #[test]
    fn test_case_insensitive() {
        let corpus = vec![rust_doc()];
        assert_eq!(score("OWNERSHIP", &corpus), score("ownership", &corpus));
    }

    #[test]
    fn test_top_k_stable_ties() {
        let corpus = vec![
            Document::new("first", "alpha", "shared words"),
            Document::new("second", "alpha", "shared words"),
            Document::new("third", "alpha", "shared words"),
        ];
        let top = top_k("alpha", &corpus, 10);
        let ids: Vec<&str> = top.iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_top_k_orders_and_truncates() {
        let corpus = vec![
            Document::new("once", "garden", "tomatoes"),
            Document::new("twice", "garden", "garden tomatoes"),
            Document::new("none", "kitchen", "pasta"),
        ];
        let top = top_k("garden", &corpus, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0.id, "twice");
    }

    #[test]
    fn test_shorter_document_scores_higher_for_same_tf() {
        let corpus = vec![
            Document::new("long", "x", "kafka one two three four five six seven eight nine"),
            Document::new("short", "x", "kafka"),
        ];
        let scores = score("kafka", &corpus);
        assert!(scores["short"] > scores["long"]);
    }
}
