//! Reciprocal Rank Fusion and heuristic reranking.
//!
//! # Fusion
//!
//! Each source list contributes `weight / (k + rank + 1)` per candidate
//! (`rank` is 0-indexed), summed per document id:
//!
//! ```text
//! fused = 0.6 / (60 + r_sem + 1) + 0.4 / (60 + r_lex + 1)
//! ```
//!
//! RRF only looks at ranks, so cosine similarities and BM25 scores never
//! need to share a scale.
//!
//! # Reranking
//!
//! | Signal | Effect |
//! |--------|--------|
//! | raw query is a substring of `title + text` | `+0.30` |
//! | each query term (len > 2) in the title | `+0.15` |
//! | each query term (len > 2) in any tag | `+0.10` |
//! | text shorter than 50 characters | `× 0.8` |
//!
//! All sorts here are stable: on equal scores, earlier candidates stay first.
//! Determinism of the whole pipeline relies on that.

use std::collections::{HashMap, HashSet};

use crate::bm25::query_terms;
use crate::models::{Document, ScoredCandidate};
use crate::store::VectorHit;

pub const DEFAULT_RRF_K: f64 = 60.0;
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.6;
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 0.4;

pub const EXACT_MATCH_BOOST: f64 = 0.30;
pub const TITLE_TERM_BOOST: f64 = 0.15;
pub const TAG_TERM_BOOST: f64 = 0.10;
pub const SHORT_TEXT_CHARS: usize = 50;
pub const SHORT_TEXT_PENALTY: f64 = 0.8;

/// Fusion tuning, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub rrf_k: f64,
    pub semantic_weight: f64,
    pub lexical_weight: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
        }
    }
}

impl FusionParams {
    /// Weighted RRF contribution for a 0-indexed rank.
    pub fn contribution(&self, weight: f64, rank: usize) -> f64 {
        weight / (self.rrf_k + rank as f64 + 1.0)
    }
}

/// Order by `key` descending, keeping input order on ties.
fn stable_sort_desc(candidates: &mut [ScoredCandidate], key: fn(&ScoredCandidate) -> f64) {
    candidates.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn candidate_from_hit(hit: &VectorHit) -> ScoredCandidate {
    ScoredCandidate {
        document_id: hit.document_id.clone(),
        title: hit.title.clone(),
        notebook_id: hit.notebook_id.clone(),
        tags: hit.tags.clone(),
        text: hit.body.clone(),
        semantic_score: None,
        semantic_rank: None,
        lexical_score: None,
        lexical_rank: None,
        fused_score: 0.0,
        final_score: 0.0,
    }
}

/// Candidates for a semantic-only retrieval: similarity is the score at
/// every stage.
pub fn semantic_candidates(hits: &[VectorHit]) -> Vec<ScoredCandidate> {
    hits.iter()
        .enumerate()
        .map(|(rank, hit)| {
            let mut c = candidate_from_hit(hit);
            c.semantic_score = Some(hit.similarity);
            c.semantic_rank = Some(rank);
            c.fused_score = hit.similarity;
            c.final_score = hit.similarity;
            c
        })
        .collect()
}

/// Fuse a semantic and a lexical ranking with weighted RRF.
///
/// Candidates are keyed by document id. The semantic list is read first, so
/// when a document appears in both lists its title, tags and text come from
/// the semantic hit. Only a document's first position in each list counts.
///
/// Returns at most `keep` candidates ordered by `fused_score` descending.
pub fn fuse(
    semantic: &[VectorHit],
    lexical: &[(&Document, f64)],
    params: &FusionParams,
    keep: usize,
) -> Vec<ScoredCandidate> {
    let mut candidates: Vec<ScoredCandidate> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for (rank, hit) in semantic.iter().enumerate() {
        let idx = *by_id.entry(hit.document_id.clone()).or_insert_with(|| {
            candidates.push(candidate_from_hit(hit));
            candidates.len() - 1
        });
        let c = &mut candidates[idx];
        if c.semantic_rank.is_some() {
            continue;
        }
        c.semantic_score = Some(hit.similarity);
        c.semantic_rank = Some(rank);
        c.fused_score += params.contribution(params.semantic_weight, rank);
    }

    for (rank, (doc, score)) in lexical.iter().enumerate() {
        let idx = *by_id.entry(doc.id.clone()).or_insert_with(|| {
            candidates.push(ScoredCandidate::from_document(doc));
            candidates.len() - 1
        });
        let c = &mut candidates[idx];
        if c.lexical_rank.is_some() {
            continue;
        }
        c.lexical_score = Some(*score);
        c.lexical_rank = Some(rank);
        c.fused_score += params.contribution(params.lexical_weight, rank);
    }

    stable_sort_desc(&mut candidates, |c| c.fused_score);
    candidates.truncate(keep);
    candidates
}

/// Score adjustments for one candidate against the raw (unexpanded) query.
fn rerank_score(candidate: &ScoredCandidate, query_lower: &str, terms: &[String]) -> f64 {
    let mut score = candidate.fused_score;

    let title_lower = candidate.title.to_lowercase();
    let haystack = format!("{} {}", title_lower, candidate.text.to_lowercase());
    if !query_lower.is_empty() && haystack.contains(query_lower) {
        score += EXACT_MATCH_BOOST;
    }

    let tags_lower: Vec<String> = candidate.tags.iter().map(|t| t.to_lowercase()).collect();
    for term in terms {
        if title_lower.contains(term.as_str()) {
            score += TITLE_TERM_BOOST;
        }
        if tags_lower.iter().any(|t| t.contains(term.as_str())) {
            score += TAG_TERM_BOOST;
        }
    }

    if candidate.text.chars().count() < SHORT_TEXT_CHARS {
        score *= SHORT_TEXT_PENALTY;
    }

    score
}

/// Apply the rerank signals, sort by `final_score`, and keep the top `k`.
pub fn rerank(mut candidates: Vec<ScoredCandidate>, raw_query: &str, k: usize) -> Vec<ScoredCandidate> {
    let query_lower = raw_query.trim().to_lowercase();
    let mut seen = HashSet::new();
    let terms: Vec<String> = query_terms(raw_query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect();

    for c in &mut candidates {
        c.final_score = rerank_score(c, &query_lower, &terms);
    }

    stable_sort_desc(&mut candidates, |c| c.final_score);
    candidates.truncate(k);
    candidates
}

/// Drop repeated document ids, keeping the first (highest ranked) one.
pub fn dedup_by_document(candidates: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.document_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, similarity: f64) -> VectorHit {
        VectorHit {
            document_id: id.to_string(),
            title: format!("semantic {id}"),
            notebook_id: None,
            body: "a body that is comfortably longer than fifty characters in total".to_string(),
            tags: Vec::new(),
            similarity,
        }
    }

    fn doc(id: &str) -> Document {
        Document::new(
            id,
            format!("lexical {id}"),
            "another body that is comfortably longer than fifty characters",
        )
    }

    #[test]
    fn test_both_lists_beat_single_list() {
        let d_both = doc("both");
        let d_lex = doc("lex_only");
        let semantic = vec![hit("both", 0.9)];
        let lexical = vec![(&d_both, 3.0), (&d_lex, 2.0)];

        let fused = fuse(&semantic, &lexical, &FusionParams::default(), 10);
        assert_eq!(fused[0].document_id, "both");
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < 1e-12);

        // Rank 0 in both lists vs rank 0 in one list only.
        let solo_sem = fuse(&[hit("x", 0.9)], &[], &FusionParams::default(), 10);
        let d_y = doc("y");
        let solo_lex = fuse(&[], &[(&d_y, 1.0)], &FusionParams::default(), 10);
        assert!(fused[0].fused_score > solo_sem[0].fused_score);
        assert!(fused[0].fused_score > solo_lex[0].fused_score);
        assert!((solo_sem[0].fused_score - 0.6 / 61.0).abs() < 1e-12);
        assert!((solo_lex[0].fused_score - 0.4 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_first_list_sets_base_fields_and_both_scores_recorded() {
        let d = doc("a");
        let fused = fuse(&[hit("a", 0.7)], &[(&d, 4.5)], &FusionParams::default(), 10);
        let c = &fused[0];
        assert_eq!(c.title, "semantic a");
        assert_eq!(c.semantic_score, Some(0.7));
        assert_eq!(c.semantic_rank, Some(0));
        assert_eq!(c.lexical_score, Some(4.5));
        assert_eq!(c.lexical_rank, Some(0));
    }

    #[test]
    fn test_lexical_only_candidate_has_no_semantic_fields() {
        let d = doc("a");
        let fused = fuse(&[], &[(&d, 1.0)], &FusionParams::default(), 10);
        assert_eq!(fused[0].semantic_score, None);
        assert_eq!(fused[0].semantic_rank, None);
        assert_eq!(fused[0].title, "lexical a");
    }

    #[test]
    fn test_duplicate_in_one_list_counts_once() {
        let fused = fuse(&[hit("a", 0.9), hit("a", 0.8)], &[], &FusionParams::default(), 10);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].fused_score - 0.6 / 61.0).abs() < 1e-12);
        assert_eq!(fused[0].semantic_score, Some(0.9));
    }

    #[test]
    fn test_fuse_keeps_top_n() {
        let hits: Vec<VectorHit> = (0..10).map(|i| hit(&format!("d{i}"), 0.5)).collect();
        let fused = fuse(&hits, &[], &FusionParams::default(), 4);
        let ids: Vec<&str> = fused.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1", "d2", "d3"]);
    }

    #[test]
    fn test_fuse_equal_scores_keep_insertion_order() {
        // Equal weights make rank 0 in either list an exact tie.
        let params = FusionParams {
            rrf_k: 60.0,
            semantic_weight: 0.5,
            lexical_weight: 0.5,
        };
        let d1 = doc("l1");
        let fused = fuse(&[hit("s1", 0.5)], &[(&d1, 1.0)], &params, 10);
        let ids: Vec<&str> = fused.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "l1"]);
    }

    #[test]
    fn test_rerank_title_term_boost() {
        let d = Document::new("a", "Rust Ownership", "Rust uses ownership to manage memory.")
            .with_tags(["rust", "memory"]);
        let fused = fuse(&[], &[(&d, 1.0)], &FusionParams::default(), 10);
        let base = fused[0].fused_score;
        let ranked = rerank(fused, "ownership rules", 5);
        // +0.15 for "ownership" in the title; the body is under 50 chars.
        let expected = (base + TITLE_TERM_BOOST) * SHORT_TEXT_PENALTY;
        assert!((ranked[0].final_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rerank_exact_match_and_tags() {
        let d = Document::new(
            "a",
            "Weekly notes",
            "We should revisit the deploy checklist before friday, it keeps slipping.",
        )
        .with_tags(["deploy-process"]);
        let fused = fuse(&[], &[(&d, 1.0)], &FusionParams::default(), 10);
        let base = fused[0].fused_score;
        let ranked = rerank(fused, "Deploy Checklist", 5);
        // exact phrase + "deploy" in a tag; no title terms; long body.
        let expected = base + EXACT_MATCH_BOOST + TAG_TERM_BOOST;
        assert!((ranked[0].final_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rerank_can_reorder() {
        let plain = doc("plain");
        let titled = Document::new(
            "titled",
            "Kubernetes cheatsheet",
            "kubectl get pods, kubectl describe, kubectl logs and friends",
        );
        let fused = fuse(&[], &[(&plain, 5.0), (&titled, 1.0)], &FusionParams::default(), 10);
        assert_eq!(fused[0].document_id, "plain");
        let ranked = rerank(fused, "kubernetes", 10);
        assert_eq!(ranked[0].document_id, "titled");
    }

    #[test]
    fn test_rerank_truncates_and_is_stable() {
        let hits: Vec<VectorHit> = (0..6).map(|i| hit(&format!("d{i}"), 0.5)).collect();
        let mut fused = semantic_candidates(&hits);
        for c in &mut fused {
            c.fused_score = 0.1;
        }
        let ranked = rerank(fused, "zzz", 3);
        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1", "d2"]);
    }

    #[test]
    fn test_repeated_query_term_boosts_once() {
        let d = Document::new("a", "garden", "x".repeat(60));
        let fused = fuse(&[], &[(&d, 1.0)], &FusionParams::default(), 10);
        let base = fused[0].fused_score;
        let ranked = rerank(fused, "garden garden", 1);
        // "garden garden" is not a substring of "garden xxx…", one title boost.
        assert!((ranked[0].final_score - (base + TITLE_TERM_BOOST)).abs() < 1e-12);
    }

    #[test]
    fn test_semantic_candidates_scores() {
        let cands = semantic_candidates(&[hit("a", 0.8), hit("b", 0.4)]);
        assert_eq!(cands[1].semantic_rank, Some(1));
        assert_eq!(cands[1].final_score, 0.4);
        assert_eq!(cands[0].lexical_score, None);
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mut cands = semantic_candidates(&[hit("a", 0.9), hit("b", 0.5), hit("a", 0.3)]);
        cands[2].title = "dup".to_string();
        let deduped = dedup_by_document(cands);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].final_score, 0.9);
        assert!(deduped.iter().all(|c| c.title != "dup"));
    }
}
