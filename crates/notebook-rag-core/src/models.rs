//! Core data models for the retrieval pipeline.
//!
//! Documents come from the external store and are never mutated here.
//! Everything else is created per request and dropped once the caller has
//! consumed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note as supplied by the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub notebook_id: Option<String>,
    pub title: String,
    pub body: String,
    /// Ordered set: no duplicates, insertion order preserved.
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            notebook_id: None,
            title: title.into(),
            body: body.into(),
            tags: Vec::new(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_notebook(mut self, notebook_id: impl Into<String>) -> Self {
        self.notebook_id = Some(notebook_id.into());
        self
    }

    /// Replace the tag set, dropping repeated tags but keeping first-seen order.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into();
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// True when this document passes an optional notebook filter.
    pub fn in_notebook(&self, filter: Option<&str>) -> bool {
        match filter {
            Some(nb) => self.notebook_id.as_deref() == Some(nb),
            None => true,
        }
    }
}

/// A segment of a document body produced by [`crate::chunk::chunk_document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
    /// Set when the body fit in one chunk and was not split.
    pub is_full_document: bool,
}

/// A candidate flowing through fusion and reranking.
///
/// Optional fields are filled by the stage that knows them: the semantic
/// branch sets `semantic_*`, the lexical branch sets `lexical_*`, fusion sets
/// `fused_score`, and reranking sets `final_score`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub document_id: String,
    pub title: String,
    pub notebook_id: Option<String>,
    pub tags: Vec<String>,
    pub text: String,
    pub semantic_score: Option<f64>,
    pub semantic_rank: Option<usize>,
    pub lexical_score: Option<f64>,
    pub lexical_rank: Option<usize>,
    pub fused_score: f64,
    pub final_score: f64,
}

impl ScoredCandidate {
    /// Build a candidate from a document with no scores yet.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            notebook_id: doc.notebook_id.clone(),
            tags: doc.tags.clone(),
            text: doc.body.clone(),
            semantic_score: None,
            semantic_rank: None,
            lexical_score: None,
            lexical_rank: None,
            fused_score: 0.0,
            final_score: 0.0,
        }
    }
}

/// How a retrieval was actually carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Embedding search only.
    Semantic,
    /// Embedding and BM25 fused.
    Hybrid,
    /// Hybrid was requested but the vector index was down; BM25 only.
    LexicalFallback,
    /// Retrieval failed; nothing could be returned.
    Unavailable,
}

impl RetrievalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
            Self::LexicalFallback => "lexical_fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Ranked, deduplicated output of one retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub candidates: Vec<ScoredCandidate>,
    pub method: RetrievalMethod,
    /// Set when the request was canceled before it finished.
    pub aborted: bool,
}

impl RetrievalResult {
    pub fn new(candidates: Vec<ScoredCandidate>, method: RetrievalMethod) -> Self {
        Self {
            candidates,
            method,
            aborted: false,
        }
    }

    pub fn aborted(method: RetrievalMethod) -> Self {
        Self {
            candidates: Vec::new(),
            method,
            aborted: true,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// One citation entry in a [`RagContext`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// 1-based, matches the `[n]` marker in the context text.
    pub index: usize,
    pub document_id: String,
    pub title: String,
    pub notebook_id: Option<String>,
    pub tags: Vec<String>,
    pub score: f64,
}

/// Citation-annotated context ready for prompt construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagContext {
    #[serde(rename = "context")]
    pub context_text: String,
    pub sources: Vec<Source>,
    pub has_context: bool,
    pub retrieval_method: RetrievalMethod,
    pub result_count: usize,
}

impl RagContext {
    /// A context with nothing in it, still reporting how retrieval went.
    pub fn empty(method: RetrievalMethod) -> Self {
        Self {
            context_text: String::new(),
            sources: Vec::new(),
            has_context: false,
            retrieval_method: method,
            result_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_tags_dedupes_in_order() {
        let doc = Document::new("a", "t", "b").with_tags(["rust", "memory", "rust"]);
        assert_eq!(doc.tags, vec!["rust", "memory"]);
    }

    #[test]
    fn test_in_notebook() {
        let doc = Document::new("a", "t", "b").with_notebook("nb1");
        assert!(doc.in_notebook(None));
        assert!(doc.in_notebook(Some("nb1")));
        assert!(!doc.in_notebook(Some("nb2")));
        assert!(!Document::new("b", "t", "b").in_notebook(Some("nb1")));
    }

    #[test]
    fn test_rag_context_serialized_field_names() {
        let ctx = RagContext::empty(RetrievalMethod::Hybrid);
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["context"], "");
        assert_eq!(json["hasContext"], false);
        assert_eq!(json["retrievalMethod"], "hybrid");
        assert_eq!(json["resultCount"], 0);
        assert!(json["sources"].as_array().unwrap().is_empty());
    }
}
