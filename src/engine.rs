//! Retrieval orchestration.
//!
//! [`RetrievalEngine`] runs one retrieval request end to end:
//!
//! ```text
//! semantic:  embed(query) ─▶ VectorIndex::search(k) ─▶ candidates
//!
//! hybrid:    expand(query) ─┬─▶ embed ─▶ VectorIndex::search(2k) ─┐
//!                           └─▶ list_documents ─▶ bm25::top_k(2k) ─┴─▶ fuse(2k) ─▶ rerank(k) ─▶ dedup
//! ```
//!
//! Both branches of a hybrid request run concurrently and both are
//! restricted to the notebook filter before anything is scored.
//!
//! # Degradation
//!
//! | Failure | Semantic | Hybrid |
//! |---------|----------|--------|
//! | vector index unavailable | error | BM25 only, method `lexical_fallback` |
//! | model load failure | error | error |
//! | document store failure | n/a | error |
//! | canceled | aborted, empty | aborted, empty |

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use notebook_rag_core::bm25;
use notebook_rag_core::embedding::Embedder;
use notebook_rag_core::expand::expand_query;
use notebook_rag_core::fusion::{dedup_by_document, fuse, rerank, semantic_candidates, FusionParams};
use notebook_rag_core::models::{Document, RetrievalMethod, RetrievalResult};
use notebook_rag_core::store::{DocumentStore, VectorHit, VectorIndex};
use notebook_rag_core::{Result, RetrievalError};

/// Composes the embedder, the document store and the vector index into the
/// retrieval pipeline. Holds no per-request state.
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    fusion: FusionParams,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        fusion: FusionParams,
    ) -> Self {
        Self {
            embedder,
            store,
            index,
            fusion,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Retrieve up to `k` documents for `query`.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::InvalidArgument`] for a blank query or `k == 0`,
    /// before any work starts. Otherwise see the degradation table in the
    /// module docs.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        notebook: Option<&str>,
        use_hybrid: bool,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(RetrievalError::invalid_argument("query must not be empty"));
        }
        if k == 0 {
            return Err(RetrievalError::invalid_argument("k must be >= 1"));
        }

        let method = if use_hybrid {
            RetrievalMethod::Hybrid
        } else {
            RetrievalMethod::Semantic
        };
        if cancel.is_cancelled() {
            return Ok(RetrievalResult::aborted(method));
        }

        let work = async {
            if use_hybrid {
                self.hybrid(query, k, notebook).await
            } else {
                self.semantic(query, k, notebook).await
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(method = method.as_str(), "retrieval canceled");
                Ok(RetrievalResult::aborted(method))
            }
            result = work => {
                if let Ok(r) = &result {
                    debug!(method = r.method.as_str(), results = r.len(), k, "retrieval finished");
                }
                result
            }
        }
    }

    async fn semantic(&self, query: &str, k: usize, notebook: Option<&str>) -> Result<RetrievalResult> {
        let hits = self.vector_search(query, k, notebook).await?;
        let mut candidates = dedup_by_document(semantic_candidates(&hits));
        candidates.truncate(k);
        Ok(RetrievalResult::new(candidates, RetrievalMethod::Semantic))
    }

    async fn hybrid(&self, query: &str, k: usize, notebook: Option<&str>) -> Result<RetrievalResult> {
        let expanded = expand_query(query);
        let fetch = k.saturating_mul(2);

        let (semantic, corpus) = tokio::join!(
            self.vector_search(&expanded, fetch, notebook),
            self.store.list_documents(notebook),
        );

        let corpus: Vec<Document> = corpus?
            .into_iter()
            .filter(|d| d.in_notebook(notebook))
            .collect();
        let lexical = bm25::top_k(&expanded, &corpus, fetch);

        let (hits, method) = match semantic {
            Ok(hits) => (hits, RetrievalMethod::Hybrid),
            Err(RetrievalError::IndexUnavailable { reason }) => {
                warn!(%reason, "vector index unavailable, falling back to lexical search");
                (Vec::new(), RetrievalMethod::LexicalFallback)
            }
            Err(e) => return Err(e),
        };

        debug!(
            semantic = hits.len(),
            lexical = lexical.len(),
            corpus = corpus.len(),
            "hybrid branches finished"
        );

        let fused = fuse(&hits, &lexical, &self.fusion, fetch);
        let mut candidates = dedup_by_document(rerank(fused, query, k));
        candidates.truncate(k);
        Ok(RetrievalResult::new(candidates, method))
    }

    /// Embed and search, dropping any hit outside the notebook filter.
    async fn vector_search(&self, text: &str, k: usize, notebook: Option<&str>) -> Result<Vec<VectorHit>> {
        let query_vec = self.embedder.embed(text).await?;
        let mut hits = self.index.search(&query_vec, k, notebook).await?;
        if let Some(nb) = notebook {
            hits.retain(|h| h.notebook_id.as_deref() == Some(nb));
        }
        Ok(hits)
    }
}
