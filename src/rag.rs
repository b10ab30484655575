//! Public retrieval surface: semantic search, hybrid search, and RAG
//! context building.
//!
//! [`RagService`] is the composition root. It owns the corpus snapshot, the
//! embedding service and the engine, and is shared by the CLI and the HTTP
//! server.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example(config: notebook_rag::config::Config) -> anyhow::Result<()> {
//! use notebook_rag::rag::{RagOptions, RagService};
//! use tokio_util::sync::CancellationToken;
//!
//! let service = RagService::open(config).await?;
//! let cancel = CancellationToken::new();
//! let ctx = service
//!     .build_rag_context("how does ownership work?", 5, None, RagOptions::default(), &cancel)
//!     .await?;
//! println!("{}", ctx.context_text);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use notebook_rag_core::context::{build_context, ContextOptions};
use notebook_rag_core::embedding::Embedder;
use notebook_rag_core::models::{RagContext, RetrievalMethod, ScoredCandidate};
use notebook_rag_core::store::memory::InMemoryStore;
use notebook_rag_core::{Result, RetrievalError};

use crate::config::Config;
use crate::corpus::load_corpus;
use crate::embedding::{EmbeddingService, ModelState};
use crate::engine::RetrievalEngine;
use crate::indexer::{index_all, IndexStats};

/// One search result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub note_id: String,
    pub note_title: String,
    pub notebook_id: Option<String>,
    pub text: String,
    pub tags: Vec<String>,
    pub score: f64,
}

impl From<ScoredCandidate> for SearchHit {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            note_id: c.document_id,
            note_title: c.title,
            notebook_id: c.notebook_id,
            text: c.text,
            tags: c.tags,
            score: c.final_score,
        }
    }
}

/// Options for [`RagService::build_rag_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RagOptions {
    pub use_hybrid: bool,
    pub use_chunking: bool,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            use_hybrid: true,
            use_chunking: true,
        }
    }
}

pub struct RagService {
    config: Config,
    store: Arc<InMemoryStore>,
    embeddings: Option<EmbeddingService>,
    engine: RetrievalEngine,
}

impl RagService {
    /// Load the corpus, start the embedding service and build the vector
    /// index.
    ///
    /// With `provider = "disabled"` no index is built; semantic retrieval
    /// then reports a model failure on every request.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let docs = load_corpus(&config.corpus.path)?;
        let store = Arc::new(InMemoryStore::from_documents(docs));
        let embeddings = EmbeddingService::from_config(&config.embedding)?;
        let service = Self::assemble(config, store, Arc::new(embeddings.clone()), Some(embeddings));

        if service.config.embedding.is_enabled() {
            service
                .reindex(&CancellationToken::new())
                .await
                .context("Failed to build vector index")?;
        } else {
            info!("embedding provider disabled, skipping vector index");
        }
        Ok(service)
    }

    /// Build a service around an existing store and embedder. Nothing is
    /// indexed; call [`reindex`](Self::reindex) when the store has no
    /// vectors yet.
    pub fn with_parts(config: Config, store: Arc<InMemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self::assemble(config, store, embedder, None)
    }

    fn assemble(
        config: Config,
        store: Arc<InMemoryStore>,
        embedder: Arc<dyn Embedder>,
        embeddings: Option<EmbeddingService>,
    ) -> Self {
        let engine = RetrievalEngine::new(
            embedder,
            store.clone(),
            store.clone(),
            config.retrieval.fusion_params(),
        );
        Self {
            config,
            store,
            embeddings,
            engine,
        }
    }

    /// Re-embed every document in the store.
    pub async fn reindex(&self, cancel: &CancellationToken) -> Result<IndexStats> {
        index_all(
            &self.store,
            self.engine.embedder().as_ref(),
            &self.config.chunking,
            cancel,
        )
        .await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    /// Lifecycle state of the managed model, when this service owns one.
    pub fn model_state(&self) -> Option<ModelState> {
        self.embeddings.as_ref().map(EmbeddingService::state)
    }

    pub fn model_name(&self) -> &str {
        self.engine.embedder().model_name()
    }

    /// Embedding-only search.
    pub async fn semantic_search(
        &self,
        query: &str,
        k: usize,
        notebook: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let result = self.engine.retrieve(query, k, notebook, false, cancel).await?;
        Ok(result.candidates.into_iter().map(SearchHit::from).collect())
    }

    /// Expanded, fused and reranked search.
    pub async fn hybrid_search(
        &self,
        query: &str,
        k: usize,
        notebook: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchHit>> {
        let result = self.engine.retrieve(query, k, notebook, true, cancel).await?;
        Ok(result.candidates.into_iter().map(SearchHit::from).collect())
    }

    /// Retrieve and assemble a citation-annotated context.
    ///
    /// Only an invalid argument is an error. Any retrieval failure yields a
    /// context with `has_context = false` and `retrieval_method =
    /// unavailable`.
    pub async fn build_rag_context(
        &self,
        question: &str,
        k: usize,
        notebook: Option<&str>,
        options: RagOptions,
        cancel: &CancellationToken,
    ) -> Result<RagContext> {
        let result = match self
            .engine
            .retrieve(question, k, notebook, options.use_hybrid, cancel)
            .await
        {
            Ok(result) => result,
            Err(e @ RetrievalError::InvalidArgument { .. }) => return Err(e),
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                return Ok(RagContext::empty(RetrievalMethod::Unavailable));
            }
        };

        let ctx = build_context(
            &result,
            question,
            &ContextOptions {
                use_chunking: options.use_chunking,
            },
        );
        info!(
            method = ctx.retrieval_method.as_str(),
            sources = ctx.result_count,
            aborted = result.aborted,
            "rag context built"
        );
        Ok(ctx)
    }
}
