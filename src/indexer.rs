//! Vector indexing: chunk every document, embed each chunk, store the
//! vectors.
//!
//! Each chunk is embedded as a note of its own (`Title:` / chunk text /
//! `Tags:`), so short chunks still carry the document's title and tags.
//! A document whose embedding fails is skipped with a warning; a model that
//! cannot load stops the whole run.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use notebook_rag_core::chunk::chunk_document;
use notebook_rag_core::embedding::{format_note_for_embedding, Embedder};
use notebook_rag_core::models::Document;
use notebook_rag_core::store::memory::InMemoryStore;
use notebook_rag_core::{Result, RetrievalError};

use crate::config::ChunkingConfig;

/// Counts from one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Embed one document's chunks and replace its vectors in the store.
///
/// Returns the number of vectors stored.
pub async fn index_document(
    store: &InMemoryStore,
    embedder: &dyn Embedder,
    doc: &Document,
    chunking: &ChunkingConfig,
) -> Result<usize> {
    let chunks = chunk_document(doc, chunking.chunk_size, chunking.overlap);
    let mut vectors = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let text = format_note_for_embedding(&doc.title, &chunk.text, &doc.tags);
        vectors.push(embedder.embed(&text).await?);
    }
    let count = vectors.len();
    store.replace_vectors(&doc.id, vectors);
    debug!(document_id = %doc.id, chunks = count, "document indexed");
    Ok(count)
}

/// Index every document in the store.
///
/// Stops early, keeping what was indexed so far, when `cancel` fires.
pub async fn index_all(
    store: &InMemoryStore,
    embedder: &dyn Embedder,
    chunking: &ChunkingConfig,
    cancel: &CancellationToken,
) -> Result<IndexStats> {
    let mut stats = IndexStats::default();
    let started = std::time::Instant::now();

    for doc in store.documents() {
        if cancel.is_cancelled() {
            info!(indexed = stats.documents, "indexing canceled");
            break;
        }
        match index_document(store, embedder, &doc, chunking).await {
            Ok(n) => {
                stats.documents += 1;
                stats.chunks += n;
            }
            Err(e @ RetrievalError::ModelLoadFailure { .. }) => return Err(e),
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "skipping document that failed to embed");
                stats.skipped += 1;
            }
        }
    }

    info!(
        documents = stats.documents,
        chunks = stats.chunks,
        skipped = stats.skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "vector index built"
    );
    Ok(stats)
}
