//! Storage abstractions consumed by the retrieval pipeline.
//!
//! The document store and the vector index are external collaborators: the
//! pipeline only lists documents and asks for nearest neighbours. Both traits
//! take the notebook filter so implementations can restrict the candidate set
//! *before* scoring; a document outside the filter must never come back.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::Document;

/// One nearest-neighbour hit, already joined with its document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorHit {
    pub document_id: String,
    pub title: String,
    pub notebook_id: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    /// Similarity in `[0, 1]`, higher is closer.
    pub similarity: f64,
}

impl VectorHit {
    pub fn from_document(doc: &Document, similarity: f64) -> Self {
        Self {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            notebook_id: doc.notebook_id.clone(),
            body: doc.body.clone(),
            tags: doc.tags.clone(),
            similarity,
        }
    }
}

/// Read access to the note corpus.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_documents`](DocumentStore::list_documents) | Documents in the notebook filter, in stable order, without vectors |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List documents, optionally restricted to one notebook.
    ///
    /// The order must be stable between calls on an unchanged corpus; BM25
    /// uses it to break ties.
    async fn list_documents(&self, notebook: Option<&str>) -> Result<Vec<Document>>;
}

/// Nearest-neighbour search over document embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` hits for `query_vec`, ordered by similarity
    /// descending, restricted to `notebook` when given.
    ///
    /// Fails with [`RetrievalError::IndexUnavailable`](crate::error::RetrievalError::IndexUnavailable)
    /// when the index cannot be reached.
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        notebook: Option<&str>,
    ) -> Result<Vec<VectorHit>>;
}
