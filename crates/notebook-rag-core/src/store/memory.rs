//! In-memory [`DocumentStore`] and [`VectorIndex`] implementation.
//!
//! Documents live in a `Vec` to keep insertion order stable for BM25
//! tie-breaking. Vectors are stored per chunk; vector search is brute-force
//! cosine similarity, aggregated per document with MAX.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::models::Document;

use super::{DocumentStore, VectorHit, VectorIndex};

struct StoredVector {
    document_id: String,
    vector: Vec<f32>,
}

/// In-memory corpus snapshot plus chunk-level embedding index.
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            vectors: RwLock::new(Vec::new()),
        }
    }

    pub fn from_documents(docs: Vec<Document>) -> Self {
        let store = Self::new();
        for doc in docs {
            store.upsert_document(doc);
        }
        store
    }

    /// Insert a document, or replace the one with the same id in place.
    pub fn upsert_document(&self, doc: Document) {
        let mut docs = self.docs.write();
        match docs.iter_mut().find(|d| d.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    /// Replace all chunk vectors for a document.
    pub fn replace_vectors(&self, document_id: &str, vectors: Vec<Vec<f32>>) {
        let mut stored = self.vectors.write();
        stored.retain(|v| v.document_id != document_id);
        stored.extend(vectors.into_iter().map(|vector| StoredVector {
            document_id: document_id.to_string(),
            vector,
        }));
    }

    /// Snapshot of every document in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().len()
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.read().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn list_documents(&self, notebook: Option<&str>) -> Result<Vec<Document>> {
        Ok(self
            .docs
            .read()
            .iter()
            .filter(|d| d.in_notebook(notebook))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
        notebook: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let docs = self.docs.read();
        let vectors = self.vectors.read();

        let mut best: HashMap<&str, f64> = HashMap::new();
        for sv in vectors.iter() {
            let sim = cosine_similarity(query_vec, &sv.vector) as f64;
            let entry = best.entry(sv.document_id.as_str()).or_insert(f64::MIN);
            if sim > *entry {
                *entry = sim;
            }
        }

        // Walk documents (not vectors) so the notebook filter applies before
        // anything is ranked, and ties fall back to corpus order.
        let mut hits: Vec<VectorHit> = docs
            .iter()
            .filter(|d| d.in_notebook(notebook))
            .filter_map(|d| {
                best.get(d.id.as_str())
                    .map(|&sim| VectorHit::from_document(d, sim.clamp(0.0, 1.0)))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        let s = InMemoryStore::from_documents(vec![
            Document::new("a", "A", "alpha").with_notebook("work"),
            Document::new("b", "B", "beta").with_notebook("home"),
            Document::new("c", "C", "gamma"),
        ]);
        s.replace_vectors("a", vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        s.replace_vectors("b", vec![vec![0.6, 0.8]]);
        s.replace_vectors("c", vec![vec![-1.0, 0.0]]);
        s
    }

    #[tokio::test]
    async fn test_list_documents_in_order_and_filtered() {
        let s = store();
        let all = s.list_documents(None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let work = s.list_documents(Some("work")).await.unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].id, "a");
    }

    #[tokio::test]
    async fn test_vector_search_max_aggregation() {
        let s = store();
        let hits = s.search(&[0.0, 1.0], 10, None).await.unwrap();
        assert_eq!(hits[0].document_id, "a");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].document_id, "b");
        // Negative cosine is clamped into [0, 1].
        assert_eq!(hits[2].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_vector_search_filter_before_ranking() {
        let s = store();
        let hits = s.search(&[0.0, 1.0], 1, Some("home")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "b");
    }

    #[tokio::test]
    async fn test_documents_without_vectors_are_not_hits() {
        let s = store();
        s.upsert_document(Document::new("d", "D", "delta"));
        let hits = s.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(hits.iter().all(|h| h.document_id != "d"));
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let s = store();
        s.upsert_document(Document::new("b", "B2", "beta two"));
        let docs = s.documents();
        assert_eq!(docs[1].title, "B2");
        assert_eq!(s.document_count(), 3);
    }
}
