//! # notebook-rag
//!
//! Hybrid retrieval and RAG context assembly for a personal notes app.
//!
//! Given a natural-language query, notebook-rag returns a ranked,
//! deduplicated, citation-ready context by fusing embedding search with
//! BM25, expanding queries with synonyms, chunking long notes, and
//! reranking on title, tag and exact-match signals.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ corpus.json │──▶│   Indexer    │──▶│ InMemoryStore  │
//! │ (notes)     │   │ Chunk+Embed  │   │ docs + vectors │
//! └─────────────┘   └──────────────┘   └───────┬────────┘
//!                                              │
//!                          ┌───────────────────┤
//!                          ▼                   ▼
//!                   ┌─────────────┐     ┌─────────────┐
//!                   │ RetrievalEng│◀────│ Embedding   │
//!                   │ BM25 + RRF  │     │ Service     │
//!                   └──────┬──────┘     └─────────────┘
//!                          ▼
//!                 ┌────────────────┐
//!                 │  CLI  │  HTTP  │
//!                 │ (nbr) │ (axum) │
//!                 └────────────────┘
//! ```
//!
//! The algorithms live in the runtime-free `notebook-rag-core` crate; this
//! crate adds configuration, the embedding model lifecycle, orchestration and
//! the transports.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | JSON note corpus loading |
//! | [`embedding`] | Embedding model lifecycle and backends |
//! | [`indexer`] | Chunk and embed notes into the vector index |
//! | [`engine`] | Semantic and hybrid retrieval |
//! | [`rag`] | Search and RAG context entry points |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command runners |

pub mod commands;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod indexer;
pub mod rag;
pub mod server;
