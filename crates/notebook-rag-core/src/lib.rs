//! # notebook-rag core
//!
//! Runtime-free logic for notebook-rag: data models, query expansion, BM25
//! scoring, chunking, reciprocal rank fusion, context assembly, and the
//! store/embedding traits the application wires together.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. The
//! application crate supplies the embedding backends, the composition root,
//! and the transports.
//!
//! ```text
//! query ─▶ expand ─┬─▶ embed ─▶ VectorIndex::search ─┐
//!                  └─▶ bm25::top_k(corpus) ──────────┴─▶ fusion::fuse ─▶ rerank ─▶ dedup
//!                                                                                  │
//!                                                       context::build ◀───────────┘
//! ```

pub mod bm25;
pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod fusion;
pub mod models;
pub mod store;

pub use error::{Result, RetrievalError};
