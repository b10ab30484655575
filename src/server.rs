//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/search/semantic` | Embedding-only search |
//! | `POST` | `/api/search/hybrid` | Expanded, fused and reranked search |
//! | `POST` | `/api/ai/rag` | RAG context, system prompt and citations |
//! | `GET`  | `/health` | Health check (version, model state) |
//!
//! Search bodies are `{ "query", "topK"?, "notebookId"? }` and return an array
//! of hits; the RAG body is
//! `{ "question", "topK"?, "notebookId"?, "useHybrid"?, "useChunking"? }`.
//! Omitted fields fall back to the `[retrieval]` config.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid argument: query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `model_unavailable` (503),
//! `index_unavailable` (503), `internal` (500).
//!
//! # Cancellation
//!
//! Each request gets a [`CancellationToken`] that is canceled when the
//! handler future is dropped, which happens when the client disconnects.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the notes web app can
//! call the API from another origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use notebook_rag_core::context::{format_citations, format_system_prompt};
use notebook_rag_core::models::RagContext;
use notebook_rag_core::RetrievalError;

use crate::embedding::ModelState;
use crate::rag::{RagOptions, RagService, SearchHit};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    rag: Arc<RagService>,
}

/// Build the router. Split from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(rag: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search/semantic", post(handle_semantic))
        .route("/api/search/hybrid", post(handle_hybrid))
        .route("/api/ai/rag", post(handle_rag))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { rag })
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(rag: Arc<RagService>) -> anyhow::Result<()> {
    let bind_addr = rag.config().server.bind.clone();
    let app = router(rag);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let (status, code) = match &err {
            RetrievalError::InvalidArgument { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            RetrievalError::ModelLoadFailure { .. } | RetrievalError::Inference { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable")
            }
            RetrievalError::IndexUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable")
            }
            RetrievalError::Store { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Handlers ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    notebook_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RagRequest {
    question: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    notebook_id: Option<String>,
    #[serde(default)]
    use_hybrid: Option<bool>,
    #[serde(default)]
    use_chunking: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RagResponse {
    #[serde(flatten)]
    context: RagContext,
    system_prompt: String,
    citations: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: ModelInfo,
    documents: usize,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    state: Option<ModelState>,
}

async fn handle_semantic(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let k = req.top_k.unwrap_or(state.rag.config().retrieval.top_k);
    let results = state
        .rag
        .semantic_search(&req.query, k, req.notebook_id.as_deref(), &cancel)
        .await?;
    Ok(Json(results))
}

async fn handle_hybrid(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let k = req.top_k.unwrap_or(state.rag.config().retrieval.top_k);
    let results = state
        .rag
        .hybrid_search(&req.query, k, req.notebook_id.as_deref(), &cancel)
        .await?;
    Ok(Json(results))
}

async fn handle_rag(
    State(state): State<AppState>,
    Json(req): Json<RagRequest>,
) -> Result<Json<RagResponse>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let defaults = &state.rag.config().retrieval;
    let k = req.top_k.unwrap_or(defaults.top_k);
    let options = RagOptions {
        use_hybrid: req.use_hybrid.unwrap_or(defaults.use_hybrid),
        use_chunking: req.use_chunking.unwrap_or(defaults.use_chunking),
    };
    let context = state
        .rag
        .build_rag_context(&req.question, k, req.notebook_id.as_deref(), options, &cancel)
        .await?;
    Ok(Json(RagResponse {
        system_prompt: format_system_prompt(&context),
        citations: format_citations(&context.sources),
        context,
    }))
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: ModelInfo {
            name: state.rag.model_name().to_string(),
            state: state.rag.model_state(),
        },
        documents: state.rag.store().document_count(),
    })
}
