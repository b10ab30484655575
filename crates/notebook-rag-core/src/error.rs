//! Error taxonomy for the retrieval pipeline.
//!
//! An empty corpus is deliberately absent: it is not an error, both search
//! paths simply return nothing.

/// Errors raised while retrieving or embedding.
///
/// `Clone` so a single failed model load can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    /// The embedding model could not be initialized.
    #[error("embedding model failed to load: {reason}")]
    ModelLoadFailure { reason: String },

    /// The model was loaded but inference failed.
    #[error("embedding inference failed: {reason}")]
    Inference { reason: String },

    /// The vector index could not be reached.
    #[error("vector index unavailable: {reason}")]
    IndexUnavailable { reason: String },

    /// The document store failed to list documents.
    #[error("document store error: {reason}")]
    Store { reason: String },

    /// The request was rejected before any work was done.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl RetrievalError {
    pub fn model_load(reason: impl Into<String>) -> Self {
        Self::ModelLoadFailure {
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Into<String>) -> Self {
        Self::Inference {
            reason: reason.into(),
        }
    }

    pub fn index_unavailable(reason: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
