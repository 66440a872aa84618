//! Error taxonomy shared by the store, ingestion, search, and generation
//! layers.
//!
//! Missing configuration is not an error here. An unconfigured vector
//! store is a degraded-availability state reported by
//! [`DocumentStore::is_available`](crate::store::DocumentStore::is_available).

use thiserror::Error;

pub use crate::extract::ExtractError;

/// Failures raised by the [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// No usable connection to the vector store.
    #[error("vector store is not available")]
    Unavailable,
    /// The store is reachable but rejected a write.
    #[error("vector store write failed: {0}")]
    Write(String),
    /// The store is reachable but rejected a read (bad filter, schema mismatch).
    #[error("vector store query failed: {0}")]
    Search(String),
}

/// Failures raised by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to extract text from {file}: {source}")]
    Extraction {
        file: String,
        #[source]
        source: ExtractError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ingestion of {file} was interrupted: {message}")]
    Interrupted { file: String, message: String },
}

/// Failures raised by the search service.
///
/// "Store unavailable" is not an error on the search read paths (they fall
/// back to curated results); it only surfaces from [`get_document`], which
/// has no meaningful placeholder.
///
/// [`get_document`]: crate::search::SearchService::get_document
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    #[error("search failed: {0}")]
    Store(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("vector store is not available")]
    Unavailable,
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable => SearchError::Unavailable,
            StoreError::Write(msg) | StoreError::Search(msg) => SearchError::Store(msg),
        }
    }
}

/// Failures raised by the generation orchestrator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),
    #[error("template document not found: {0}")]
    TemplateNotFound(String),
}
