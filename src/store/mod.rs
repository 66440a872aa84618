//! Document store adapter.
//!
//! The [`VectorBackend`] trait defines the operations the pipeline needs
//! from a vector-capable document collection; [`DocumentStore`] wraps an
//! optional backend and gives callers a stable interface whether or not
//! the backend is reachable.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`insert`](DocumentStore::insert) | Store a record, returning the store id |
//! | [`delete_by_id`](DocumentStore::delete_by_id) | Remove a record (idempotent) |
//! | [`delete_many`](DocumentStore::delete_many) | Remove a batch of records |
//! | [`get_by_id`](DocumentStore::get_by_id) | Fetch a single record |
//! | [`fetch_by_filter`](DocumentStore::fetch_by_filter) | Exact-match fetch, store order |
//! | [`nearest_neighbors`](DocumentStore::nearest_neighbors) | Semantic similarity search |
//! | [`aggregate_by_field`](DocumentStore::aggregate_by_field) | Group counts by field value |
//!
//! Without a backend every operation returns [`StoreError::Unavailable`];
//! callers decide whether that degrades or fails.

pub mod memory;
pub mod weaviate;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{create_provider, DisabledProvider, EmbeddingProvider};
use crate::error::StoreError;
use crate::models::DocumentRecord;

pub use memory::InMemoryStore;
pub use weaviate::WeaviateStore;

/// Filterable and groupable record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Title,
    Industry,
    ProjectType,
    Location,
    Budget,
    Timeline,
    DocumentType,
    FileName,
}

impl RecordField {
    pub const ALL: [RecordField; 8] = [
        RecordField::Title,
        RecordField::Industry,
        RecordField::ProjectType,
        RecordField::Location,
        RecordField::Budget,
        RecordField::Timeline,
        RecordField::DocumentType,
        RecordField::FileName,
    ];

    /// Persisted (camelCase) property name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Title => "title",
            RecordField::Industry => "industry",
            RecordField::ProjectType => "projectType",
            RecordField::Location => "location",
            RecordField::Budget => "budget",
            RecordField::Timeline => "timeline",
            RecordField::DocumentType => "documentType",
            RecordField::FileName => "fileName",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn value_of<'a>(&self, record: &'a DocumentRecord) -> &'a str {
        match self {
            RecordField::Title => &record.title,
            RecordField::Industry => &record.industry,
            RecordField::ProjectType => &record.project_type,
            RecordField::Location => &record.location,
            RecordField::Budget => &record.budget,
            RecordField::Timeline => &record.timeline,
            RecordField::DocumentType => &record.document_type,
            RecordField::FileName => &record.file_name,
        }
    }
}

/// A conjunction of equality predicates. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(RecordField, String)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(field: RecordField, value: impl Into<String>) -> Self {
        Self::all().and(field, value)
    }

    pub fn and(mut self, field: RecordField, value: impl Into<String>) -> Self {
        self.clauses.push((field, value.into()));
        self
    }

    pub fn clauses(&self) -> &[(RecordField, String)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &DocumentRecord) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| field.value_of(record) == value)
    }
}

/// A record together with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(flatten)]
    pub record: DocumentRecord,
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub stored: StoredRecord,
    /// Similarity in `[0, 1]`, higher is closer.
    pub certainty: Option<f64>,
    /// Vector distance, lower is closer.
    pub distance: Option<f64>,
}

/// Abstract vector-capable document collection.
///
/// Implementations must be `Send + Sync`; the store is shared across
/// concurrent requests and relies on the backend for its own consistency.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Short backend identifier for logs.
    fn name(&self) -> &str;

    /// Connectivity check.
    async fn ping(&self) -> Result<()>;

    /// Create the collection if it does not already exist.
    async fn ensure_schema(&self) -> Result<()>;

    async fn insert(&self, record: &DocumentRecord) -> Result<String>;

    /// Deleting an unknown id succeeds.
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Delete a batch of ids. Returns the number of ids processed, or the
    /// number actually removed where the backend can tell.
    async fn delete_many(&self, ids: &[String]) -> Result<usize> {
        for id in ids {
            self.delete_by_id(id).await?;
        }
        Ok(ids.len())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredRecord>>;

    async fn fetch_by_filter(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredRecord>>;

    /// Records most similar to `query`, restricted to `filter`.
    async fn nearest_neighbors(
        &self,
        query: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Hit>>;

    async fn aggregate_by_field(&self, field: RecordField) -> Result<Vec<(String, u64)>>;
}

/// Process-wide handle to the vector store.
///
/// Construction never fails: a missing configuration or an unreachable
/// backend leaves the store unavailable, which every operation reports as
/// [`StoreError::Unavailable`].
pub struct DocumentStore {
    backend: RwLock<Option<Arc<dyn VectorBackend>>>,
}

impl DocumentStore {
    /// Build the configured backend, check readiness and ensure its schema.
    pub async fn connect(config: &Config) -> Self {
        let store = Self::unavailable();
        store.reinitialize(config).await;
        store
    }

    pub fn with_backend(backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            backend: RwLock::new(None),
        }
    }

    /// Drop the current backend and connect again from `config`.
    ///
    /// Returns whether the store is available afterwards.
    pub async fn reinitialize(&self, config: &Config) -> bool {
        let backend = open_backend(config).await;
        let available = backend.is_some();
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = backend;
        available
    }

    /// Release the backend. Subsequent operations see an unavailable store.
    pub fn close(&self) {
        self.backend
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_available(&self) -> bool {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn backend_name(&self) -> Option<String> {
        self.backend().map(|b| b.name().to_string())
    }

    fn backend(&self) -> Option<Arc<dyn VectorBackend>> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require(&self) -> Result<Arc<dyn VectorBackend>, StoreError> {
        self.backend().ok_or(StoreError::Unavailable)
    }

    pub async fn insert(&self, record: &DocumentRecord) -> Result<String, StoreError> {
        self.require()?
            .insert(record)
            .await
            .map_err(|e| StoreError::Write(format!("{:#}", e)))
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.require()?
            .delete_by_id(id)
            .await
            .map_err(|e| StoreError::Write(format!("{:#}", e)))
    }

    pub async fn delete_many(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.require()?
            .delete_many(ids)
            .await
            .map_err(|e| StoreError::Write(format!("{:#}", e)))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<StoredRecord>, StoreError> {
        self.require()?.get_by_id(id).await.map_err(read_error)
    }

    pub async fn fetch_by_filter(
        &self,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.require()?
            .fetch_by_filter(filter, limit)
            .await
            .map_err(read_error)
    }

    pub async fn nearest_neighbors(
        &self,
        query: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Hit>, StoreError> {
        self.require()?
            .nearest_neighbors(query, filter, limit)
            .await
            .map_err(read_error)
    }

    pub async fn aggregate_by_field(
        &self,
        field: RecordField,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.require()?
            .aggregate_by_field(field)
            .await
            .map_err(read_error)
    }
}

/// CLI entry point for `rfp init`: connect and prepare the collection.
pub async fn run_init(config: &Config) -> Result<()> {
    let store = DocumentStore::connect(config).await;
    let Some(name) = store.backend_name() else {
        anyhow::bail!(
            "Vector store '{}' is unavailable; check [store] settings",
            config.store.provider
        );
    };
    println!(
        "Vector store ready: {} (collection {})",
        name, config.store.collection
    );
    Ok(())
}

fn read_error(e: anyhow::Error) -> StoreError {
    StoreError::Search(format!("{:#}", e))
}

/// Embedder for the memory store. A provider that cannot be built leaves
/// the store unranked rather than unavailable.
fn memory_embedder(config: &Config) -> Arc<dyn EmbeddingProvider> {
    match create_provider(&config.embedding) {
        Ok(provider) => {
            tracing::info!(
                "memory store embeddings: {} ({})",
                config.embedding.provider,
                provider.model_name()
            );
            provider
        }
        Err(e) => {
            tracing::warn!("embedding provider unavailable, search is unranked: {:#}", e);
            Arc::new(DisabledProvider)
        }
    }
}

/// Instantiate a backend, ping it and ensure its schema. Every failure is logged and
/// yields `None`.
async fn open_backend(config: &Config) -> Option<Arc<dyn VectorBackend>> {
    let store = &config.store;
    let backend: Arc<dyn VectorBackend> = match store.provider.as_str() {
        "disabled" => {
            tracing::info!("vector store disabled by configuration");
            return None;
        }
        "memory" => {
            let embedder = memory_embedder(config);
            match &store.path {
                Some(path) => match InMemoryStore::open(path, embedder).await {
                    Ok(memory) => Arc::new(memory),
                    Err(e) => {
                        tracing::warn!("memory store snapshot unusable: {:#}", e);
                        return None;
                    }
                },
                None => Arc::new(InMemoryStore::new(embedder)),
            }
        }
        "weaviate" => match WeaviateStore::from_config(store) {
            Ok(weaviate) => Arc::new(weaviate),
            Err(e) => {
                tracing::warn!("weaviate store not configured: {:#}", e);
                return None;
            }
        },
        other => {
            tracing::warn!("unknown store provider '{}'", other);
            return None;
        }
    };

    let timeout = Duration::from_secs(store.connect_timeout_secs);
    match tokio::time::timeout(timeout, backend.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!("{} store unreachable: {:#}", backend.name(), e);
            return None;
        }
        Err(_) => {
            tracing::warn!(
                "{} store connectivity check timed out after {}s",
                backend.name(),
                store.connect_timeout_secs
            );
            return None;
        }
    }

    if let Err(e) = backend.ensure_schema().await {
        // Another process may be creating the collection concurrently.
        tracing::warn!("{} schema setup failed, continuing: {:#}", backend.name(), e);
    }

    tracing::info!("{} store connected", backend.name());
    Some(backend)
}
