//! Ingestion pipeline.
//!
//! Turns a directory of source documents into stored records:
//!
//! ```text
//! source file ─▶ extract text ─▶ sidecar / file-name metadata ─▶ DocumentRecord ─▶ store
//! ```
//!
//! Files are processed sequentially. A failure on one file is logged and
//! counted; it never aborts the batch. Reading and text extraction run on
//! the blocking thread pool.
//!
//! Re-ingesting a file name replaces the earlier record. The new record is
//! inserted first and older copies are deleted afterwards, so a failed
//! insert leaves the previous copy in place and `fileName` stays unique
//! once the call returns.

use anyhow::Result;
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::config::{Config, IngestionConfig};
use crate::error::{IngestError, StoreError};
use crate::extract::{content_type_for, PdfTextExtractor, TextExtractor};
use crate::metadata::{self, sidecar_path_for, try_parse_sidecar, SidecarMetadata};
use crate::models::DocumentRecord;
use crate::store::{DocumentStore, Filter, RecordField};

/// Per-batch outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub success_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearStats {
    pub deleted_count: usize,
}

pub struct IngestionPipeline {
    store: Arc<DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    include_set: GlobSet,
    page_size: usize,
}

impl IngestionPipeline {
    /// Pipeline with the default PDF extractor.
    pub fn new(store: Arc<DocumentStore>, config: &IngestionConfig) -> Result<Self> {
        Ok(Self {
            store,
            extractor: Arc::new(PdfTextExtractor),
            include_set: build_globset(&config.include_globs)?,
            page_size: config.page_size,
        })
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Primary source files directly inside `dir`, sorted by name.
    ///
    /// Sidecar descriptors are never primary files, whatever the globs say.
    pub fn list_source_files(&self, dir: &Path) -> Result<Vec<String>, IngestError> {
        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| IngestError::Io {
                path: dir.display().to_string(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(metadata::SIDECAR_SUFFIX) {
                continue;
            }
            if self.include_set.is_match(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Ingest every primary source file in `dir`.
    ///
    /// Returns `{0, 0}` without touching the directory when the store is
    /// unavailable.
    pub async fn ingest_all(&self, dir: &Path) -> Result<IngestStats, IngestError> {
        if !self.store.is_available() {
            tracing::warn!("vector store unavailable, skipping ingestion");
            return Ok(IngestStats::default());
        }

        let files = self.list_source_files(dir)?;
        tracing::info!("found {} source files in {}", files.len(), dir.display());

        let mut stats = IngestStats::default();
        for name in &files {
            match self.ingest_one(dir, name).await {
                Ok(id) => {
                    tracing::info!("ingested {} as {}", name, id);
                    stats.success_count += 1;
                }
                Err(e) => {
                    tracing::error!("failed to ingest {}: {}", name, e);
                    stats.failed_count += 1;
                }
            }
        }

        tracing::info!(
            "ingestion complete: {} succeeded, {} failed",
            stats.success_count,
            stats.failed_count
        );
        Ok(stats)
    }

    /// Ingest a single file from `dir`, returning the new store id.
    pub async fn ingest_one(&self, dir: &Path, file_name: &str) -> Result<String, IngestError> {
        if !self.store.is_available() {
            return Err(StoreError::Unavailable.into());
        }

        let (content, sidecar) = self.read_source(dir, file_name).await?;
        let record = build_record(file_name, content, sidecar.as_ref());

        let id = self.store.insert(&record).await?;
        self.delete_previous_copies(file_name, &id).await?;
        Ok(id)
    }

    /// Read, extract, and load the sidecar for one file off the async
    /// runtime.
    async fn read_source(
        &self,
        dir: &Path,
        file_name: &str,
    ) -> Result<(String, Option<SidecarMetadata>), IngestError> {
        let extractor = self.extractor.clone();
        let dir = dir.to_path_buf();
        let name = file_name.to_string();

        tokio::task::spawn_blocking(move || -> Result<_, IngestError> {
            let path = dir.join(&name);
            let bytes = std::fs::read(&path).map_err(|source| IngestError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let content = extractor
                .extract(&bytes, content_type_for(&path))
                .map_err(|source| IngestError::Extraction {
                    file: name.clone(),
                    source,
                })?;
            let sidecar = try_parse_sidecar(&sidecar_path_for(&dir, &name));
            Ok((content, sidecar))
        })
        .await
        .map_err(|e| IngestError::Interrupted {
            file: file_name.to_string(),
            message: e.to_string(),
        })?
    }

    /// Delete every record for `file_name` other than `keep_id`.
    async fn delete_previous_copies(
        &self,
        file_name: &str,
        keep_id: &str,
    ) -> Result<usize, StoreError> {
        let stale: Vec<String> = self
            .store
            .fetch_by_filter(&Filter::eq(RecordField::FileName, file_name), self.page_size)
            .await?
            .into_iter()
            .map(|stored| stored.id)
            .filter(|id| id != keep_id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        tracing::debug!("replacing {} earlier record(s) for {}", stale.len(), file_name);
        self.store.delete_many(&stale).await
    }

    /// Delete up to one page of records from the collection.
    pub async fn clear_all(&self) -> Result<ClearStats, IngestError> {
        let ids: Vec<String> = self
            .store
            .fetch_by_filter(&Filter::all(), self.page_size)
            .await?
            .into_iter()
            .map(|stored| stored.id)
            .collect();
        self.store.delete_many(&ids).await?;
        tracing::info!("cleared {} documents", ids.len());
        Ok(ClearStats {
            deleted_count: ids.len(),
        })
    }
}

/// Assemble a complete record from extracted text and resolved metadata.
pub fn build_record(
    file_name: &str,
    content: String,
    sidecar: Option<&metadata::SidecarMetadata>,
) -> DocumentRecord {
    let meta = metadata::infer(file_name, sidecar);
    DocumentRecord {
        title: meta.title,
        content,
        industry: meta.industry,
        project_type: meta.project_type,
        disciplines: meta.disciplines,
        regulations: meta.regulations,
        location: meta.location,
        budget: meta.budget,
        timeline: meta.timeline,
        document_type: meta.document_type,
        file_name: file_name.to_string(),
        created_at: Utc::now(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// CLI entry point for `rfp ingest all`.
pub async fn run_ingest_all(config: &Config, dir: Option<&Path>) -> Result<()> {
    let store = Arc::new(DocumentStore::connect(config).await);
    if !store.is_available() {
        anyhow::bail!("Vector store is not available. Check [store] configuration.");
    }
    let pipeline = IngestionPipeline::new(store, &config.ingestion)?;
    let dir = dir.unwrap_or(config.ingestion.source_dir.as_path());

    let stats = pipeline.ingest_all(dir).await?;
    println!("ingest {}", dir.display());
    println!("  succeeded: {}", stats.success_count);
    println!("  failed: {}", stats.failed_count);
    println!("ok");
    Ok(())
}

/// CLI entry point for `rfp ingest file <name>`.
pub async fn run_ingest_file(config: &Config, name: &str, dir: Option<&Path>) -> Result<()> {
    let store = Arc::new(DocumentStore::connect(config).await);
    let pipeline = IngestionPipeline::new(store, &config.ingestion)?;
    let dir = dir.unwrap_or(config.ingestion.source_dir.as_path());

    let id = pipeline.ingest_one(dir, name).await?;
    println!("ingested {} as {}", name, id);
    Ok(())
}

/// CLI entry point for `rfp clear`.
pub async fn run_clear(config: &Config) -> Result<()> {
    let store = Arc::new(DocumentStore::connect(config).await);
    let pipeline = IngestionPipeline::new(store, &config.ingestion)?;
    let stats = pipeline.clear_all().await?;
    println!("deleted {} documents", stats.deleted_count);
    Ok(())
}
