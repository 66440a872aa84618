//! In-memory [`VectorBackend`] for local use and tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine similarity over vectors from the configured
//! [`EmbeddingProvider`]. With a disabled provider, similarity queries
//! return filter matches in insertion order without scores.
//!
//! When opened with a snapshot path, records and their vectors are written
//! to a JSON file after every mutation and reloaded on open. Records whose
//! vectors came from a different model are re-embedded on load.
//!
//! Mutations are serialized by an async write lock held across the
//! snapshot write, so snapshots land in mutation order. A failed write
//! rolls the in-memory state back to what is on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::DocumentRecord;

use super::{Filter, Hit, RecordField, StoredRecord, VectorBackend};

#[derive(Clone)]
struct Entry {
    stored: StoredRecord,
    vector: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    model: String,
    records: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(flatten)]
    stored: StoredRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    vector: Vec<f32>,
}

/// Text that contributes to a record's embedding. Mirrors the vectorized
/// properties of the remote collection.
fn vectorized_text(record: &DocumentRecord) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        record.title, record.industry, record.project_type, record.content
    )
}

/// Cosine similarity mapped onto `[0, 1]`, the way Weaviate reports
/// certainty.
fn certainty_from_cosine(cosine: f32) -> f64 {
    ((1.0 + cosine as f64) / 2.0).clamp(0.0, 1.0)
}

/// In-memory store with optional JSON snapshot persistence.
pub struct InMemoryStore {
    entries: RwLock<Vec<Entry>>,
    embedder: Arc<dyn EmbeddingProvider>,
    snapshot: Option<PathBuf>,
    write_lock: tokio::sync::Mutex<()>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
            snapshot: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a store backed by a snapshot file, loading it if present.
    pub async fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = Self {
            snapshot: Some(path.to_path_buf()),
            ..Self::new(embedder)
        };

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
            let entries = store.load_entries(snapshot).await?;
            *store.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
        }

        Ok(store)
    }

    /// Keep persisted vectors from the current model; re-embed the rest.
    async fn load_entries(&self, snapshot: Snapshot) -> Result<Vec<Entry>> {
        let same_model = snapshot.model == self.embedder.model_name();
        let dims = self.embedder.dims();
        let mut entries: Vec<Entry> = snapshot
            .records
            .into_iter()
            .map(|e| Entry {
                stored: e.stored,
                vector: if same_model && e.vector.len() == dims {
                    e.vector
                } else {
                    Vec::new()
                },
            })
            .collect();

        if !self.embedder.is_enabled() {
            return Ok(entries);
        }

        let stale: Vec<usize> = (0..entries.len())
            .filter(|&i| entries[i].vector.is_empty())
            .collect();
        if stale.is_empty() {
            return Ok(entries);
        }

        tracing::info!(
            "re-embedding {} snapshot records with {}",
            stale.len(),
            self.embedder.model_name()
        );
        let texts: Vec<String> = stale
            .iter()
            .map(|&i| vectorized_text(&entries[i].stored.record))
            .collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != stale.len() {
            anyhow::bail!(
                "embedding provider returned {} vectors for {} records",
                vectors.len(),
                stale.len()
            );
        }
        for (i, vector) in stale.into_iter().zip(vectors) {
            entries[i].vector = vector;
        }
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn embed_record(&self, record: &DocumentRecord) -> Result<Vec<f32>> {
        if !self.embedder.is_enabled() {
            return Ok(Vec::new());
        }
        embed_query(self.embedder.as_ref(), &vectorized_text(record)).await
    }

    /// Apply `mutate` and persist the result. Must be called with
    /// `write_lock` held. On a failed write the previous entries are
    /// restored and the error returned.
    async fn commit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Entry>) -> bool,
    {
        let Some(path) = self.snapshot.clone() else {
            mutate(&mut self.entries.write().unwrap_or_else(PoisonError::into_inner));
            return Ok(());
        };

        let (previous, data) = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let previous = entries.clone();
            if !mutate(&mut entries) {
                return Ok(());
            }
            match self.serialize(&entries) {
                Ok(data) => (previous, data),
                Err(e) => {
                    *entries = previous;
                    return Err(e);
                }
            }
        };

        let written = tokio::task::spawn_blocking(move || write_snapshot(&path, &data))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
        if let Err(e) = written {
            *self.entries.write().unwrap_or_else(PoisonError::into_inner) = previous;
            return Err(e);
        }
        Ok(())
    }

    fn serialize(&self, entries: &[Entry]) -> Result<String> {
        let snapshot = Snapshot {
            model: self.embedder.model_name().to_string(),
            records: entries
                .iter()
                .map(|e| SnapshotEntry {
                    stored: e.stored.clone(),
                    vector: e.vector.clone(),
                })
                .collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Remove every entry whose id is in `ids` under a single snapshot
    /// write. Returns how many were removed.
    async fn remove_ids(&self, ids: &[String]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        self.commit(|entries| {
            let before = entries.len();
            entries.retain(|e| !ids.contains(&e.stored.id));
            removed = before - entries.len();
            removed > 0
        })
        .await?;
        Ok(removed)
    }
}

/// Write via temp file + rename so a crash never leaves a truncated file.
fn write_snapshot(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write snapshot: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl VectorBackend for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.commit(|_| true).await
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<String> {
        let vector = self.embed_record(record).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let entry = Entry {
            stored: StoredRecord {
                id: id.clone(),
                record: record.clone(),
            },
            vector,
        };

        let _guard = self.write_lock.lock().await;
        self.commit(move |entries| {
            entries.push(entry);
            true
        })
        .await?;
        Ok(id)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.remove_ids(&[id.to_string()]).await?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize> {
        self.remove_ids(ids).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredRecord>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .find(|e| e.stored.id == id)
            .map(|e| e.stored.clone()))
    }

    async fn fetch_by_filter(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredRecord>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .iter()
            .filter(|e| filter.matches(&e.stored.record))
            .take(limit)
            .map(|e| e.stored.clone())
            .collect())
    }

    async fn nearest_neighbors(
        &self,
        query: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Hit>> {
        if !self.embedder.is_enabled() {
            return Ok(self
                .fetch_by_filter(filter, limit)
                .await?
                .into_iter()
                .map(|stored| Hit {
                    stored,
                    certainty: None,
                    distance: None,
                })
                .collect());
        }

        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .filter(|e| filter.matches(&e.stored.record))
            .map(|e| (cosine_similarity(&query_vec, &e.vector), e))
            .collect();

        // Stable: ties keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(cos, e)| Hit {
                stored: e.stored.clone(),
                certainty: Some(certainty_from_cosine(cos)),
                distance: Some(1.0 - cos as f64),
            })
            .collect())
    }

    async fn aggregate_by_field(&self, field: RecordField) -> Result<Vec<(String, u64)>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for e in entries.iter() {
            *counts.entry(field.value_of(&e.stored.record)).or_insert(0) += 1;
        }

        let mut groups: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(value, count)| (value.to_string(), count))
            .collect();
        groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(groups)
    }
}
