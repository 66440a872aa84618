//! Deterministic embedder shared by the integration tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rfp_harness::embedding::EmbeddingProvider;
use rfp_harness::store::InMemoryStore;

const VOCABULARY: &[&str] = &[
    "reactor",
    "vessel",
    "modernization",
    "chemical",
    "solvent",
    "crude",
    "terminal",
    "pipeline",
    "storage",
    "tank",
    "manifolds",
    "control",
];

/// One dimension per vocabulary term, valued by its occurrence count.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                let tokens: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
                VOCABULARY
                    .iter()
                    .map(|term| tokens.iter().filter(|t| *t == term).count() as f32)
                    .collect()
            })
            .collect())
    }
}

pub fn memory_store() -> InMemoryStore {
    InMemoryStore::new(Arc::new(KeywordEmbedder))
}
