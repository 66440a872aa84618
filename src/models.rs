//! Core data models used throughout RFP Harness.
//!
//! These types represent the documents, search results, and generation
//! requests that flow through the ingestion, retrieval, and generation
//! pipeline. Field names serialize in camelCase: the persisted record shape
//! is the wire contract between ingestion and search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default value for categorical fields that could not be determined.
pub const UNKNOWN: &str = "Unknown";
/// Default value for budget and timeline.
pub const TBD: &str = "TBD";
/// Default document type.
pub const DEFAULT_DOCUMENT_TYPE: &str = "RFP";

/// A procurement document as stored in the vector collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub title: String,
    pub content: String,
    pub industry: String,
    pub project_type: String,
    #[serde(default)]
    pub disciplines: Vec<String>,
    #[serde(default)]
    pub regulations: Vec<String>,
    pub location: String,
    pub budget: String,
    pub timeline: String,
    pub document_type: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

/// Drop duplicate entries while keeping first occurrences.
///
/// Disciplines and regulations are sets; order carries no meaning but a
/// stable order keeps prompts and snapshots reproducible.
pub fn dedup_set(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

/// Where a read result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Served by the vector store.
    Live,
    /// Curated placeholder data served because the store is unreachable.
    Fallback,
}

/// Optional equality filters for search.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
}

impl SearchFilters {
    pub fn industry(industry: impl Into<String>) -> Self {
        Self {
            industry: Some(industry.into()),
            ..Self::default()
        }
    }

    /// Non-empty filter values as `(camelCase field name, value)` pairs.
    pub fn active(&self) -> Vec<(&'static str, &str)> {
        [
            ("industry", self.industry.as_deref()),
            ("projectType", self.project_type.as_deref()),
            ("documentType", self.document_type.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| match value.map(str::trim) {
            Some(v) if !v.is_empty() => Some((field, v)),
            _ => None,
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active().is_empty()
    }

    /// Whether a record passes every active filter (exact match).
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        self.active().into_iter().all(|(field, value)| match field {
            "industry" => record.industry == value,
            "projectType" => record.project_type == value,
            "documentType" => record.document_type == value,
            _ => false,
        })
    }
}

/// A document returned from search, with retrieval-time data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Store object id.
    pub id: String,
    pub title: String,
    pub industry: String,
    pub project_type: String,
    pub disciplines: Vec<String>,
    pub regulations: Vec<String>,
    pub location: String,
    pub budget: String,
    pub timeline: String,
    pub document_type: String,
    pub file_name: String,
    /// Similarity in `[0.0, 1.0]`, higher is more similar.
    pub relevance_score: f64,
    pub snippet: String,
}

/// Search results tagged with their provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub provenance: Provenance,
}

impl SearchOutcome {
    pub fn live(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            provenance: Provenance::Live,
        }
    }

    pub fn fallback(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            provenance: Provenance::Fallback,
        }
    }

    pub fn is_live(&self) -> bool {
        self.provenance == Provenance::Live
    }
}

/// Document counts for the collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_documents: u64,
    pub industries: BTreeMap<String, u64>,
    pub provenance: Provenance,
}

/// Structured user input for RFP generation.
///
/// No field is required; every field has a sane default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    pub document_type: String,
    pub sector: String,
    pub project_name: String,
    pub project_description: String,
    pub industry: String,
    pub project_type: String,
    pub budget: String,
    pub timeline: String,
    pub location: String,
    pub disciplines: Vec<String>,
    pub requirements: Vec<String>,
    pub evaluation_criteria: String,
    pub submission_guidelines: String,
    pub regulatory: String,
    pub contact_info: String,
    pub custom_clauses: String,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            sector: "Government".to_string(),
            project_name: String::new(),
            project_description: String::new(),
            industry: String::new(),
            project_type: String::new(),
            budget: String::new(),
            timeline: String::new(),
            location: String::new(),
            disciplines: Vec::new(),
            requirements: Vec::new(),
            evaluation_criteria: String::new(),
            submission_guidelines: String::new(),
            regulatory: String::new(),
            contact_info: String::new(),
            custom_clauses: String::new(),
        }
    }
}

/// A document that informed a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSummary {
    pub title: String,
    pub file_name: String,
    pub relevance_score: f64,
}

/// Metadata attached to a generated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub industry: String,
    pub project_type: String,
    pub document_type: String,
    pub document_id: String,
    pub generated_at: DateTime<Utc>,
    pub word_count: usize,
}

/// The result of a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub rfp_text: String,
    pub references: Vec<ReferenceSummary>,
    pub metadata: GenerationMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(industry: &str, project_type: &str) -> DocumentRecord {
        DocumentRecord {
            title: "t".into(),
            content: "c".into(),
            industry: industry.into(),
            project_type: project_type.into(),
            disciplines: vec![],
            regulations: vec![],
            location: UNKNOWN.into(),
            budget: TBD.into(),
            timeline: TBD.into(),
            document_type: DEFAULT_DOCUMENT_TYPE.into(),
            file_name: "f.pdf".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_strings_are_inactive_filters() {
        let filters = SearchFilters {
            industry: Some("  ".into()),
            project_type: None,
            document_type: Some(String::new()),
        };
        assert!(filters.is_empty());
        assert!(filters.matches(&record("Oil & Gas", "Modernization")));
    }

    #[test]
    fn filters_are_a_conjunction() {
        let filters = SearchFilters {
            industry: Some("Manufacturing".into()),
            project_type: Some("Modernization".into()),
            document_type: None,
        };
        assert!(filters.matches(&record("Manufacturing", "Modernization")));
        assert!(!filters.matches(&record("Manufacturing", "Facility Upgrade")));
        assert!(!filters.matches(&record("Oil & Gas", "Modernization")));
    }

    #[test]
    fn dedup_set_keeps_first_occurrence() {
        let out = dedup_set(vec![
            "OSHA".into(),
            " ISO 9001 ".into(),
            "OSHA".into(),
            "".into(),
        ]);
        assert_eq!(out, vec!["OSHA".to_string(), "ISO 9001".to_string()]);
    }

    #[test]
    fn generation_request_defaults_from_empty_json() {
        let req: GenerationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.document_type, "RFP");
        assert_eq!(req.sector, "Government");
        assert!(req.requirements.is_empty());
    }

    #[test]
    fn record_serializes_camel_case() {
        let json = serde_json::to_value(record("Manufacturing", "Modernization")).unwrap();
        assert!(json.get("projectType").is_some());
        assert!(json.get("fileName").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
