//! Curated placeholder data served when the vector store is unreachable.
//!
//! Every read path of [`SearchService`](crate::search::SearchService)
//! degrades to this set instead of failing. Results built from it are
//! tagged [`Provenance::Fallback`](crate::models::Provenance::Fallback).

use chrono::DateTime;
use std::collections::BTreeMap;

use crate::models::{CollectionStats, DocumentRecord, Provenance, SearchFilters};
use crate::store::StoredRecord;

/// Similarity reported for curated results, in curated order.
const FALLBACK_SCORES: [f64; 4] = [0.95, 0.89, 0.84, 0.78];

const SUGGESTIONS: &[&str] = &[
    "manufacturing modernization",
    "oil and gas facility upgrade",
    "chemical processing safety compliance",
    "automation retrofit",
    "plant expansion",
    "decommissioning",
];

struct Curated {
    id: &'static str,
    title: &'static str,
    industry: &'static str,
    project_type: &'static str,
    disciplines: &'static [&'static str],
    regulations: &'static [&'static str],
    location: &'static str,
    budget: &'static str,
    timeline: &'static str,
    content: &'static str,
}

const CURATED: &[Curated] = &[
    Curated {
        id: "fallback-001",
        title: "Manufacturing Plant Modernization RFP",
        industry: "Manufacturing",
        project_type: "Modernization",
        disciplines: &["Mechanical", "Electrical", "Controls"],
        regulations: &["OSHA 1910", "NFPA 70E"],
        location: "Detroit, MI",
        budget: "$5M - $10M",
        timeline: "18 months",
        content: "The agency seeks qualified firms to modernize production lines, \
replace legacy PLC controls, and upgrade plant electrical distribution while \
maintaining continuous operations.",
    },
    Curated {
        id: "fallback-002",
        title: "Refinery Facility Upgrade RFP",
        industry: "Oil & Gas",
        project_type: "Facility Upgrade",
        disciplines: &["Process", "Piping", "Instrumentation"],
        regulations: &["API 650", "OSHA PSM 1910.119"],
        location: "Houston, TX",
        budget: "$20M - $35M",
        timeline: "24 months",
        content: "Proposals are requested for the upgrade of crude distillation \
units, tank farm integrity improvements, and replacement of safety \
instrumented systems at an operating refinery.",
    },
    Curated {
        id: "fallback-003",
        title: "Chemical Processing Safety Compliance RFP",
        industry: "Chemical Processing",
        project_type: "Safety Compliance",
        disciplines: &["Process Safety", "Environmental"],
        regulations: &["EPA RMP", "OSHA PSM 1910.119"],
        location: "Baton Rouge, LA",
        budget: "$2M - $4M",
        timeline: "12 months",
        content: "Scope includes process hazard analyses, relief system \
validation, and remediation of findings to bring reactor units into \
compliance with federal process safety rules.",
    },
    Curated {
        id: "fallback-004",
        title: "Manufacturing Automation Retrofit RFP",
        industry: "Manufacturing",
        project_type: "Automation Retrofit",
        disciplines: &["Controls", "Robotics"],
        regulations: &["ISO 10218", "OSHA 1910"],
        location: "Dallas, TX",
        budget: "$3M - $6M",
        timeline: "9 months",
        content: "The retrofit covers robotic material handling cells, vision \
inspection stations, and integration with the existing manufacturing \
execution system.",
    },
];

fn to_stored(c: &Curated) -> StoredRecord {
    StoredRecord {
        id: c.id.to_string(),
        record: DocumentRecord {
            title: c.title.to_string(),
            content: c.content.to_string(),
            industry: c.industry.to_string(),
            project_type: c.project_type.to_string(),
            disciplines: c.disciplines.iter().map(|s| s.to_string()).collect(),
            regulations: c.regulations.iter().map(|s| s.to_string()).collect(),
            location: c.location.to_string(),
            budget: c.budget.to_string(),
            timeline: c.timeline.to_string(),
            document_type: "RFP".to_string(),
            file_name: format!("{}.pdf", c.id),
            created_at: DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default(),
        },
    }
}

/// The curated records paired with their fixed relevance scores.
pub fn records() -> Vec<(StoredRecord, f64)> {
    CURATED
        .iter()
        .zip(FALLBACK_SCORES)
        .map(|(c, score)| (to_stored(c), score))
        .collect()
}

/// Curated records passing `filters`, at most `limit`.
pub fn matching(filters: &SearchFilters, limit: usize) -> Vec<(StoredRecord, f64)> {
    records()
        .into_iter()
        .filter(|(stored, _)| filters.matches(&stored.record))
        .take(limit)
        .collect()
}

pub fn suggestions(limit: usize) -> Vec<String> {
    SUGGESTIONS
        .iter()
        .take(limit)
        .map(|s| s.to_string())
        .collect()
}

/// Stats computed over the curated set.
pub fn stats() -> CollectionStats {
    let mut industries = BTreeMap::new();
    for c in CURATED {
        *industries.entry(c.industry.to_string()).or_insert(0) += 1;
    }
    CollectionStats {
        total_documents: CURATED.len() as u64,
        industries,
        provenance: Provenance::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_match_curated_set() {
        let s = stats();
        assert_eq!(s.total_documents, 4);
        assert_eq!(s.industries.get("Manufacturing"), Some(&2));
        assert_eq!(s.industries.values().sum::<u64>(), s.total_documents);
    }

    #[test]
    fn matching_applies_filters_and_limit() {
        let manufacturing = matching(&SearchFilters::industry("Manufacturing"), 10);
        assert_eq!(manufacturing.len(), 2);
        assert!(manufacturing
            .iter()
            .all(|(s, _)| s.record.industry == "Manufacturing"));

        assert_eq!(matching(&SearchFilters::default(), 3).len(), 3);
        assert!(matching(&SearchFilters::industry("Aerospace"), 10).is_empty());
    }

    #[test]
    fn suggestions_truncate() {
        assert_eq!(suggestions(2).len(), 2);
        assert_eq!(suggestions(100).len(), SUGGESTIONS.len());
    }
}
