//! Search service: filtered semantic search over the document store.
//!
//! Every read path degrades instead of failing when the store is
//! unreachable. Degraded results come from [`crate::fallback`] and are
//! tagged [`Provenance::Fallback`] so callers can tell them apart from live
//! data.
//!
//! # Relevance
//!
//! `relevanceScore` is a similarity in `[0, 1]`, higher is more similar.
//! It comes from the backend's certainty when reported, otherwise from its
//! distance (`1 - distance / 2`, clamped), otherwise `0`. Exact-match
//! fetches compute no similarity and report `0`.

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::error::{SearchError, StoreError};
use crate::fallback;
use crate::models::{CollectionStats, Provenance, SearchFilters, SearchOutcome, SearchResult};
use crate::store::{DocumentStore, Filter, Hit, RecordField, StoredRecord};

/// Characters of the source document used as the query for similarity.
const SIMILAR_QUERY_CHARS: usize = 500;
const SNIPPET_CHARS_BEFORE: usize = 100;
const SNIPPET_CHARS_AFTER: usize = 200;

pub struct SearchService {
    store: Arc<DocumentStore>,
    snippet_length: usize,
}

impl SearchService {
    pub fn new(store: Arc<DocumentStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            snippet_length: config.snippet_length,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Semantic search restricted by equality filters.
    pub async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let hits = match self
            .store
            .nearest_neighbors(query, &to_store_filter(filters), limit)
            .await
        {
            Ok(hits) => hits,
            Err(StoreError::Unavailable) => {
                tracing::debug!("store unavailable, serving fallback results");
                return Ok(self.fallback_outcome(query, filters, limit));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(SearchOutcome::live(
            hits.into_iter()
                .map(|hit| {
                    let score = relevance_from_hit(&hit);
                    self.to_result(hit.stored, score, query)
                })
                .collect(),
        ))
    }

    /// Exact-match listing of one industry.
    pub async fn search_by_industry(
        &self,
        industry: &str,
        limit: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let filters = SearchFilters::industry(industry);
        match self
            .store
            .fetch_by_filter(&to_store_filter(&filters), limit)
            .await
        {
            Ok(records) => Ok(SearchOutcome::live(
                records
                    .into_iter()
                    .map(|stored| self.to_result(stored, 0.0, ""))
                    .collect(),
            )),
            Err(StoreError::Unavailable) => Ok(self.fallback_outcome("", &filters, limit)),
            Err(e) => Err(e.into()),
        }
    }

    /// Documents similar to `document_id`, which may be a file name or a
    /// store id. The source document itself is never returned.
    pub async fn find_similar_documents(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let source = match self.resolve(document_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(SearchError::NotFound(document_id.to_string())),
            Err(StoreError::Unavailable) => {
                let mut outcome =
                    self.fallback_outcome("", &SearchFilters::default(), limit.saturating_add(1));
                outcome
                    .results
                    .retain(|r| r.id != document_id && r.file_name != document_id);
                outcome.results.truncate(limit);
                return Ok(outcome);
            }
            Err(e) => return Err(e.into()),
        };

        let query: String = source.record.content.chars().take(SIMILAR_QUERY_CHARS).collect();
        let filters = SearchFilters::industry(source.record.industry.clone());
        // One extra so dropping the source still leaves `limit` results.
        let mut outcome = self.search(&query, &filters, limit.saturating_add(1)).await?;
        outcome
            .results
            .retain(|r| r.file_name != source.record.file_name);
        outcome.results.truncate(limit);
        Ok(outcome)
    }

    /// The full stored document, by file name or store id.
    pub async fn get_document(&self, document_id: &str) -> Result<StoredRecord, SearchError> {
        self.resolve(document_id)
            .await?
            .ok_or_else(|| SearchError::NotFound(document_id.to_string()))
    }

    async fn resolve(&self, document_id: &str) -> Result<Option<StoredRecord>, StoreError> {
        let by_name = self
            .store
            .fetch_by_filter(&Filter::eq(RecordField::FileName, document_id), 1)
            .await?;
        if let Some(stored) = by_name.into_iter().next() {
            return Ok(Some(stored));
        }
        self.store.get_by_id(document_id).await
    }

    /// Autocomplete candidates for a partial query.
    ///
    /// Never fails; any problem yields the fixed fallback list.
    pub async fn get_search_suggestions(&self, partial: &str, limit: usize) -> Vec<String> {
        let outcome = match self.search(partial, &SearchFilters::default(), limit).await {
            Ok(outcome) if outcome.is_live() => outcome,
            Ok(_) => return fallback::suggestions(limit),
            Err(e) => {
                tracing::warn!("suggestion search failed: {}", e);
                return fallback::suggestions(limit);
            }
        };

        let needle = partial.to_lowercase();
        let mut suggestions = BTreeSet::new();
        for result in &outcome.results {
            for token in result.title.split_whitespace() {
                if token.chars().count() > 3 && token.to_lowercase().contains(&needle) {
                    suggestions.insert(token.to_string());
                }
            }
            for value in [&result.project_type, &result.industry] {
                if value.to_lowercase().contains(&needle) {
                    suggestions.insert(value.clone());
                }
            }
        }
        suggestions.into_iter().take(limit).collect()
    }

    /// Document counts per industry.
    pub async fn get_collection_stats(&self) -> CollectionStats {
        match self.store.aggregate_by_field(RecordField::Industry).await {
            Ok(groups) => CollectionStats {
                total_documents: groups.iter().map(|(_, count)| count).sum(),
                industries: groups.into_iter().collect(),
                provenance: Provenance::Live,
            },
            Err(StoreError::Unavailable) => fallback::stats(),
            Err(e) => {
                tracing::warn!("collection stats failed, serving fallback: {}", e);
                fallback::stats()
            }
        }
    }

    fn fallback_outcome(&self, query: &str, filters: &SearchFilters, limit: usize) -> SearchOutcome {
        SearchOutcome::fallback(
            fallback::matching(filters, limit)
                .into_iter()
                .map(|(stored, score)| self.to_result(stored, score, query))
                .collect(),
        )
    }

    /// Project a stored record into a result with a snippet for `query`.
    pub fn to_result(&self, stored: StoredRecord, relevance_score: f64, query: &str) -> SearchResult {
        let snippet = create_snippet(&stored.record.content, query, self.snippet_length);
        let r = stored.record;
        SearchResult {
            id: stored.id,
            title: r.title,
            industry: r.industry,
            project_type: r.project_type,
            disciplines: r.disciplines,
            regulations: r.regulations,
            location: r.location,
            budget: r.budget,
            timeline: r.timeline,
            document_type: r.document_type,
            file_name: r.file_name,
            relevance_score,
            snippet,
        }
    }
}

fn to_store_filter(filters: &SearchFilters) -> Filter {
    filters
        .active()
        .into_iter()
        .fold(Filter::all(), |filter, (name, value)| {
            match RecordField::parse(name) {
                Some(field) => filter.and(field, value),
                None => filter,
            }
        })
}

fn relevance_from_hit(hit: &Hit) -> f64 {
    match (hit.certainty, hit.distance) {
        (Some(c), _) => c.clamp(0.0, 1.0),
        (None, Some(d)) => (1.0 - d / 2.0).clamp(0.0, 1.0),
        (None, None) => 0.0,
    }
}

/// Extract a query-focused excerpt of `content`.
///
/// Query tokens of at most two characters are ignored. The first token
/// (in query order) found anywhere in the content, case-insensitively,
/// anchors a window of 100 characters before and 200 after its position.
/// Without a match the excerpt is the first `max_length` characters, with
/// `...` appended when that cut anything off. Indices count characters.
pub fn create_snippet(content: &str, query: &str, max_length: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let folded: Vec<char> = chars.iter().map(|c| fold_char(*c)).collect();

    for token in query.split_whitespace().filter(|t| t.chars().count() > 2) {
        let needle: Vec<char> = token.chars().map(fold_char).collect();
        if let Some(pos) = find_chars(&folded, &needle) {
            let start = pos.saturating_sub(SNIPPET_CHARS_BEFORE);
            let end = (pos + SNIPPET_CHARS_AFTER).min(chars.len());
            return chars[start..end].iter().collect::<String>().trim().to_string();
        }
    }

    let mut snippet: String = chars.iter().take(max_length).collect();
    if chars.len() > max_length {
        snippet.push_str("...");
    }
    snippet.trim().to_string()
}

/// Single-character lowercase so folded text keeps its character positions.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// CLI entry point for `rfp search`.
pub async fn run_search(
    config: &Config,
    query: &str,
    filters: &SearchFilters,
    limit: Option<usize>,
) -> Result<()> {
    let service = connect_service(config).await;
    let limit = limit.unwrap_or(config.retrieval.default_limit);
    let outcome = service.search(query, filters, limit).await?;
    print_outcome(&outcome);
    Ok(())
}

/// CLI entry point for `rfp similar`.
pub async fn run_similar(config: &Config, document_id: &str, limit: Option<usize>) -> Result<()> {
    let service = connect_service(config).await;
    let limit = limit.unwrap_or(config.retrieval.default_limit);
    let outcome = service.find_similar_documents(document_id, limit).await?;
    print_outcome(&outcome);
    Ok(())
}

/// CLI entry point for `rfp suggest`.
pub async fn run_suggest(config: &Config, partial: &str, limit: usize) -> Result<()> {
    let service = connect_service(config).await;
    for suggestion in service.get_search_suggestions(partial, limit).await {
        println!("{}", suggestion);
    }
    Ok(())
}

/// CLI entry point for `rfp stats`.
pub async fn run_stats(config: &Config) -> Result<()> {
    let service = connect_service(config).await;
    let stats = service.get_collection_stats().await;
    println!("documents: {}", stats.total_documents);
    for (industry, count) in &stats.industries {
        println!("  {:<24} {}", industry, count);
    }
    println!("source: {}", provenance_label(stats.provenance));
    Ok(())
}

/// CLI entry point for `rfp get`.
pub async fn run_get(config: &Config, document_id: &str) -> Result<()> {
    let service = connect_service(config).await;
    let stored = service.get_document(document_id).await?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

async fn connect_service(config: &Config) -> SearchService {
    let store = Arc::new(DocumentStore::connect(config).await);
    SearchService::new(store, &config.retrieval)
}

fn print_outcome(outcome: &SearchOutcome) {
    if outcome.results.is_empty() {
        println!("No results.");
    }
    for (i, r) in outcome.results.iter().enumerate() {
        println!(
            "{}. [{:.2}] {} ({} / {})",
            i + 1,
            r.relevance_score,
            r.title,
            r.industry,
            r.project_type
        );
        println!("    file: {}  id: {}", r.file_name, r.id);
        if !r.snippet.is_empty() {
            println!("    {}", r.snippet.replace('\n', " "));
        }
    }
    println!("source: {}", provenance_label(outcome.provenance));
}

pub fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Live => "live",
        Provenance::Fallback => "fallback",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::keyword_embedder;
    use crate::models::{DocumentRecord, TBD, UNKNOWN};
    use crate::store::InMemoryStore;
    use chrono::Utc;

    fn record(file_name: &str, title: &str, industry: &str, project_type: &str, content: &str) -> DocumentRecord {
        DocumentRecord {
            title: title.to_string(),
            content: content.to_string(),
            industry: industry.to_string(),
            project_type: project_type.to_string(),
            disciplines: vec![],
            regulations: vec![],
            location: UNKNOWN.to_string(),
            budget: TBD.to_string(),
            timeline: TBD.to_string(),
            document_type: "RFP".to_string(),
            file_name: file_name.to_string(),
            created_at: Utc::now(),
        }
    }

    async fn seeded() -> SearchService {
        let store = Arc::new(DocumentStore::with_backend(Arc::new(InMemoryStore::new(
            keyword_embedder(),
        ))));
        for r in [
            record("a.pdf", "Refinery Upgrade", "Oil & Gas", "Facility Upgrade", "refinery compressor upgrade"),
            record("b.pdf", "Refinery Expansion", "Oil & Gas", "Plant Expansion", "refinery tank farm expansion"),
            record("c.pdf", "Assembly Modernization", "Manufacturing", "Modernization", "assembly line robotics"),
        ] {
            store.insert(&r).await.unwrap();
        }
        SearchService::new(store, &RetrievalConfig::default())
    }

    fn unavailable() -> SearchService {
        SearchService::new(Arc::new(DocumentStore::unavailable()), &RetrievalConfig::default())
    }

    #[test]
    fn snippet_centers_on_first_matching_token() {
        let content = format!("{}Refinery{}", "x".repeat(150), "y".repeat(300));
        let s = create_snippet(&content, "an refinery", 300);
        // 100 before the match, 200 after the match position.
        assert_eq!(s.chars().count(), 300);
        assert!(s.starts_with(&"x".repeat(50)));
        assert!(s.contains("Refinery"));
    }

    #[test]
    fn snippet_defaults_with_ellipsis() {
        let content = "a".repeat(400);
        let s = create_snippet(&content, "zzz", 300);
        assert_eq!(s, format!("{}...", "a".repeat(300)));

        let short = create_snippet("  short text  ", "zzz", 300);
        assert_eq!(short, "short text");
    }

    #[test]
    fn snippet_ignores_short_tokens_and_stops_at_first_match() {
        let content = "of the pump station and the boiler room";
        // "of" is ignored; "boiler" is checked before "pump".
        let s = create_snippet(content, "of boiler pump", 300);
        assert!(s.contains("boiler"));
        assert_eq!(s, content);
    }

    #[test]
    fn snippet_is_char_safe() {
        let content = "ÄÖÜ".repeat(200);
        let s = create_snippet(&content, "öü", 10);
        assert!(s.ends_with("..."));
        let s = create_snippet(&content, "üäö", 10);
        assert!(s.chars().count() <= 300);
    }

    #[test]
    fn snippet_is_deterministic() {
        let content = "Scope of Work: replace boilers.";
        assert_eq!(
            create_snippet(content, "boilers", 300),
            create_snippet(content, "boilers", 300)
        );
    }

    #[test]
    fn relevance_prefers_certainty_then_distance() {
        let stored = StoredRecord {
            id: "x".into(),
            record: record("x.pdf", "t", "i", "p", "c"),
        };
        let hit = |certainty, distance| Hit {
            stored: stored.clone(),
            certainty,
            distance,
        };
        assert_eq!(relevance_from_hit(&hit(Some(0.8), Some(0.1))), 0.8);
        assert_eq!(relevance_from_hit(&hit(None, Some(0.5))), 0.75);
        assert_eq!(relevance_from_hit(&hit(None, None)), 0.0);
    }

    #[tokio::test]
    async fn live_search_applies_filter_conjunction() {
        let service = seeded().await;
        let outcome = service
            .search(
                "refinery",
                &SearchFilters {
                    industry: Some("Oil & Gas".into()),
                    project_type: Some("Plant Expansion".into()),
                    document_type: None,
                },
                10,
            )
            .await
            .unwrap();
        assert!(outcome.is_live());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].file_name, "b.pdf");
        assert!(outcome.results[0].relevance_score > 0.0);
    }

    #[tokio::test]
    async fn fallback_search_applies_filters() {
        let outcome = unavailable()
            .search("anything", &SearchFilters::industry("Manufacturing"), 10)
            .await
            .unwrap();
        assert_eq!(outcome.provenance, Provenance::Fallback);
        assert!(!outcome.results.is_empty());
        assert!(outcome.results.iter().all(|r| r.industry == "Manufacturing"));
    }

    #[tokio::test]
    async fn search_by_industry_is_exact_match_with_zero_score() {
        let outcome = seeded().await.search_by_industry("Oil & Gas", 10).await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.relevance_score == 0.0));
        assert!(outcome.results.iter().all(|r| r.industry == "Oil & Gas"));
    }

    #[tokio::test]
    async fn similar_excludes_source_and_resolves_by_file_name_or_id() {
        let service = seeded().await;
        let outcome = service.find_similar_documents("a.pdf", 5).await.unwrap();
        assert!(outcome.results.iter().all(|r| r.file_name != "a.pdf"));
        assert!(outcome.results.iter().all(|r| r.industry == "Oil & Gas"));
        assert_eq!(outcome.results.len(), 1);

        let id = service.get_document("a.pdf").await.unwrap().id;
        let by_id = service.find_similar_documents(&id, 5).await.unwrap();
        assert_eq!(by_id.results, outcome.results);
    }

    #[tokio::test]
    async fn similar_accepts_unbounded_limit() {
        let outcome = seeded()
            .await
            .find_similar_documents("a.pdf", usize::MAX)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);

        let fallback = unavailable()
            .find_similar_documents("fallback-001", usize::MAX)
            .await
            .unwrap();
        assert_eq!(fallback.provenance, Provenance::Fallback);
        assert!(!fallback.results.is_empty());
    }

    #[tokio::test]
    async fn similar_unknown_document_is_not_found() {
        let err = seeded().await.find_similar_documents("nope.pdf", 5).await.unwrap_err();
        assert_eq!(err, SearchError::NotFound("nope.pdf".into()));
    }

    #[tokio::test]
    async fn similar_without_store_excludes_id() {
        let outcome = unavailable()
            .find_similar_documents("fallback-001", 10)
            .await
            .unwrap();
        assert_eq!(outcome.provenance, Provenance::Fallback);
        assert!(outcome.results.iter().all(|r| r.id != "fallback-001"));
    }

    #[tokio::test]
    async fn get_document_without_store_is_unavailable() {
        assert_eq!(
            unavailable().get_document("a.pdf").await.unwrap_err(),
            SearchError::Unavailable
        );
    }

    #[tokio::test]
    async fn suggestions_from_live_results() {
        let suggestions = seeded().await.get_search_suggestions("refin", 10).await;
        assert_eq!(suggestions, vec!["Refinery".to_string()]);

        let upgrades = seeded().await.get_search_suggestions("upgrade", 10).await;
        assert!(upgrades.contains(&"Facility Upgrade".to_string()));
        assert!(upgrades.contains(&"Upgrade".to_string()));
    }

    #[tokio::test]
    async fn suggestions_fall_back_without_store() {
        let s = unavailable().get_search_suggestions("x", 3).await;
        assert_eq!(s, fallback::suggestions(3));
    }

    #[tokio::test]
    async fn stats_live_and_fallback() {
        let live = seeded().await.get_collection_stats().await;
        assert_eq!(live.provenance, Provenance::Live);
        assert_eq!(live.total_documents, 3);
        assert_eq!(live.industries.get("Oil & Gas"), Some(&2));

        let fb = unavailable().get_collection_stats().await;
        assert_eq!(fb.provenance, Provenance::Fallback);
        assert_eq!(fb, fallback::stats());
    }
}
