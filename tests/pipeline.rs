mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rfp_harness::compliance;
use rfp_harness::config::Config;
use rfp_harness::error::{GenerationError, IngestError, SearchError, StoreError};
use rfp_harness::generate::Generator;
use rfp_harness::ingest::{IngestStats, IngestionPipeline};
use rfp_harness::llm::TemplateBackend;
use rfp_harness::models::{GenerationRequest, Provenance, SearchFilters};
use rfp_harness::search::SearchService;
use rfp_harness::store::DocumentStore;
use tempfile::TempDir;

const CHEM_FILE: &str = "rfp_001_chem_glenn_modernization.txt";
const OIL_FILE: &str = "rfp_002_oil_houston_expansion.txt";
const BROKEN_FILE: &str = "rfp_003_tech_austin_retrofit.txt";

fn test_config() -> Config {
    let mut config = Config::minimal();
    config.ingestion.include_globs = vec!["*.txt".to_string()];
    config
}

fn write_corpus(dir: &Path) {
    fs::write(
        dir.join(CHEM_FILE),
        "Solicitation for reactor vessel modernization at the Glenn chemical plant. \
         Scope covers reactor jacket replacement, distributed control upgrades, \
         and hazardous solvent handling.",
    )
    .unwrap();
    fs::write(
        dir.join(OIL_FILE),
        "Houston terminal expansion: new crude storage tanks, pipeline manifolds, \
         and marine loading arms for the export dock.",
    )
    .unwrap();
    fs::write(
        dir.join("rfp_002_oil_houston_expansion_metadata.json"),
        r#"{"title": "Houston Crude Terminal Expansion", "disciplines": ["Piping", "Civil", "Piping"], "budget": "$40M"}"#,
    )
    .unwrap();
    // Not valid UTF-8, so text extraction fails.
    fs::write(dir.join(BROKEN_FILE), [0xff, 0xfe, 0x00, 0xc3]).unwrap();
}

struct Harness {
    _tmp: TempDir,
    dir: std::path::PathBuf,
    store: Arc<DocumentStore>,
    pipeline: IngestionPipeline,
    search: Arc<SearchService>,
}

fn harness(config: &Config) -> Harness {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().to_path_buf();
    write_corpus(&dir);
    let store = Arc::new(DocumentStore::with_backend(Arc::new(common::memory_store())));
    let pipeline = IngestionPipeline::new(store.clone(), &config.ingestion).unwrap();
    let search = Arc::new(SearchService::new(store.clone(), &config.retrieval));
    Harness {
        _tmp: tmp,
        dir,
        store,
        pipeline,
        search,
    }
}

#[tokio::test]
async fn test_ingest_all_counts_failures_without_aborting() {
    let h = harness(&test_config());

    let stats = h.pipeline.ingest_all(&h.dir).await.unwrap();
    assert_eq!(
        stats,
        IngestStats {
            success_count: 2,
            failed_count: 1
        }
    );

    let stats = h.search.get_collection_stats().await;
    assert_eq!(stats.provenance, Provenance::Live);
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.industries.get("Chemical Processing"), Some(&1));
    assert_eq!(stats.industries.get("Oil & Gas"), Some(&1));
}

#[tokio::test]
async fn test_sidecar_fields_override_file_name() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();

    let stored = h.search.get_document(OIL_FILE).await.unwrap();
    assert_eq!(stored.record.title, "Houston Crude Terminal Expansion");
    assert_eq!(stored.record.budget, "$40M");
    assert_eq!(stored.record.disciplines, vec!["Piping", "Civil"]);
    // Inferred from the file name where the sidecar is silent.
    assert_eq!(stored.record.industry, "Oil & Gas");
    assert_eq!(stored.record.project_type, "Plant Expansion");
    assert_eq!(stored.record.location, "houston");
    assert_eq!(stored.record.timeline, "TBD");
}

#[tokio::test]
async fn test_reingest_replaces_existing_record() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();
    let first = h.search.get_document(CHEM_FILE).await.unwrap();

    let new_id = h.pipeline.ingest_one(&h.dir, CHEM_FILE).await.unwrap();
    assert_ne!(new_id, first.id);

    let stats = h.search.get_collection_stats().await;
    assert_eq!(stats.total_documents, 2);
    let current = h.search.get_document(CHEM_FILE).await.unwrap();
    assert_eq!(current.id, new_id);
    assert!(matches!(
        h.search.get_document(&first.id).await,
        Err(SearchError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_search_respects_filters_and_scores() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();

    let outcome = h
        .search
        .search("reactor vessel modernization", &SearchFilters::default(), 10)
        .await
        .unwrap();
    assert!(outcome.is_live());
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].file_name, CHEM_FILE);
    assert!(outcome.results[0].relevance_score >= outcome.results[1].relevance_score);
    for r in &outcome.results {
        assert!((0.0..=1.0).contains(&r.relevance_score));
    }
    assert!(outcome.results[0].snippet.to_lowercase().contains("reactor"));

    let filtered = h
        .search
        .search(
            "reactor vessel modernization",
            &SearchFilters::industry("Oil & Gas"),
            10,
        )
        .await
        .unwrap();
    assert_eq!(filtered.results.len(), 1);
    assert_eq!(filtered.results[0].file_name, OIL_FILE);
}

#[tokio::test]
async fn test_search_by_industry_is_exact_match() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();

    let outcome = h
        .search
        .search_by_industry("Chemical Processing", 10)
        .await
        .unwrap();
    assert!(outcome.is_live());
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].relevance_score, 0.0);

    let none = h.search.search_by_industry("chemical", 10).await.unwrap();
    assert!(none.results.is_empty());
}

#[tokio::test]
async fn test_similar_documents_exclude_source() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();
    h.pipeline.ingest_one(&h.dir, CHEM_FILE).await.unwrap();

    let outcome = h.search.find_similar_documents(CHEM_FILE, 5).await.unwrap();
    assert!(outcome.is_live());
    assert!(outcome.results.iter().all(|r| r.file_name != CHEM_FILE));

    assert!(matches!(
        h.search.find_similar_documents("missing.pdf", 5).await,
        Err(SearchError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_similar_documents_accept_unbounded_limit() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();

    let outcome = h
        .search
        .find_similar_documents(CHEM_FILE, usize::MAX)
        .await
        .unwrap();
    assert!(outcome.is_live());
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].file_name, OIL_FILE);
}

#[tokio::test]
async fn test_clear_all_empties_collection() {
    let h = harness(&test_config());
    h.pipeline.ingest_all(&h.dir).await.unwrap();

    let cleared = h.pipeline.clear_all().await.unwrap();
    assert_eq!(cleared.deleted_count, 2);
    assert_eq!(h.search.get_collection_stats().await.total_documents, 0);
}

#[tokio::test]
async fn test_unavailable_store_degrades_reads_and_rejects_writes() {
    let h = harness(&test_config());
    h.store.close();

    let outcome = h
        .search
        .search("anything", &SearchFilters::industry("Manufacturing"), 10)
        .await
        .unwrap();
    assert_eq!(outcome.provenance, Provenance::Fallback);
    assert!(!outcome.results.is_empty());
    assert!(outcome.results.iter().all(|r| r.industry == "Manufacturing"));

    let stats = h.search.get_collection_stats().await;
    assert_eq!(stats.provenance, Provenance::Fallback);
    assert_eq!(stats.total_documents, 4);

    let suggestions = h.search.get_search_suggestions("modern", 3).await;
    assert_eq!(suggestions.len(), 3);

    assert_eq!(
        h.pipeline.ingest_all(&h.dir).await.unwrap(),
        IngestStats::default()
    );
    assert!(matches!(
        h.pipeline.ingest_one(&h.dir, CHEM_FILE).await,
        Err(IngestError::Store(StoreError::Unavailable))
    ));
    assert_eq!(
        h.search.get_document(CHEM_FILE).await.unwrap_err(),
        SearchError::Unavailable
    );
}

#[tokio::test]
async fn test_generation_uses_live_references() {
    let config = test_config();
    let h = harness(&config);
    h.pipeline.ingest_all(&h.dir).await.unwrap();
    let generator = Generator::new(
        h.search.clone(),
        Arc::new(TemplateBackend),
        &config.generation,
    );

    let request = GenerationRequest {
        project_name: "Glenn Reactor Modernization".into(),
        project_description: "Modernize reactor vessels and solvent handling".into(),
        industry: "Chemical Processing".into(),
        ..GenerationRequest::default()
    };
    let response = generator.generate(&request).await.unwrap();

    assert_eq!(response.references.len(), 1);
    assert_eq!(response.references[0].file_name, CHEM_FILE);
    assert!(response.rfp_text.contains("Glenn Reactor Modernization"));
    assert!(response.rfp_text.contains(&format!(
        "Document ID: {}*",
        response.metadata.document_id
    )));
    assert!(response.metadata.document_id.starts_with("RFP-"));
    assert_eq!(response.metadata.industry, "Chemical Processing");
    assert_eq!(response.metadata.project_type, "Unknown");
    assert!(response.metadata.word_count > 0);
    assert!(compliance::validate(&response.rfp_text).is_compliant);
}

#[tokio::test]
async fn test_generation_without_store_has_no_references() {
    let config = test_config();
    let h = harness(&config);
    h.store.close();
    let generator = Generator::new(
        h.search.clone(),
        Arc::new(TemplateBackend),
        &config.generation,
    );

    let request = GenerationRequest {
        project_name: "Line 4 Retrofit".into(),
        industry: "Manufacturing".into(),
        ..GenerationRequest::default()
    };
    let response = generator.generate(&request).await.unwrap();
    assert!(response.references.is_empty());
    assert!(!response.rfp_text.is_empty());
}

#[tokio::test]
async fn test_generate_from_template_leads_with_template() {
    let config = test_config();
    let h = harness(&config);
    h.pipeline.ingest_all(&h.dir).await.unwrap();
    let generator = Generator::new(
        h.search.clone(),
        Arc::new(TemplateBackend),
        &config.generation,
    );

    let request = GenerationRequest {
        project_name: "Second Terminal".into(),
        project_description: "Reactor vessel modernization".into(),
        ..GenerationRequest::default()
    };
    let response = generator
        .generate_from_template(OIL_FILE, &request)
        .await
        .unwrap();
    assert_eq!(response.references[0].file_name, OIL_FILE);
    assert_eq!(response.references[0].relevance_score, 1.0);
    assert_eq!(
        response
            .references
            .iter()
            .filter(|r| r.file_name == OIL_FILE)
            .count(),
        1
    );

    assert!(matches!(
        generator.generate_from_template("nope.pdf", &request).await,
        Err(GenerationError::TemplateNotFound(_))
    ));
}
