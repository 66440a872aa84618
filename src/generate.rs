//! Generation orchestrator.
//!
//! Linear pipeline per request:
//!
//! ```text
//! Gather ─▶ Compose ─▶ Invoke ─▶ Post-process
//! ```
//!
//! Gather is a read path nested in a write-adjacent flow: when search fails
//! or the store is down it yields zero references rather than blocking
//! generation. Curated fallback results are never used as references.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, GenerationConfig};
use crate::error::{GenerationError, SearchError};
use crate::llm::{self, GenerationBackend};
use crate::models::{
    GenerationMetadata, GenerationRequest, GenerationResponse, ReferenceSummary, SearchFilters,
    SearchResult, UNKNOWN,
};
use crate::prompt;
use crate::search::SearchService;
use crate::store::DocumentStore;

const OVERVIEW_MARKER: &str = "project overview";

pub struct Generator {
    search: Arc<SearchService>,
    backend: Arc<dyn GenerationBackend>,
    max_references: usize,
}

impl Generator {
    pub fn new(
        search: Arc<SearchService>,
        backend: Arc<dyn GenerationBackend>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            search,
            backend,
            max_references: config.max_references,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Live search results relevant to `request`, at most the configured cap.
    pub async fn gather_references(&self, request: &GenerationRequest) -> Vec<SearchResult> {
        let query = build_query(request);
        if query.is_empty() {
            tracing::debug!("no searchable fields in request, skipping references");
            return Vec::new();
        }

        let filters = match request.industry.trim() {
            "" => SearchFilters::default(),
            industry => SearchFilters::industry(industry),
        };

        match self.search.search(&query, &filters, self.max_references).await {
            Ok(outcome) if outcome.is_live() => outcome.results,
            Ok(_) => {
                tracing::info!("vector store unavailable, generating without references");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("reference search failed, generating without references: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let references = self.gather_references(request).await;
        self.generate_with_references(request, references).await
    }

    /// Generate with the stored document `template_id` as the leading
    /// reference.
    pub async fn generate_from_template(
        &self,
        template_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let template = match self.search.get_document(template_id).await {
            Ok(stored) => stored,
            Err(SearchError::NotFound(id)) => return Err(GenerationError::TemplateNotFound(id)),
            Err(e) => return Err(GenerationError::Failed(e.to_string())),
        };

        let query = build_query(request);
        let lead = self.search.to_result(template, 1.0, &query);
        let mut references = vec![lead];
        for r in self.gather_references(request).await {
            if r.file_name != references[0].file_name {
                references.push(r);
            }
        }
        references.truncate(self.max_references.max(1));

        self.generate_with_references(request, references).await
    }

    /// Compliance review of `document_text` for the request's industry,
    /// sector and named regulations.
    pub async fn review_compliance(
        &self,
        request: &GenerationRequest,
        document_text: &str,
    ) -> Result<String, GenerationError> {
        let prompt = prompt::compose_compliance_review(request, document_text);
        tracing::info!(
            "reviewing {} chars for compliance via {}",
            document_text.chars().count(),
            self.backend.name()
        );
        self.invoke(&prompt).await
    }

    /// Scope of work broken down per engineering discipline. `complexity`
    /// is clamped to 1..=5.
    pub async fn generate_scope_of_work(
        &self,
        request: &GenerationRequest,
        complexity: u8,
    ) -> Result<String, GenerationError> {
        let prompt = prompt::compose_scope_of_work(request, complexity);
        tracing::info!(
            "generating scope of work ({} disciplines) via {}",
            request.disciplines.len(),
            self.backend.name()
        );
        self.invoke(&prompt).await
    }

    async fn invoke(&self, prompt: &str) -> Result<String, GenerationError> {
        self.backend
            .generate_text(prompt)
            .await
            .map_err(|e| GenerationError::Failed(format!("{:#}", e)))
    }

    async fn generate_with_references(
        &self,
        request: &GenerationRequest,
        references: Vec<SearchResult>,
    ) -> Result<GenerationResponse, GenerationError> {
        let prompt = prompt::compose(request, &references);
        tracing::info!(
            "generating {} with {} references via {} ({} chars of prompt)",
            request.document_type,
            references.len(),
            self.backend.name(),
            prompt.chars().count()
        );

        let raw = self.invoke(&prompt).await?;

        let now = Utc::now();
        let document_id = document_id_at(now);
        let rfp_text = post_process(&raw, request, now, &document_id);
        let word_count = rfp_text.split_whitespace().count();

        Ok(GenerationResponse {
            rfp_text,
            references: references
                .iter()
                .map(|r| ReferenceSummary {
                    title: r.title.clone(),
                    file_name: r.file_name.clone(),
                    relevance_score: r.relevance_score,
                })
                .collect(),
            metadata: GenerationMetadata {
                industry: non_empty_or(&request.industry, UNKNOWN),
                project_type: non_empty_or(&request.project_type, UNKNOWN),
                document_type: non_empty_or(&request.document_type, "RFP"),
                document_id,
                generated_at: now,
                word_count,
            },
        })
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    match value.trim() {
        "" => default.to_string(),
        v => v.to_string(),
    }
}

/// Search query built from the request's descriptive fields.
pub fn build_query(request: &GenerationRequest) -> String {
    let mut parts: Vec<&str> = [
        request.project_description.as_str(),
        request.industry.as_str(),
        request.project_type.as_str(),
    ]
    .into_iter()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect();
    parts.extend(
        request
            .disciplines
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty()),
    );
    parts.join(" ")
}

/// `RFP-<yyyymmddHHMMSS>-<millis>`.
pub fn document_id_at(now: DateTime<Utc>) -> String {
    format!(
        "RFP-{}-{:03}",
        now.format("%Y%m%d%H%M%S"),
        now.timestamp_subsec_millis()
    )
}

/// Ensure an overview block and append the provenance footer.
pub fn post_process(
    text: &str,
    request: &GenerationRequest,
    now: DateTime<Utc>,
    document_id: &str,
) -> String {
    let mut out = String::new();

    if !text.to_lowercase().contains(OVERVIEW_MARKER) {
        let field = |v: &str| non_empty_or(v, "To be determined");
        out.push_str("## PROJECT OVERVIEW\n\n");
        out.push_str(&format!("- **Industry:** {}\n", field(&request.industry)));
        out.push_str(&format!("- **Project Type:** {}\n", field(&request.project_type)));
        out.push_str(&format!("- **Location:** {}\n", field(&request.location)));
        out.push_str(&format!("- **Budget:** {}\n\n", field(&request.budget)));
    }

    out.push_str(text.trim_end());
    out.push_str(&format!(
        "\n\n---\n*Generated on {} | Document ID: {}*\n",
        now.format("%Y-%m-%d"),
        document_id
    ));
    out
}

/// CLI entry point for `rfp generate`.
pub async fn run_generate(
    config: &Config,
    input: &Path,
    rfi: bool,
    template: Option<&str>,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;
    let mut request: GenerationRequest = serde_json::from_str(&content)?;
    if rfi {
        request.document_type = "RFI".to_string();
    }

    let store = Arc::new(DocumentStore::connect(config).await);
    let search = Arc::new(SearchService::new(store, &config.retrieval));
    let backend = llm::create_backend(&config.generation)?;
    let generator = Generator::new(search, backend, &config.generation);

    let response = match template {
        Some(id) => generator.generate_from_template(id, &request).await?,
        None => generator.generate(&request).await?,
    };

    println!("{}", response.rfp_text);
    eprintln!(
        "document {} ({} words, {} references)",
        response.metadata.document_id,
        response.metadata.word_count,
        response.references.len()
    );
    Ok(())
}
