//! HTTP API server.
//!
//! Exposes search, generation, compliance, and ingestion over a JSON API.
//! Every response body carries a `success` flag; failures add a
//! human-readable `error`:
//!
//! ```json
//! { "success": false, "error": "document not found: rfp_001.pdf" }
//! ```
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner and endpoint map |
//! | `GET`  | `/api/status` | Uptime and store availability |
//! | `POST` | `/api/search` | Semantic search with filters |
//! | `GET`  | `/api/search/industry/{industry}` | Exact-match listing by industry |
//! | `GET`  | `/api/search/similar/{documentId}` | Similar documents |
//! | `GET`  | `/api/search/document/{documentId}` | Full document |
//! | `GET`  | `/api/search/suggestions?q=&limit=` | Autocomplete suggestions |
//! | `GET`  | `/api/search/stats` | Collection statistics |
//! | `POST` | `/api/rfp/generate` | Generate an RFP |
//! | `POST` | `/api/rfp/generate-rfi` | Generate an RFI |
//! | `POST` | `/api/rfp/generate-from-template/{templateDocumentId}` | Template-seeded generation |
//! | `POST` | `/api/rfp/scope-of-work` | Scope of work per discipline |
//! | `POST` | `/api/compliance/validate` | Section checklist validation |
//! | `POST` | `/api/compliance/review` | Generated compliance review |
//! | `POST` | `/api/ingestion/init` | Reconnect the vector store |
//! | `POST` | `/api/ingestion/ingest-all` | Ingest the configured source directory |
//! | `POST` | `/api/ingestion/ingest/{fileName}` | Ingest one file |
//! | `DELETE` | `/api/ingestion/clear-all` | Delete stored documents |
//! | `GET`  | `/api/ingestion/status` | Collection stats with a status line |
//!
//! Result limits are capped at 100 per request.
//!
//! Status codes: 400 for missing input, 404 for unknown documents, 503 when
//! a write needs the vector store and it is unavailable, 500 otherwise.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for browser clients.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::compliance;
use crate::config::Config;
use crate::error::{GenerationError, IngestError, SearchError, StoreError};
use crate::generate::Generator;
use crate::ingest::IngestionPipeline;
use crate::llm::{self, GenerationBackend};
use crate::models::{GenerationRequest, Provenance, SearchFilters, SearchOutcome};
use crate::search::{provenance_label, SearchService};
use crate::store::DocumentStore;

const DEFAULT_SUGGESTION_LIMIT: usize = 5;
const MAX_LIMIT: usize = 100;
const DEFAULT_COMPLEXITY: u8 = 3;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<DocumentStore>,
    search: Arc<SearchService>,
    ingestion: Arc<IngestionPipeline>,
    generator: Arc<Generator>,
    started_at: Instant,
}

impl AppState {
    /// Wire services around an existing store and generation backend.
    pub fn new(
        config: Config,
        store: Arc<DocumentStore>,
        backend: Arc<dyn GenerationBackend>,
    ) -> anyhow::Result<Self> {
        let search = Arc::new(SearchService::new(store.clone(), &config.retrieval));
        let ingestion = Arc::new(IngestionPipeline::new(store.clone(), &config.ingestion)?);
        let generator = Arc::new(Generator::new(search.clone(), backend, &config.generation));
        Ok(Self {
            config: Arc::new(config),
            store,
            search,
            ingestion,
            generator,
            started_at: Instant::now(),
        })
    }

    /// Connect the configured store and backend.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(DocumentStore::connect(config).await);
        let backend = llm::create_backend(&config.generation)?;
        Self::new(config.clone(), store, backend)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/status", get(handle_status))
        .route("/api/search", post(handle_search))
        .route("/api/search/industry/{industry}", get(handle_search_by_industry))
        .route("/api/search/similar/{document_id}", get(handle_similar))
        .route("/api/search/document/{document_id}", get(handle_get_document))
        .route("/api/search/suggestions", get(handle_suggestions))
        .route("/api/search/stats", get(handle_stats))
        .route("/api/rfp/generate", post(handle_generate))
        .route("/api/rfp/generate-rfi", post(handle_generate_rfi))
        .route(
            "/api/rfp/generate-from-template/{template_id}",
            post(handle_generate_from_template),
        )
        .route("/api/rfp/scope-of-work", post(handle_scope_of_work))
        .route("/api/compliance/validate", post(handle_validate))
        .route("/api/compliance/review", post(handle_review))
        .route("/api/ingestion/init", post(handle_init))
        .route("/api/ingestion/ingest-all", post(handle_ingest_all))
        .route("/api/ingestion/ingest/{file_name}", post(handle_ingest_one))
        .route("/api/ingestion/clear-all", delete(handle_clear_all))
        .route("/api/ingestion/status", get(handle_ingestion_status))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::connect(config).await?;
    if !state.store.is_available() {
        tracing::warn!("vector store unavailable, read endpoints will serve fallback data");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("RFP Harness API listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

/// Handler error rendered as `{ "success": false, "error": ... }`.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.message);
        }
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn unavailable() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        message: StoreError::Unavailable.to_string(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.into(),
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        let status = match &err {
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            SearchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::TemplateNotFound(_) => StatusCode::NOT_FOUND,
            GenerationError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::Store(StoreError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(format!("invalid request body: {}", e.body_text())))
}

fn outcome_json(outcome: SearchOutcome) -> Value {
    json!({
        "success": true,
        "total": outcome.results.len(),
        "source": provenance_label(outcome.provenance),
        "results": outcome.results,
    })
}

fn clamp_limit(limit: Option<usize>, default: usize) -> usize {
    limit.unwrap_or(default).min(MAX_LIMIT)
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

// ============ Service ============

async fn handle_index() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "RFP Harness API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "status": "/api/status",
            "search": "/api/search",
            "rfp": "/api/rfp",
            "compliance": "/api/compliance",
            "ingestion": "/api/ingestion",
        }
    }))
}

async fn handle_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "status": "running",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now().to_rfc3339(),
        "store": {
            "available": state.store.is_available(),
            "backend": state.store.backend_name(),
        },
        "generation": state.generator.backend_name(),
    }))
}

// ============ Search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody {
    #[serde(default)]
    query: String,
    #[serde(default)]
    filters: SearchFilters,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SuggestionParams {
    q: Option<String>,
    limit: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(body)?;
    if body.query.trim().is_empty() {
        return Err(bad_request("query is required"));
    }
    let limit = clamp_limit(body.limit, state.config.retrieval.default_limit);
    let outcome = state.search.search(&body.query, &body.filters, limit).await?;
    Ok(Json(merge(
        outcome_json(outcome),
        json!({ "query": body.query, "filters": body.filters }),
    )))
}

async fn handle_search_by_industry(
    State(state): State<AppState>,
    Path(industry): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, AppError> {
    let limit = clamp_limit(params.limit, state.config.retrieval.default_limit);
    let outcome = state.search.search_by_industry(&industry, limit).await?;
    Ok(Json(merge(
        outcome_json(outcome),
        json!({ "industry": industry }),
    )))
}

async fn handle_similar(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, AppError> {
    let limit = clamp_limit(params.limit, DEFAULT_SUGGESTION_LIMIT);
    let outcome = state
        .search
        .find_similar_documents(&document_id, limit)
        .await?;
    Ok(Json(merge(
        outcome_json(outcome),
        json!({ "documentId": document_id }),
    )))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let document = state.search.get_document(&document_id).await?;
    Ok(Json(json!({ "success": true, "document": document })))
}

async fn handle_suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> Result<Json<Value>, AppError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("q is required"))?;
    let limit = clamp_limit(params.limit, DEFAULT_SUGGESTION_LIMIT);
    let suggestions = state.search.get_search_suggestions(&query, limit).await;
    Ok(Json(json!({
        "success": true,
        "query": query,
        "suggestions": suggestions,
    })))
}

async fn handle_stats(State(state): State<AppState>) -> Json<Value> {
    let stats = state.search.get_collection_stats().await;
    Json(json!({ "success": true, "stats": stats }))
}

// ============ Generation ============

fn require_project(request: &GenerationRequest) -> Result<(), AppError> {
    if request.project_name.trim().is_empty() && request.project_description.trim().is_empty() {
        return Err(bad_request("Project name or description is required"));
    }
    Ok(())
}

async fn handle_generate(
    State(state): State<AppState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(body)?;
    require_project(&request)?;
    let response = state.generator.generate(&request).await?;
    Ok(Json(merge(
        json!({ "success": true }),
        serde_json::to_value(response).map_err(|e| internal(e.to_string()))?,
    )))
}

async fn handle_generate_rfi(
    State(state): State<AppState>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let mut request = json_body(body)?;
    request.document_type = "RFI".to_string();
    require_project(&request)?;
    let response = state.generator.generate(&request).await?;
    Ok(Json(merge(
        json!({ "success": true, "documentType": "RFI" }),
        serde_json::to_value(response).map_err(|e| internal(e.to_string()))?,
    )))
}

async fn handle_generate_from_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
    body: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(body)?;
    let response = state
        .generator
        .generate_from_template(&template_id, &request)
        .await?;
    Ok(Json(merge(
        json!({ "success": true, "templateDocumentId": template_id }),
        serde_json::to_value(response).map_err(|e| internal(e.to_string()))?,
    )))
}

#[derive(Deserialize)]
struct ScopeOfWorkBody {
    complexity: Option<u8>,
    #[serde(flatten)]
    request: GenerationRequest,
}

async fn handle_scope_of_work(
    State(state): State<AppState>,
    body: Result<Json<ScopeOfWorkBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(body)?;
    let complexity = body.complexity.unwrap_or(DEFAULT_COMPLEXITY).clamp(1, 5);
    let scope = state
        .generator
        .generate_scope_of_work(&body.request, complexity)
        .await?;
    Ok(Json(json!({
        "success": true,
        "complexity": complexity,
        "scopeOfWork": scope,
    })))
}

// ============ Compliance ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    document_text: Option<String>,
}

async fn handle_validate(
    body: Result<Json<ValidateBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let text = json_body(body)?
        .document_text
        .ok_or_else(|| bad_request("documentText is required"))?;
    Ok(Json(json!({
        "success": true,
        "result": compliance::validate(&text),
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewBody {
    document_text: Option<String>,
    #[serde(flatten)]
    request: GenerationRequest,
}

async fn handle_review(
    State(state): State<AppState>,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let body = json_body(body)?;
    let text = body
        .document_text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| bad_request("documentText is required"))?;
    let review = state
        .generator
        .review_compliance(&body.request, &text)
        .await?;
    Ok(Json(json!({
        "success": true,
        "review": review,
        "result": compliance::validate(&text),
    })))
}

// ============ Ingestion ============

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    data_path: Option<PathBuf>,
}

async fn handle_init(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if !state.store.reinitialize(&state.config).await {
        return Err(unavailable());
    }
    Ok(Json(json!({
        "success": true,
        "message": "Vector store initialized successfully",
    })))
}

async fn handle_ingest_all(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if !state.store.is_available() {
        return Err(unavailable());
    }
    let stats = state
        .ingestion
        .ingest_all(&state.config.ingestion.source_dir)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Document ingestion completed",
        "stats": stats,
    })))
}

async fn handle_ingest_one(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    if file_name.trim().is_empty() {
        return Err(bad_request("File name is required"));
    }
    let body: IngestBody = if body.is_empty() {
        IngestBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid request body: {}", e)))?
    };
    let dir = body
        .data_path
        .unwrap_or_else(|| state.config.ingestion.source_dir.clone());

    let id = state.ingestion.ingest_one(&dir, &file_name).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully ingested {}", file_name),
        "documentId": id,
    })))
}

async fn handle_clear_all(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let result = state.ingestion.clear_all().await?;
    Ok(Json(json!({
        "success": true,
        "message": "All documents cleared from vector store",
        "result": result,
    })))
}

async fn handle_ingestion_status(State(state): State<AppState>) -> Json<Value> {
    let stats = state.search.get_collection_stats().await;
    let status = if stats.provenance == Provenance::Fallback {
        "Vector store unavailable; showing sample data"
    } else if stats.total_documents > 0 {
        "Documents loaded"
    } else {
        "No documents found"
    };
    Json(json!({
        "success": true,
        "stats": stats,
        "status": status,
        "source": provenance_label(stats.provenance),
    }))
}
