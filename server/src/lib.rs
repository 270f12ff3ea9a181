use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use cinesearch_core::persist::{load_catalog, IndexPaths};
use cinesearch_core::{
    Document, FieldWeights, RankingMethod, SearchEngine, SearchError, SearchHit, SearchRequest, StandardPreprocessor,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub smoothing: Option<String>,
    #[serde(default = "default_smoothing_param")]
    pub alpha: f64,
    #[serde(default = "default_smoothing_param")]
    pub lambda: f64,
    /// `stars=1,genres=0.5,...`; all text fields at 1 when absent
    pub weights: Option<String>,
    #[serde(default = "default_safe")]
    pub safe: bool,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Tier-scan budget for unsafe ranking
    pub budget_ms: Option<u64>,
}
fn default_method() -> String { "lnc.ltc".to_string() }
fn default_smoothing_param() -> f64 { 0.5 }
fn default_safe() -> bool { true }
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub method: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize, Default)]
pub struct AddParams {
    /// Run raw field text through the standard preprocessor first
    #[serde(default)]
    pub preprocess: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum DocumentBatch {
    One(Document),
    Many(Vec<Document>),
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub preprocessor: StandardPreprocessor,
    pub admin_token: Option<String>,
}

pub fn build_app(index_dir: String) -> Result<Router> {
    let catalog = load_catalog(&IndexPaths::new(&index_dir))?;
    let engine = Arc::new(SearchEngine::new(catalog));
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    Ok(router(engine, admin_token).layer(cors_from_env()))
}

/// Routes over an already loaded engine, without CORS.
pub fn router(engine: Arc<SearchEngine>, admin_token: Option<String>) -> Router {
    let app_state = AppState { engine, preprocessor: StandardPreprocessor::default(), admin_token };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/documents", post(add_documents))
        .route("/index/documents/:doc_id", delete(remove_document))
        .route("/index/refresh", post(refresh_index))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

// CORS_ALLOW_ORIGIN is comma-separated; anything unparseable falls back to Any
fn cors_from_env() -> CorsLayer {
    let origins: Vec<HeaderValue> = std::env::var("CORS_ALLOW_ORIGIN")
        .map(|val| val.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

fn reject(err: SearchError) -> ApiError {
    if err.is_invalid_request() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        tracing::error!(error = %err, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn parse_request(state: &AppState, params: &SearchParams) -> Result<SearchRequest, SearchError> {
    let method = RankingMethod::parse(&params.method, params.smoothing.as_deref(), params.alpha, params.lambda)?;
    let weights = match &params.weights {
        Some(raw) => raw.parse()?,
        None => FieldWeights::uniform(),
    };
    let mut request = SearchRequest::from_text(&params.q, &state.preprocessor, method)
        .weights(weights)
        .safe_ranking(params.safe)
        .max_results(Some(params.k.clamp(1, 100)));
    if let Some(ms) = params.budget_ms {
        request = request.deadline(Instant::now() + Duration::from_millis(ms));
    }
    Ok(request)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let request = parse_request(&state, &params).map_err(reject)?;
    let method = request.method.to_string();

    let engine = state.engine.clone();
    let results = blocking(move || engine.search(&request)).await?.map_err(reject)?;

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, %method, hits = results.len(), "search");
    Ok(Json(SearchResponse {
        query: params.q,
        method,
        took_s: elapsed.as_secs_f64(),
        total_hits: results.len(),
        results,
    }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<String>) -> Result<Json<Document>, ApiError> {
    let engine = state.engine.clone();
    let id = doc_id.clone();
    blocking(move || engine.document(&id))
        .await?
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no document {doc_id}")))
}

// --- Admin endpoints ---
async fn add_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<AddParams>,
    Json(batch): Json<DocumentBatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let docs = match batch {
        DocumentBatch::One(doc) => vec![doc],
        DocumentBatch::Many(docs) => docs,
    };
    let added: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
    let (engine, preprocessor) = (state.engine.clone(), state.preprocessor);
    let stale = blocking(move || {
        for doc in docs {
            let doc = if params.preprocess { preprocessor.preprocess_document(doc) } else { doc };
            engine.add_document(doc);
        }
        engine.read().is_stale()
    })
    .await?;
    tracing::info!(count = added.len(), "added documents");
    Ok(Json(serde_json::json!({ "added": added, "stale": stale })))
}

async fn remove_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let id = doc_id.clone();
    let removed = blocking(move || engine.remove_document(&id).map(|_| engine.read().is_stale())).await?;
    match removed {
        Some(stale) => {
            tracing::info!(doc_id = %doc_id, "removed document");
            Ok(Json(serde_json::json!({ "removed": doc_id, "stale": stale })))
        }
        None => Err((StatusCode::NOT_FOUND, format!("no document {doc_id}"))),
    }
}

async fn refresh_index(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let documents = blocking(move || {
        engine.refresh();
        engine.document_count()
    })
    .await?;
    Ok(Json(serde_json::json!({ "documents": documents })))
}

// Engine calls take a blocking lock and may wait on in-flight searches, so
// they run on the blocking pool rather than an async worker.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
