use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use search_core::persist::CachePaths;
use search_core::{config, Bm25Params, DocId, Error, HashingEncoder, HybridResult, HybridSearch, KeywordReranker, Tokenizer, ZeroPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub type Engine = HybridSearch<HashingEncoder>;

/// Where the cache lives and how to rebuild the query-side components.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub cache_dir: PathBuf,
    pub dimension: usize,
    pub stopwords: Option<PathBuf>,
    pub admin_token: Option<String>,
}

impl ServerSettings {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self { cache_dir: cache_dir.into(), dimension: config::HASHING_DIMENSION, stopwords: None, admin_token: None }
    }

    /// Load the engine from the cache. Never builds one.
    pub fn load_engine(&self) -> search_core::Result<Engine> {
        let tokenizer = match &self.stopwords {
            Some(path) => Tokenizer::from_stopwords_file(path)?,
            None => Tokenizer::default(),
        };
        let encoder = HashingEncoder::new(self.dimension, tokenizer.clone());
        HybridSearch::load(&CachePaths::new(&self.cache_dir), tokenizer, encoder)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Rrf,
    Weighted,
    Bm25,
    Semantic,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default)]
    pub zero_policy: ZeroPolicy,
    /// rrf mode only: reorder a wider short-list by keyword relevance
    #[serde(default)]
    pub rerank: bool,
}
fn default_k() -> usize { 10 }
fn default_alpha() -> f64 { config::DEFAULT_ALPHA }
fn default_rrf_k() -> f64 { config::RRF_K }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_rank: Option<usize>,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<Arc<Engine>>>,
    pub settings: Arc<ServerSettings>,
}

type ApiError = (StatusCode, String);

pub fn build_app(settings: ServerSettings) -> Result<Router> {
    let engine = settings.load_engine()?;
    tracing::info!(
        cache = %settings.cache_dir.display(),
        docs = engine.index().num_documents(),
        chunks = engine.ranker().store().len(),
        "engine loaded"
    );
    let app_state = AppState { engine: Arc::new(RwLock::new(Arc::new(engine))), settings: Arc::new(settings) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

fn status_of(err: &Error) -> StatusCode {
    match err {
        Error::InvalidArgument(_) | Error::DimensionMismatch { .. } => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::CacheMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: Error) -> ApiError {
    (status_of(&err), err.to_string())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    // queries run against a snapshot so a reload never waits on them
    let engine = Arc::clone(&state.engine.read());
    let k = params.k.clamp(1, 100);

    let hits: Vec<(DocId, f64, Option<usize>, Option<usize>)> = match params.mode {
        SearchMode::Bm25 => ranked(engine.bm25_search(&params.q, k).map_err(api_error)?),
        SearchMode::Semantic => ranked(engine.semantic_search(&params.q, k).map_err(api_error)?),
        SearchMode::Weighted => fused(engine.weighted_search(&params.q, params.alpha, params.zero_policy, k).map_err(api_error)?),
        SearchMode::Rrf if params.rerank => {
            let reranker = KeywordReranker::new(engine.index().tokenizer().clone(), Bm25Params::default());
            fused(engine.rrf_search_reranked(&params.q, params.rrf_k, k, &reranker).map_err(api_error)?)
        }
        SearchMode::Rrf => fused(engine.rrf_search(&params.q, params.rrf_k, k).map_err(api_error)?),
    };
    let total_hits = hits.len();

    // Capture raw query terms for highlighting
    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let mut results = Vec::with_capacity(hits.len());
    for (doc_id, score, bm25_rank, semantic_rank) in hits {
        if let Some(doc) = engine.index().document(doc_id) {
            let snippet = snippet_from_text(&doc.description, &raw_terms);
            results.push(SearchHit { doc_id, score, title: doc.title.clone(), bm25_rank, semantic_rank, snippet });
        }
    }

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, mode = ?params.mode, total_hits, "search");
    Ok(Json(SearchResponse { query: params.q, took_ms: elapsed.as_millis(), took_s: elapsed.as_secs_f64(), total_hits, results }))
}

fn ranked(hits: Vec<(DocId, f64)>) -> Vec<(DocId, f64, Option<usize>, Option<usize>)> {
    hits.into_iter().map(|(id, score)| (id, score, None, None)).collect()
}

fn fused(hits: Vec<HybridResult>) -> Vec<(DocId, f64, Option<usize>, Option<usize>)> {
    hits.into_iter()
        .map(|r| (r.hit.doc_id, r.hit.combined, r.hit.lexical.map(|c| c.rank), r.hit.semantic.map(|c| c.rank)))
        .collect()
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = Arc::clone(&state.engine.read());
    let doc = engine.index().document(doc_id).ok_or_else(|| api_error(Error::NotFound(doc_id)))?;
    Ok(Json(serde_json::json!({
        "doc_id": doc.id,
        "title": doc.title,
        "description": doc.description,
    })))
}

/// Re-read the cache from disk and swap it in. The old engine keeps
/// serving until the new one is fully loaded.
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let settings = Arc::clone(&state.settings);
    let engine = tokio::task::spawn_blocking(move || settings.load_engine())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(api_error)?;
    let num_docs = engine.index().num_documents();
    *state.engine.write() = Arc::new(engine);
    tracing::info!(num_docs, "engine reloaded");
    Ok(Json(serde_json::json!({ "reloaded": true, "num_docs": num_docs })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.settings.admin_token {
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

fn snippet_from_text(text: &str, raw_terms: &[String]) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    // first case-insensitive match of any raw term, as a char offset
    let lower: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
    let chars: Vec<char> = text.chars().collect();
    let first_idx = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| find_chars(&lower, &t.to_lowercase().chars().collect::<Vec<_>>()))
        // lowercasing can change the char count; fall back to the start
        .filter(|_| lower.len() == chars.len());
    let snippet: String = match first_idx {
        Some(idx) => {
            let start = idx.saturating_sub(100);
            let end = (idx + 200).min(chars.len());
            chars[start..end].iter().collect()
        }
        None => chars.iter().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms.iter().filter(|t| !t.trim().is_empty()) {
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_centers_on_first_match() {
        let text = format!("{}needle{}", "a ".repeat(150), " b".repeat(150));
        let snippet = snippet_from_text(&text, &["Needle".to_string()]).unwrap();
        assert!(snippet.contains("<em>needle</em>"));
        assert!(snippet.starts_with("a "));
        assert!(snippet.chars().count() < text.chars().count());
    }

    #[test]
    fn snippet_without_match_takes_prefix() {
        let snippet = snippet_from_text("Short plot.", &["zzz".to_string()]).unwrap();
        assert_eq!(snippet, "Short plot.");
        assert_eq!(snippet_from_text("", &["x".to_string()]), None);
    }

    #[test]
    fn highlight_escapes_terms() {
        assert_eq!(highlight_terms("a+b and A+B", &["a+b".to_string()]), "<em>a+b</em> and <em>A+B</em>");
    }
}
