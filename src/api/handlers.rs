use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    middleware::CorrelationId,
    models::{
        MovieDetails, RecommendationResponse, SearchResponse, SimilarMoviesResponse,
        SimilarityMethod,
    },
    services::{CacheStats, MetricsSnapshot, ModelStatus},
};

const DEFAULT_RESULTS: usize = 10;
const DEFAULT_MIN_RATING: f64 = 3.5;

// Request/Response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    pub user_ratings: BTreeMap<u32, f64>,
    pub n: Option<usize>,
    /// Defaults to 3.5; an explicit `null` disables the filter
    #[serde(default = "default_min_rating")]
    pub min_rating: Option<f64>,
}

fn default_min_rating() -> Option<f64> {
    Some(DEFAULT_MIN_RATING)
}

#[derive(Debug, Deserialize)]
pub struct SimilarParams {
    pub n: Option<usize>,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReloadRequest {
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service_version: &'static str,
    pub model: ModelStatus,
    pub cache: CacheStats,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheResponse {
    pub cleared: usize,
    pub previous: CacheStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub version: String,
    pub movie_count: usize,
    pub cache_cleared: usize,
}

fn correlation(id: Option<Extension<CorrelationId>>) -> CorrelationId {
    id.map(|Extension(id)| id).unwrap_or_default()
}

fn parse_movie_id(raw: &str) -> AppResult<u32> {
    raw.parse::<u32>()
        .map_err(|_| AppError::InvalidInput(format!("Invalid movie id '{}'", raw)))
}

/// An empty body selects the default version; anything else must be a valid request
fn parse_reload_request(body: &[u8]) -> AppResult<ReloadRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReloadRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid reload request: {}", e)))
}

fn parse_method(raw: Option<&str>) -> AppResult<Option<SimilarityMethod>> {
    raw.map(str::parse).transpose()
}

// Handlers

/// Service information
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "POST /recommend",
            "GET /movies/search",
            "GET /movies/{id}",
            "GET /movies/{id}/similar",
            "POST /cache/clear",
            "POST /admin/reload",
            "GET /metrics",
        ],
    }))
}

/// Health check endpoint. Reports `degraded` until a model is loaded.
pub async fn health_check(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
) -> AppResult<Json<HealthResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("health", &id, async {
            let model = state.store.status();
            Ok(Json(HealthResponse {
                status: if model.loaded { "healthy" } else { "degraded" },
                service_version: env!("CARGO_PKG_VERSION"),
                model,
                cache: state.service.cache_stats(),
                timestamp: Utc::now(),
            }))
        })
        .await
}

/// Rating-based recommendations
pub async fn recommend(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
    body: Result<Json<RecommendRequest>, JsonRejection>,
) -> AppResult<Json<RecommendationResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("recommend", &id, async {
            let Json(request) = body.map_err(|e| AppError::InvalidInput(e.body_text()))?;
            let response = state
                .service
                .recommend_from_ratings(
                    &request.user_ratings,
                    request.n.unwrap_or(DEFAULT_RESULTS),
                    request.min_rating,
                )
                .await?;
            Ok(Json(response))
        })
        .await
}

/// Title search
pub async fn search_movies(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> AppResult<Json<SearchResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("search", &id, async {
            let Query(params) = params.map_err(|e| AppError::InvalidInput(e.body_text()))?;
            let query = params.q.unwrap_or_default();
            let response = state
                .service
                .search_movies(&query, params.limit.unwrap_or(DEFAULT_RESULTS))
                .await?;
            Ok(Json(response))
        })
        .await
}

/// Details of a single movie
pub async fn movie_details(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
    Path(movie_id): Path<String>,
) -> AppResult<Json<MovieDetails>> {
    let id = correlation(id);
    state
        .metrics
        .track("movie", &id, async {
            let movie_id = parse_movie_id(&movie_id)?;
            Ok(Json(state.service.movie_details(movie_id).await?))
        })
        .await
}

/// Movies similar to the one in the path
pub async fn similar_movies(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
    Path(movie_id): Path<String>,
    params: Result<Query<SimilarParams>, QueryRejection>,
) -> AppResult<Json<SimilarMoviesResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("similar", &id, async {
            let movie_id = parse_movie_id(&movie_id)?;
            let Query(params) = params.map_err(|e| AppError::InvalidInput(e.body_text()))?;
            let method = parse_method(params.method.as_deref())?;
            let response = state
                .service
                .similar_movies(movie_id, params.n.unwrap_or(DEFAULT_RESULTS), method)
                .await?;
            Ok(Json(response))
        })
        .await
}

/// Empties the result cache
pub async fn clear_cache(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
) -> AppResult<Json<ClearCacheResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("cache_clear", &id, async {
            let previous = state.service.clear_cache();
            Ok(Json(ClearCacheResponse {
                cleared: previous.size,
                previous,
            }))
        })
        .await
}

/// Activates a model version (the configured default when none is given)
pub async fn reload_model(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Json<ReloadResponse>> {
    let id = correlation(id);
    state
        .metrics
        .track("reload", &id, async {
            let body = body.map_err(|e| AppError::InvalidInput(e.body_text()))?;
            let request = parse_reload_request(&body)?;
            let version = request
                .version
                .unwrap_or_else(|| state.store.default_version().to_string());

            let bundle = state.store.activate(&version).await?;
            let previous = state.service.clear_cache();

            Ok(Json(ReloadResponse {
                version: bundle.version().to_string(),
                movie_count: bundle.movie_count(),
                cache_cleared: previous.size,
            }))
        })
        .await
}

/// Aggregated request metrics
pub async fn metrics(
    State(state): State<AppState>,
    id: Option<Extension<CorrelationId>>,
) -> AppResult<Json<MetricsSnapshot>> {
    let id = correlation(id);
    state
        .metrics
        .track("metrics", &id, async {
            Ok(Json(state.metrics.snapshot(state.service.cache_stats())))
        })
        .await
}
