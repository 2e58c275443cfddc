use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{correlation_id_middleware, make_span_with_correlation_id};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        // Queries
        .route("/recommend", post(handlers::recommend))
        .route("/movies/search", get(handlers::search_movies))
        .route("/movies/:movie_id", get(handlers::movie_details))
        .route("/movies/:movie_id/similar", get(handlers::similar_movies))
        // Administration
        .route("/cache/clear", post(handlers::clear_cache))
        .route("/admin/reload", post(handlers::reload_model))
        .route("/metrics", get(handlers::metrics))
        // TraceLayer sits inside the correlation middleware so its span sees the id
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_correlation_id))
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
