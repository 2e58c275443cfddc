use parking_lot::Mutex;
use rayon::prelude::*;
use std::{collections::BTreeMap, sync::Arc};

use super::{
    cache::{CacheKey, CacheStats, ResultCache},
    model_store::ModelStore,
};
use crate::{
    cached,
    config::EngineConfig,
    error::{AppError, AppResult},
    models::{
        ArtifactBundle, MovieDetails, MovieInfo, RankedMovie, RecommendationResponse,
        RecommendedMovie, SearchResponse, SimilarMovie, SimilarMoviesResponse, SimilarityMethod,
    },
};

/// Upper bound for `n` and search `limit`
pub const MAX_RESULTS: usize = 50;
pub const MIN_RATING: f64 = 0.5;
pub const MAX_RATING: f64 = 5.0;
/// Centre of the rating scale; ratings above it pull candidates up
pub const RATING_MIDPOINT: f64 = 2.75;

/// Answers similarity and rating-based queries against the active model
///
/// Results are ranked once and kept in a bounded LRU cache keyed by the query
/// and the model version. The cache is emptied whenever the active version
/// changes.
pub struct RecommendationService {
    store: Arc<ModelStore>,
    cache: ResultCache,
    default_method: SimilarityMethod,
    served_version: Mutex<Option<String>>,
}

impl RecommendationService {
    pub fn new(store: Arc<ModelStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            cache: ResultCache::new(config.cache_capacity()),
            default_method: config.default_method(),
            served_version: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn default_method(&self) -> SimilarityMethod {
        self.default_method
    }

    /// Movies most similar to `movie_id`, excluding itself
    pub async fn similar_movies(
        &self,
        movie_id: u32,
        n: usize,
        method: Option<SimilarityMethod>,
    ) -> AppResult<SimilarMoviesResponse> {
        validate_count("n", n)?;
        let method = method.unwrap_or(self.default_method);

        let bundle = self.bundle().await?;
        let idx = bundle
            .index_of(movie_id)
            .ok_or(AppError::MovieNotFound(movie_id))?;

        let key = CacheKey::Similar {
            version: bundle.version().to_string(),
            movie_id,
            n,
            method,
        };
        let ranking = cached!(self.cache, key, rank_similar(&bundle, idx, n, method))?;

        let similar_movies: Vec<SimilarMovie> = ranking
            .iter()
            .filter_map(|ranked| {
                bundle.movie(ranked.movie_id).map(|movie| SimilarMovie {
                    movie_id: movie.id,
                    title: movie.title.clone(),
                    year: movie.year,
                    similarity: ranked.score,
                })
            })
            .collect();

        tracing::debug!(movie_id, %method, count = similar_movies.len(), "Similar movies ranked");

        Ok(SimilarMoviesResponse {
            query_movie: MovieInfo::from(&bundle.movies[idx]),
            count: similar_movies.len(),
            similar_movies,
        })
    }

    /// Ranks unrated movies by their similarity to the user's ratings.
    ///
    /// Each candidate scores `Σ s·(r − 2.75) / Σ |r − 2.75|` over the known
    /// rated movies, so liked movies pull it up and disliked ones push it
    /// down. Candidates with no similarity to any rated movie are skipped.
    /// With `min_rating`, candidates whose similarity-weighted average rating
    /// falls below it are dropped.
    pub async fn recommend_from_ratings(
        &self,
        ratings: &BTreeMap<u32, f64>,
        n: usize,
        min_rating: Option<f64>,
    ) -> AppResult<RecommendationResponse> {
        validate_count("n", n)?;
        if ratings.is_empty() {
            return Err(AppError::InvalidRating(
                "At least one movie rating is required".to_string(),
            ));
        }
        for (movie_id, rating) in ratings {
            validate_rating(&format!("rating for movie {}", movie_id), *rating)?;
        }
        if let Some(min) = min_rating {
            validate_rating("min_rating", min)?;
        }

        let bundle = self.bundle().await?;
        let known: BTreeMap<u32, f64> = ratings
            .iter()
            .filter(|(movie_id, _)| bundle.index_of(**movie_id).is_some())
            .map(|(movie_id, rating)| (*movie_id, *rating))
            .collect();

        if known.is_empty() {
            return Err(AppError::InvalidRating(
                "None of the rated movies exist in the catalog".to_string(),
            ));
        }
        if known.len() < ratings.len() {
            tracing::debug!(
                dropped = ratings.len() - known.len(),
                "Ignoring ratings for unknown movies"
            );
        }

        let method = self.default_method;
        let ranking = {
            let key = CacheKey::Recommend {
                version: bundle.version().to_string(),
                ratings: known.clone(),
                n,
                min_rating,
                method,
            };
            cached!(
                self.cache,
                key,
                rank_from_ratings(&bundle, &known, n, min_rating, method)
            )?
        };

        let recommendations: Vec<RecommendedMovie> = ranking
            .iter()
            .filter_map(|ranked| {
                bundle.movie(ranked.movie_id).map(|movie| RecommendedMovie {
                    movie_id: movie.id,
                    title: movie.title.clone(),
                    year: movie.year,
                    score: ranked.score,
                })
            })
            .collect();

        tracing::debug!(
            rated = known.len(),
            count = recommendations.len(),
            "Recommendations ranked"
        );

        Ok(RecommendationResponse {
            count: recommendations.len(),
            recommendations,
        })
    }

    pub async fn movie_details(&self, movie_id: u32) -> AppResult<MovieDetails> {
        let bundle = self.bundle().await?;
        bundle
            .movie(movie_id)
            .map(MovieDetails::from)
            .ok_or(AppError::MovieNotFound(movie_id))
    }

    /// Case-insensitive title search, ordered by movie id
    pub async fn search_movies(&self, query: &str, limit: usize) -> AppResult<SearchResponse> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(AppError::InvalidInput(
                "Search query must not be empty".to_string(),
            ));
        }
        validate_count("limit", limit)?;

        let bundle = self.bundle().await?;
        let results: Vec<MovieInfo> = bundle
            .movies
            .iter()
            .filter(|movie| movie.title.to_lowercase().contains(&needle))
            .take(limit)
            .map(MovieInfo::from)
            .collect();

        Ok(SearchResponse {
            query: query.trim().to_string(),
            count: results.len(),
            results,
        })
    }

    /// Empties the result cache, returning the statistics it had before
    pub fn clear_cache(&self) -> CacheStats {
        let before = self.cache.stats();
        let removed = self.cache.clear();
        tracing::info!(removed, "Result cache cleared");
        before
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn bundle(&self) -> AppResult<Arc<ArtifactBundle>> {
        let bundle = self.store.active_or_load().await?;
        self.observe_version(bundle.version());
        Ok(bundle)
    }

    fn observe_version(&self, version: &str) {
        // A request still holding a replaced bundle must not roll the marker back
        let is_active = matches!(self.store.active(), Ok(active) if active.version() == version);
        if !is_active {
            return;
        }

        let mut served = self.served_version.lock();
        if served.as_deref() == Some(version) {
            return;
        }
        if let Some(previous) = served.as_deref() {
            let removed = self.cache.clear();
            tracing::info!(
                previous,
                current = version,
                removed,
                "Model version changed, result cache cleared"
            );
        }
        *served = Some(version.to_string());
    }
}

fn validate_count(name: &str, value: usize) -> AppResult<()> {
    if value == 0 || value > MAX_RESULTS {
        return Err(AppError::InvalidInput(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_RESULTS, value
        )));
    }
    Ok(())
}

fn validate_rating(name: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "{} must be between {} and {}, got {}",
            name, MIN_RATING, MAX_RATING, value
        )));
    }
    Ok(())
}

/// Descending score, ties broken by ascending movie id
fn sort_ranked(ranked: &mut [RankedMovie]) {
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.movie_id.cmp(&b.movie_id))
    });
}

fn rank_similar(
    bundle: &ArtifactBundle,
    idx: usize,
    n: usize,
    method: SimilarityMethod,
) -> AppResult<Vec<RankedMovie>> {
    let mut ranked: Vec<RankedMovie> = bundle
        .similarity(method)
        .row(idx)
        .iter()
        .enumerate()
        .filter(|(other, _)| *other != idx)
        .map(|(other, similarity)| RankedMovie {
            movie_id: other as u32 + 1,
            score: f64::from(*similarity),
        })
        .collect();

    sort_ranked(&mut ranked);
    ranked.truncate(n);
    Ok(ranked)
}

fn rank_from_ratings(
    bundle: &ArtifactBundle,
    known: &BTreeMap<u32, f64>,
    n: usize,
    min_rating: Option<f64>,
    method: SimilarityMethod,
) -> AppResult<Vec<RankedMovie>> {
    let matrix = bundle.similarity(method);
    let count = bundle.movie_count();

    let rated: Vec<(usize, f64)> = known
        .iter()
        .filter_map(|(movie_id, rating)| bundle.index_of(*movie_id).map(|idx| (idx, *rating)))
        .collect();
    let mut is_rated = vec![false; count];
    for (idx, _) in &rated {
        is_rated[*idx] = true;
    }
    let spread: f64 = rated
        .iter()
        .map(|(_, rating)| (rating - RATING_MIDPOINT).abs())
        .sum();

    let mut ranked: Vec<RankedMovie> = (0..count)
        .into_par_iter()
        .filter(|candidate| !is_rated[*candidate])
        .filter_map(|candidate| {
            let (mut weight, mut weighted_rating, mut centred) = (0.0, 0.0, 0.0);
            for (idx, rating) in &rated {
                let similarity = f64::from(matrix.get(*idx, candidate));
                weight += similarity;
                weighted_rating += similarity * rating;
                centred += similarity * (rating - RATING_MIDPOINT);
            }
            if weight <= 0.0 {
                return None;
            }

            let predicted = weighted_rating / weight;
            if min_rating.is_some_and(|min| predicted < min) {
                return None;
            }

            let score = if spread > 0.0 { centred / spread } else { 0.0 };
            Some(RankedMovie {
                movie_id: candidate as u32 + 1,
                score,
            })
        })
        .collect();

    if let Some(bad) = ranked.iter().find(|r| !r.score.is_finite()) {
        return Err(AppError::Internal(format!(
            "Non-finite score for movie {}",
            bad.movie_id
        )));
    }

    sort_ranked(&mut ranked);
    ranked.truncate(n);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage::MockArtifactStorage, test_support::sample_bundle};
    use std::path::PathBuf;

    fn service(capacity: usize) -> RecommendationService {
        let mut storage = MockArtifactStorage::new();
        storage
            .expect_load()
            .returning(|version| Ok(sample_bundle(version)));
        let store = Arc::new(ModelStore::new(Arc::new(storage), "v1"));
        let config = EngineConfig::new(
            0.1,
            capacity,
            SimilarityMethod::Cosine,
            "v1".to_string(),
            PathBuf::from("models"),
        )
        .unwrap();
        RecommendationService::new(store, &config)
    }

    fn assert_ranked(scores: &[(u32, f64)]) {
        for pair in scores.windows(2) {
            let (a_id, a) = pair[0];
            let (b_id, b) = pair[1];
            assert!(a > b || (a == b && a_id < b_id), "{:?} out of order", pair);
        }
    }

    #[tokio::test]
    async fn test_similar_movies_excludes_query_and_is_ordered() {
        let service = service(16);

        let response = service.similar_movies(1, 10, None).await.unwrap();

        assert_eq!(response.query_movie.movie_id, 1);
        assert_eq!(response.count, 10);
        assert_eq!(response.similar_movies.len(), 10);
        assert!(response.similar_movies.iter().all(|m| m.movie_id != 1));
        let scores: Vec<(u32, f64)> = response
            .similar_movies
            .iter()
            .map(|m| (m.movie_id, m.similarity))
            .collect();
        assert_ranked(&scores);
    }

    #[tokio::test]
    async fn test_similar_movies_match_matrix_values() {
        let service = service(16);
        let bundle = sample_bundle("v1");

        let response = service
            .similar_movies(7, 5, Some(SimilarityMethod::Jaccard))
            .await
            .unwrap();

        for movie in &response.similar_movies {
            let expected = bundle.jaccard.get(6, movie.movie_id as usize - 1);
            assert_eq!(movie.similarity, f64::from(expected));
        }
    }

    #[tokio::test]
    async fn test_similar_movies_validates_input() {
        let service = service(16);

        assert_eq!(
            service.similar_movies(9999, 5, None).await.unwrap_err(),
            AppError::MovieNotFound(9999)
        );
        assert_eq!(
            service.similar_movies(0, 5, None).await.unwrap_err(),
            AppError::MovieNotFound(0)
        );
        for n in [0, 51] {
            assert!(matches!(
                service.similar_movies(1, n, None).await,
                Err(AppError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_recommend_rejects_empty_and_unknown_ratings() {
        let service = service(16);

        let empty = BTreeMap::new();
        assert!(matches!(
            service.recommend_from_ratings(&empty, 5, None).await,
            Err(AppError::InvalidRating(_))
        ));

        let unknown = BTreeMap::from([(9999, 4.0), (10_000, 3.0)]);
        assert!(matches!(
            service.recommend_from_ratings(&unknown, 5, None).await,
            Err(AppError::InvalidRating(_))
        ));
    }

    #[tokio::test]
    async fn test_recommend_rejects_out_of_range_values() {
        let service = service(16);

        let too_high = BTreeMap::from([(1, 5.5)]);
        assert!(matches!(
            service.recommend_from_ratings(&too_high, 5, None).await,
            Err(AppError::InvalidInput(_))
        ));

        let fine = BTreeMap::from([(1, 4.0)]);
        assert!(matches!(
            service.recommend_from_ratings(&fine, 5, Some(0.1)).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            service.recommend_from_ratings(&fine, 51, None).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_recommend_from_two_liked_movies() {
        let service = service(16);
        let bundle = sample_bundle("v1");
        let ratings = BTreeMap::from([(1, 5.0), (50, 4.0)]);

        let response = service
            .recommend_from_ratings(&ratings, 5, Some(3.5))
            .await
            .unwrap();

        assert!(!response.recommendations.is_empty());
        assert!(response.count <= 5);
        assert_eq!(response.count, response.recommendations.len());

        for movie in &response.recommendations {
            assert!(movie.movie_id != 1 && movie.movie_id != 50);

            let c = movie.movie_id as usize - 1;
            let s1 = f64::from(bundle.cosine.get(0, c));
            let s50 = f64::from(bundle.cosine.get(49, c));
            let predicted = (s1 * 5.0 + s50 * 4.0) / (s1 + s50);
            let score = (s1 * 2.25 + s50 * 1.25) / 3.5;
            assert!(predicted >= 3.5);
            assert!((movie.score - score).abs() < 1e-9);
        }

        let scores: Vec<(u32, f64)> = response
            .recommendations
            .iter()
            .map(|m| (m.movie_id, m.score))
            .collect();
        assert_ranked(&scores);
    }

    #[tokio::test]
    async fn test_min_rating_filters_disliked_neighbourhood() {
        let service = service(16);
        let disliked = BTreeMap::from([(1, 1.0)]);

        let filtered = service
            .recommend_from_ratings(&disliked, 10, Some(3.5))
            .await
            .unwrap();
        assert_eq!(filtered.count, 0);

        let unfiltered = service
            .recommend_from_ratings(&disliked, 10, None)
            .await
            .unwrap();
        assert!(unfiltered.count > 0);
        assert!(unfiltered.recommendations.iter().all(|m| m.score <= 0.0));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_dropped() {
        let service = service(16);

        let with_unknown = BTreeMap::from([(1, 5.0), (9999, 1.0)]);
        let only_known = BTreeMap::from([(1, 5.0)]);

        let a = service
            .recommend_from_ratings(&with_unknown, 5, None)
            .await
            .unwrap();
        let b = service
            .recommend_from_ratings(&only_known, 5, None)
            .await
            .unwrap();

        assert_eq!(a, b);
        // both queries share one cache entry
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let service = service(16);

        let first = service.similar_movies(3, 5, None).await.unwrap();
        let second = service.similar_movies(3, 5, None).await.unwrap();

        assert_eq!(first, second);
        let stats = service.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_cache_is_bounded() {
        let service = service(2);

        for movie_id in 1..=4 {
            service.similar_movies(movie_id, 3, None).await.unwrap();
        }

        let stats = service.cache_stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.evictions, 2);
    }

    #[tokio::test]
    async fn test_version_change_clears_cache() {
        let service = service(16);

        service.similar_movies(1, 5, None).await.unwrap();
        service.similar_movies(2, 5, None).await.unwrap();
        assert_eq!(service.cache_stats().size, 2);

        service.store().activate("v2").await.unwrap();
        service.similar_movies(1, 5, None).await.unwrap();

        let stats = service.cache_stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.misses, 3);
    }

    #[tokio::test]
    async fn test_stale_version_does_not_roll_back_or_clear() {
        let service = service(16);
        service.similar_movies(1, 5, None).await.unwrap();

        service.store().activate("v2").await.unwrap();
        service.similar_movies(2, 5, None).await.unwrap();
        assert_eq!(service.cache_stats().size, 1);

        // a request that fetched the v1 bundle before the swap finishes late
        service.observe_version("v1");

        assert_eq!(service.served_version.lock().as_deref(), Some("v2"));
        assert_eq!(service.cache_stats().size, 1);
        service.similar_movies(2, 5, None).await.unwrap();
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_clear_cache_returns_previous_stats() {
        let service = service(16);
        service.similar_movies(1, 5, None).await.unwrap();

        let before = service.clear_cache();

        assert_eq!(before.size, 1);
        assert_eq!(service.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_search_movies() {
        let service = service(16);

        let response = service.search_movies("  SAMPLE movie 1", 5).await.unwrap();
        let ids: Vec<u32> = response.results.iter().map(|m| m.movie_id).collect();
        assert_eq!(ids, vec![1, 10, 11, 12, 13]);
        assert_eq!(response.query, "SAMPLE movie 1");

        assert!(matches!(
            service.search_movies("   ", 5).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            service.search_movies("sample", 0).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_movie_details() {
        let service = service(16);

        let details = service.movie_details(3).await.unwrap();
        assert_eq!(details.movie_id, 3);
        assert!(details.genres.contains(&"Drama".to_string()));
        assert!(details.imdb_url.is_some());

        assert_eq!(
            service.movie_details(61).await.unwrap_err(),
            AppError::MovieNotFound(61)
        );
    }
}
