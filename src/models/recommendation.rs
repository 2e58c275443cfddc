use serde::{Deserialize, Serialize};

use super::Movie;

/// One entry of a ranked result list, as stored in the result cache
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedMovie {
    pub movie_id: u32,
    pub score: f64,
}

/// Basic movie information returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieInfo {
    pub movie_id: u32,
    pub title: String,
    pub year: Option<i32>,
}

impl From<&Movie> for MovieInfo {
    fn from(movie: &Movie) -> Self {
        Self {
            movie_id: movie.id,
            title: movie.title.clone(),
            year: movie.year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedMovie {
    pub movie_id: u32,
    pub title: String,
    pub year: Option<i32>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarMovie {
    pub movie_id: u32,
    pub title: String,
    pub year: Option<i32>,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendedMovie>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarMoviesResponse {
    pub query_movie: MovieInfo,
    pub similar_movies: Vec<SimilarMovie>,
    pub count: usize,
}

/// Detailed movie information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetails {
    pub movie_id: u32,
    pub title: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub imdb_url: Option<String>,
}

impl From<&Movie> for MovieDetails {
    fn from(movie: &Movie) -> Self {
        Self {
            movie_id: movie.id,
            title: movie.title.clone(),
            year: movie.year,
            genres: movie.genres.names().into_iter().map(String::from).collect(),
            imdb_url: movie.imdb_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<MovieInfo>,
    pub count: usize,
}
