pub mod bundle;
pub mod matrix;
pub mod movie;
pub mod recommendation;

pub use bundle::{
    ArtifactBundle, BuildConfig, BundleMetadata, ScalerParams, YearRange, SCHEMA_VERSION,
};
pub use matrix::{FeatureMatrix, SimilarityMatrix};
pub use movie::{GenreFlags, Movie, SimilarityMethod, GENRE_COUNT, GENRE_NAMES};
pub use recommendation::{
    MovieDetails, MovieInfo, RankedMovie, RecommendationResponse, RecommendedMovie,
    SearchResponse, SimilarMovie, SimilarMoviesResponse,
};
