use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FeatureMatrix, Movie, SimilarityMatrix, SimilarityMethod};
use crate::error::{AppError, AppResult};

/// Bundle layout version understood by this build
pub const SCHEMA_VERSION: u32 = 1;

/// Min-max parameters used to scale the year feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub year_min: f64,
    pub year_max: f64,
    /// Year substituted for movies whose title carries none
    pub fill_year: Option<f64>,
    pub year_weight: f64,
}

impl ScalerParams {
    /// Scales a raw year into `[0, year_weight]`
    pub fn scale(&self, year: f64) -> f64 {
        let span = self.year_max - self.year_min;
        if span <= 0.0 {
            return 0.0;
        }
        ((year - self.year_min) / span).clamp(0.0, 1.0) * self.year_weight
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

/// Configuration the bundle was built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub year_weight: f64,
    pub default_similarity_method: SimilarityMethod,
}

/// Structured metadata document stored next to the matrices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub schema_version: u32,
    pub model_version: String,
    pub built_at: DateTime<Utc>,
    pub movie_count: usize,
    pub feature_dim: usize,
    pub genre_columns: Vec<String>,
    pub similarity_methods: Vec<SimilarityMethod>,
    pub year_range: Option<YearRange>,
    pub config: BuildConfig,
}

/// Immutable output of one training run
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    pub metadata: BundleMetadata,
    pub movies: Vec<Movie>,
    pub features: FeatureMatrix,
    pub cosine: SimilarityMatrix,
    pub jaccard: SimilarityMatrix,
    pub scaler: ScalerParams,
}

impl ArtifactBundle {
    pub fn version(&self) -> &str {
        &self.metadata.model_version
    }

    pub fn movie_count(&self) -> usize {
        self.movies.len()
    }

    /// Row index of a movie id, if it belongs to the vocabulary
    pub fn index_of(&self, movie_id: u32) -> Option<usize> {
        let idx = (movie_id as usize).checked_sub(1)?;
        (idx < self.movies.len()).then_some(idx)
    }

    pub fn movie(&self, movie_id: u32) -> Option<&Movie> {
        self.index_of(movie_id).map(|idx| &self.movies[idx])
    }

    pub fn similarity(&self, method: SimilarityMethod) -> &SimilarityMatrix {
        match method {
            SimilarityMethod::Cosine => &self.cosine,
            SimilarityMethod::Jaccard => &self.jaccard,
        }
    }

    /// Cross-checks every part of the bundle against its metadata
    pub fn validate(&self) -> AppResult<()> {
        let n = self.movies.len();

        if self.metadata.movie_count != n {
            return Err(AppError::CorruptArtifact(format!(
                "metadata declares {} movies but {} were stored",
                self.metadata.movie_count, n
            )));
        }

        for (idx, movie) in self.movies.iter().enumerate() {
            if movie.id as usize != idx + 1 {
                return Err(AppError::CorruptArtifact(format!(
                    "movie ids are not contiguous at position {} (found id {})",
                    idx, movie.id
                )));
            }
        }

        self.features.validate()?;
        if self.features.rows() != n || self.features.cols() != self.metadata.feature_dim {
            return Err(AppError::CorruptArtifact(format!(
                "feature matrix is {}x{}, expected {}x{}",
                self.features.rows(),
                self.features.cols(),
                n,
                self.metadata.feature_dim
            )));
        }

        for method in SimilarityMethod::ALL {
            let matrix = self.similarity(method);
            if matrix.method() != method {
                return Err(AppError::CorruptArtifact(format!(
                    "{} slot holds a {} matrix",
                    method,
                    matrix.method()
                )));
            }
            matrix.validate(n)?;
        }

        Ok(())
    }
}
