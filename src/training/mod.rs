//! Offline training: catalog → features → similarity matrices → bundle.

use chrono::Utc;
use std::{path::Path, sync::Arc, time::Instant};

use crate::{
    config::{validate_version, EngineConfig},
    error::AppResult,
    models::{
        ArtifactBundle, BuildConfig, BundleMetadata, SimilarityMethod, GENRE_NAMES, SCHEMA_VERSION,
    },
    storage::ArtifactStorage,
};

pub mod catalog;
pub mod features;
pub mod similarity;

pub use catalog::{load_movies, RawMovie};
pub use features::{FeatureBuilder, FeatureSet};
pub use similarity::SimilarityEngine;

/// Builds artifact bundles and publishes them to storage
pub struct TrainingPipeline {
    config: EngineConfig,
    storage: Arc<dyn ArtifactStorage>,
}

impl TrainingPipeline {
    pub fn new(config: EngineConfig, storage: Arc<dyn ArtifactStorage>) -> Self {
        Self { config, storage }
    }

    /// Builds a bundle in memory from raw catalog records
    pub fn build(&self, records: &[RawMovie], version: &str) -> AppResult<ArtifactBundle> {
        validate_version(version)?;
        let start = Instant::now();

        let FeatureSet {
            movies,
            matrix,
            scaler,
            year_range,
        } = FeatureBuilder::new(&self.config).build(records)?;

        let (cosine, jaccard) = SimilarityEngine::new().compute_all(&matrix)?;

        let metadata = BundleMetadata {
            schema_version: SCHEMA_VERSION,
            model_version: version.to_string(),
            built_at: Utc::now(),
            movie_count: movies.len(),
            feature_dim: matrix.cols(),
            genre_columns: GENRE_NAMES.iter().map(|g| g.to_string()).collect(),
            similarity_methods: SimilarityMethod::ALL.to_vec(),
            year_range,
            config: BuildConfig {
                year_weight: self.config.year_weight(),
                default_similarity_method: self.config.default_method(),
            },
        };

        let bundle = ArtifactBundle {
            metadata,
            movies,
            features: matrix,
            cosine,
            jaccard,
            scaler,
        };

        tracing::info!(
            version,
            movies = bundle.movie_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Artifact bundle built"
        );

        Ok(bundle)
    }

    /// Loads the catalog from a MovieLens directory, builds and publishes a bundle
    pub async fn run(&self, data_dir: &Path, version: &str) -> AppResult<ArtifactBundle> {
        tracing::info!(version, data_dir = %data_dir.display(), "Starting training pipeline");

        let records = load_movies(data_dir).await?;
        let bundle = self.build(&records, version)?;
        self.storage.save(&bundle).await?;

        tracing::info!(version, "Training pipeline completed");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GenreFlags;
    use crate::storage::MockArtifactStorage;

    fn records() -> Vec<RawMovie> {
        vec![
            RawMovie {
                id: 1,
                title: "Toy Story (1995)".to_string(),
                genres: GenreFlags::from_names(["Animation", "Children", "Comedy"]),
                imdb_url: None,
            },
            RawMovie {
                id: 2,
                title: "GoldenEye (1995)".to_string(),
                genres: GenreFlags::from_names(["Action", "Adventure", "Thriller"]),
                imdb_url: None,
            },
        ]
    }

    #[test]
    fn test_build_produces_valid_bundle() {
        let pipeline =
            TrainingPipeline::new(EngineConfig::default(), Arc::new(MockArtifactStorage::new()));
        let bundle = pipeline.build(&records(), "v-test").unwrap();

        assert_eq!(bundle.version(), "v-test");
        assert_eq!(bundle.metadata.schema_version, SCHEMA_VERSION);
        assert_eq!(bundle.metadata.feature_dim, 20);
        assert!(bundle.validate().is_ok());
    }

    #[test]
    fn test_build_rejects_bad_version() {
        let pipeline =
            TrainingPipeline::new(EngineConfig::default(), Arc::new(MockArtifactStorage::new()));
        assert!(pipeline.build(&records(), "../v1").is_err());
    }
}
