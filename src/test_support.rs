//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::{
    config::EngineConfig,
    models::{ArtifactBundle, GenreFlags, GENRE_COUNT, GENRE_NAMES},
    storage::MockArtifactStorage,
    training::{RawMovie, TrainingPipeline},
};

pub const SAMPLE_SIZE: u32 = 60;

/// Deterministic catalog of `count` movies with two or three genres each.
///
/// Every fifth movie has no year in its title.
pub fn sample_records(count: u32) -> Vec<RawMovie> {
    (1..=count)
        .map(|id| {
            let i = id as usize;
            let mut names = vec![
                GENRE_NAMES[1 + i % (GENRE_COUNT - 1)],
                GENRE_NAMES[1 + (i * 7) % (GENRE_COUNT - 1)],
            ];
            if id % 3 == 0 {
                names.push("Drama");
            }
            let title = if id % 5 == 0 {
                format!("Sample Movie {}", id)
            } else {
                format!("Sample Movie {} ({})", id, 1950 + (id * 3) % 48)
            };
            RawMovie {
                id,
                title,
                genres: GenreFlags::from_names(names),
                imdb_url: Some(format!("http://us.imdb.com/Title?sample-{}", id)),
            }
        })
        .collect()
}

/// A small valid bundle built through the real training pipeline
pub fn sample_bundle(version: &str) -> ArtifactBundle {
    let pipeline =
        TrainingPipeline::new(EngineConfig::default(), Arc::new(MockArtifactStorage::new()));
    pipeline
        .build(&sample_records(SAMPLE_SIZE), version)
        .expect("sample bundle builds")
}
