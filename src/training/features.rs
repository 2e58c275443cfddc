//! Feature engineering for content-based similarity.
//!
//! Each movie becomes one row of genre flags followed by a single scaled year
//! column. The year is scaled into `[0, year_weight]` so that genre overlap
//! dominates any distance computed over the row.

use regex::Regex;
use std::sync::OnceLock;

use super::catalog::RawMovie;
use crate::{
    config::EngineConfig,
    error::{AppError, AppResult},
    models::{FeatureMatrix, Movie, ScalerParams, YearRange, GENRE_COUNT},
};

/// Output of a feature build
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub movies: Vec<Movie>,
    pub matrix: FeatureMatrix,
    pub scaler: ScalerParams,
    pub year_range: Option<YearRange>,
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    year_weight: f64,
}

impl FeatureBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            year_weight: config.year_weight(),
        }
    }

    /// Builds the feature matrix for a full catalog.
    ///
    /// Records may arrive in any order but their ids must cover `1..=N`
    /// exactly. The build is deterministic for a given input and weight.
    pub fn build(&self, records: &[RawMovie]) -> AppResult<FeatureSet> {
        if records.is_empty() {
            return Err(AppError::InvalidInput("movie catalog is empty".to_string()));
        }

        let mut sorted: Vec<&RawMovie> = records.iter().collect();
        sorted.sort_by_key(|m| m.id);
        for (idx, movie) in sorted.iter().enumerate() {
            if movie.id as usize != idx + 1 {
                return Err(AppError::InvalidInput(format!(
                    "movie ids must be contiguous from 1, found {} at position {}",
                    movie.id,
                    idx + 1
                )));
            }
        }

        let years: Vec<Option<i32>> = sorted.iter().map(|m| parse_year(&m.title)).collect();
        let known: Vec<i32> = years.iter().flatten().copied().collect();
        let missing = years.len() - known.len();

        let fill_year = median(&known);
        if missing > 0 {
            tracing::warn!(
                missing,
                fill_year = ?fill_year,
                "Movies without a year; using the median year"
            );
        }

        let year_range = match (known.iter().min(), known.iter().max()) {
            (Some(&min), Some(&max)) => Some(YearRange { min, max }),
            _ => None,
        };

        let scaler = ScalerParams {
            year_min: year_range.as_ref().map_or(0.0, |r| r.min as f64),
            year_max: year_range.as_ref().map_or(0.0, |r| r.max as f64),
            fill_year,
            year_weight: self.year_weight,
        };

        let cols = GENRE_COUNT + 1;
        let mut data = Vec::with_capacity(sorted.len() * cols);
        for (movie, year) in sorted.iter().zip(&years) {
            data.extend(movie.genres.0.iter().map(|&g| if g { 1.0 } else { 0.0 }));
            let year_feature = match year.map(f64::from).or(fill_year) {
                Some(y) => scaler.scale(y),
                None => 0.0,
            };
            data.push(year_feature);
        }

        let matrix = FeatureMatrix::new(sorted.len(), GENRE_COUNT, data)?;

        let movies = sorted
            .iter()
            .zip(years)
            .map(|(raw, year)| Movie {
                id: raw.id,
                title: raw.title.clone(),
                year,
                genres: raw.genres,
                imdb_url: raw.imdb_url.clone(),
            })
            .collect();

        tracing::info!(
            rows = matrix.rows(),
            cols = matrix.cols(),
            year_weight = self.year_weight,
            "Feature matrix created"
        );

        Ok(FeatureSet {
            movies,
            matrix,
            scaler,
            year_range,
        })
    }
}

fn year_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\((\d{4})\)").ok())
        .as_ref()
}

/// Extracts the first `(YYYY)` group from a title
pub fn parse_year(title: &str) -> Option<i32> {
    year_pattern()?
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn median(values: &[i32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}
