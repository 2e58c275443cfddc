use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

use crate::error::AppError;

/// Number of MovieLens genre categories
pub const GENRE_COUNT: usize = 19;

/// MovieLens 100k genre columns, in file order
pub const GENRE_NAMES: [&str; GENRE_COUNT] = [
    "unknown",
    "Action",
    "Adventure",
    "Animation",
    "Children",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Fantasy",
    "Film-Noir",
    "Horror",
    "Musical",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Fixed-size set of genre flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenreFlags(pub [bool; GENRE_COUNT]);

impl GenreFlags {
    /// Builds flags from genre names, ignoring names outside the vocabulary
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = [false; GENRE_COUNT];
        for name in names {
            if let Some(idx) = GENRE_NAMES.iter().position(|g| g.eq_ignore_ascii_case(name)) {
                flags[idx] = true;
            }
        }
        Self(flags)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0
            .iter()
            .zip(GENRE_NAMES.iter())
            .filter(|(set, _)| **set)
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|f| **f).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// A catalog movie. Immutable once a bundle is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: u32,
    pub title: String,
    pub year: Option<i32>,
    pub genres: GenreFlags,
    #[serde(default)]
    pub imdb_url: Option<String>,
}

/// Similarity measure used to rank neighbours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMethod {
    /// Cosine over genres and the scaled year
    #[default]
    Cosine,
    /// Jaccard index over genre flags only
    Jaccard,
}

impl SimilarityMethod {
    pub const ALL: [SimilarityMethod; 2] = [SimilarityMethod::Cosine, SimilarityMethod::Jaccard];

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Cosine => "cosine",
            SimilarityMethod::Jaccard => "jaccard",
        }
    }
}

impl Display for SimilarityMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMethod::Cosine),
            "jaccard" => Ok(SimilarityMethod::Jaccard),
            other => Err(AppError::InvalidInput(format!(
                "Unknown similarity method '{}', expected 'cosine' or 'jaccard'",
                other
            ))),
        }
    }
}
