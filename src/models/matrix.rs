use serde::{Deserialize, Serialize};

use super::SimilarityMethod;
use crate::error::{AppError, AppResult};

/// Tolerance used when checking symmetry of a persisted similarity matrix
pub const SYMMETRY_TOLERANCE: f32 = 1e-6;

/// Row-major feature matrix. Row `i` belongs to movie id `i + 1`.
///
/// The first `genre_cols` columns are 0/1 genre flags; the last column is the
/// scaled release year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    genre_cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(rows: usize, genre_cols: usize, data: Vec<f64>) -> AppResult<Self> {
        let cols = genre_cols + 1;
        if data.len() != rows * cols {
            return Err(AppError::Internal(format!(
                "Feature matrix data length {} does not match shape {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            genre_cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn genre_cols(&self) -> usize {
        self.genre_cols
    }

    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    /// Genre flag columns of a row, without the year feature
    pub fn genre_row(&self, idx: usize) -> &[f64] {
        &self.row(idx)[..self.genre_cols]
    }

    /// Checks that a deserialized matrix is internally consistent
    pub fn validate(&self) -> AppResult<()> {
        if self.cols != self.genre_cols + 1 || self.data.len() != self.rows * self.cols {
            return Err(AppError::CorruptArtifact(format!(
                "feature matrix holds {} values for shape {}x{}",
                self.data.len(),
                self.rows,
                self.cols
            )));
        }
        Ok(())
    }

    /// Canonical little-endian byte form, used to compare builds
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

/// Square pairwise similarity matrix for one method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    method: SimilarityMethod,
    size: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    pub fn new(method: SimilarityMethod, size: usize, data: Vec<f32>) -> AppResult<Self> {
        if data.len() != size * size {
            return Err(AppError::Internal(format!(
                "Similarity matrix data length {} does not match size {}",
                data.len(),
                size
            )));
        }
        Ok(Self { method, size, data })
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.size..(i + 1) * self.size]
    }

    /// Checks shape, unit diagonal, range and symmetry
    pub fn validate(&self, expected_size: usize) -> AppResult<()> {
        if self.size != expected_size || self.data.len() != self.size * self.size {
            return Err(AppError::CorruptArtifact(format!(
                "{} matrix has size {} but the catalog has {} movies",
                self.method, self.size, expected_size
            )));
        }

        for i in 0..self.size {
            if self.get(i, i) != 1.0 {
                return Err(AppError::CorruptArtifact(format!(
                    "{} matrix diagonal at {} is {}",
                    self.method,
                    i,
                    self.get(i, i)
                )));
            }
            for j in (i + 1)..self.size {
                let a = self.get(i, j);
                let b = self.get(j, i);
                if !(0.0..=1.0).contains(&a)
                    || !(0.0..=1.0).contains(&b)
                    || (a - b).abs() > SYMMETRY_TOLERANCE
                {
                    return Err(AppError::CorruptArtifact(format!(
                        "{} matrix is not a symmetric [0,1] matrix at ({}, {})",
                        self.method, i, j
                    )));
                }
            }
        }

        Ok(())
    }
}
