//! Offline pairwise similarity computation.
//!
//! Both matrices are O(N²·F) and are built once per training run. Only the
//! upper triangle is computed; the lower triangle is mirrored from it and the
//! diagonal is written as exactly 1.0.

use rayon::prelude::*;
use std::time::Instant;

use crate::{
    error::AppResult,
    models::{FeatureMatrix, SimilarityMatrix, SimilarityMethod},
};

#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine;

impl SimilarityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Computes every supported matrix for a feature matrix
    pub fn compute_all(
        &self,
        features: &FeatureMatrix,
    ) -> AppResult<(SimilarityMatrix, SimilarityMatrix)> {
        let cosine = self.compute(features, SimilarityMethod::Cosine)?;
        let jaccard = self.compute(features, SimilarityMethod::Jaccard)?;
        Ok((cosine, jaccard))
    }

    pub fn compute(
        &self,
        features: &FeatureMatrix,
        method: SimilarityMethod,
    ) -> AppResult<SimilarityMatrix> {
        let start = Instant::now();
        let n = features.rows();

        let matrix = match method {
            SimilarityMethod::Cosine => {
                let norms: Vec<f64> = (0..n).map(|i| norm(features.row(i))).collect();
                symmetric(method, n, |i, j| {
                    cosine(features.row(i), features.row(j), norms[i], norms[j])
                })?
            }
            SimilarityMethod::Jaccard => {
                let sets: Vec<Vec<bool>> = (0..n)
                    .map(|i| features.genre_row(i).iter().map(|&v| v > 0.5).collect())
                    .collect();
                symmetric(method, n, |i, j| jaccard(&sets[i], &sets[j]))?
            }
        };

        tracing::info!(
            method = %method,
            size = n,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Similarity matrix computed"
        );

        Ok(matrix)
    }
}

/// Fills an `n x n` matrix from a pair function evaluated on `i < j` only
fn symmetric<F>(method: SimilarityMethod, n: usize, pair: F) -> AppResult<SimilarityMatrix>
where
    F: Fn(usize, usize) -> f64 + Sync,
{
    let upper: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| pair(i, j).clamp(0.0, 1.0) as f32)
                .collect()
        })
        .collect();

    let mut data = vec![0.0f32; n * n];
    for (i, row) in upper.iter().enumerate() {
        data[i * n + i] = 1.0;
        for (offset, &value) in row.iter().enumerate() {
            let j = i + 1 + offset;
            data[i * n + j] = value;
            data[j * n + i] = value;
        }
    }

    SimilarityMatrix::new(method, n, data)
}

fn norm(row: &[f64]) -> f64 {
    row.iter().map(|v| v * v).sum::<f64>().sqrt()
}

fn cosine(a: &[f64], b: &[f64], norm_a: f64, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

fn jaccard(a: &[bool], b: &[bool]) -> f64 {
    let (intersection, union) = a.iter().zip(b).fold((0u32, 0u32), |(inter, uni), (&x, &y)| {
        (inter + (x && y) as u32, uni + (x || y) as u32)
    });
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GENRE_COUNT;

    fn features(rows: &[(&[usize], f64)]) -> FeatureMatrix {
        let mut data = Vec::new();
        for (genres, year) in rows {
            let mut row = vec![0.0; GENRE_COUNT];
            for &g in *genres {
                row[g] = 1.0;
            }
            row.push(*year);
            data.extend(row);
        }
        FeatureMatrix::new(rows.len(), GENRE_COUNT, data).unwrap()
    }

    fn sample() -> FeatureMatrix {
        features(&[
            (&[1, 2, 16], 0.1),
            (&[1, 2], 0.05),
            (&[8, 14], 0.0),
            (&[], 0.0),
            (&[3, 4, 5], 0.07),
        ])
    }

    #[test]
    fn test_cosine_is_symmetric_with_unit_diagonal() {
        let m = SimilarityEngine::new()
            .compute(&sample(), SimilarityMethod::Cosine)
            .unwrap();
        for i in 0..m.size() {
            assert_eq!(m.get(i, i), 1.0);
            for j in 0..m.size() {
                assert_eq!(m.get(i, j), m.get(j, i));
                assert!((0.0..=1.0).contains(&m.get(i, j)));
            }
        }
        assert!(m.validate(5).is_ok());
    }

    #[test]
    fn test_cosine_includes_year() {
        let f = features(&[(&[0], 0.0), (&[0], 0.1)]);
        let m = SimilarityEngine::new().compute(&f, SimilarityMethod::Cosine).unwrap();
        assert!(m.get(0, 1) < 1.0);
        assert!(m.get(0, 1) > 0.99);
    }

    #[test]
    fn test_zero_row_has_zero_off_diagonal() {
        let m = SimilarityEngine::new()
            .compute(&sample(), SimilarityMethod::Cosine)
            .unwrap();
        assert_eq!(m.get(3, 3), 1.0);
        for j in [0, 1, 2, 4] {
            assert_eq!(m.get(3, j), 0.0);
        }
    }

    #[test]
    fn test_jaccard_ignores_year() {
        let f = features(&[(&[1, 2], 0.0), (&[1, 2], 0.1), (&[1], 0.05)]);
        let m = SimilarityEngine::new().compute(&f, SimilarityMethod::Jaccard).unwrap();
        assert_eq!(m.get(0, 1), 1.0);
        assert_eq!(m.get(0, 2), 0.5);
        assert_eq!(m.get(2, 1), 0.5);
    }

    #[test]
    fn test_jaccard_empty_union_is_zero() {
        let f = features(&[(&[], 0.0), (&[], 0.1)]);
        let m = SimilarityEngine::new().compute(&f, SimilarityMethod::Jaccard).unwrap();
        assert_eq!(m.get(0, 1), 0.0);
        assert_eq!(m.get(0, 0), 1.0);
    }

    #[test]
    fn test_compute_all_is_deterministic() {
        let engine = SimilarityEngine::new();
        let (c1, j1) = engine.compute_all(&sample()).unwrap();
        let (c2, j2) = engine.compute_all(&sample()).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(j1, j2);
    }
}
