//! Motion-field estimation seam and a nearest-neighbour baseline.
//!
//! The batch runner only depends on the `MotionEstimator` trait. The
//! `NearestNeighborEstimator` shipped here:
//! - optionally drops statistical outliers (`denoise`)
//! - optionally voxel-downsamples both clouds (`dsp`)
//! - pairs every source point with the centroid of its `k` nearest target
//!   points using a `kiddo` KD-tree, parallelized with `rayon`

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::debug;
use rayon::prelude::*;
use thiserror::Error;

use crate::config::EstimatorParams;
use crate::core::field::MotionField;
use crate::core::loaders::PointSet;

/// Errors reported by an estimator for a single pair.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("Invalid estimator parameter: {0}")]
    InvalidParameter(String),

    #[error("{which} point set is empty after preparation")]
    EmptyInput { which: &'static str },

    #[error("Need at least {required} target points for k={required}, found {available}")]
    InsufficientPoints { required: usize, available: usize },

    #[error("Estimation failed: {0}")]
    Failed(String),
}

/// Computes the displacement field between two point sets.
///
/// Implementations must be deterministic for identical inputs; re-runs rely
/// on it to reproduce identical result files.
pub trait MotionEstimator: Send + Sync {
    fn estimate(
        &self,
        source: &PointSet,
        target: &PointSet,
        params: &EstimatorParams,
    ) -> Result<MotionField, EstimatorError>;
}

/// Drop points whose mean distance to their `k` neighbours exceeds
/// `mean + std_ratio * std` over the whole cloud.
pub fn remove_outliers(points: &[[f64; 3]], k: usize, std_ratio: f64) -> Vec<[f64; 3]> {
    if k == 0 || points.len() <= k || std_ratio <= 0.0 {
        return points.to_vec();
    }
    let Some(neighbours) = NonZeroUsize::new(k + 1) else {
        return points.to_vec();
    };

    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(points);

    // First neighbour is the point itself at distance 0
    let mean_dists: Vec<f64> = points
        .par_iter()
        .map(|p| {
            let nn = tree.nearest_n::<SquaredEuclidean>(p, neighbours);
            let sum: f64 = nn.iter().skip(1).map(|n| n.distance.sqrt()).sum();
            sum / k as f64
        })
        .collect();

    let n = mean_dists.len() as f64;
    let mean = mean_dists.iter().sum::<f64>() / n;
    let var = mean_dists.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let threshold = mean + std_ratio * var.sqrt();

    points
        .iter()
        .zip(&mean_dists)
        .filter(|(_, &d)| d <= threshold)
        .map(|(p, _)| *p)
        .collect()
}

/// Replace the points in each occupied voxel of edge `voxel` by their centroid.
///
/// Output is ordered by voxel index, so the result does not depend on input
/// order.
pub fn voxel_downsample(points: &[[f64; 3]], voxel: f64) -> Vec<[f64; 3]> {
    if voxel <= 0.0 {
        return points.to_vec();
    }

    let mut cells: BTreeMap<[i64; 3], ([f64; 3], usize)> = BTreeMap::new();
    for p in points {
        let key = [
            (p[0] / voxel).floor() as i64,
            (p[1] / voxel).floor() as i64,
            (p[2] / voxel).floor() as i64,
        ];
        let cell = cells.entry(key).or_insert(([0.0; 3], 0));
        cell.0[0] += p[0];
        cell.0[1] += p[1];
        cell.0[2] += p[2];
        cell.1 += 1;
    }

    cells
        .into_values()
        .map(|(sum, count)| {
            let c = count as f64;
            [sum[0] / c, sum[1] / c, sum[2] / c]
        })
        .collect()
}

/// Baseline estimator: displacement to the centroid of the `k` nearest
/// target points.
///
/// Each output row is `x y z dx dy dz |d|` for one (prepared) source point.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborEstimator;

impl NearestNeighborEstimator {
    fn prepare(points: &PointSet, params: &EstimatorParams) -> Vec<[f64; 3]> {
        let mut prepared = points.points().to_vec();
        if params.denoise > 0.0 {
            let before = prepared.len();
            prepared = remove_outliers(&prepared, params.k, params.denoise);
            debug!("Denoise removed {} of {} points", before - prepared.len(), before);
        }
        if params.dsp > 0.0 {
            let before = prepared.len();
            prepared = voxel_downsample(&prepared, params.dsp);
            debug!("Downsampled {} -> {} points", before, prepared.len());
        }
        prepared
    }
}

impl MotionEstimator for NearestNeighborEstimator {
    fn estimate(
        &self,
        source: &PointSet,
        target: &PointSet,
        params: &EstimatorParams,
    ) -> Result<MotionField, EstimatorError> {
        let k = NonZeroUsize::new(params.k)
            .ok_or_else(|| EstimatorError::InvalidParameter("k must be at least 1".to_string()))?;

        if params.plotflag {
            debug!("Plot output requested; the nearest-neighbour estimator does not plot");
        }

        let src = Self::prepare(source, params);
        let tgt = Self::prepare(target, params);

        if src.is_empty() {
            return Err(EstimatorError::EmptyInput { which: "source" });
        }
        if tgt.len() < k.get() {
            return Err(EstimatorError::InsufficientPoints {
                required: k.get(),
                available: tgt.len(),
            });
        }

        let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&tgt);

        let rows: Vec<Vec<f64>> = src
            .par_iter()
            .map(|p| {
                let nn = tree.nearest_n::<SquaredEuclidean>(p, k);
                let mut centroid = [0.0f64; 3];
                for n in &nn {
                    let q = tgt[n.item as usize];
                    centroid[0] += q[0];
                    centroid[1] += q[1];
                    centroid[2] += q[2];
                }
                let count = nn.len() as f64;
                let d = [
                    centroid[0] / count - p[0],
                    centroid[1] / count - p[1],
                    centroid[2] / count - p[2],
                ];
                let magnitude = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
                vec![p[0], p[1], p[2], d[0], d[1], d[2], magnitude]
            })
            .collect();

        Ok(MotionField::from_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(offset: [f64; 3]) -> PointSet {
        let mut pts = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                for l in 0..4 {
                    pts.push([
                        i as f64 + offset[0],
                        j as f64 + offset[1],
                        l as f64 + offset[2],
                    ]);
                }
            }
        }
        PointSet::from_points(pts)
    }

    fn params(k: usize) -> EstimatorParams {
        EstimatorParams {
            k,
            ..EstimatorParams::default()
        }
    }

    #[test]
    fn test_pure_translation_with_k1() {
        let source = grid([0.0; 3]);
        let target = grid([0.0, 0.0, 0.25]);

        let field = NearestNeighborEstimator
            .estimate(&source, &target, &params(1))
            .unwrap();

        assert_eq!(field.num_rows(), source.len());
        for row in field.rows() {
            assert_eq!(row.len(), 7);
            assert!(row[3].abs() < 1e-12);
            assert!(row[4].abs() < 1e-12);
            assert!((row[5] - 0.25).abs() < 1e-12);
            assert!((row[6] - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_identical_sets_have_zero_motion() {
        let cloud = grid([0.0; 3]);
        let field = NearestNeighborEstimator
            .estimate(&cloud, &cloud, &params(1))
            .unwrap();
        assert!(field.rows().iter().all(|r| r[6] == 0.0));
    }

    #[test]
    fn test_is_deterministic() {
        let source = grid([0.0; 3]);
        let target = grid([0.1, 0.2, 0.3]);
        let p = params(4);

        let a = NearestNeighborEstimator.estimate(&source, &target, &p).unwrap();
        let b = NearestNeighborEstimator.estimate(&source, &target, &p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_points_for_k() {
        let source = grid([0.0; 3]);
        let target = PointSet::from_points(vec![[0.0; 3], [1.0, 0.0, 0.0]]);

        let err = NearestNeighborEstimator
            .estimate(&source, &target, &params(3))
            .unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::InsufficientPoints {
                required: 3,
                available: 2
            }
        ));
    }

    #[test]
    fn test_zero_k_rejected() {
        let cloud = grid([0.0; 3]);
        let err = NearestNeighborEstimator
            .estimate(&cloud, &cloud, &params(0))
            .unwrap_err();
        assert!(matches!(err, EstimatorError::InvalidParameter(_)));
    }

    #[test]
    fn test_empty_source() {
        let err = NearestNeighborEstimator
            .estimate(&PointSet::default(), &grid([0.0; 3]), &params(1))
            .unwrap_err();
        assert!(matches!(err, EstimatorError::EmptyInput { which: "source" }));
    }

    #[test]
    fn test_voxel_downsample_merges_cells() {
        let pts = vec![[0.1, 0.1, 0.1], [0.3, 0.3, 0.3], [1.5, 0.0, 0.0]];
        let down = voxel_downsample(&pts, 1.0);

        assert_eq!(down.len(), 2);
        assert!((down[0][0] - 0.2).abs() < 1e-12);
        assert_eq!(down[1], [1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_voxel_downsample_disabled() {
        let pts = vec![[0.1, 0.1, 0.1], [0.3, 0.3, 0.3]];
        assert_eq!(voxel_downsample(&pts, 0.0), pts);
    }

    #[test]
    fn test_remove_outliers_drops_far_point() {
        let mut pts = grid([0.0; 3]).points().to_vec();
        pts.push([100.0, 100.0, 100.0]);

        let kept = remove_outliers(&pts, 4, 1.0);

        assert_eq!(kept.len(), pts.len() - 1);
        assert!(!kept.contains(&[100.0, 100.0, 100.0]));
    }

    #[test]
    fn test_remove_outliers_small_cloud_untouched() {
        let pts = vec![[0.0; 3], [1.0, 1.0, 1.0]];
        assert_eq!(remove_outliers(&pts, 4, 1.0), pts);
    }
}
