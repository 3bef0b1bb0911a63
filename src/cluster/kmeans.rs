//! k-means under a Mahalanobis metric.
//!
//! The metric is the inverse of the sample covariance of the whole point set,
//! computed once per run. Distances are evaluated in the whitened space
//! `L⁻¹ x` (with `L Lᵀ = Σ`), where the Mahalanobis distance becomes Euclidean
//! and centroids transform linearly.

use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{rng_util, stats};

/// The outcome of a k-means run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KMeansFit {
    /// Cluster centroids in the input coordinates.
    pub means: Vec<Vec<f64>>,
    /// Cluster index of every input point, in `0..k`.
    pub assignment: Vec<usize>,
    /// Number of assignment passes performed.
    pub iterations: usize,
}

/// Partitions `points` into `k` clusters by Lloyd iterations under the
/// Mahalanobis metric of the global sample covariance.
///
/// Initial centroids are `k` distinct points drawn without replacement. Each
/// pass assigns every point to its nearest centroid (ties go to the lowest
/// index) and moves centroids to their member means; a cluster left empty is
/// re-seeded with a random input point. Iteration stops once the assignment
/// no longer changes, or after `max_iterations` passes when given. At least
/// one pass always runs, so a cap of zero acts as a cap of one.
///
/// # Errors
///
/// Returns `Error::TooFewPoints` if `points.len() <= k`.
/// Returns `Error::SingularCovariance` if the points do not span the space.
///
/// # Examples
///
/// ```
/// use sky_area::cluster::kmeans;
///
/// let points = vec![
///     vec![0.0, 0.0],
///     vec![0.1, 0.2],
///     vec![0.2, -0.1],
///     vec![5.0, 5.0],
///     vec![5.1, 4.8],
///     vec![4.9, 5.2],
/// ];
/// let mut rng = fastrand::Rng::with_seed(1);
/// let fit = kmeans(&points, 2, &mut rng, None).unwrap();
/// assert_eq!(fit.assignment[0], fit.assignment[1]);
/// assert_ne!(fit.assignment[0], fit.assignment[3]);
/// ```
pub fn kmeans(
    points: &[Vec<f64>],
    k: usize,
    rng: &mut fastrand::Rng,
    max_iterations: Option<usize>,
) -> Result<KMeansFit> {
    let n = points.len();
    if k == 0 || n <= k {
        return Err(Error::TooFewPoints {
            n_points: n,
            n_clusters: k,
        });
    }

    let (whitened, factor) = whiten(points)?;
    let n_dims = points[0].len();

    let order = rng_util::permutation(rng, n);
    let mut centroids: Vec<Vec<f64>> = order[..k].iter().map(|&i| whitened[i].clone()).collect();

    // no point carries this index, so the first pass always counts as a change
    let mut assignment = vec![usize::MAX; n];
    let mut iterations = 0;

    loop {
        if max_iterations.is_some_and(|cap| iterations >= cap.max(1)) {
            break;
        }
        iterations += 1;

        let mut changed = false;
        for (slot, x) in assignment.iter_mut().zip(&whitened) {
            let nearest = nearest_centroid(x, &centroids);
            if *slot != nearest {
                *slot = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        centroids = member_means(&whitened, &assignment, k, n_dims);
        for centroid in &mut centroids {
            if centroid.is_empty() {
                *centroid = whitened[rng.usize(0..n)].clone();
            }
        }
    }

    // centroids are reported in the input coordinates
    let means = member_means(points, &assignment, k, n_dims)
        .into_iter()
        .zip(&centroids)
        .map(|(mean, centroid)| {
            if mean.is_empty() {
                // a re-seeded cluster left empty by the iteration cap
                (&factor * DVector::from_column_slice(centroid)).iter().copied().collect()
            } else {
                mean
            }
        })
        .collect();

    Ok(KMeansFit {
        means,
        assignment,
        iterations,
    })
}

/// Maps points through `L⁻¹` for the Cholesky factor `L` of their covariance.
/// Returns the whitened points and `L`.
fn whiten(points: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, DMatrix<f64>)> {
    let n = points.len();
    let covariance = stats::covariance(points).ok_or(Error::SingularCovariance { n_points: n })?;
    let n_dims = covariance.nrows();
    let cholesky = nalgebra::linalg::Cholesky::new(covariance)
        .ok_or(Error::SingularCovariance { n_points: n })?;
    let factor = cholesky.l();
    let whitener = factor
        .solve_lower_triangular(&DMatrix::identity(n_dims, n_dims))
        .ok_or(Error::SingularCovariance { n_points: n })?;

    let whitened = points
        .iter()
        .map(|p| (&whitener * DVector::from_column_slice(p)).iter().copied().collect())
        .collect();
    Ok((whitened, factor))
}

fn nearest_centroid(x: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let dist: f64 = x.iter().zip(centroid).map(|(a, b)| (a - b) * (a - b)).sum();
        // strict comparison keeps the lowest index on ties
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    best
}

/// Member means per cluster; empty clusters yield an empty vector.
#[allow(clippy::cast_precision_loss)]
fn member_means(points: &[Vec<f64>], assignment: &[usize], k: usize, n_dims: usize) -> Vec<Vec<f64>> {
    let mut sums = vec![vec![0.0; n_dims]; k];
    let mut counts = vec![0usize; k];
    for (p, &c) in points.iter().zip(assignment) {
        if c < k {
            counts[c] += 1;
            for (s, &x) in sums[c].iter_mut().zip(p) {
                *s += x;
            }
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, count)| {
            if count == 0 {
                Vec::new()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}
