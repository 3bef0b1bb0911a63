//! Mixture of per-cluster Gaussian KDEs.

use core::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::GaussianKde;
use crate::error::{Error, Result};

/// Longitude offsets of the periodic sky images.
const LON_IMAGES: [f64; 3] = [0.0, 2.0 * PI, -2.0 * PI];

/// The space a mixture density is evaluated on.
///
/// Sky mixtures live in `(lon, sin lat)` where individual kernels are planar
/// Gaussians; evaluating them on the sphere sums the periodic images across
/// the longitude seam and the latitude reflections through both poles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Domain {
    /// `(lon, sin lat)`, density per steradian.
    Sky,
    /// Cartesian 3-D, density per unit volume.
    Volume,
}

impl Domain {
    /// Dimension of the embedded space.
    #[must_use]
    pub fn n_dims(self) -> usize {
        match self {
            Self::Sky => 2,
            Self::Volume => 3,
        }
    }

    /// Density of `kde` at an embedded point of this domain.
    #[must_use]
    pub fn density(self, kde: &ClusteredKde, x: &[f64]) -> f64 {
        match self {
            Self::Sky => kde.periodic_sky_pdf(x[0], x[1]),
            Self::Volume => kde.pdf(x),
        }
    }
}

/// One surviving cluster of a [`ClusteredKde`].
#[derive(Clone, Debug)]
pub struct Component {
    /// Index of the cluster in the assignment.
    pub cluster: usize,
    /// Mixture weight (member fraction among surviving clusters).
    pub weight: f64,
    /// Kernel density estimate of the cluster members.
    pub kde: GaussianKde,
}

/// Weighted mixture of per-cluster Gaussian KDEs:
///
/// `p(x) = Σ_c (N_c / N) · KDE_c(x)`
///
/// where only clusters with more members than dimensions take part (smaller
/// clusters cannot yield a full-rank covariance and are dropped; `N` counts
/// the surviving members).
#[derive(Clone, Debug)]
pub struct ClusteredKde {
    components: Vec<Component>,
    n_dims: usize,
}

impl ClusteredKde {
    /// Builds the mixture from points and their cluster assignment.
    ///
    /// # Errors
    ///
    /// Returns `Error::AssignmentMismatch` if `assignment.len() != points.len()`.
    /// Returns `Error::SingularCovariance` if a kept cluster has a degenerate
    /// covariance or no cluster survives.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_assignment(points: &[Vec<f64>], assignment: &[usize], k: usize) -> Result<Self> {
        if assignment.len() != points.len() {
            return Err(Error::AssignmentMismatch {
                expected: points.len(),
                got: assignment.len(),
            });
        }
        let n_dims = points.first().map_or(0, Vec::len);

        let mut members: Vec<Vec<Vec<f64>>> = vec![Vec::new(); k];
        for (point, &c) in points.iter().zip(assignment) {
            if let Some(cluster) = members.get_mut(c) {
                cluster.push(point.clone());
            }
        }

        let mut components = Vec::with_capacity(k);
        for (cluster, pts) in members.into_iter().enumerate() {
            if pts.len() > n_dims {
                let count = pts.len() as f64;
                components.push(Component {
                    cluster,
                    weight: count,
                    kde: GaussianKde::new(pts)?,
                });
            }
        }

        let total: f64 = components.iter().map(|c| c.weight).sum();
        if components.is_empty() || total <= 0.0 {
            return Err(Error::SingularCovariance {
                n_points: points.len(),
            });
        }
        for c in &mut components {
            c.weight /= total;
        }

        Ok(Self { components, n_dims })
    }

    /// Returns the surviving clusters.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Returns the mixture weights of the surviving clusters.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Mixture density at an embedded point, without periodic images.
    #[must_use]
    pub fn pdf(&self, x: &[f64]) -> f64 {
        self.components.iter().map(|c| c.weight * c.kde.pdf(x)).sum()
    }

    /// Mixture density on the sphere at `(lon, sin lat)`, summing the nine
    /// images `lon + {0, 2π, -2π}` × `{s, 2 - s, -2 - s}`.
    #[must_use]
    pub fn periodic_sky_pdf(&self, lon: f64, sin_lat: f64) -> f64 {
        let mut total = 0.0;
        for dlon in LON_IMAGES {
            let l = lon + dlon;
            total += self.pdf(&[l, sin_lat]);
            total += self.pdf(&[l, 2.0 - sin_lat]);
            total += self.pdf(&[l, -2.0 - sin_lat]);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng_util;

    fn blob(rng: &mut fastrand::Rng, n: usize, center: [f64; 2], scale: f64) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| {
                vec![
                    center[0] + scale * rng_util::standard_normal(rng),
                    center[1] + scale * rng_util::standard_normal(rng),
                ]
            })
            .collect()
    }

    #[test]
    fn weights_sum_to_one_with_dropped_clusters() {
        let mut rng = fastrand::Rng::with_seed(1);
        let mut points = blob(&mut rng, 30, [1.0, 0.0], 0.1);
        points.extend(blob(&mut rng, 10, [3.0, 0.5], 0.1));
        points.extend(blob(&mut rng, 2, [5.0, -0.5], 0.1));
        let assignment: Vec<usize> = (0..42)
            .map(|i| match i {
                0..30 => 0,
                30..40 => 1,
                _ => 2,
            })
            .collect();

        let kde = ClusteredKde::from_assignment(&points, &assignment, 3).unwrap();
        assert_eq!(kde.components().len(), 2);
        let total: f64 = kde.weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((kde.weights()[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn empty_clusters_are_skipped() {
        let mut rng = fastrand::Rng::with_seed(2);
        let points = blob(&mut rng, 20, [0.0, 0.0], 1.0);
        let kde = ClusteredKde::from_assignment(&points, &[1; 20], 4).unwrap();
        assert_eq!(kde.components().len(), 1);
        assert_eq!(kde.components()[0].cluster, 1);
    }

    #[test]
    fn no_surviving_cluster_is_an_error() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.5], vec![0.3, 0.2]];
        let result = ClusteredKde::from_assignment(&points, &[0, 1, 2, 3], 4);
        assert!(matches!(result, Err(Error::SingularCovariance { n_points: 4 })));
    }

    #[test]
    fn assignment_length_is_checked() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let result = ClusteredKde::from_assignment(&points, &[0], 1);
        assert!(matches!(
            result,
            Err(Error::AssignmentMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn periodic_density_is_invariant_under_full_turns() {
        let mut rng = fastrand::Rng::with_seed(3);
        // straddles the longitude seam
        let points = blob(&mut rng, 50, [0.05, 0.2], 0.1);
        let kde = ClusteredKde::from_assignment(&points, &[0; 50], 1).unwrap();

        for &(lon, s) in &[(0.0, 0.2), (6.2, 0.25), (0.1, 0.1)] {
            let a = kde.periodic_sky_pdf(lon, s);
            let b = kde.periodic_sky_pdf(lon + 2.0 * PI, s);
            assert!((a - b).abs() <= 1e-9 * a.max(1e-300), "{a} vs {b}");
        }
        // mass just across the seam is picked up by the shifted image
        assert!(kde.periodic_sky_pdf(2.0 * PI - 0.05, 0.2) > 0.1 * kde.periodic_sky_pdf(0.05, 0.2));
    }

    #[test]
    fn pole_reflection_adds_density() {
        let mut rng = fastrand::Rng::with_seed(4);
        let points = blob(&mut rng, 50, [1.0, 0.97], 0.05);
        let kde = ClusteredKde::from_assignment(&points, &[0; 50], 1).unwrap();
        assert!(kde.periodic_sky_pdf(1.0, 0.99) > kde.pdf(&[1.0, 0.99]));
    }

    #[test]
    fn domain_dimensions() {
        assert_eq!(Domain::Sky.n_dims(), 2);
        assert_eq!(Domain::Volume.n_dims(), 3);
    }
}
