//! Full-covariance Gaussian kernel density estimation.
//!
//! The kernel covariance is the sample covariance of the data scaled by the
//! square of Scott's factor, so the kernels follow the correlations present in
//! the cluster instead of using independent per-dimension bandwidths.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::stats;

/// Smallest admissible ratio of a Cholesky pivot to the matching variance.
const MIN_PARTIAL_VARIANCE: f64 = 1e-12;

/// A multivariate Gaussian kernel density estimator.
///
/// # Examples
///
/// ```
/// use sky_area::kde::GaussianKde;
///
/// let samples = vec![
///     vec![0.0, 0.1],
///     vec![1.0, 0.9],
///     vec![2.0, 2.2],
///     vec![0.5, 0.3],
/// ];
/// let kde = GaussianKde::new(samples).unwrap();
/// assert_eq!(kde.n_dims(), 2);
/// assert!(kde.pdf(&[1.0, 1.0]) > kde.pdf(&[5.0, -5.0]));
/// ```
#[derive(Clone, Debug)]
pub struct GaussianKde {
    /// The sample points, one row per point.
    dataset: Vec<Vec<f64>>,
    /// Row-major `n × d` dataset mapped through the whitening transform.
    whitened: Vec<f64>,
    /// `L⁻¹` where `L Lᵀ` is the kernel covariance.
    whitener: DMatrix<f64>,
    /// The kernel covariance.
    covariance: DMatrix<f64>,
    /// Inverse of the kernel covariance.
    inverse_covariance: DMatrix<f64>,
    /// `1 / (n · sqrt(det(2πΣ)))`.
    norm: f64,
    n_dims: usize,
}

impl GaussianKde {
    /// Fits a KDE with Scott's-rule kernel covariance
    /// `Σ = cov(data) · n^(-2/(d+4))`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientSamples` if `dataset` is empty.
    /// Returns `Error::DimensionMismatch` if points have inconsistent dimensions.
    /// Returns `Error::SingularCovariance` if there are no more points than
    /// dimensions or the points do not span the space.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(dataset: Vec<Vec<f64>>) -> Result<Self> {
        let n = dataset.len();
        if n == 0 {
            return Err(Error::InsufficientSamples {
                n_points: 0,
                required: 1,
            });
        }

        let n_dims = dataset[0].len();
        for (i, point) in dataset.iter().enumerate() {
            if point.len() != n_dims {
                return Err(Error::DimensionMismatch {
                    expected: n_dims,
                    got: point.len(),
                    sample_index: i,
                });
            }
        }
        if n_dims == 0 || n <= n_dims {
            return Err(Error::SingularCovariance { n_points: n });
        }

        let factor = Self::scotts_factor(n, n_dims);
        let covariance = stats::covariance(&dataset)
            .ok_or(Error::SingularCovariance { n_points: n })?
            * (factor * factor);

        let cholesky = nalgebra::linalg::Cholesky::new(covariance.clone())
            .ok_or(Error::SingularCovariance { n_points: n })?;
        let l = cholesky.l();
        // a vanishing pivot relative to its variance means the points lie in a
        // lower-dimensional subspace
        let degenerate = (0..n_dims)
            .any(|i| l[(i, i)] * l[(i, i)] <= MIN_PARTIAL_VARIANCE * covariance[(i, i)]);
        if degenerate {
            return Err(Error::SingularCovariance { n_points: n });
        }
        let whitener = l
            .solve_lower_triangular(&DMatrix::identity(n_dims, n_dims))
            .ok_or(Error::SingularCovariance { n_points: n })?;
        let inverse_covariance = cholesky.inverse();

        // sqrt(det Σ) is the product of the Cholesky diagonal
        let sqrt_det: f64 = l.diagonal().iter().product();
        let norm = 1.0
            / (n as f64 * (2.0 * core::f64::consts::PI).powf(n_dims as f64 / 2.0) * sqrt_det);

        let mut whitened = Vec::with_capacity(n * n_dims);
        for point in &dataset {
            whitened.extend(Self::whiten_with(&whitener, point).iter());
        }

        Ok(Self {
            dataset,
            whitened,
            whitener,
            covariance,
            inverse_covariance,
            norm,
            n_dims,
        })
    }

    /// Scott's factor `n^(-1/(d+4))`.
    #[allow(clippy::cast_precision_loss)]
    fn scotts_factor(n: usize, n_dims: usize) -> f64 {
        (n as f64).powf(-1.0 / (n_dims as f64 + 4.0))
    }

    fn whiten_with(whitener: &DMatrix<f64>, x: &[f64]) -> DVector<f64> {
        whitener * DVector::from_column_slice(x)
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Returns the number of kernels (sample points).
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.dataset.len()
    }

    /// Returns the sample points.
    #[must_use]
    pub fn dataset(&self) -> &[Vec<f64>] {
        &self.dataset
    }

    /// Returns the kernel covariance.
    #[must_use]
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Returns the inverse of the kernel covariance.
    #[must_use]
    pub fn inverse_covariance(&self) -> &DMatrix<f64> {
        &self.inverse_covariance
    }

    /// Returns the probability density at `x`:
    ///
    /// `f(x) = (1/n) Σ_i N(x; x_i, Σ)`
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != self.n_dims()`.
    #[must_use]
    pub fn pdf(&self, x: &[f64]) -> f64 {
        assert_eq!(
            x.len(),
            self.n_dims,
            "Point dimension {} doesn't match KDE dimension {}",
            x.len(),
            self.n_dims
        );

        let z = Self::whiten_with(&self.whitener, x);
        let sum: f64 = self
            .whitened
            .chunks_exact(self.n_dims)
            .map(|zi| {
                let r2: f64 = zi.iter().zip(z.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                (-0.5 * r2).exp()
            })
            .sum();

        self.norm * sum
    }
}
