//! Distance moments along lines of sight.
//!
//! For a direction `n̂`, every Gaussian kernel of a volume mixture restricted to
//! the ray `r n̂` is a one-dimensional Gaussian in `r` times a constant. The
//! probability per steradian and the conditional mean and standard deviation
//! of the distance therefore reduce to truncated Gaussian moments
//!
//! `I_k(μ, σ) = ∫₀^∞ r^k N(r; μ, σ) dr`
//!
//! which follow from `I_0 = Φ(μ/σ)`, `I_1 = μ I_0 + σ φ(μ/σ)` and
//! `I_k = μ I_{k-1} + (k - 1) σ² I_{k-2}`.
//!
//! Maps store these moments through the ansatz
//! `p(r) = norm · r² · N(r; mu, sigma)` (see [`moments_to_parameters`]).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::kde::ClusteredKde;
use crate::stats::{norm_cdf, norm_pdf};

/// Smallest `mu / sigma` the ansatz inversion searches.
const MIN_Z: f64 = -10.0;
/// Largest `mu / sigma` the ansatz inversion searches.
const MAX_Z: f64 = 1e6;

/// Conditional distance distribution along one line of sight.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceMoments {
    /// Probability per steradian, `∫ p(r n̂) r² dr`.
    pub probability: f64,
    /// Conditional mean distance; NaN where the probability vanishes.
    pub mean: f64,
    /// Conditional distance standard deviation; NaN where the probability vanishes.
    pub std: f64,
}

/// Parameters of the distance ansatz `p(r) = norm · r² · N(r; mu, sigma)`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistanceAnsatz {
    /// Location of the Gaussian factor.
    pub mu: f64,
    /// Scale of the Gaussian factor.
    pub sigma: f64,
    /// Normalization making the ansatz integrate to one over `r > 0`.
    pub norm: f64,
}

impl DistanceAnsatz {
    /// The ansatz used where the moments cannot be represented.
    pub const UNDEFINED: Self = Self {
        mu: f64::INFINITY,
        sigma: 1.0,
        norm: 0.0,
    };
}

/// `[I_0, …, I_4]` of `N(r; mu, sigma)` over `r > 0`.
#[must_use]
pub fn truncated_moments(mu: f64, sigma: f64) -> [f64; 5] {
    let z = mu / sigma;
    let mut moments = [0.0; 5];
    moments[0] = norm_cdf(z);
    moments[1] = mu * moments[0] + sigma * norm_pdf(z);
    for k in 2..5 {
        #[allow(clippy::cast_precision_loss)]
        let order = (k - 1) as f64;
        moments[k] = mu * moments[k - 1] + order * sigma * sigma * moments[k - 2];
    }
    moments
}

/// Finds the ansatz with the given conditional mean and standard deviation.
///
/// The ratio `std / mean` determines `mu / sigma` (found by bisection), and
/// the mean then fixes the scale. A ratio of `1/√3` or more cannot be
/// represented (the ansatz tends to `r² e^{-r/s}` as `mu → -∞`); such
/// moments, like non-finite or non-positive ones, give
/// [`DistanceAnsatz::UNDEFINED`]. Ratios beyond the searched range of
/// `mu / sigma` are clamped to its ends.
///
/// # Examples
///
/// ```
/// use sky_area::distance::{DistanceAnsatz, moments_to_parameters};
///
/// let ansatz = moments_to_parameters(100.0, 10.0);
/// assert!(ansatz.mu > 90.0 && ansatz.mu < 100.0);
/// assert_eq!(moments_to_parameters(100.0, 60.0), DistanceAnsatz::UNDEFINED);
/// ```
#[must_use]
pub fn moments_to_parameters(mean: f64, std: f64) -> DistanceAnsatz {
    if !mean.is_finite() || !std.is_finite() || mean <= 0.0 || std <= 0.0 {
        return DistanceAnsatz::UNDEFINED;
    }
    let target = std / mean;
    if target >= 1.0 / 3f64.sqrt() {
        return DistanceAnsatz::UNDEFINED;
    }

    // std / mean of the ansatz decreases monotonically in z = mu / sigma
    let mut low = MIN_Z;
    let mut high = MAX_Z;
    let z = if relative_spread(low) <= target {
        low
    } else if relative_spread(high) >= target {
        high
    } else {
        for _ in 0..200 {
            let mid = 0.5 * (low + high);
            if relative_spread(mid) > target {
                low = mid;
            } else {
                high = mid;
            }
            if high - low <= 1e-12 * (1.0 + mid.abs()) {
                break;
            }
        }
        0.5 * (low + high)
    };

    let moments = truncated_moments(z, 1.0);
    let sigma = mean * moments[2] / moments[3];
    DistanceAnsatz {
        mu: z * sigma,
        sigma,
        norm: 1.0 / (sigma * sigma * moments[2]),
    }
}

/// Mean and standard deviation of the ansatz with the given parameters.
#[must_use]
pub fn parameters_to_moments(mu: f64, sigma: f64) -> (f64, f64) {
    let moments = truncated_moments(mu, sigma);
    let mean = moments[3] / moments[2];
    let second = moments[4] / moments[2];
    (mean, (second - mean * mean).max(0.0).sqrt())
}

fn relative_spread(z: f64) -> f64 {
    let (mean, std) = parameters_to_moments(z, 1.0);
    std / mean
}

/// One cluster of a volume mixture prepared for line-of-sight integration.
#[derive(Clone, Debug)]
struct KernelSet {
    /// Mixture weight divided by the number of kernels.
    weight: f64,
    precision: [[f64; 3]; 3],
    sqrt_det_precision: f64,
    centres: Vec<[f64; 3]>,
    /// `xᵀ A x` per kernel centre.
    quadratic: Vec<f64>,
}

/// Evaluates [`DistanceMoments`] of a 3-D clustered KDE.
#[derive(Clone, Debug)]
pub struct DistanceIntegrator {
    kernels: Vec<KernelSet>,
}

impl DistanceIntegrator {
    /// Prepares a 3-D (Cartesian) mixture for line-of-sight integration.
    ///
    /// # Panics
    ///
    /// Panics if `kde` is not three-dimensional.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(kde: &ClusteredKde) -> Self {
        assert_eq!(kde.n_dims(), 3, "distance moments need a 3-D mixture");
        let kernels = kde
            .components()
            .iter()
            .map(|component| {
                let inv = component.kde.inverse_covariance();
                let precision: [[f64; 3]; 3] =
                    core::array::from_fn(|i| core::array::from_fn(|j| inv[(i, j)]));
                let centres: Vec<[f64; 3]> = component
                    .kde
                    .dataset()
                    .iter()
                    .map(|x| [x[0], x[1], x[2]])
                    .collect();
                let quadratic = centres.iter().map(|x| quad_form(&precision, x, x)).collect();
                KernelSet {
                    weight: component.weight / centres.len() as f64,
                    precision,
                    sqrt_det_precision: inv.determinant().sqrt(),
                    centres,
                    quadratic,
                }
            })
            .collect();
        Self { kernels }
    }

    /// Probability per steradian and conditional distance moments towards
    /// `(lon, lat)`.
    #[must_use]
    pub fn moments(&self, lon: f64, lat: f64) -> DistanceMoments {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        let n = [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat];

        let mut sums = [0.0; 3];
        for set in &self.kernels {
            let an: [f64; 3] = core::array::from_fn(|i| {
                (0..3).map(|j| set.precision[i][j] * n[j]).sum::<f64>()
            });
            let a: f64 = (0..3).map(|i| an[i] * n[i]).sum();
            let sigma = a.sqrt().recip();
            let scale = set.weight * (set.sqrt_det_precision / a.sqrt())
                / (2.0 * core::f64::consts::PI);

            for (x, &c) in set.centres.iter().zip(&set.quadratic) {
                let b: f64 = (0..3).map(|i| an[i] * x[i]).sum();
                let mu = b / a;
                let factor = scale * (-0.5 * (c - b * mu)).exp();
                if factor == 0.0 {
                    continue;
                }
                let moments = truncated_moments(mu, sigma);
                sums[0] += factor * moments[2];
                sums[1] += factor * moments[3];
                sums[2] += factor * moments[4];
            }
        }

        let probability = sums[0];
        if probability <= 0.0 {
            return DistanceMoments {
                probability: 0.0,
                mean: f64::NAN,
                std: f64::NAN,
            };
        }
        let mean = sums[1] / probability;
        let variance = sums[2] / probability - mean * mean;
        DistanceMoments {
            probability,
            mean,
            std: variance.max(0.0).sqrt(),
        }
    }
}

fn quad_form(m: &[[f64; 3]; 3], x: &[f64; 3], y: &[f64; 3]) -> f64 {
    (0..3)
        .map(|i| x[i] * (0..3).map(|j| m[i][j] * y[j]).sum::<f64>())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::VolumePoint;
    use crate::rng_util::standard_normal;

    fn integrate(f: impl Fn(f64) -> f64, low: f64, high: f64, steps: u32) -> f64 {
        let h = (high - low) / f64::from(steps);
        (0..steps)
            .map(|i| f(low + (f64::from(i) + 0.5) * h) * h)
            .sum()
    }

    #[test]
    fn test_truncated_moments_match_quadrature() {
        for &(mu, sigma) in &[(2.0, 1.0), (0.5, 2.0), (-1.0, 0.7)] {
            let moments = truncated_moments(mu, sigma);
            for (k, &m) in moments.iter().enumerate() {
                let power = i32::try_from(k).unwrap();
                let direct = integrate(
                    |r| r.powi(power) * norm_pdf((r - mu) / sigma) / sigma,
                    0.0,
                    mu.max(0.0) + 20.0 * sigma,
                    200_000,
                );
                assert!((m - direct).abs() < 1e-6 * direct.max(1e-3), "k = {k}: {m} vs {direct}");
            }
        }
    }

    #[test]
    fn test_moments_to_parameters_inverts_moments() {
        for &(mu, sigma) in &[(100.0, 10.0), (40.0, 30.0), (5.0, 20.0)] {
            let (mean, std) = parameters_to_moments(mu, sigma);
            let ansatz = moments_to_parameters(mean, std);
            assert!((ansatz.mu - mu).abs() < 1e-6 * sigma, "{ansatz:?}");
            assert!((ansatz.sigma - sigma).abs() < 1e-6 * sigma, "{ansatz:?}");
        }
    }

    #[test]
    fn test_ansatz_is_normalized() {
        let ansatz = moments_to_parameters(50.0, 15.0);
        let total = integrate(
            |r| ansatz.norm * r * r * norm_pdf((r - ansatz.mu) / ansatz.sigma) / ansatz.sigma,
            0.0,
            400.0,
            100_000,
        );
        assert!((total - 1.0).abs() < 1e-6, "{total}");
    }

    #[test]
    fn test_unrepresentable_moments() {
        let undefined = DistanceAnsatz::UNDEFINED;
        assert_eq!(moments_to_parameters(1.0, 0.6), undefined);
        assert_eq!(moments_to_parameters(f64::NAN, 1.0), undefined);
        assert_eq!(moments_to_parameters(f64::INFINITY, 1.0), undefined);
        assert_eq!(moments_to_parameters(-5.0, 1.0), undefined);
        assert_eq!(moments_to_parameters(5.0, 0.0), undefined);
    }

    #[test]
    fn test_moments_match_radial_quadrature() {
        let mut rng = fastrand::Rng::with_seed(1);
        let points: Vec<Vec<f64>> = (0..200)
            .map(|_| {
                VolumePoint::new(
                    1.0 + 0.05 * standard_normal(&mut rng),
                    0.4 + 0.05 * standard_normal(&mut rng),
                    100.0 + 10.0 * standard_normal(&mut rng),
                )
                .embed()
            })
            .collect();
        let kde = ClusteredKde::from_assignment(&points, &vec![0; 200], 1).unwrap();
        let integrator = DistanceIntegrator::new(&kde);

        let (lon, lat) = (1.02, 0.41);
        let moments = integrator.moments(lon, lat);
        let ray = |r: f64| VolumePoint::new(lon, lat, r).to_cartesian();
        let weight = |r: f64, k: i32| kde.pdf(&ray(r)) * r.powi(k);
        let probability = integrate(|r| weight(r, 2), 0.0, 300.0, 30_000);
        let mean = integrate(|r| weight(r, 3), 0.0, 300.0, 30_000) / probability;
        let second = integrate(|r| weight(r, 4), 0.0, 300.0, 30_000) / probability;

        assert!((moments.probability - probability).abs() < 1e-5 * probability);
        assert!((moments.mean - mean).abs() < 1e-5 * mean);
        assert!((moments.std - (second - mean * mean).sqrt()).abs() < 1e-4 * moments.std);
    }

    #[test]
    fn test_moments_vanish_far_from_data() {
        let mut rng = fastrand::Rng::with_seed(2);
        let points: Vec<Vec<f64>> = (0..50)
            .map(|_| {
                vec![
                    100.0 + standard_normal(&mut rng),
                    standard_normal(&mut rng),
                    standard_normal(&mut rng),
                ]
            })
            .collect();
        let kde = ClusteredKde::from_assignment(&points, &vec![0; 50], 1).unwrap();
        let moments = DistanceIntegrator::new(&kde).moments(core::f64::consts::PI, 0.0);
        assert!(moments.probability.abs() < f64::EPSILON);
        assert!(moments.mean.is_nan());
    }
}
