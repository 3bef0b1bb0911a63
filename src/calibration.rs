//! Calibration of p-values.
//!
//! When the truth of every simulated event is drawn from the distribution its
//! samples were drawn from, the p-values of a well-calibrated posterior are
//! uniform on `[0, 1]`. [`ks_uniform`] tests exactly that.

use core::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome of a one-sample Kolmogorov-Smirnov test.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KsTest {
    /// Largest distance between the empirical and the uniform CDF.
    pub statistic: f64,
    /// Probability of a statistic at least this large under uniformity.
    pub p_value: f64,
}

/// Kolmogorov-Smirnov test of `samples` against the uniform distribution on
/// `[0, 1]`.
///
/// The p-value uses the asymptotic Kolmogorov distribution evaluated at
/// `(√n + 0.12 + 0.11/√n) · D`, which is accurate for small `n` as well.
///
/// # Errors
///
/// Returns `Error::InsufficientSamples` if `samples` is empty and
/// `Error::NonFiniteCoordinate` if a sample is not finite.
///
/// # Examples
///
/// ```
/// use sky_area::calibration::ks_uniform;
///
/// let uniform: Vec<f64> = (0..100).map(|i| (f64::from(i) + 0.5) / 100.0).collect();
/// assert!(ks_uniform(&uniform).unwrap().p_value > 0.99);
///
/// let skewed: Vec<f64> = uniform.iter().map(|p| p * p).collect();
/// assert!(ks_uniform(&skewed).unwrap().p_value < 0.01);
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn ks_uniform(samples: &[f64]) -> Result<KsTest> {
    if samples.is_empty() {
        return Err(Error::InsufficientSamples {
            n_points: 0,
            required: 1,
        });
    }
    if let Some(index) = samples.iter().position(|x| !x.is_finite()) {
        return Err(Error::NonFiniteCoordinate { index });
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;

    let statistic = sorted
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let cdf = x.clamp(0.0, 1.0);
            let below = i as f64 / n;
            let above = (i + 1) as f64 / n;
            (above - cdf).max(cdf - below)
        })
        .fold(0.0, f64::max);

    let sqrt_n = n.sqrt();
    let lambda = (sqrt_n + 0.12 + 0.11 / sqrt_n) * statistic;
    let p_value = kolmogorov_survival(lambda);
    trace_debug!(statistic, p_value, "ks test");

    Ok(KsTest { statistic, p_value })
}

/// `P(K > lambda)` for the Kolmogorov distribution.
fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    let survival = if lambda < 1.18 {
        // theta-function form of the CDF converges fast for small arguments
        let y = (-PI * PI / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * PI).sqrt() / lambda * (y + y.powi(9) + y.powi(25) + y.powi(49));
        1.0 - cdf
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        2.0 * (x - x.powi(4) + x.powi(9))
    };
    survival.clamp(0.0, 1.0)
}
