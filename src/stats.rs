//! Sample moments and standard normal helpers shared by clustering, the
//! kernel density estimators and the distance moments.

use nalgebra::DMatrix;

/// Column means of a set of equally sized points.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean<P: AsRef<[f64]>>(points: &[P]) -> Vec<f64> {
    let n_dims = points.first().map_or(0, |p| p.as_ref().len());
    let mut sum = vec![0.0; n_dims];
    for p in points {
        for (s, &x) in sum.iter_mut().zip(p.as_ref()) {
            *s += x;
        }
    }
    let n = points.len() as f64;
    sum.iter().map(|s| s / n).collect()
}

/// Unbiased (n - 1 normalized) sample covariance of a set of points.
///
/// Returns `None` for fewer than two points.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn covariance<P: AsRef<[f64]>>(points: &[P]) -> Option<DMatrix<f64>> {
    if points.len() < 2 {
        return None;
    }
    let mu = mean(points);
    let d = mu.len();
    let mut cov = DMatrix::<f64>::zeros(d, d);
    for p in points {
        let p = p.as_ref();
        for i in 0..d {
            let di = p[i] - mu[i];
            for j in i..d {
                cov[(i, j)] += di * (p[j] - mu[j]);
            }
        }
    }
    let denom = (points.len() - 1) as f64;
    for i in 0..d {
        for j in i..d {
            let v = cov[(i, j)] / denom;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    Some(cov)
}

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF, accurate in the far tails.
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(-x / core::f64::consts::SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_points() {
        let pts = vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]];
        assert_eq!(mean(&pts), vec![2.0, 3.0]);
    }

    #[test]
    fn covariance_is_unbiased_and_symmetric() {
        let pts = vec![vec![0.0, 0.0], vec![1.0, 2.0], vec![2.0, 4.0], vec![3.0, 3.0]];
        let cov = covariance(&pts).unwrap();
        // var(x) of 0,1,2,3 with ddof = 1
        assert!((cov[(0, 0)] - 5.0 / 3.0).abs() < 1e-12);
        assert!((cov[(0, 1)] - cov[(1, 0)]).abs() < 1e-15);
    }

    #[test]
    fn covariance_needs_two_points() {
        assert!(covariance(&[vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn norm_cdf_matches_known_values() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-15);
        assert!((norm_cdf(1.959_963_984_540_054) - 0.975).abs() < 1e-12);
        // far tail stays relatively accurate
        let tail = norm_cdf(-10.0);
        assert!((tail / 7.619_853_024_160_527e-24 - 1.0).abs() < 1e-8);
    }

    #[test]
    fn norm_pdf_peak() {
        assert!((norm_pdf(0.0) - 0.398_942_280_401_432_7).abs() < 1e-15);
        assert!((norm_pdf(1.5) - norm_pdf(-1.5)).abs() < 1e-15);
    }
}
