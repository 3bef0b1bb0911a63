/// Return a uniformly random permutation of `0..n`.
pub(crate) fn permutation(rng: &mut fastrand::Rng, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut order);
    order
}

/// Draw a standard normal variate with the Box-Muller transform.
#[cfg(test)]
pub(crate) fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // 1 - u keeps the logarithm finite
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * core::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_contains_every_index_once() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut order = permutation(&mut rng, 50);
        order.sort_unstable();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn permutation_is_reproducible_with_seed() {
        let a = permutation(&mut fastrand::Rng::with_seed(11), 20);
        let b = permutation(&mut fastrand::Rng::with_seed(11), 20);
        assert_eq!(a, b);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn standard_normal_has_unit_variance() {
        let mut rng = fastrand::Rng::with_seed(5);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean = {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance = {var}");
    }
}
