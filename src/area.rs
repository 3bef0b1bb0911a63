//! Areas of density level sets on the sky.
//!
//! Two integrators are available:
//!
//! - the adaptive grid, which evaluates the density once per leaf and sums
//!   the areas of leaves at or above a level (fast, resolution follows the
//!   samples);
//! - uniform HEALPix grids of increasing resolution combined by Richardson
//!   extrapolation until successive estimates agree (slow, resolution follows
//!   the requested accuracy).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coords::SkyPoint;
use crate::error::Result;
use crate::healpix::{self, AdaptiveGrid};

/// How sky areas are integrated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AreaMethod {
    /// Sum over the leaves of the adaptive grid.
    #[default]
    Adaptive,
    /// Richardson-extrapolated uniform grids, refined to the configured accuracy.
    Refined,
}

/// Adaptive grid with the density evaluated at every leaf centre.
#[derive(Debug)]
pub(crate) struct GridCache {
    grid: AdaptiveGrid,
    densities: Vec<f64>,
    /// Leaf densities in ascending order.
    sorted: Vec<f64>,
    /// `area_above[i]`: total area of the leaves from `sorted[i]` upwards.
    area_above: Vec<f64>,
}

impl GridCache {
    pub(crate) fn build(
        points: &[SkyPoint],
        max_order: u8,
        density: impl Fn(f64, f64) -> f64,
    ) -> Result<Self> {
        let grid = AdaptiveGrid::new(points, max_order)?;
        let densities: Vec<f64> = grid
            .leaves()
            .iter()
            .map(|leaf| density(leaf.lon, leaf.lat))
            .collect();

        let mut by_density: Vec<(f64, f64)> = grid
            .leaves()
            .iter()
            .zip(&densities)
            .map(|(leaf, &d)| (d, leaf.area()))
            .collect();
        by_density.sort_by(|a, b| a.0.total_cmp(&b.0));

        let sorted = by_density.iter().map(|&(d, _)| d).collect();
        let mut area_above = vec![0.0; by_density.len() + 1];
        for (i, &(_, area)) in by_density.iter().enumerate().rev() {
            area_above[i] = area_above[i + 1] + area;
        }

        Ok(Self {
            grid,
            densities,
            sorted,
            area_above,
        })
    }

    pub(crate) fn grid(&self) -> &AdaptiveGrid {
        &self.grid
    }

    pub(crate) fn densities(&self) -> &[f64] {
        &self.densities
    }

    /// Total area of the leaves with density at least `level`.
    pub(crate) fn area(&self, level: f64) -> f64 {
        let first = self.sorted.partition_point(|&d| d < level);
        self.area_above[first]
    }
}

/// Result of the Richardson-refined integration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) struct RefinedAreas {
    /// Extrapolated area per level, steradians.
    pub(crate) areas: Vec<f64>,
    /// Resolution of the last grid evaluated.
    pub(crate) nside: u64,
    /// `false` when `max_nside` was reached before the requested accuracy.
    pub(crate) converged: bool,
}

/// Areas of `{density > level}` for every level, refined over nside = 2, 4, …
///
/// With `A_n` the pixel-counting area at resolution `n`, the estimate is
/// `R_n = (4 A_n − A_{n/2}) / 3` (taking `A_1 = 0`). Refinement stops once
/// every `A_n` is positive and within `accuracy` of `R_n` relative to `R_n`,
/// or when `nside` reaches `max_nside`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn refined_areas(
    levels: &[f64],
    accuracy: f64,
    max_nside: u64,
    density: impl Fn(f64, f64) -> f64,
) -> RefinedAreas {
    let mut previous = vec![0.0; levels.len()];
    let mut nside = 1;

    loop {
        nside *= 2;
        let pixel_area = healpix::pixel_area(nside);
        let mut values: Vec<f64> = (0..healpix::npix(nside))
            .map(|ipix| {
                let (lon, lat) = healpix::pix2ang_nest(nside, ipix);
                density(lon, lat)
            })
            .collect();
        values.sort_by(f64::total_cmp);

        let current: Vec<f64> = levels
            .iter()
            .map(|&level| {
                let above = values.len() - values.partition_point(|&d| d <= level);
                above as f64 * pixel_area
            })
            .collect();
        let estimate: Vec<f64> = current
            .iter()
            .zip(&previous)
            .map(|(a, a_prev)| (4.0 * a - a_prev) / 3.0)
            .collect();

        let converged = current
            .iter()
            .zip(&estimate)
            .all(|(&a, &r)| a > 0.0 && ((a - r) / r).abs() < accuracy);
        trace_debug!(nside, converged, "refined area pass");

        if converged || nside >= max_nside {
            if !converged {
                trace_warn!(nside, accuracy, "area refinement stopped at maximum resolution");
            }
            return RefinedAreas {
                areas: estimate,
                nside,
                converged,
            };
        }
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::PI;

    use super::*;

    const KAPPA: f64 = 10.0;

    /// Von Mises-Fisher density about the north pole.
    fn polar_density(_lon: f64, lat: f64) -> f64 {
        KAPPA / (2.0 * PI * (1.0 - (-2.0 * KAPPA).exp())) * (KAPPA * (lat.sin() - 1.0)).exp()
    }

    /// Exact area of `{polar_density > level}`.
    fn polar_area(level: f64) -> f64 {
        let peak = polar_density(0.0, core::f64::consts::FRAC_PI_2);
        -2.0 * PI * (level / peak).ln() / KAPPA
    }

    fn uniform_points(rng: &mut fastrand::Rng, n: usize) -> Vec<SkyPoint> {
        (0..n)
            .map(|_| SkyPoint::new(2.0 * PI * rng.f64(), (2.0 * rng.f64() - 1.0).asin()))
            .collect()
    }

    #[test]
    fn test_refined_uniform_density_converges_to_full_sky() {
        let result = refined_areas(&[0.5 / (4.0 * PI)], 1e-3, 512, |_, _| 1.0 / (4.0 * PI));
        assert!(result.converged);
        assert_eq!(result.nside, 4);
        assert!((result.areas[0] - 4.0 * PI).abs() < 1e-9);
    }

    #[test]
    fn test_refined_matches_exact_cap_area() {
        let peak = polar_density(0.0, core::f64::consts::FRAC_PI_2);
        let levels = [0.5 * peak, 0.1 * peak, 0.01 * peak];
        let result = refined_areas(&levels, 1e-2, 512, polar_density);
        for (&level, &area) in levels.iter().zip(&result.areas) {
            let exact = polar_area(level);
            assert!(
                ((area - exact) / exact).abs() < 0.03,
                "level {level}: {area} vs {exact}"
            );
        }
    }

    #[test]
    fn test_refined_stops_at_max_nside() {
        let peak = polar_density(0.0, core::f64::consts::FRAC_PI_2);
        let result = refined_areas(&[0.5 * peak], 1e-9, 8, polar_density);
        assert!(!result.converged);
        assert_eq!(result.nside, 8);
    }

    #[test]
    fn test_refined_empty_level_set_does_not_converge() {
        let result = refined_areas(&[1.0], 1e-2, 16, |_, _| 0.0);
        assert!(!result.converged);
        assert!(result.areas[0].abs() < f64::EPSILON);
    }

    #[test]
    fn test_grid_cache_area_is_monotone() {
        let mut rng = fastrand::Rng::with_seed(1);
        let points = uniform_points(&mut rng, 2000);
        let cache = GridCache::build(&points, healpix::MAX_ORDER, polar_density).unwrap();
        assert_eq!(cache.densities().len(), cache.grid().len());

        let peak = polar_density(0.0, core::f64::consts::FRAC_PI_2);
        let mut previous = 0.0;
        for fraction in [0.9, 0.5, 0.1, 0.01, 0.0] {
            let area = cache.area(fraction * peak);
            assert!(area >= previous);
            previous = area;
        }
        assert!((cache.area(0.0) - 4.0 * PI).abs() < 1e-9);
        assert!(cache.area(2.0 * peak).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grid_cache_matches_exact_cap_area() {
        let mut rng = fastrand::Rng::with_seed(2);
        let points = uniform_points(&mut rng, 4000);
        let cache = GridCache::build(&points, healpix::MAX_ORDER, polar_density).unwrap();
        let peak = polar_density(0.0, core::f64::consts::FRAC_PI_2);
        for fraction in [0.3, 0.05] {
            let exact = polar_area(fraction * peak);
            let area = cache.area(fraction * peak);
            assert!(((area - exact) / exact).abs() < 0.1, "{area} vs {exact}");
        }
    }
}
