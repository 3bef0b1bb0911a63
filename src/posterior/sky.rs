//! Posteriors over sky positions.
//!
//! Areas and maps are integrated on an adaptive HEALPix grid that is built on
//! first use and then shared between queries.

use std::sync::Arc;

use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Fitted, MapMethod, Posterior, PosteriorBuilder, PosteriorConfig, normalize};
use crate::area::{AreaMethod, GridCache, refined_areas};
use crate::cluster::ClusterModel;
use crate::coords::{SkyPoint, check_finite};
use crate::error::Result;
use crate::greedy::{CredibleLevel, GreedyRanker};
use crate::healpix::{self, PixelOrdering};

/// Area of the whole sphere, steradians.
const FULL_SKY: f64 = 4.0 * core::f64::consts::PI;

/// A clustered KDE posterior over sky positions.
///
/// Built through [`SkyPosterior::builder`]. Credible and searched areas, p-values
/// and sky maps are available through [`Posterior`] and the inherent methods.
///
/// # Examples
///
/// ```
/// use sky_area::prelude::*;
///
/// let mut rng = fastrand::Rng::with_seed(11);
/// let points: Vec<SkyPoint> = (0..300)
///     .map(|_| SkyPoint::new(4.0 + 0.1 * rng.f64(), -0.5 + 0.1 * rng.f64()))
///     .collect();
/// let posterior = SkyPosterior::builder().n_trials(2).seed(5).build_sky(&points).unwrap();
///
/// let map = posterior.to_healpix(16, PixelOrdering::Ring, MapMethod::Direct).unwrap();
/// let total: f64 = map.values().iter().sum();
/// assert!((total - 1.0).abs() < 1e-9);
/// ```
#[derive(Debug)]
pub struct SkyPosterior {
    points: Vec<SkyPoint>,
    model: ClusterModel,
    ranker: GreedyRanker,
    config: PosteriorConfig,
    grid: Mutex<Option<Arc<GridCache>>>,
}

impl SkyPosterior {
    /// Starts building a sky posterior.
    #[must_use]
    pub fn builder() -> PosteriorBuilder {
        PosteriorBuilder::new()
    }

    pub(super) fn from_fitted(points: Vec<SkyPoint>, fitted: Fitted, config: PosteriorConfig) -> Self {
        Self {
            points,
            model: fitted.model,
            ranker: fitted.ranker,
            config,
            grid: Mutex::new(None),
        }
    }

    /// The samples the posterior was built from.
    #[must_use]
    pub fn points(&self) -> &[SkyPoint] {
        &self.points
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PosteriorConfig {
        &self.config
    }

    /// Changes the relative accuracy used by [`AreaMethod::Refined`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAccuracy` if `accuracy` is not positive and finite.
    pub fn set_accuracy(&mut self, accuracy: f64) -> Result<()> {
        super::validate_accuracy(accuracy)?;
        self.config.accuracy = accuracy;
        Ok(())
    }

    /// Rasterizes the density onto a full-sky HEALPix map normalized to sum 1.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNside` if `nside` is not a power of two in
    /// `1..=2^29`.
    pub fn to_healpix(
        &self,
        nside: u64,
        ordering: PixelOrdering,
        method: MapMethod,
    ) -> Result<SkyMap> {
        healpix::nside_to_order(nside)?;
        let mut values = match method {
            MapMethod::Adaptive => {
                let cache = self.grid_cache()?;
                cache.grid().rasterize(cache.densities(), nside)?
            }
            MapMethod::Direct => (0..healpix::npix(nside))
                .map(|ipix| {
                    let (lon, lat) = healpix::pix2ang_nest(nside, ipix);
                    self.density_at(lon, lat)
                })
                .collect(),
        };
        normalize(&mut values);
        SkyMap {
            nside,
            ordering: PixelOrdering::Nested,
            values,
        }
        .reorder(ordering)
    }

    fn density_at(&self, lon: f64, lat: f64) -> f64 {
        self.model.density(&[lon, lat.sin()])
    }

    /// The adaptive grid with leaf densities, built on first use.
    fn grid_cache(&self) -> Result<Arc<GridCache>> {
        let mut guard = self.grid.lock();
        if let Some(cache) = guard.as_ref() {
            return Ok(Arc::clone(cache));
        }
        let cache = Arc::new(GridCache::build(
            &self.points,
            self.config.max_grid_order,
            |lon, lat| self.density_at(lon, lat),
        )?);
        trace_debug!(n_leaves = cache.grid().len(), "adaptive grid built");
        *guard = Some(Arc::clone(&cache));
        Ok(cache)
    }

    /// Area of the region with density above each of `levels`.
    fn areas_at(&self, levels: &[f64], method: AreaMethod) -> Result<Vec<f64>> {
        if levels.is_empty() {
            return Ok(Vec::new());
        }
        match method {
            AreaMethod::Adaptive => {
                let cache = self.grid_cache()?;
                Ok(levels.iter().map(|&level| cache.area(level)).collect())
            }
            AreaMethod::Refined => {
                let refined = refined_areas(
                    levels,
                    self.config.accuracy,
                    self.config.max_nside,
                    |lon, lat| self.density_at(lon, lat),
                );
                trace_debug!(
                    nside = refined.nside,
                    converged = refined.converged,
                    "refined areas"
                );
                Ok(refined.areas)
            }
        }
    }
}

impl Posterior for SkyPosterior {
    type Point = SkyPoint;

    fn density(&self, points: &[SkyPoint]) -> Result<Vec<f64>> {
        check_finite(points, SkyPoint::is_finite)?;
        Ok(points.iter().map(|p| self.density_at(p.lon, p.lat)).collect())
    }

    fn model(&self) -> &ClusterModel {
        &self.model
    }

    fn ranker(&self) -> &GreedyRanker {
        &self.ranker
    }

    fn sky_area(&self, credible_levels: &[f64], method: AreaMethod) -> Result<Vec<f64>> {
        let contours = credible_levels
            .iter()
            .map(|&q| self.ranker.level_at_quantile(q))
            .collect::<Result<Vec<_>>>()?;
        let levels: Vec<f64> = contours
            .iter()
            .filter_map(|contour| match contour {
                CredibleLevel::Contour(level) => Some(*level),
                CredibleLevel::Missed => None,
            })
            .collect();

        let mut areas = self.areas_at(&levels, method)?.into_iter();
        Ok(contours
            .iter()
            .map(|contour| match contour {
                CredibleLevel::Contour(_) => areas.next().unwrap_or(FULL_SKY),
                CredibleLevel::Missed => FULL_SKY,
            })
            .collect())
    }

    fn searched_area(&self, points: &[SkyPoint], method: AreaMethod) -> Result<Vec<f64>> {
        let levels = self.density(points)?;
        self.areas_at(&levels, method)
    }

    fn p_values(&self, points: &[SkyPoint]) -> Result<Vec<f64>> {
        let levels = self.density(points)?;
        Ok(levels
            .into_iter()
            .map(|level| self.ranker.quantile_at_level(level))
            .collect())
    }
}

/// A full-sky probability map.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkyMap {
    nside: u64,
    ordering: PixelOrdering,
    values: Vec<f64>,
}

impl SkyMap {
    /// Wraps per-pixel values given in `ordering`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMapLength` if `values.len()` is not `12 · nside²`
    /// for a valid nside.
    pub fn new(values: Vec<f64>, ordering: PixelOrdering) -> Result<Self> {
        let nside = healpix::npix_to_nside(values.len())?;
        Ok(Self {
            nside,
            ordering,
            values,
        })
    }

    /// Resolution of the map.
    #[must_use]
    pub fn nside(&self) -> u64 {
        self.nside
    }

    /// Pixel ordering of [`values`](Self::values).
    #[must_use]
    pub fn ordering(&self) -> PixelOrdering {
        self.ordering
    }

    /// Probability per pixel.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Consumes the map, returning the pixel values.
    #[must_use]
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// The same map in another pixel ordering.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMapLength` if the map length is invalid.
    pub fn reorder(self, ordering: PixelOrdering) -> Result<Self> {
        let values = healpix::reorder(&self.values, self.ordering, ordering)?;
        Ok(Self {
            nside: self.nside,
            ordering,
            values,
        })
    }
}
