//! Posteriors over 3-D positions and their distance ansatz maps.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Fitted, Posterior, PosteriorBuilder, PosteriorConfig, normalize};
use crate::cluster::ClusterModel;
use crate::coords::{VolumePoint, check_finite};
use crate::distance::{DistanceAnsatz, DistanceIntegrator, DistanceMoments, moments_to_parameters};
use crate::error::Result;
use crate::greedy::GreedyRanker;
use crate::healpix::{self, PixelOrdering};

/// A clustered KDE posterior over 3-D positions.
///
/// Sky areas and p-values are not defined on a volume posterior; the
/// corresponding [`Posterior`] methods return `Error::UnsupportedOperation`.
#[derive(Debug)]
pub struct VolumePosterior {
    points: Vec<VolumePoint>,
    model: ClusterModel,
    ranker: GreedyRanker,
    config: PosteriorConfig,
    integrator: DistanceIntegrator,
}

impl VolumePosterior {
    /// Starts building a volume posterior.
    #[must_use]
    pub fn builder() -> PosteriorBuilder {
        PosteriorBuilder::new()
    }

    pub(super) fn from_fitted(
        points: Vec<VolumePoint>,
        fitted: Fitted,
        config: PosteriorConfig,
    ) -> Self {
        let integrator = DistanceIntegrator::new(fitted.model.kde());
        Self {
            points,
            model: fitted.model,
            ranker: fitted.ranker,
            config,
            integrator,
        }
    }

    /// The samples the posterior was built from.
    #[must_use]
    pub fn points(&self) -> &[VolumePoint] {
        &self.points
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PosteriorConfig {
        &self.config
    }

    /// Unnormalized density along the ray towards `(lon, lat)` at each distance.
    ///
    /// # Errors
    ///
    /// Returns `Error::NonFiniteCoordinate` (indexed by distance) if the
    /// direction or a distance is not finite.
    pub fn conditional_density(&self, lon: f64, lat: f64, distances: &[f64]) -> Result<Vec<f64>> {
        let points: Vec<VolumePoint> = distances
            .iter()
            .map(|&r| VolumePoint::new(lon, lat, r))
            .collect();
        self.density(&points)
    }

    /// Probability per steradian and conditional distance moments towards
    /// `(lon, lat)`.
    #[must_use]
    pub fn distance_moments(&self, lon: f64, lat: f64) -> DistanceMoments {
        self.integrator.moments(lon, lat)
    }

    /// Rasterizes the posterior onto a HEALPix map of sky probability and
    /// per-pixel distance ansatz parameters, evaluated at pixel centres.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNside` if `nside` is not a power of two in
    /// `1..=2^29`.
    pub fn to_healpix(&self, nside: u64, ordering: PixelOrdering) -> Result<VolumeMap> {
        healpix::nside_to_order(nside)?;
        let pixel_area = healpix::pixel_area(nside);
        let (mut prob, ansatz): (Vec<f64>, Vec<DistanceAnsatz>) = (0..healpix::npix(nside))
            .map(|ipix| {
                let (lon, lat) = healpix::pix2ang_nest(nside, ipix);
                let moments = self.integrator.moments(lon, lat);
                (
                    moments.probability * pixel_area,
                    moments_to_parameters(moments.mean, moments.std),
                )
            })
            .unzip();
        normalize(&mut prob);

        VolumeMap {
            nside,
            ordering: PixelOrdering::Nested,
            prob,
            distmu: ansatz.iter().map(|a| a.mu).collect(),
            distsigma: ansatz.iter().map(|a| a.sigma).collect(),
            distnorm: ansatz.iter().map(|a| a.norm).collect(),
        }
        .reorder(ordering)
    }
}

impl Posterior for VolumePosterior {
    type Point = VolumePoint;

    fn density(&self, points: &[VolumePoint]) -> Result<Vec<f64>> {
        check_finite(points, VolumePoint::is_finite)?;
        Ok(points
            .iter()
            .map(|p| self.model.density(&p.to_cartesian()))
            .collect())
    }

    fn model(&self) -> &ClusterModel {
        &self.model
    }

    fn ranker(&self) -> &GreedyRanker {
        &self.ranker
    }
}

/// A full-sky probability map with a distance ansatz per pixel.
///
/// Along pixel `i` the distance density is
/// `distnorm[i] · r² · N(r; distmu[i], distsigma[i])`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeMap {
    nside: u64,
    ordering: PixelOrdering,
    prob: Vec<f64>,
    distmu: Vec<f64>,
    distsigma: Vec<f64>,
    distnorm: Vec<f64>,
}

impl VolumeMap {
    /// Resolution of the map.
    #[must_use]
    pub fn nside(&self) -> u64 {
        self.nside
    }

    /// Pixel ordering of every column.
    #[must_use]
    pub fn ordering(&self) -> PixelOrdering {
        self.ordering
    }

    /// Sky probability per pixel, summing to one.
    #[must_use]
    pub fn prob(&self) -> &[f64] {
        &self.prob
    }

    /// Ansatz location per pixel.
    #[must_use]
    pub fn distmu(&self) -> &[f64] {
        &self.distmu
    }

    /// Ansatz scale per pixel.
    #[must_use]
    pub fn distsigma(&self) -> &[f64] {
        &self.distsigma
    }

    /// Ansatz normalization per pixel.
    #[must_use]
    pub fn distnorm(&self) -> &[f64] {
        &self.distnorm
    }

    /// The same map in another pixel ordering.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMapLength` if the map length is invalid.
    pub fn reorder(self, ordering: PixelOrdering) -> Result<Self> {
        let from = self.ordering;
        Ok(Self {
            nside: self.nside,
            ordering,
            prob: healpix::reorder(&self.prob, from, ordering)?,
            distmu: healpix::reorder(&self.distmu, from, ordering)?,
            distsigma: healpix::reorder(&self.distsigma, from, ordering)?,
            distnorm: healpix::reorder(&self.distnorm, from, ordering)?,
        })
    }
}
