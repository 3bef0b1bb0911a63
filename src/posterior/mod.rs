//! Posterior objects built from samples.
//!
//! A posterior is assembled once by [`PosteriorBuilder`]: the samples are
//! permuted and split into a fitting half and a ranking half, a cluster model
//! is selected on the fitting half, and the ranking half is ordered by the
//! fitted density. The builder only ever hands out a posterior in this
//! finished state; the integration grid is built lazily on the first area or
//! map query and shared afterwards.

mod sky;
mod volume;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use sky::{SkyMap, SkyPosterior};
pub use volume::{VolumeMap, VolumePosterior};

use crate::area::AreaMethod;
use crate::cluster::{ClusterModel, select_model};
use crate::coords::{SkyPoint, VolumePoint};
use crate::error::{Error, Result};
use crate::greedy::GreedyRanker;
use crate::healpix::{self, MAX_ORDER};
use crate::kde::Domain;
use crate::rng_util;

/// Default number of k-means restarts per cluster count.
const DEFAULT_N_TRIALS: usize = 5;
/// Default relative accuracy of refined areas.
const DEFAULT_ACCURACY: f64 = 1e-2;
/// Default finest resolution of refined areas.
const DEFAULT_MAX_NSIDE: u64 = 512;

/// How a density is projected onto a HEALPix map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MapMethod {
    /// Spread the adaptive grid's leaf densities onto the map.
    #[default]
    Adaptive,
    /// Evaluate the density at every map pixel centre.
    Direct,
}

/// Settings for building and querying a posterior.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PosteriorConfig {
    /// k-means restarts per evaluated cluster count (default: 5).
    pub n_trials: usize,
    /// Relative accuracy of [`AreaMethod::Refined`] areas (default: 1e-2).
    pub accuracy: f64,
    /// Finest resolution [`AreaMethod::Refined`] may use (default: 512).
    pub max_nside: u64,
    /// Deepest order of the adaptive grid (default: 29).
    pub max_grid_order: u8,
    /// Cap on k-means passes. `None` iterates until the assignment is stable
    /// (default: `None`).
    pub max_kmeans_iterations: Option<usize>,
    /// Random seed for reproducibility (default: `None`).
    pub seed: Option<u64>,
}

impl Default for PosteriorConfig {
    fn default() -> Self {
        Self {
            n_trials: DEFAULT_N_TRIALS,
            accuracy: DEFAULT_ACCURACY,
            max_nside: DEFAULT_MAX_NSIDE,
            max_grid_order: MAX_ORDER,
            max_kmeans_iterations: None,
            seed: None,
        }
    }
}

impl PosteriorConfig {
    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidTrials` if `n_trials == 0`.
    /// Returns `Error::InvalidAccuracy` if `accuracy` is not positive and finite.
    /// Returns `Error::InvalidNside` if `max_nside` is not a valid resolution or
    /// `max_grid_order` exceeds 29.
    /// Returns `Error::InvalidIterationCap` if `max_kmeans_iterations` is `Some(0)`.
    pub fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(Error::InvalidTrials);
        }
        if self.max_kmeans_iterations == Some(0) {
            return Err(Error::InvalidIterationCap);
        }
        validate_accuracy(self.accuracy)?;
        healpix::nside_to_order(self.max_nside)?;
        if self.max_grid_order > MAX_ORDER {
            let nside = 1u64
                .checked_shl(u32::from(self.max_grid_order))
                .unwrap_or(u64::MAX);
            return Err(Error::InvalidNside(nside));
        }
        Ok(())
    }
}

fn validate_accuracy(accuracy: f64) -> Result<()> {
    if accuracy > 0.0 && accuracy.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidAccuracy(accuracy))
    }
}

/// Scales `values` to sum to one, leaving an all-zero map untouched.
fn normalize(values: &mut [f64]) {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
}

/// Queries shared by sky and volume posteriors.
///
/// Area and p-value queries are defined on the sky only; the default
/// implementations report [`Error::UnsupportedOperation`].
pub trait Posterior {
    /// The kind of sample point the posterior is built from.
    type Point;

    /// Density at each point (per steradian on the sky, per unit volume in 3-D).
    ///
    /// # Errors
    ///
    /// Returns `Error::NonFiniteCoordinate` if a point is not finite.
    fn density(&self, points: &[Self::Point]) -> Result<Vec<f64>>;

    /// The selected cluster model.
    fn model(&self) -> &ClusterModel;

    /// Held-out ranking of the fitted density.
    fn ranker(&self) -> &GreedyRanker;

    /// Area (steradians) of the smallest region holding each credible level.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredibleLevel` for a level outside `[0, 1]`,
    /// and `Error::UnsupportedOperation` where areas are not defined.
    fn sky_area(&self, credible_levels: &[f64], method: AreaMethod) -> Result<Vec<f64>> {
        let _ = (credible_levels, method);
        Err(Error::UnsupportedOperation("sky_area"))
    }

    /// Area (steradians) of the region denser than each point.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedOperation` where areas are not defined.
    fn searched_area(&self, points: &[Self::Point], method: AreaMethod) -> Result<Vec<f64>> {
        let _ = (points, method);
        Err(Error::UnsupportedOperation("searched_area"))
    }

    /// Credible level of the contour through each point.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedOperation` where p-values are not defined.
    fn p_values(&self, points: &[Self::Point]) -> Result<Vec<f64>> {
        let _ = points;
        Err(Error::UnsupportedOperation("p_values"))
    }
}

/// An explicit clustering of the fitting half, bypassing model selection.
#[derive(Clone, Debug)]
struct Clustering {
    k: usize,
    assignment: Vec<usize>,
    means: Option<Vec<Vec<f64>>>,
}

/// Builder for [`SkyPosterior`] and [`VolumePosterior`].
///
/// # Examples
///
/// ```
/// use sky_area::prelude::*;
///
/// let mut rng = fastrand::Rng::with_seed(3);
/// let points: Vec<VolumePoint> = (0..200)
///     .map(|_| VolumePoint::new(2.0 + 0.1 * rng.f64(), -0.3 + 0.1 * rng.f64(), 80.0 + 20.0 * rng.f64()))
///     .collect();
///
/// let posterior = PosteriorBuilder::new()
///     .n_trials(2)
///     .seed(1)
///     .build_volume(&points)
///     .unwrap();
/// assert!(posterior.density(&points[..1]).unwrap()[0] > 0.0);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PosteriorBuilder {
    n_trials: Option<usize>,
    accuracy: Option<f64>,
    max_nside: Option<u64>,
    max_grid_order: Option<u8>,
    max_kmeans_iterations: Option<usize>,
    seed: Option<u64>,
    clustering: Option<Clustering>,
}

impl PosteriorBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every setting from `config`.
    #[must_use]
    pub fn config(mut self, config: PosteriorConfig) -> Self {
        self.n_trials = Some(config.n_trials);
        self.accuracy = Some(config.accuracy);
        self.max_nside = Some(config.max_nside);
        self.max_grid_order = Some(config.max_grid_order);
        self.max_kmeans_iterations = config.max_kmeans_iterations;
        self.seed = config.seed;
        self
    }

    /// Sets the number of k-means restarts per evaluated cluster count.
    ///
    /// Default: 5.
    #[must_use]
    pub fn n_trials(mut self, n: usize) -> Self {
        self.n_trials = Some(n);
        self
    }

    /// Sets the relative accuracy of refined areas.
    ///
    /// Default: 1e-2.
    #[must_use]
    pub fn accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the finest resolution refined areas may use.
    ///
    /// Default: 512.
    #[must_use]
    pub fn max_nside(mut self, nside: u64) -> Self {
        self.max_nside = Some(nside);
        self
    }

    /// Sets the deepest order of the adaptive grid.
    ///
    /// Default: 29.
    #[must_use]
    pub fn max_grid_order(mut self, order: u8) -> Self {
        self.max_grid_order = Some(order);
        self
    }

    /// Caps the number of k-means passes. A cap of zero is rejected when the
    /// posterior is built.
    ///
    /// Default: unbounded.
    #[must_use]
    pub fn max_kmeans_iterations(mut self, n: usize) -> Self {
        self.max_kmeans_iterations = Some(n);
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Uses a fixed clustering of the fitting half instead of selecting one.
    ///
    /// `assignment` gives the cluster in `0..k` of each fitting point, in the
    /// order the split produces them. Cluster means are recomputed from the
    /// assignment; see [`clustering_with_means`](Self::clustering_with_means)
    /// to supply them.
    #[must_use]
    pub fn clustering(mut self, k: usize, assignment: Vec<usize>) -> Self {
        self.clustering = Some(Clustering {
            k,
            assignment,
            means: None,
        });
        self
    }

    /// Uses a fixed clustering with precomputed centroids, one per cluster, in
    /// the embedded coordinates (`(lon, sin lat)` on the sky, Cartesian in
    /// 3-D). The number of clusters is `means.len()`.
    ///
    /// The centroids are reported by [`ClusterModel::means`]; the density
    /// depends on the assignment only.
    #[must_use]
    pub fn clustering_with_means(mut self, means: Vec<Vec<f64>>, assignment: Vec<usize>) -> Self {
        self.clustering = Some(Clustering {
            k: means.len(),
            assignment,
            means: Some(means),
        });
        self
    }

    /// The resolved configuration.
    #[must_use]
    pub fn resolved_config(&self) -> PosteriorConfig {
        let defaults = PosteriorConfig::default();
        PosteriorConfig {
            n_trials: self.n_trials.unwrap_or(defaults.n_trials),
            accuracy: self.accuracy.unwrap_or(defaults.accuracy),
            max_nside: self.max_nside.unwrap_or(defaults.max_nside),
            max_grid_order: self.max_grid_order.unwrap_or(defaults.max_grid_order),
            max_kmeans_iterations: self.max_kmeans_iterations,
            seed: self.seed,
        }
    }

    /// Builds a sky posterior, seeding the random generator from the config.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a point is not
    /// finite, there are too few points, or no cluster model can be fitted.
    pub fn build_sky(self, points: &[SkyPoint]) -> Result<SkyPosterior> {
        let mut rng = self.seeded_rng();
        self.build_sky_with_rng(points, &mut rng)
    }

    /// Builds a sky posterior drawing randomness from `rng`.
    ///
    /// # Errors
    ///
    /// See [`build_sky`](Self::build_sky).
    pub fn build_sky_with_rng(
        self,
        points: &[SkyPoint],
        rng: &mut fastrand::Rng,
    ) -> Result<SkyPosterior> {
        let config = self.resolved_config();
        config.validate()?;
        crate::coords::check_finite(points, SkyPoint::is_finite)?;
        let embedded: Vec<Vec<f64>> = points.iter().map(|p| p.embed()).collect();
        let fitted = fit(&embedded, Domain::Sky, &config, self.clustering, rng)?;
        Ok(SkyPosterior::from_fitted(points.to_vec(), fitted, config))
    }

    /// Builds a volume posterior, seeding the random generator from the config.
    ///
    /// # Errors
    ///
    /// See [`build_sky`](Self::build_sky).
    pub fn build_volume(self, points: &[VolumePoint]) -> Result<VolumePosterior> {
        let mut rng = self.seeded_rng();
        self.build_volume_with_rng(points, &mut rng)
    }

    /// Builds a volume posterior drawing randomness from `rng`.
    ///
    /// # Errors
    ///
    /// See [`build_sky`](Self::build_sky).
    pub fn build_volume_with_rng(
        self,
        points: &[VolumePoint],
        rng: &mut fastrand::Rng,
    ) -> Result<VolumePosterior> {
        let config = self.resolved_config();
        config.validate()?;
        crate::coords::check_finite(points, VolumePoint::is_finite)?;
        let embedded: Vec<Vec<f64>> = points.iter().map(|p| p.embed()).collect();
        let fitted = fit(&embedded, Domain::Volume, &config, self.clustering, rng)?;
        Ok(VolumePosterior::from_fitted(points.to_vec(), fitted, config))
    }

    fn seeded_rng(&self) -> fastrand::Rng {
        self.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
    }
}

/// A selected model with its held-out ranking.
#[derive(Debug)]
struct Fitted {
    model: ClusterModel,
    ranker: GreedyRanker,
}

/// Splits the embedded samples, selects (or builds) the cluster model on the
/// even positions of a random permutation and ranks the odd positions.
fn fit(
    embedded: &[Vec<f64>],
    domain: Domain,
    config: &PosteriorConfig,
    clustering: Option<Clustering>,
    rng: &mut fastrand::Rng,
) -> Result<Fitted> {
    let required = 2 * domain.n_dims() + 1;
    if embedded.len() < required {
        return Err(Error::InsufficientSamples {
            n_points: embedded.len(),
            required,
        });
    }

    let order = rng_util::permutation(rng, embedded.len());
    let fitting: Vec<Vec<f64>> = order.iter().step_by(2).map(|&i| embedded[i].clone()).collect();

    let model = match clustering {
        Some(Clustering {
            assignment,
            means: Some(means),
            ..
        }) => ClusterModel::from_means(&fitting, domain, means, assignment)?,
        Some(Clustering {
            k,
            assignment,
            means: None,
        }) => ClusterModel::from_assignment(&fitting, domain, k, assignment)?,
        None => select_model(
            &fitting,
            domain,
            config.n_trials,
            config.max_kmeans_iterations,
            rng,
        )?,
    };

    let densities: Vec<f64> = order
        .iter()
        .skip(1)
        .step_by(2)
        .map(|&i| model.density(&embedded[i]))
        .collect();
    trace_info!(
        n_fitting = fitting.len(),
        n_ranking = densities.len(),
        k = model.k(),
        "posterior fitted"
    );

    Ok(Fitted {
        model,
        ranker: GreedyRanker::new(densities),
    })
}
