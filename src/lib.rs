#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Clustered kernel-density posteriors over the sky (and over 3-D space) built
//! from posterior samples, with credible areas, searched areas, calibration
//! p-values and HEALPix maps derived from the estimated density.
//!
//! # Getting Started
//!
//! ```
//! use sky_area::prelude::*;
//!
//! let mut rng = fastrand::Rng::with_seed(7);
//! let points: Vec<SkyPoint> = (0..400)
//!     .map(|_| SkyPoint::new(1.0 + 0.05 * (rng.f64() - 0.5), 0.3 + 0.05 * (rng.f64() - 0.5)))
//!     .collect();
//!
//! let posterior = SkyPosterior::builder()
//!     .n_trials(2)
//!     .seed(42)
//!     .build_sky(&points)
//!     .unwrap();
//!
//! let areas = posterior.sky_area(&[0.5, 0.9], AreaMethod::Adaptive).unwrap();
//! assert!(areas[0] <= areas[1]);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`SkyPosterior`] | Clustered KDE over (longitude, latitude); areas, p-values and sky maps. |
//! | [`VolumePosterior`] | Clustered KDE over 3-D positions; volume density and distance-ansatz maps. |
//! | [`ClusterModel`] | The selected cluster count, assignment and kernel mixture. |
//! | [`GreedyRanker`] | Held-out ranking set mapping density levels to credible quantiles. |
//! | [`AdaptiveGrid`](healpix::AdaptiveGrid) | Quadtree over nested HEALPix pixels used for integration. |
//!
//! # Algorithm
//!
//! The samples are split once into a fitting half and a ranking half. The
//! number of clusters is chosen by maximizing a BIC over k-means clusterings of
//! the fitting half (Mahalanobis metric, random restarts, bracketing search over
//! k); each cluster carries a Gaussian KDE and the mixture of these KDEs is the
//! density. Ranking the held-out half under the density calibrates density
//! contours against credible levels without reusing the fitting points.
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `serde` | `Serialize`/`Deserialize` on points, configs, maps and records | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) during model selection and integration | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod area;
pub mod calibration;
pub mod cluster;
mod coords;
pub mod distance;
mod error;
mod greedy;
pub mod healpix;
pub mod kde;
mod posterior;
pub mod report;
mod rng_util;
mod stats;

pub use area::AreaMethod;
pub use cluster::{ClusterModel, KMeansFit};
pub use coords::{SkyPoint, VolumePoint};
pub use error::{Error, Result};
pub use greedy::{CredibleLevel, GreedyRanker};
pub use healpix::PixelOrdering;
pub use posterior::{
    MapMethod, Posterior, PosteriorBuilder, PosteriorConfig, SkyMap, SkyPosterior, VolumeMap,
    VolumePosterior,
};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use sky_area::prelude::*;
/// ```
pub mod prelude {
    pub use crate::area::AreaMethod;
    pub use crate::calibration::{KsTest, ks_uniform};
    pub use crate::cluster::ClusterModel;
    pub use crate::coords::{SkyPoint, VolumePoint};
    pub use crate::error::{Error, Result};
    pub use crate::greedy::{CredibleLevel, GreedyRanker};
    pub use crate::healpix::{AdaptiveGrid, PixelOrdering};
    pub use crate::posterior::{
        MapMethod, Posterior, PosteriorBuilder, PosteriorConfig, SkyMap, SkyPosterior, VolumeMap,
        VolumePosterior,
    };
    pub use crate::report::AreaRecord;
}
