//! Sample coordinates and the embeddings used for clustering.
//!
//! Sky points are clustered in `(lon, sin lat)`, where the area element of the
//! sphere is uniform, and volume points in Cartesian coordinates.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A position on the sky in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkyPoint {
    /// Longitude (right ascension), radians.
    pub lon: f64,
    /// Latitude (declination), radians in `[-π/2, π/2]`.
    pub lat: f64,
}

impl SkyPoint {
    /// Creates a sky point from longitude and latitude in radians.
    #[must_use]
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Returns `true` if both coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    /// The `(lon, sin lat)` embedding used for clustering and kernel fitting.
    pub(crate) fn embed(self) -> Vec<f64> {
        vec![self.lon, self.lat.sin()]
    }
}

/// A position in 3-D space given as sky direction plus distance.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumePoint {
    /// Longitude (right ascension), radians.
    pub lon: f64,
    /// Latitude (declination), radians.
    pub lat: f64,
    /// Distance from the origin.
    pub distance: f64,
}

impl VolumePoint {
    /// Creates a volume point from longitude, latitude (radians) and distance.
    #[must_use]
    pub fn new(lon: f64, lat: f64, distance: f64) -> Self {
        Self { lon, lat, distance }
    }

    /// Returns `true` if all coordinates are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite() && self.distance.is_finite()
    }

    /// The sky direction of this point.
    #[must_use]
    pub fn direction(&self) -> SkyPoint {
        SkyPoint::new(self.lon, self.lat)
    }

    /// Cartesian coordinates `(x, y, z)`.
    #[must_use]
    pub fn to_cartesian(&self) -> [f64; 3] {
        let (sin_lat, cos_lat) = self.lat.sin_cos();
        let (sin_lon, cos_lon) = self.lon.sin_cos();
        [
            self.distance * cos_lon * cos_lat,
            self.distance * sin_lon * cos_lat,
            self.distance * sin_lat,
        ]
    }

    /// Inverse of [`to_cartesian`](Self::to_cartesian). The origin maps to
    /// zero longitude and latitude.
    #[must_use]
    pub fn from_cartesian(xyz: [f64; 3]) -> Self {
        let [x, y, z] = xyz;
        let distance = (x * x + y * y + z * z).sqrt();
        if distance == 0.0 {
            return Self::new(0.0, 0.0, 0.0);
        }
        Self::new(y.atan2(x), (z / distance).clamp(-1.0, 1.0).asin(), distance)
    }

    pub(crate) fn embed(self) -> Vec<f64> {
        self.to_cartesian().to_vec()
    }
}

/// Fails with [`Error::NonFiniteCoordinate`] on the first non-finite point.
pub(crate) fn check_finite<T>(points: &[T], is_finite: impl Fn(&T) -> bool) -> Result<()> {
    match points.iter().position(|p| !is_finite(p)) {
        Some(index) => Err(Error::NonFiniteCoordinate { index }),
        None => Ok(()),
    }
}
