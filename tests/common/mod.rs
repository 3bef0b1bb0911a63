//! Sample generators shared by the integration tests.

#![allow(dead_code)]

use core::f64::consts::PI;

use sky_area::{SkyPoint, VolumePoint};

/// Standard normal variate (Box-Muller).
pub fn normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// `n` points scattered around `(lon, lat)` with angular width `width`.
pub fn sky_blob(rng: &mut fastrand::Rng, n: usize, lon: f64, lat: f64, width: f64) -> Vec<SkyPoint> {
    (0..n)
        .map(|_| {
            SkyPoint::new(
                (lon + width * normal(rng)).rem_euclid(2.0 * PI),
                (lat + width * normal(rng)).clamp(-PI / 2.0, PI / 2.0),
            )
        })
        .collect()
}

/// `n` points scattered isotropically around `centre` with Cartesian width `width`.
pub fn volume_blob(
    rng: &mut fastrand::Rng,
    n: usize,
    centre: VolumePoint,
    width: f64,
) -> Vec<VolumePoint> {
    let [x, y, z] = centre.to_cartesian();
    (0..n)
        .map(|_| {
            VolumePoint::from_cartesian([
                x + width * normal(rng),
                y + width * normal(rng),
                z + width * normal(rng),
            ])
        })
        .collect()
}

/// Sample mean of sky points in `(lon, lat)`, valid away from the wrap.
pub fn mean_point(points: &[SkyPoint]) -> SkyPoint {
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    SkyPoint::new(
        points.iter().map(|p| p.lon).sum::<f64>() / n,
        points.iter().map(|p| p.lat).sum::<f64>() / n,
    )
}
