//! HEALPix pixelization of the sphere.
//!
//! The sphere is divided into 12 base pixels, each split recursively into four
//! children; at resolution `nside = 2^order` there are `12 · nside²` pixels of
//! equal area. Pixels are numbered either in the *nested* scheme (children of a
//! pixel `p` are `4p .. 4p + 4`) or the *ring* scheme (iso-latitude rings from
//! north to south, increasing longitude within a ring).
//!
//! Coordinates are longitude and latitude in radians.
//!
//! - [`ang2pix_nest`] / [`pix2ang_nest`] - nested index of a direction and the
//!   centre of a nested pixel
//! - [`nest2ring`] / [`ring2nest`] - conversion between the two schemes
//! - [`reorder`] - permute a whole map between schemes
//! - [`AdaptiveGrid`] - quadtree of nested pixels refined around sample points

mod adaptive;

use core::f64::consts::{FRAC_PI_2, PI};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use adaptive::{AdaptiveGrid, GridLeaf};

use crate::error::{Error, Result};

/// The finest supported resolution order (`nside = 2^29`).
pub const MAX_ORDER: u8 = 29;

/// Ring index of the southernmost vertex of each base pixel, in units of nside.
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
/// Longitude of each base pixel's centre, in units of π/4.
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// Pixel numbering scheme of a HEALPix map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelOrdering {
    /// Hierarchical numbering; children of `p` are `4p .. 4p + 4`.
    #[default]
    Nested,
    /// Iso-latitude rings from north to south.
    Ring,
}

/// Returns the order (`log2 nside`) of a valid resolution.
///
/// # Errors
///
/// Returns `Error::InvalidNside` unless `nside` is a power of two no larger
/// than `2^29`.
#[allow(clippy::cast_possible_truncation)]
pub fn nside_to_order(nside: u64) -> Result<u8> {
    if nside.is_power_of_two() && nside <= 1 << MAX_ORDER {
        Ok(nside.trailing_zeros() as u8)
    } else {
        Err(Error::InvalidNside(nside))
    }
}

/// Recovers the resolution of a map from its pixel count.
///
/// # Errors
///
/// Returns `Error::InvalidMapLength` unless `npix = 12 · nside²` for a valid nside.
pub fn npix_to_nside(len: usize) -> Result<u64> {
    let count = len as u64;
    if count == 0 || count % 12 != 0 {
        return Err(Error::InvalidMapLength(len));
    }
    let nside = (count / 12).isqrt();
    if npix(nside) != count || nside_to_order(nside).is_err() {
        return Err(Error::InvalidMapLength(len));
    }
    Ok(nside)
}

/// Number of pixels at resolution `nside`.
#[must_use]
pub fn npix(nside: u64) -> u64 {
    12 * nside * nside
}

/// Solid angle of one pixel at resolution `nside`, in steradians.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pixel_area(nside: u64) -> f64 {
    4.0 * PI / npix(nside) as f64
}

/// Nested index of the pixel containing the direction `(lon, lat)`.
///
/// `nside` must be a valid resolution (see [`nside_to_order`]).
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn ang2pix_nest(nside: u64, lon: f64, lat: f64) -> u64 {
    let order = nside.trailing_zeros();
    let ns = nside as i64;
    let z = lat.sin();
    let za = z.abs();

    let mut tt = (lon / FRAC_PI_2).rem_euclid(4.0);
    if tt >= 4.0 {
        tt = 0.0;
    }

    let (ix, iy, face) = if za <= 2.0 / 3.0 {
        let temp1 = nside as f64 * (0.5 + tt);
        let temp2 = nside as f64 * (0.75 * z);
        // indices of the ascending and descending edge lines
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ifp = jp >> order;
        let ifm = jm >> order;
        let face = match ifp.cmp(&ifm) {
            core::cmp::Ordering::Equal => ifp | 4,
            core::cmp::Ordering::Less => ifp,
            core::cmp::Ordering::Greater => ifm + 8,
        };
        (jm & (ns - 1), ns - (jp & (ns - 1)) - 1, face)
    } else {
        let ntt = (tt as i64).min(3);
        let tp = tt - ntt as f64;
        // nside · sqrt(3 (1 - |z|)), written to stay accurate near the poles
        let tmp = nside as f64 * lat.cos().abs() * (3.0 / (1.0 + za)).sqrt();
        let jp = ((tp * tmp) as i64).min(ns - 1);
        let jm = (((1.0 - tp) * tmp) as i64).min(ns - 1);
        if z >= 0.0 {
            (ns - jm - 1, ns - jp - 1, ntt)
        } else {
            (jp, jm, ntt + 8)
        }
    };

    xyf2nest(order, ix as u64, iy as u64, face as u64)
}

/// Centre `(lon, lat)` of a nested pixel, with `lon` in `[0, 2π)`.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn pix2ang_nest(nside: u64, ipix: u64) -> (f64, f64) {
    let order = nside.trailing_zeros();
    let (ix, iy, face) = nest2xyf(order, ipix);
    let ns = nside as i64;
    let (ix, iy) = (ix as i64, iy as i64);
    let face = face as usize;

    let jr = (JRLL[face] << order) - ix - iy - 1;
    let fact2 = 1.0 / (3.0 * (nside as f64) * (nside as f64));

    let (nr, z, sin_theta) = if jr < ns {
        let tmp = (jr * jr) as f64 * fact2;
        (jr, 1.0 - tmp, (tmp * (2.0 - tmp)).sqrt())
    } else if jr > 3 * ns {
        let nr = 4 * ns - jr;
        let tmp = (nr * nr) as f64 * fact2;
        (nr, tmp - 1.0, (tmp * (2.0 - tmp)).sqrt())
    } else {
        let z = (2 * ns - jr) as f64 * 2.0 / (3.0 * nside as f64);
        (ns, z, ((1.0 - z) * (1.0 + z)).sqrt())
    };

    let mut tmp = JPLL[face] * nr + ix - iy;
    if tmp < 0 {
        tmp += 8 * nr;
    }
    let lon = PI * tmp as f64 / (4.0 * nr as f64);
    (lon, z.atan2(sin_theta))
}

/// Converts a nested pixel index to the ring scheme.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn nest2ring(nside: u64, ipix: u64) -> u64 {
    let order = nside.trailing_zeros();
    let (ix, iy, face) = nest2xyf(order, ipix);
    let ns = nside as i64;
    let (ix, iy) = (ix as i64, iy as i64);
    let face = face as usize;
    let nl4 = 4 * ns;
    let ncap = 2 * ns * (ns - 1);
    let npix = 12 * ns * ns;

    let jr = JRLL[face] * ns - ix - iy - 1;
    let (n_before, nr, kshift) = if jr < ns {
        (2 * jr * (jr - 1), jr, 0)
    } else if jr > 3 * ns {
        let nr = nl4 - jr;
        (npix - 2 * (nr + 1) * nr, nr, 0)
    } else {
        (ncap + (jr - ns) * nl4, ns, (jr - ns) & 1)
    };

    let mut jp = (JPLL[face] * nr + ix - iy + 1 + kshift) / 2;
    if jp > nl4 {
        jp -= nl4;
    } else if jp < 1 {
        jp += nl4;
    }
    (n_before + jp - 1) as u64
}

/// Converts a ring pixel index to the nested scheme.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn ring2nest(nside: u64, ipix: u64) -> u64 {
    let order = nside.trailing_zeros();
    let ns = nside as i64;
    let pix = ipix as i64;
    let nl2 = 2 * ns;
    let ncap = 2 * ns * (ns - 1);
    let npix = 12 * ns * ns;

    let (iring, iphi, kshift, nr, face) = if pix < ncap {
        let iring = (1 + (1 + 2 * pix).isqrt()) >> 1;
        let iphi = pix + 1 - 2 * iring * (iring - 1);
        (iring, iphi, 0, iring, (iphi - 1) / iring)
    } else if pix < npix - ncap {
        let ip = pix - ncap;
        let tmp = ip >> (order + 2);
        let iring = tmp + ns;
        let iphi = ip - tmp * 4 * ns + 1;
        let kshift = (iring + ns) & 1;
        let ire = tmp + 1;
        let irm = nl2 + 1 - tmp;
        let ifm = (iphi - (ire >> 1) + ns - 1) >> order;
        let ifp = (iphi - (irm >> 1) + ns - 1) >> order;
        let face = match ifp.cmp(&ifm) {
            core::cmp::Ordering::Equal => ifp | 4,
            core::cmp::Ordering::Less => ifp,
            core::cmp::Ordering::Greater => ifm + 8,
        };
        (iring, iphi, kshift, ns, face)
    } else {
        let ip = npix - pix;
        let ring_from_south = (1 + (2 * ip - 1).isqrt()) >> 1;
        let iphi = 4 * ring_from_south + 1 - (ip - 2 * ring_from_south * (ring_from_south - 1));
        (
            2 * nl2 - ring_from_south,
            iphi,
            0,
            ring_from_south,
            (iphi - 1) / ring_from_south + 8,
        )
    };

    let f = face as usize;
    let irt = iring - JRLL[f] * ns + 1;
    let mut ipt = 2 * iphi - JPLL[f] * nr - kshift - 1;
    if ipt >= nl2 {
        ipt -= 8 * ns;
    }
    let ix = (ipt - irt) >> 1;
    let iy = (-ipt - irt) >> 1;

    xyf2nest(order, ix as u64, iy as u64, face as u64)
}

/// Permutes a full-sky map from one pixel ordering to another.
///
/// # Errors
///
/// Returns `Error::InvalidMapLength` if `values.len()` is not `12 · nside²`
/// for a valid nside.
///
/// # Examples
///
/// ```
/// use sky_area::healpix::{PixelOrdering, reorder};
///
/// let nested: Vec<f64> = (0..48).map(f64::from).collect();
/// let ring = reorder(&nested, PixelOrdering::Nested, PixelOrdering::Ring).unwrap();
/// let back = reorder(&ring, PixelOrdering::Ring, PixelOrdering::Nested).unwrap();
/// assert_eq!(back, nested);
/// ```
#[allow(clippy::cast_possible_truncation)]
pub fn reorder<T: Copy>(values: &[T], from: PixelOrdering, to: PixelOrdering) -> Result<Vec<T>> {
    let nside = npix_to_nside(values.len())?;
    let mut out = values.to_vec();
    if from == to {
        return Ok(out);
    }
    for (i, &v) in values.iter().enumerate() {
        let j = match to {
            PixelOrdering::Ring => nest2ring(nside, i as u64),
            PixelOrdering::Nested => ring2nest(nside, i as u64),
        };
        out[j as usize] = v;
    }
    Ok(out)
}

fn xyf2nest(order: u32, ix: u64, iy: u64, face: u64) -> u64 {
    (face << (2 * order)) + spread_bits(ix) + (spread_bits(iy) << 1)
}

fn nest2xyf(order: u32, ipix: u64) -> (u64, u64, u64) {
    let face = ipix >> (2 * order);
    let ipf = ipix & ((1 << (2 * order)) - 1);
    (compress_bits(ipf), compress_bits(ipf >> 1), face)
}

/// Interleaves zero bits above each of the low 32 bits of `v`.
fn spread_bits(v: u64) -> u64 {
    let mut x = v & 0x0000_0000_FFFF_FFFF;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

/// Inverse of [`spread_bits`]: gathers the even bits of `v`.
fn compress_bits(v: u64) -> u64 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF
}
