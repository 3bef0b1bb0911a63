//! Quadtree of nested HEALPix pixels refined around sample points.
//!
//! Starting from the 12 base pixels, a pixel holding more than one sample is
//! split into its four nested children until every pixel holds at most one
//! sample or the maximum order is reached. The leaves tile the sphere and are
//! small where samples are dense, which is where the density varies most.

use core::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{MAX_ORDER, ang2pix_nest, pix2ang_nest, pixel_area};
use crate::coords::SkyPoint;
use crate::error::{Error, Result};

/// One pixel of an [`AdaptiveGrid`] that is not split further.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridLeaf {
    /// Resolution order of the pixel (`nside = 2^order`).
    pub order: u8,
    /// Nested index of the pixel at its order.
    pub ipix: u64,
    /// Longitude of the pixel centre, radians.
    pub lon: f64,
    /// Latitude of the pixel centre, radians.
    pub lat: f64,
    /// Number of sample points inside the pixel.
    pub n_points: usize,
}

impl GridLeaf {
    /// Resolution of the pixel.
    #[must_use]
    pub fn nside(&self) -> u64 {
        1 << self.order
    }

    /// Solid angle of the pixel, in steradians.
    #[must_use]
    pub fn area(&self) -> f64 {
        pixel_area(self.nside())
    }
}

#[derive(Clone, Debug)]
struct GridNode {
    order: u8,
    ipix: u64,
    points: Range<usize>,
    children: Option<[usize; 4]>,
}

/// An adaptively refined tiling of the sphere by nested HEALPix pixels.
///
/// Nodes are kept in an arena and addressed by index; the leaves are listed
/// in nested (depth-first) order.
///
/// # Examples
///
/// ```
/// use sky_area::SkyPoint;
/// use sky_area::healpix::AdaptiveGrid;
///
/// let points = vec![SkyPoint::new(0.1, 0.2), SkyPoint::new(0.11, 0.2), SkyPoint::new(3.0, -1.0)];
/// let grid = AdaptiveGrid::new(&points, 29).unwrap();
/// let total: f64 = grid.leaves().iter().map(|l| l.area()).sum();
/// assert!((total - 4.0 * std::f64::consts::PI).abs() < 1e-9);
/// ```
#[derive(Clone, Debug)]
pub struct AdaptiveGrid {
    nodes: Vec<GridNode>,
    leaves: Vec<GridLeaf>,
    max_order: u8,
}

impl AdaptiveGrid {
    /// Builds the grid over `points`, refining no deeper than `max_order`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NonFiniteCoordinate` if a point is not finite.
    /// Returns `Error::InvalidNside` if `max_order` exceeds 29.
    pub fn new(points: &[SkyPoint], max_order: u8) -> Result<Self> {
        if max_order > MAX_ORDER {
            let nside = 1u64.checked_shl(u32::from(max_order)).unwrap_or(u64::MAX);
            return Err(Error::InvalidNside(nside));
        }
        crate::coords::check_finite(points, SkyPoint::is_finite)?;

        // every point is indexed once at the finest order; a pixel's points
        // are then a contiguous run of the sorted indices
        let finest = 1u64 << MAX_ORDER;
        let mut indices: Vec<u64> = points
            .iter()
            .map(|p| ang2pix_nest(finest, p.lon, p.lat))
            .collect();
        indices.sort_unstable();

        let mut nodes: Vec<GridNode> = Vec::new();
        let mut pending: Vec<usize> = Vec::new();
        for (face, points) in split_range(&indices, 0..indices.len(), 0, 0..12)
            .into_iter()
            .enumerate()
        {
            nodes.push(GridNode {
                order: 0,
                ipix: face as u64,
                points,
                children: None,
            });
        }
        pending.extend((0..nodes.len()).rev());

        while let Some(id) = pending.pop() {
            let node = &nodes[id];
            if node.points.len() <= 1 || node.order >= max_order {
                continue;
            }
            let order = node.order + 1;
            let first_child = node.ipix * 4;
            let ranges = split_range(
                &indices,
                node.points.clone(),
                order,
                first_child..first_child + 4,
            );

            let base = nodes.len();
            for (offset, points) in ranges.into_iter().enumerate() {
                nodes.push(GridNode {
                    order,
                    ipix: first_child + offset as u64,
                    points,
                    children: None,
                });
            }
            nodes[id].children = Some([base, base + 1, base + 2, base + 3]);
            pending.extend((base..base + 4).rev());
        }

        let leaves = collect_leaves(&nodes);
        trace_debug!(
            n_points = points.len(),
            n_nodes = nodes.len(),
            n_leaves = leaves.len(),
            "adaptive grid built"
        );

        Ok(Self {
            nodes,
            leaves,
            max_order,
        })
    }

    /// Leaves in nested order.
    #[must_use]
    pub fn leaves(&self) -> &[GridLeaf] {
        &self.leaves
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Always `false`: the 12 base pixels are present even without points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Total number of nodes, split and unsplit.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest order the grid may refine to.
    #[must_use]
    pub fn max_order(&self) -> u8 {
        self.max_order
    }

    /// Projects per-leaf densities onto a nested map of resolution `nside`.
    ///
    /// A leaf finer than the map contributes `density · leaf_area / pixel_area`
    /// to the map pixel containing it; a leaf at least as coarse as the map
    /// sets every map pixel it covers to its density. The result is a density
    /// per pixel in nested order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidNside` if `nside` is not a valid resolution.
    ///
    /// # Panics
    ///
    /// Panics if `densities.len() != self.len()`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn rasterize(&self, densities: &[f64], nside: u64) -> Result<Vec<f64>> {
        assert_eq!(
            densities.len(),
            self.leaves.len(),
            "expected one density per leaf"
        );
        let map_order = super::nside_to_order(nside)?;
        let map_area = pixel_area(nside);
        let mut map = vec![0.0; super::npix(nside) as usize];

        for (leaf, &density) in self.leaves.iter().zip(densities) {
            if leaf.order > map_order {
                let shift = 2 * u32::from(leaf.order - map_order);
                map[(leaf.ipix >> shift) as usize] += density * leaf.area() / map_area;
            } else {
                let shift = 2 * u32::from(map_order - leaf.order);
                let start = (leaf.ipix << shift) as usize;
                let end = ((leaf.ipix + 1) << shift) as usize;
                map[start..end].fill(density);
            }
        }
        Ok(map)
    }
}

/// Splits `range` of the sorted finest-order `indices` among the pixels
/// `pixels` at `order`.
fn split_range(
    indices: &[u64],
    range: Range<usize>,
    order: u8,
    pixels: Range<u64>,
) -> Vec<Range<usize>> {
    let shift = 2 * u32::from(MAX_ORDER - order);
    let slice = &indices[range.clone()];
    let mut start = range.start;
    pixels
        .map(|pixel| {
            let end = range.start + slice.partition_point(|&idx| (idx >> shift) <= pixel);
            let child = start..end;
            start = end;
            child
        })
        .collect()
}

/// Leaves in depth-first order, children visited in nested order.
#[allow(clippy::cast_precision_loss)]
fn collect_leaves(nodes: &[GridNode]) -> Vec<GridLeaf> {
    let mut leaves = Vec::new();
    let mut stack: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.order == 0)
        .map(|(id, _)| id)
        .rev()
        .collect();

    while let Some(id) = stack.pop() {
        let node = &nodes[id];
        match node.children {
            Some(children) => stack.extend(children.iter().rev()),
            None => {
                let (lon, lat) = pix2ang_nest(1 << node.order, node.ipix);
                leaves.push(GridLeaf {
                    order: node.order,
                    ipix: node.ipix,
                    lon,
                    lat,
                    n_points: node.points.len(),
                });
            }
        }
    }
    leaves
}
