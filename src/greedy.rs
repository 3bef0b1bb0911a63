//! Calibration of density contours against credible levels.
//!
//! The ranking points are held out from the fit, so the fraction of them above
//! a density level is an unbiased estimate of the probability enclosed by that
//! level's contour.

use core::cmp::Ordering;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The density contour enclosing a credible level.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CredibleLevel {
    /// Points with density at least this value make up the credible region.
    Contour(f64),
    /// The level lies beyond the ranking set; the region is the whole domain.
    Missed,
}

/// Ranking points ordered by decreasing density.
///
/// # Examples
///
/// ```
/// use sky_area::{CredibleLevel, GreedyRanker};
///
/// let ranker = GreedyRanker::new(vec![0.1, 3.0, 2.0, 1.0]);
/// assert_eq!(ranker.order(), &[1, 2, 3, 0]);
/// assert_eq!(ranker.level_at_quantile(0.5).unwrap(), CredibleLevel::Contour(1.0));
/// assert_eq!(ranker.level_at_quantile(1.0).unwrap(), CredibleLevel::Missed);
/// assert!((ranker.quantile_at_level(1.5) - 0.5).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GreedyRanker {
    order: Vec<usize>,
    levels: Vec<f64>,
}

impl GreedyRanker {
    /// Ranks the given densities, highest first. Equal densities keep their
    /// input order.
    #[must_use]
    pub fn new(densities: Vec<f64>) -> Self {
        let mut order: Vec<usize> = (0..densities.len()).collect();
        order.sort_by(|&a, &b| {
            densities[b]
                .partial_cmp(&densities[a])
                .unwrap_or(Ordering::Equal)
        });
        let levels = order.iter().map(|&i| densities[i]).collect();
        Self { order, levels }
    }

    /// Indices of the ranking points by decreasing density.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Densities of the ranking points, non-increasing.
    #[must_use]
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Number of ranking points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` if there are no ranking points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Density contour enclosing credible level `q`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredibleLevel` if `q` is not in `[0, 1]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn level_at_quantile(&self, q: f64) -> Result<CredibleLevel> {
        if !(0.0..=1.0).contains(&q) {
            return Err(Error::InvalidCredibleLevel(q));
        }
        let idx = (q * self.levels.len() as f64).round() as usize;
        Ok(self
            .levels
            .get(idx)
            .map_or(CredibleLevel::Missed, |&level| CredibleLevel::Contour(level)))
    }

    /// Fraction of ranking points with density above `level`, i.e. the
    /// credible level of the contour through `level`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn quantile_at_level(&self, level: f64) -> f64 {
        if self.levels.is_empty() {
            return 0.0;
        }
        // levels are non-increasing: the points above `level` form a prefix
        let above = self.levels.partition_point(|&l| l > level);
        above as f64 / self.levels.len() as f64
    }
}
