//! BIC-driven search over the number of clusters.
//!
//! Each candidate cluster count `k` is scored by
//!
//! `BIC(k) = Σ ln p(x_i) − (m/2) ln n`, `m = k·d + k·d(d+1)/2 + (k − 1)`
//!
//! where `p` is the clustered KDE density of the fitting points (on the sky
//! including its periodic images) and `m` counts means, covariances and
//! weights. The search brackets the maximum starting from `(1, 2, 4)`, doubles
//! the upper bound while the score keeps rising and then bisects the wider
//! side of the bracket.

use std::collections::BTreeMap;

use super::kmeans::{KMeansFit, kmeans};
use crate::error::{Error, Result};
use crate::kde::{ClusteredKde, Domain};
use crate::stats;

/// A clustering of the fitting points together with its density model.
#[derive(Clone, Debug)]
pub struct ClusterModel {
    k: usize,
    means: Vec<Vec<f64>>,
    assignment: Vec<usize>,
    kde: ClusteredKde,
    domain: Domain,
    bic: f64,
}

impl ClusterModel {
    /// Builds a model from an explicit clustering of embedded points.
    ///
    /// Cluster means are the member means; a cluster without members reports
    /// an empty mean.
    ///
    /// # Errors
    ///
    /// Returns `Error::AssignmentMismatch` if `assignment` does not cover `points`.
    /// Returns `Error::InvalidClusterIndex` if an entry is not in `0..k`.
    /// Returns `Error::SingularCovariance` if a cluster's KDE cannot be fitted
    /// or no cluster has more members than dimensions.
    pub fn from_assignment(
        points: &[Vec<f64>],
        domain: Domain,
        k: usize,
        assignment: Vec<usize>,
    ) -> Result<Self> {
        check_assignment(points, k, &assignment)?;

        let means = (0..k)
            .map(|c| {
                let members: Vec<&[f64]> = points
                    .iter()
                    .zip(&assignment)
                    .filter(|&(_, &a)| a == c)
                    .map(|(p, _)| p.as_slice())
                    .collect();
                if members.is_empty() {
                    Vec::new()
                } else {
                    stats::mean(&members)
                }
            })
            .collect();

        Self::from_fit(
            points,
            domain,
            k,
            KMeansFit {
                means,
                assignment,
                iterations: 0,
            },
        )
    }

    /// Builds a model from an explicit clustering with precomputed centroids.
    ///
    /// The centroids are kept as given; the number of clusters is
    /// `means.len()`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if a centroid does not have the
    /// dimension of the points.
    /// Otherwise as [`from_assignment`](Self::from_assignment).
    pub fn from_means(
        points: &[Vec<f64>],
        domain: Domain,
        means: Vec<Vec<f64>>,
        assignment: Vec<usize>,
    ) -> Result<Self> {
        let k = means.len();
        check_assignment(points, k, &assignment)?;
        let n_dims = points.first().map_or(0, Vec::len);
        if let Some((index, mean)) = means.iter().enumerate().find(|(_, m)| m.len() != n_dims) {
            return Err(Error::DimensionMismatch {
                expected: n_dims,
                got: mean.len(),
                sample_index: index,
            });
        }

        Self::from_fit(
            points,
            domain,
            k,
            KMeansFit {
                means,
                assignment,
                iterations: 0,
            },
        )
    }

    fn from_fit(points: &[Vec<f64>], domain: Domain, k: usize, fit: KMeansFit) -> Result<Self> {
        let kde = ClusteredKde::from_assignment(points, &fit.assignment, k)?;
        let bic = bic(points, domain, &kde, k);
        Ok(Self {
            k,
            means: fit.means,
            assignment: fit.assignment,
            kde,
            domain,
            bic,
        })
    }

    /// Returns the number of clusters.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Returns the cluster means in the embedded coordinates.
    #[must_use]
    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    /// Returns the cluster index of every fitting point.
    #[must_use]
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Returns the kernel mixture.
    #[must_use]
    pub fn kde(&self) -> &ClusteredKde {
        &self.kde
    }

    /// Returns the domain the model lives on.
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Returns the BIC of the model on its fitting points.
    #[must_use]
    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// Density at an embedded point.
    #[must_use]
    pub fn density(&self, x: &[f64]) -> f64 {
        self.domain.density(&self.kde, x)
    }
}

fn check_assignment(points: &[Vec<f64>], k: usize, assignment: &[usize]) -> Result<()> {
    if assignment.len() != points.len() {
        return Err(Error::AssignmentMismatch {
            expected: points.len(),
            got: assignment.len(),
        });
    }
    if let Some(&index) = assignment.iter().find(|&&c| c >= k) {
        return Err(Error::InvalidClusterIndex {
            index,
            n_clusters: k,
        });
    }
    Ok(())
}

/// The outcome of evaluating one cluster count.
#[derive(Debug)]
pub(crate) enum Candidate {
    /// At least one restart produced a usable model; the best one is kept.
    Feasible(ClusterModel),
    /// Every restart failed (too few points, singular metric or clusters).
    /// Holds the error of the last restart.
    Infeasible(Error),
}

impl Candidate {
    fn score(&self) -> f64 {
        match self {
            Self::Feasible(model) => model.bic,
            Self::Infeasible(_) => f64::NEG_INFINITY,
        }
    }
}

/// Selects the BIC-maximizing cluster count for the embedded `points`.
///
/// `n_trials` k-means restarts are run for every `k > 1` evaluated; `k = 1`
/// is deterministic and evaluated once.
///
/// # Errors
///
/// Returns `Error::InvalidTrials` if `n_trials == 0`.
/// Returns the underlying error if the single-cluster model cannot be built,
/// or if the bracket must be extended and no count between its midpoint and
/// the doubled upper bound is feasible.
pub fn select_model(
    points: &[Vec<f64>],
    domain: Domain,
    n_trials: usize,
    max_iterations: Option<usize>,
    rng: &mut fastrand::Rng,
) -> Result<ClusterModel> {
    if n_trials == 0 {
        return Err(Error::InvalidTrials);
    }
    let mut selector = Selector {
        points,
        domain,
        n_trials,
        max_iterations,
        rng,
        candidates: BTreeMap::new(),
    };
    selector.search()
}

struct Selector<'a> {
    points: &'a [Vec<f64>],
    domain: Domain,
    n_trials: usize,
    max_iterations: Option<usize>,
    rng: &'a mut fastrand::Rng,
    candidates: BTreeMap<usize, Candidate>,
}

impl Selector<'_> {
    fn search(&mut self) -> Result<ClusterModel> {
        let single = self.fit(1)?;
        trace_debug!(k = 1, bic = single.bic, "candidate evaluated");
        self.candidates.insert(1, Candidate::Feasible(single));

        let mut low = 1;
        let mut mid = 2;
        let mut high = self.feasible_high(mid, 4).unwrap_or(mid);

        while self.score(high) > self.score(mid) {
            low = mid;
            mid = high;
            high = match self.feasible_high(mid, 2 * mid) {
                Some(k) => k,
                None => return Err(self.take_error(mid + 1)),
            };
            trace_info!(low, mid, high, "bracket extended");
        }

        while high - low > 2 {
            if high - mid > mid - low {
                let k = mid + (high - mid) / 2;
                if self.score(k) > self.score(mid) {
                    low = mid;
                    mid = k;
                } else {
                    high = k;
                }
            } else {
                let k = low + (mid - low) / 2;
                if self.score(k) > self.score(mid) {
                    high = mid;
                    mid = k;
                } else {
                    low = k;
                }
            }
            trace_debug!(low, mid, high, "bracket narrowed");
        }

        // ascending order with a strict comparison prefers fewer clusters on ties
        let mut best = low;
        for k in [mid, high] {
            if self.score(k) > self.score(best) {
                best = k;
            }
        }

        match self.candidates.remove(&best) {
            Some(Candidate::Feasible(model)) => {
                trace_info!(k = model.k, bic = model.bic, "cluster count selected");
                Ok(model)
            }
            Some(Candidate::Infeasible(error)) => Err(error),
            None => Err(Error::SingularCovariance {
                n_points: self.points.len(),
            }),
        }
    }

    /// Lowers an infeasible upper bound towards `mid` by halving the gap.
    /// Returns `None` once no count above `mid` is left to try.
    fn feasible_high(&mut self, mid: usize, mut high: usize) -> Option<usize> {
        loop {
            if self.is_feasible(high) {
                return Some(high);
            }
            high = mid + (high - mid) / 2;
            if high < mid + 1 {
                return None;
            }
        }
    }

    /// Removes the memoized failure for `k`.
    fn take_error(&mut self, k: usize) -> Error {
        match self.candidates.remove(&k) {
            Some(Candidate::Infeasible(error)) => error,
            _ => Error::SingularCovariance {
                n_points: self.points.len(),
            },
        }
    }

    fn is_feasible(&mut self, k: usize) -> bool {
        matches!(self.candidate(k), Candidate::Feasible(_))
    }

    fn score(&mut self, k: usize) -> f64 {
        self.candidate(k).score()
    }

    fn candidate(&mut self, k: usize) -> &Candidate {
        if !self.candidates.contains_key(&k) {
            let candidate = self.evaluate(k);
            self.candidates.insert(k, candidate);
        }
        &self.candidates[&k]
    }

    /// Runs the restarts for `k` and keeps the best-scoring model; later
    /// restarts win ties.
    fn evaluate(&mut self, k: usize) -> Candidate {
        let mut best: Option<ClusterModel> = None;
        let mut failure = None;
        for _ in 0..self.n_trials {
            match self.fit(k) {
                Ok(model) => {
                    if best.as_ref().is_none_or(|b| model.bic >= b.bic) {
                        best = Some(model);
                    }
                }
                Err(error) => failure = Some(error),
            }
        }
        match best {
            Some(model) => {
                trace_debug!(k, bic = model.bic, "candidate evaluated");
                Candidate::Feasible(model)
            }
            None => {
                trace_debug!(k, "candidate infeasible");
                Candidate::Infeasible(failure.unwrap_or(Error::InvalidTrials))
            }
        }
    }

    fn fit(&mut self, k: usize) -> Result<ClusterModel> {
        let fit = kmeans(self.points, k, self.rng, self.max_iterations)?;
        ClusterModel::from_fit(self.points, self.domain, k, fit)
    }
}

/// Log-likelihood of the fitting points penalized by the parameter count.
#[allow(clippy::cast_precision_loss)]
fn bic(points: &[Vec<f64>], domain: Domain, kde: &ClusteredKde, k: usize) -> f64 {
    let log_likelihood: f64 = points.iter().map(|x| domain.density(kde, x).ln()).sum();
    let d = kde.n_dims() as f64;
    let k = k as f64;
    let n_params = k * d + k * d * (d + 1.0) / 2.0 + k - 1.0;
    log_likelihood - 0.5 * n_params * (points.len() as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng_util::standard_normal;

    fn blob(rng: &mut fastrand::Rng, n: usize, center: [f64; 3], scale: f64) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| center.iter().map(|c| c + scale * standard_normal(rng)).collect())
            .collect()
    }

    fn selector<'a>(points: &'a [Vec<f64>], n_trials: usize, rng: &'a mut fastrand::Rng) -> Selector<'a> {
        Selector {
            points,
            domain: Domain::Volume,
            n_trials,
            max_iterations: None,
            rng,
            candidates: BTreeMap::new(),
        }
    }

    #[test]
    fn test_bic_penalty_for_single_cluster() {
        let mut rng = fastrand::Rng::with_seed(1);
        let points = blob(&mut rng, 100, [0.0, 0.0, 0.0], 1.0);
        let model = ClusterModel::from_assignment(&points, Domain::Volume, 1, vec![0; 100]).unwrap();
        let log_likelihood: f64 = points.iter().map(|x| model.density(x).ln()).sum();
        // 3 means + 6 covariance entries + 0 free weights
        let expected = log_likelihood - 4.5 * 100f64.ln();
        assert!((model.bic() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_more_trials_never_lower_bic() {
        let mut rng = fastrand::Rng::with_seed(2);
        let mut points = blob(&mut rng, 150, [0.0, 0.0, 0.0], 1.0);
        points.extend(blob(&mut rng, 150, [4.0, 0.0, 1.0], 1.0));

        for k in [2, 3, 5] {
            let mut rng_one = fastrand::Rng::with_seed(10);
            let mut rng_many = fastrand::Rng::with_seed(10);
            let one = selector(&points, 1, &mut rng_one).score(k);
            let many = selector(&points, 4, &mut rng_many).score(k);
            assert!(many >= one, "k = {k}: {many} < {one}");
        }
    }

    #[test]
    fn test_infeasible_when_too_many_clusters() {
        let mut rng = fastrand::Rng::with_seed(3);
        let points = blob(&mut rng, 10, [0.0, 0.0, 0.0], 1.0);
        let mut sel = selector(&points, 3, &mut rng);
        assert!(matches!(
            sel.candidate(10),
            Candidate::Infeasible(Error::TooFewPoints {
                n_points: 10,
                n_clusters: 10
            })
        ));
        assert!(sel.score(20).is_infinite());
    }

    #[test]
    fn test_feasible_high_exhausts_above_mid() {
        let mut rng = fastrand::Rng::with_seed(4);
        let points = blob(&mut rng, 10, [0.0, 0.0, 0.0], 1.0);
        let mut sel = selector(&points, 2, &mut rng);
        // 30, 19, 14, 11 and 10 clusters all need more than 10 points
        assert_eq!(sel.feasible_high(9, 30), None);
        assert!(!sel.candidates.contains_key(&9));
        assert!(matches!(
            sel.take_error(10),
            Error::TooFewPoints {
                n_points: 10,
                n_clusters: 10
            }
        ));
    }

    fn scored(points: &[Vec<f64>], bic: f64) -> Candidate {
        let mut model =
            ClusterModel::from_assignment(points, Domain::Volume, 1, vec![0; points.len()]).unwrap();
        model.bic = bic;
        Candidate::Feasible(model)
    }

    fn too_many(k: usize) -> Candidate {
        Candidate::Infeasible(Error::TooFewPoints {
            n_points: 5,
            n_clusters: k,
        })
    }

    #[test]
    fn test_initial_bracket_collapses_onto_two() {
        let mut rng = fastrand::Rng::with_seed(8);
        let points = blob(&mut rng, 30, [0.0, 0.0, 0.0], 1.0);
        let mut sel = selector(&points, 2, &mut rng);
        sel.candidates.insert(2, scored(&points, 1e9));
        sel.candidates.insert(3, too_many(3));
        sel.candidates.insert(4, too_many(4));

        let model = sel.search().unwrap();
        assert!((model.bic() - 1e9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_extension_returns_the_error() {
        let mut rng = fastrand::Rng::with_seed(9);
        let points = blob(&mut rng, 30, [0.0, 0.0, 0.0], 1.0);
        let mut sel = selector(&points, 2, &mut rng);
        // the score rises from 2 to 4, but nothing in 5..=8 can be fitted
        sel.candidates.insert(2, scored(&points, 1e8));
        sel.candidates.insert(4, scored(&points, 1e9));
        for k in 5..=8 {
            sel.candidates.insert(k, too_many(k));
        }

        assert!(matches!(
            sel.search(),
            Err(Error::TooFewPoints {
                n_points: 5,
                n_clusters: 5
            })
        ));
    }

    #[test]
    fn test_explicit_means_are_kept() {
        let points = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.5],
        ];
        let means = vec![vec![0.4, 0.6], vec![3.0, 3.0]];
        let model =
            ClusterModel::from_means(&points, Domain::Sky, means.clone(), vec![0, 0, 0, 0]).unwrap();
        assert_eq!(model.k(), 2);
        assert_eq!(model.means(), means.as_slice());

        assert!(matches!(
            ClusterModel::from_means(&points, Domain::Sky, vec![vec![0.0; 3]], vec![0; 4]),
            Err(Error::DimensionMismatch {
                expected: 2,
                got: 3,
                sample_index: 0
            })
        ));
        assert!(matches!(
            ClusterModel::from_means(&points, Domain::Sky, vec![vec![0.0; 2]], vec![0, 1, 0, 0]),
            Err(Error::InvalidClusterIndex {
                index: 1,
                n_clusters: 1
            })
        ));
    }

    #[test]
    fn test_separated_blobs_select_several_clusters() {
        let mut rng = fastrand::Rng::with_seed(5);
        let mut points = blob(&mut rng, 200, [0.0, 0.0, 0.0], 0.5);
        points.extend(blob(&mut rng, 200, [10.0, 10.0, 0.0], 0.5));
        points.extend(blob(&mut rng, 200, [-10.0, 10.0, 5.0], 0.5));

        let model = select_model(&points, Domain::Volume, 3, None, &mut rng).unwrap();
        assert!(model.k() >= 3, "selected k = {}", model.k());
        let total: f64 = model.kde().weights().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_trials_rejected() {
        let mut rng = fastrand::Rng::with_seed(6);
        let points = blob(&mut rng, 20, [0.0, 0.0, 0.0], 1.0);
        assert!(matches!(
            select_model(&points, Domain::Volume, 0, None, &mut rng),
            Err(Error::InvalidTrials)
        ));
    }

    #[test]
    fn test_explicit_assignment_validation() {
        let mut rng = fastrand::Rng::with_seed(7);
        let points = blob(&mut rng, 20, [0.0, 0.0, 0.0], 1.0);
        assert!(matches!(
            ClusterModel::from_assignment(&points, Domain::Volume, 2, vec![0; 19]),
            Err(Error::AssignmentMismatch {
                expected: 20,
                got: 19
            })
        ));
        let mut assignment = vec![0; 20];
        assignment[3] = 2;
        assert!(matches!(
            ClusterModel::from_assignment(&points, Domain::Volume, 2, assignment),
            Err(Error::InvalidClusterIndex {
                index: 2,
                n_clusters: 2
            })
        ));
    }

    #[test]
    fn test_explicit_assignment_means() {
        let points = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.5],
        ];
        let model = ClusterModel::from_assignment(&points, Domain::Sky, 2, vec![0, 0, 0, 0]).unwrap();
        assert_eq!(model.k(), 2);
        assert_eq!(model.means()[0], vec![0.5, 0.625]);
        assert!(model.means()[1].is_empty());
        assert_eq!(model.kde().components().len(), 1);
    }
}
