/// Errors raised while building or querying a posterior.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when k-means is asked for at least as many clusters as points.
    #[error("must have more points than clusters: {n_points} points for {n_clusters} clusters")]
    TooFewPoints {
        /// The number of points handed to k-means.
        n_points: usize,
        /// The requested number of clusters.
        n_clusters: usize,
    },

    /// Returned when the sample set is too small to split into a fitting and
    /// a ranking half and still fit a kernel density.
    #[error("insufficient samples: got {n_points}, need at least {required}")]
    InsufficientSamples {
        /// The number of samples supplied.
        n_points: usize,
        /// The minimum number of samples required.
        required: usize,
    },

    /// Returned when a sample or query coordinate is NaN or infinite.
    #[error("non-finite coordinate in point {index}")]
    NonFiniteCoordinate {
        /// The index of the offending point.
        index: usize,
    },

    /// Returned when points have inconsistent dimensions.
    #[error(
        "dimension mismatch: expected {expected} dimensions but point {sample_index} has {got}"
    )]
    DimensionMismatch {
        /// The expected number of dimensions.
        expected: usize,
        /// The actual number of dimensions of the point.
        got: usize,
        /// The index of the point with mismatched dimensions.
        sample_index: usize,
    },

    /// Returned when an explicit cluster assignment does not cover the fitting set.
    #[error("assignment length mismatch: expected {expected} entries but got {got}")]
    AssignmentMismatch {
        /// The size of the fitting set.
        expected: usize,
        /// The length of the supplied assignment.
        got: usize,
    },

    /// Returned when an explicit cluster assignment names a cluster outside `0..k`.
    #[error("cluster index {index} out of range for {n_clusters} clusters")]
    InvalidClusterIndex {
        /// The offending cluster index.
        index: usize,
        /// The number of clusters.
        n_clusters: usize,
    },

    /// Returned when a covariance matrix is not positive definite, e.g. a
    /// cluster whose points are collinear or identical.
    #[error("singular covariance for a set of {n_points} points")]
    SingularCovariance {
        /// The number of points the covariance was estimated from.
        n_points: usize,
    },

    /// Returned when a credible level is outside `[0, 1]`.
    #[error("invalid credible level: {0} must be in [0.0, 1.0]")]
    InvalidCredibleLevel(f64),

    /// Returned when the integration accuracy is not positive.
    #[error("invalid accuracy: {0} must be positive")]
    InvalidAccuracy(f64),

    /// Returned when a HEALPix resolution is not a power of two in `1..=2^29`.
    #[error("invalid nside: {0} must be a power of two no larger than 2^29")]
    InvalidNside(u64),

    /// Returned when a map's length is not `12 * nside^2` for any valid nside.
    #[error("invalid map length: {0} is not a valid HEALPix pixel count")]
    InvalidMapLength(usize),

    /// Returned when the number of k-means restarts per cluster count is zero.
    #[error("number of clustering trials must be at least one")]
    InvalidTrials,

    /// Returned when the k-means iteration cap is zero.
    #[error("k-means iteration cap must be at least one")]
    InvalidIterationCap,

    /// Returned when an operation is not defined for this kind of posterior.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Returned when an area table cannot be written or parsed.
    #[error("report error: {0}")]
    Report(String),
}

/// Result type for fallible operations of this crate.
///
/// # Examples
///
/// ```
/// use sky_area::{Error, Result};
///
/// fn check_level(level: f64) -> Result<f64> {
///     if (0.0..=1.0).contains(&level) {
///         Ok(level)
///     } else {
///         Err(Error::InvalidCredibleLevel(level))
///     }
/// }
///
/// assert!(check_level(0.9).is_ok());
/// assert!(matches!(check_level(1.5), Err(Error::InvalidCredibleLevel(_))));
/// ```
pub type Result<T> = core::result::Result<T, Error>;
