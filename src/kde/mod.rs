//! Kernel Density Estimation for clustered posteriors.
//!
//! - [`GaussianKde`] - full-covariance Gaussian KDE of one cluster
//! - [`ClusteredKde`] - weighted mixture of per-cluster KDEs, evaluated on the
//!   sky (with periodic images) or in Cartesian space

mod clustered;
mod gaussian;

pub use clustered::{ClusteredKde, Component, Domain};
pub use gaussian::GaussianKde;
