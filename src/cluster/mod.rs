//! Choosing the number of spatial clusters.
//!
//! - [`kmeans`] - Lloyd iterations under the Mahalanobis metric of the data
//! - [`select_model`] - BIC-maximizing bracket search over the cluster count
//! - [`ClusterModel`] - the selected clustering together with its KDE mixture

mod kmeans;
mod selection;

pub use kmeans::{KMeansFit, kmeans};
pub use selection::{ClusterModel, select_model};
