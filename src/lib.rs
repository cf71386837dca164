//! Monte-Carlo estimation of Shapley values for arbitrary models.
//!
//! Every row of interest is expanded into pairs of perturbed rows that differ
//! only in one feature. After an external model predicted all perturbed rows,
//! the prediction differences are averaged into one Shapley value per feature
//! and prediction column.
mod constants;

// Modules
pub mod algorithm;
pub mod config;
pub mod data;
pub mod errors;
pub mod estimator;
pub mod exec;
pub mod key;
pub mod preparer;
pub mod replacer;

// Individual classes, and functions
pub use algorithm::ShapleyValuesAlgorithm;
pub use config::{ConfigIO, ShapleyConfig};
pub use data::{Cell, DataTable, Row, RowKey, TableSpec};
pub use errors::ShapleyError;
pub use estimator::{Predictor, ShapleyValuesEstimator};
pub use replacer::FeatureReplacer;
