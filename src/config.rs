//! Configuration
//!
//! Settings of a Shapley values loop and their JSON persistence.
use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_ITERATIONS_PER_FEATURE};
use crate::errors::ShapleyError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_iterations_per_feature() -> usize {
    DEFAULT_ITERATIONS_PER_FEATURE
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_seed() -> u64 {
    rand::random()
}

/// Configuration of the Shapley values loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapleyConfig {
    /// Number of sampled coalitions per feature.
    #[serde(default = "default_iterations_per_feature")]
    pub iterations_per_feature: usize,
    /// Number of rows of interest perturbed per loop iteration.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Seed for permutations and sampled rows.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Columns whose contribution is explained.
    #[serde(default)]
    pub feature_columns: Vec<String>,
    /// Numeric columns holding the model predictions.
    #[serde(default)]
    pub prediction_columns: Vec<String>,
}

impl Default for ShapleyConfig {
    fn default() -> Self {
        ShapleyConfig {
            iterations_per_feature: DEFAULT_ITERATIONS_PER_FEATURE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            seed: default_seed(),
            feature_columns: Vec::new(),
            prediction_columns: Vec::new(),
        }
    }
}

impl ShapleyConfig {
    pub fn new<S: Into<String>>(feature_columns: Vec<S>, prediction_columns: Vec<S>) -> Self {
        ShapleyConfig {
            feature_columns: feature_columns.into_iter().map(Into::into).collect(),
            prediction_columns: prediction_columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the number of iterations per feature.
    /// * `iterations_per_feature` - More iterations reduce the sampling error at `1 / sqrt(n)`.
    pub fn set_iterations_per_feature(mut self, iterations_per_feature: usize) -> Self {
        self.iterations_per_feature = iterations_per_feature;
        self
    }

    /// Set the chunk size.
    /// * `chunk_size` - Number of rows of interest handled per loop iteration.
    pub fn set_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the seed.
    /// * `seed` - Integer value used to seed the randomness of the sampling.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the settings before any row is processed.
    pub fn validate(&self) -> Result<(), ShapleyError> {
        validate_positive(self.iterations_per_feature, "iterations_per_feature")?;
        validate_positive(self.chunk_size, "chunk_size")?;
        if self.feature_columns.is_empty() {
            return Err(ShapleyError::EmptyColumnSelection("feature".to_string()));
        }
        if self.prediction_columns.is_empty() {
            return Err(ShapleyError::EmptyColumnSelection("prediction".to_string()));
        }
        Ok(())
    }
}

fn validate_positive(value: usize, parameter: &str) -> Result<(), ShapleyError> {
    if value == 0 {
        Err(ShapleyError::InvalidParameter(
            parameter.to_string(),
            "a value larger than 0".to_string(),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// IO
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save the configuration to.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ShapleyError> {
        fs::write(path, self.json_dump()?).map_err(|e| ShapleyError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json string.
    fn json_dump(&self) -> Result<String, ShapleyError> {
        serde_json::to_string(self).map_err(|e| ShapleyError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    fn from_json(json_str: &str) -> Result<Self, ShapleyError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ShapleyError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json file.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ShapleyError> {
        let json_str = fs::read_to_string(path).map_err(|e| ShapleyError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for ShapleyConfig {}
