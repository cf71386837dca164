//! Replacer
//!
//! Perturbs rows of interest with values from a fixed sampling set. One call
//! to [`FeatureReplacer::replace_features`] draws a random feature permutation
//! and a random background row and returns a pair of rows that differ only in
//! the feature of interest.
use crate::data::{Cell, Row};
use crate::errors::ShapleyError;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Pair of perturbed cell vectors produced for one feature of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    /// The feature of interest keeps its original value.
    pub foi_intact: Vec<Cell>,
    /// The feature of interest is taken from the sampled row.
    pub foi_replaced: Vec<Cell>,
}

/// Mixes rows with randomly drawn rows of a sampling set.
pub struct FeatureReplacer {
    sampling_set: Vec<Row>,
    feature_count: usize,
    rng: StdRng,
}

impl FeatureReplacer {
    /// Create a replacer over `sampling_set` whose randomness is fully determined by `seed`.
    ///
    /// * `sampling_set` - Background rows, must not be empty and all rows must have the same number of cells.
    /// * `seed` - Seed of the random generator used for permutations and row draws.
    pub fn new(sampling_set: Vec<Row>, seed: u64) -> Result<Self, ShapleyError> {
        let feature_count = match sampling_set.first() {
            Some(first) => first.num_cells(),
            None => return Err(ShapleyError::EmptySamplingSet),
        };
        if let Some(row) = sampling_set.iter().find(|r| r.num_cells() != feature_count) {
            return Err(ShapleyError::FeatureCountMismatch {
                expected: feature_count,
                found: row.num_cells(),
            });
        }
        if sampling_set.len() < feature_count {
            warn!(
                "The sampling set has only {} rows for {} features, estimates may be biased.",
                sampling_set.len(),
                feature_count
            );
        }
        Ok(FeatureReplacer {
            sampling_set,
            feature_count,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn sampling_set_size(&self) -> usize {
        self.sampling_set.len()
    }

    /// Draw a random permutation and a random sampled row and replace features of `row`.
    ///
    /// Features that come before `foi` in the permutation are replaced in both
    /// outputs, features after it are kept in both. The outputs only differ at `foi`.
    ///
    /// * `row` - Row of interest, must have as many cells as the sampling rows.
    /// * `foi` - Index of the feature of interest.
    pub fn replace_features(&mut self, row: &Row, foi: usize) -> Result<Replacement, ShapleyError> {
        if row.num_cells() != self.feature_count {
            return Err(ShapleyError::FeatureCountMismatch {
                expected: self.feature_count,
                found: row.num_cells(),
            });
        }
        if foi >= self.feature_count {
            return Err(ShapleyError::InvalidParameter(
                "foi".to_string(),
                format!("feature index below {}", self.feature_count),
                foi.to_string(),
            ));
        }
        // permutation first, then the sampled row
        let permutation = index::sample(&mut self.rng, self.feature_count, self.feature_count);
        let sampled = &self.sampling_set[self.rng.gen_range(0..self.sampling_set.len())];

        let mut foi_intact = row.cells().to_vec();
        let mut foi_replaced = foi_intact.clone();
        for feature_idx in permutation.iter() {
            let replacement = sampled.cell(feature_idx);
            if feature_idx == foi {
                foi_replaced[feature_idx] = replacement.clone();
                break;
            }
            foi_intact[feature_idx] = replacement.clone();
            foi_replaced[feature_idx] = replacement.clone();
        }
        Ok(Replacement {
            foi_intact,
            foi_replaced,
        })
    }
}
