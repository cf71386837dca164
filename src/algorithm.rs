//! Algorithm
//!
//! Monte-Carlo estimation of Shapley values (Štrumbelj & Kononenko) split into
//! two phases. The prepare phase expands one row into `2 * features * iterations`
//! perturbed rows, the aggregate phase consumes the predictions for one such
//! batch and averages the prediction differences per feature.
use crate::data::{Cell, Row, RowKey};
use crate::errors::ShapleyError;
use crate::key::{KeyGeneratorFactory, RowKeyChecker, SvId};
use crate::replacer::FeatureReplacer;
use log::debug;
use std::iter::Peekable;

/// Running sum of prediction differences, one slot per target.
#[derive(Debug, Clone)]
struct DiffAccumulator {
    data: Vec<f64>,
}

impl DiffAccumulator {
    fn new(num_targets: usize) -> Self {
        DiffAccumulator {
            data: vec![0.0; num_targets],
        }
    }

    fn reset(&mut self) {
        self.data.iter_mut().for_each(|d| *d = 0.0);
    }

    fn update(&mut self, foi_intact: &Row, foi_replaced: &Row) -> Result<(), ShapleyError> {
        for (i, d) in self.data.iter_mut().enumerate() {
            *d += prediction(foi_intact, i)? - prediction(foi_replaced, i)?;
        }
        Ok(())
    }
}

fn prediction(row: &Row, target: usize) -> Result<f64, ShapleyError> {
    row.cells()
        .get(target)
        .and_then(Cell::as_f64)
        .ok_or_else(|| ShapleyError::NonNumericPrediction {
            row: row.key().to_string(),
            column: target,
        })
}

/// Shapley values of one row, laid out target-major.
#[derive(Debug, Clone)]
struct ShapleyValues {
    data: Vec<f64>,
    num_features: usize,
    iterations_per_feature: usize,
}

impl ShapleyValues {
    fn new(num_features: usize, num_targets: usize, iterations_per_feature: usize) -> Self {
        ShapleyValues {
            data: vec![0.0; num_features * num_targets],
            num_features,
            iterations_per_feature,
        }
    }

    fn update_values(&mut self, feature_idx: usize, accumulator: &DiffAccumulator) {
        for (target_idx, diff) in accumulator.data.iter().enumerate() {
            self.data[target_idx * self.num_features + feature_idx] = diff / self.iterations_per_feature as f64;
        }
    }
}

/// Prepare and aggregate phases of the Shapley values estimation.
pub struct ShapleyValuesAlgorithm {
    feature_replacer: FeatureReplacer,
    iterations_per_feature: usize,
    num_targets: usize,
    keys: KeyGeneratorFactory<RowKey>,
}

impl ShapleyValuesAlgorithm {
    /// * `feature_replacer` - Replacer holding the sampling set.
    /// * `iterations_per_feature` - Number of perturbation pairs per feature, must be positive.
    /// * `num_targets` - Number of prediction columns, must be positive.
    pub fn new(
        feature_replacer: FeatureReplacer,
        iterations_per_feature: usize,
        num_targets: usize,
    ) -> Result<Self, ShapleyError> {
        if num_targets == 0 {
            return Err(ShapleyError::EmptyColumnSelection("prediction".to_string()));
        }
        if iterations_per_feature == 0 {
            return Err(ShapleyError::InvalidParameter(
                "iterations_per_feature".to_string(),
                "a value larger than 0".to_string(),
                iterations_per_feature.to_string(),
            ));
        }
        Ok(ShapleyValuesAlgorithm {
            feature_replacer,
            iterations_per_feature,
            num_targets,
            keys: KeyGeneratorFactory::for_row_keys(),
        })
    }

    pub fn feature_count(&self) -> usize {
        self.feature_replacer.feature_count()
    }

    pub fn num_targets(&self) -> usize {
        self.num_targets
    }

    pub fn iterations_per_feature(&self) -> usize {
        self.iterations_per_feature
    }

    /// Number of perturbed rows created for every input row.
    pub fn batch_size(&self) -> usize {
        2 * self.feature_count() * self.iterations_per_feature
    }

    /// Expand `row` into its batch of perturbed rows.
    ///
    /// Rows are emitted feature by feature, iteration by iteration, the row with
    /// the intact feature of interest first.
    pub fn prepare_row(&mut self, row: &Row) -> Result<Vec<Row>, ShapleyError> {
        let mut rows = Vec::with_capacity(self.batch_size());
        let key_gen = self.keys.create_generator(row.key());
        for i in 0..self.feature_count() {
            for j in 0..self.iterations_per_feature {
                let r = self.feature_replacer.replace_features(row, i)?;
                rows.push(Row::new(key_gen.create(&SvId::new(i, j, true)), r.foi_intact));
                rows.push(Row::new(key_gen.create(&SvId::new(i, j, false)), r.foi_replaced));
            }
        }
        Ok(rows)
    }

    /// Consume the next batch of predicted rows and return the Shapley values of its original row.
    ///
    /// The rows must only contain the prediction columns. On success the iterator
    /// is positioned at the first row of the following batch.
    pub fn calculate_shapley_values_for_next_row<I>(&self, rows: &mut Peekable<I>) -> Result<Row, ShapleyError>
    where
        I: Iterator<Item = Row>,
    {
        let checker = match rows.peek() {
            Some(first) => self.keys.create_checker(first.key())?,
            None => return Err(ShapleyError::InvalidState("No rows left to calculate Shapley values for.".to_string())),
        };
        let values = self.calculate_shapley_values(rows, &checker)?;
        debug!("Calculated Shapley values for row '{}'.", checker.original_key());
        let cells = values.data.into_iter().map(Cell::Double).collect();
        Ok(Row::new(checker.original_key(), cells))
    }

    fn calculate_shapley_values<I>(
        &self,
        rows: &mut Peekable<I>,
        checker: &RowKeyChecker<RowKey>,
    ) -> Result<ShapleyValues, ShapleyError>
    where
        I: Iterator<Item = Row>,
    {
        let feature_count = self.feature_count();
        let mut shapley_values = ShapleyValues::new(feature_count, self.num_targets, self.iterations_per_feature);
        let mut accumulator = DiffAccumulator::new(self.num_targets);
        for i in 0..feature_count {
            accumulator.reset();
            for j in 0..self.iterations_per_feature {
                let foi_intact = next_row(rows, checker)?;
                checker.check(foi_intact.key(), &SvId::new(i, j, true))?;
                let foi_replaced = next_row(rows, checker)?;
                checker.check(foi_replaced.key(), &SvId::new(i, j, false))?;
                accumulator.update(&foi_intact, &foi_replaced)?;
            }
            shapley_values.update_values(i, &accumulator);
        }
        // a malformed next key is reported by the call that starts with it
        if let Some(next) = rows.peek() {
            if matches!(checker.belongs_to_batch(next.key()), Ok(true)) {
                return Err(ShapleyError::TrailingRows(checker.original_key().to_string()));
            }
        }
        Ok(shapley_values)
    }
}

fn next_row<I: Iterator<Item = Row>>(rows: &mut I, checker: &RowKeyChecker<RowKey>) -> Result<Row, ShapleyError> {
    rows.next()
        .ok_or_else(|| ShapleyError::IncompleteBatch(checker.original_key().to_string()))
}
