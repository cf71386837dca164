//! Estimator
//!
//! Drives the Shapley values loop. The loop start perturbs the rows of
//! interest chunk by chunk, an external model appends its predictions to every
//! perturbed row and the loop end turns each batch of predicted rows back into
//! one row of Shapley values.
use crate::algorithm::ShapleyValuesAlgorithm;
use crate::config::ShapleyConfig;
use crate::constants::{PROG_FRAC_PERTURB_ROWS, PROG_FRAC_SAMPLING_CREATION};
use crate::data::{Cell, ColumnSpec, DataContainer, DataTable, DataType, Row, TableSpec};
use crate::errors::ShapleyError;
use crate::exec::{ExecutionMonitor, SubProgress};
use crate::preparer::TablePreparer;
use crate::replacer::FeatureReplacer;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::VecDeque;

/// A model that can be explained in-process.
pub trait Predictor: Sync {
    /// Predict one value per prediction column for a row of feature cells.
    fn predict(&self, features: &[Cell]) -> Result<Vec<f64>, ShapleyError>;
}

impl<F> Predictor for F
where
    F: Fn(&[Cell]) -> Result<Vec<f64>, ShapleyError> + Sync,
{
    fn predict(&self, features: &[Cell]) -> Result<Vec<f64>, ShapleyError> {
        self(features)
    }
}

/// Loop start and loop end of a Shapley values estimation.
pub struct ShapleyValuesEstimator {
    config: ShapleyConfig,
    preparer: TablePreparer,
    algorithm: Option<ShapleyValuesAlgorithm>,
    pending: VecDeque<Row>,
    roi_total: usize,
    output: Option<DataContainer>,
}

impl ShapleyValuesEstimator {
    pub fn new(config: ShapleyConfig) -> Result<Self, ShapleyError> {
        config.validate()?;
        let preparer = TablePreparer::new(config.feature_columns.clone(), config.prediction_columns.clone());
        Ok(ShapleyValuesEstimator {
            config,
            preparer,
            algorithm: None,
            pending: VecDeque::new(),
            roi_total: 0,
            output: None,
        })
    }

    pub fn config(&self) -> &ShapleyConfig {
        &self.config
    }

    /// Spec of the perturbed tables produced by the loop start.
    pub fn configure_loop_start(
        &mut self,
        roi_spec: &TableSpec,
        sampling_spec: &TableSpec,
    ) -> Result<TableSpec, ShapleyError> {
        let spec = self.preparer.loop_start_spec(roi_spec)?;
        self.preparer.check_sampling_spec(sampling_spec)?;
        Ok(spec)
    }

    /// Spec of the Shapley values table produced by the loop end.
    pub fn configure_loop_end(&mut self, predicted_spec: &TableSpec) -> Result<TableSpec, ShapleyError> {
        self.preparer.loop_end_spec(predicted_spec)
    }

    /// Create the sampling set and queue the rows of interest.
    pub fn start<M: ExecutionMonitor + ?Sized>(
        &mut self,
        roi: &DataTable,
        sampling: &DataTable,
        exec: &M,
    ) -> Result<(), ShapleyError> {
        self.configure_loop_start(roi.spec(), sampling.spec())?;
        let sampling_set = self.create_sampling_set(
            sampling,
            &SubProgress::new(exec, 0.0, PROG_FRAC_SAMPLING_CREATION),
        )?;
        info!("Created sampling set with {} rows.", sampling_set.len());
        let replacer = FeatureReplacer::new(sampling_set, self.config.seed)?;
        self.algorithm = Some(ShapleyValuesAlgorithm::new(
            replacer,
            self.config.iterations_per_feature,
            self.preparer.num_prediction_columns(),
        )?);
        self.pending = self.preparer.prepare_for_perturbation(roi)?.collect();
        self.roi_total = self.pending.len();
        self.output = None;
        if self.roi_total == 0 {
            warn!("The table of rows to explain is empty.");
        }
        Ok(())
    }

    fn create_sampling_set<M: ExecutionMonitor + ?Sized>(
        &self,
        sampling: &DataTable,
        exec: &M,
    ) -> Result<Vec<Row>, ShapleyError> {
        exec.set_progress(0.0, "Create sampling dataset");
        let total = sampling.size() as f64;
        let mut sampling_set = Vec::with_capacity(sampling.size());
        for (current, row) in self.preparer.prepare_for_perturbation(sampling)?.enumerate() {
            exec.check_canceled()?;
            exec.set_progress(current as f64 / total, &format!("Reading row {}", row.key()));
            sampling_set.push(row);
        }
        Ok(sampling_set)
    }

    pub fn has_more_chunks(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Perturb the next chunk of rows of interest, `None` once all rows are handled.
    pub fn next_chunk<M: ExecutionMonitor + ?Sized>(&mut self, exec: &M) -> Result<Option<DataTable>, ShapleyError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let spec = self.preparer.feature_spec()?;
        let algorithm = self.algorithm.as_mut().ok_or_else(not_started)?;
        let progress = SubProgress::new(exec, PROG_FRAC_SAMPLING_CREATION, PROG_FRAC_PERTURB_ROWS);
        let n_rows = self.config.chunk_size.min(self.pending.len());
        let mut container = DataContainer::new(spec);
        let done = self.roi_total - self.pending.len();
        for (i, row) in self.pending.iter().take(n_rows).enumerate() {
            exec.check_canceled()?;
            progress.set_progress(
                (done + i) as f64 / self.roi_total as f64,
                &format!("Perturb row {}", row.key()),
            );
            for perturbed in algorithm.prepare_row(row)? {
                container.add_row(perturbed)?;
            }
        }
        // the chunk is only dequeued once all of its rows were perturbed
        self.pending.drain(..n_rows);
        debug!(
            "Perturbed {} rows into {} rows, {} rows remaining.",
            n_rows,
            container.size(),
            self.pending.len()
        );
        Ok(Some(container.close()))
    }

    /// Calculate the Shapley values of all batches in `predicted` and append them to the result.
    ///
    /// Nothing is appended if any batch fails.
    pub fn end_iteration<M: ExecutionMonitor + ?Sized>(
        &mut self,
        predicted: &DataTable,
        exec: &M,
    ) -> Result<(), ShapleyError> {
        exec.set_progress(0.0, "Calculating Shapley Values.");
        let spec = self.preparer.loop_end_spec(predicted.spec())?;
        let algorithm = self.algorithm.as_ref().ok_or_else(not_started)?;
        let total = (predicted.size() / algorithm.batch_size().max(1)).max(1) as f64;
        let mut rows = self.preparer.prepare_for_evaluation(predicted)?.peekable();
        let mut values = Vec::new();
        while rows.peek().is_some() {
            exec.check_canceled()?;
            let row = algorithm.calculate_shapley_values_for_next_row(&mut rows)?;
            exec.set_progress(
                values.len() as f64 / total,
                &format!("Finished Shapley Value calculation for row {}", row.key()),
            );
            values.push(row);
        }
        let output = self.output.get_or_insert_with(|| DataContainer::new(spec));
        for row in values {
            output.add_row(row)?;
        }
        Ok(())
    }

    /// Table of all Shapley values calculated so far, fails if rows of interest are still pending.
    pub fn finish(&mut self) -> Result<DataTable, ShapleyError> {
        if self.has_more_chunks() {
            return Err(ShapleyError::InvalidState(format!(
                "{} rows have not been perturbed yet.",
                self.pending.len()
            )));
        }
        let table = match self.output.take() {
            Some(container) => container.close(),
            None => DataContainer::new(self.preparer.shapley_spec()?).close(),
        };
        info!("Calculated Shapley values for {} rows.", table.size());
        Ok(table)
    }

    /// Perturb all rows of interest at once.
    pub fn execute_loop_start<M: ExecutionMonitor + ?Sized>(
        &mut self,
        roi: &DataTable,
        sampling: &DataTable,
        exec: &M,
    ) -> Result<DataTable, ShapleyError> {
        self.start(roi, sampling, exec)?;
        let mut container = DataContainer::new(self.preparer.feature_spec()?);
        while let Some(chunk) = self.next_chunk(exec)? {
            for row in chunk {
                container.add_row(row)?;
            }
        }
        Ok(container.close())
    }

    /// Calculate the Shapley values of a table holding the predictions for all perturbed rows.
    pub fn execute_loop_end<M: ExecutionMonitor + ?Sized>(
        &mut self,
        predicted: &DataTable,
        exec: &M,
    ) -> Result<DataTable, ShapleyError> {
        self.end_iteration(predicted, exec)?;
        self.finish()
    }

    /// Run the whole loop with an in-process model.
    pub fn explain<P: Predictor, M: ExecutionMonitor + ?Sized>(
        &mut self,
        roi: &DataTable,
        sampling: &DataTable,
        predictor: &P,
        exec: &M,
    ) -> Result<DataTable, ShapleyError> {
        self.start(roi, sampling, exec)?;
        while let Some(chunk) = self.next_chunk(exec)? {
            let predicted = predict_table(chunk, &self.config.prediction_columns, predictor)?;
            self.end_iteration(&predicted, exec)?;
        }
        self.finish()
    }
}

fn not_started() -> ShapleyError {
    ShapleyError::InvalidState("The loop has not been started.".to_string())
}

/// Append the predictions of `predictor` to every row of `table`.
pub fn predict_table<P: Predictor>(
    table: DataTable,
    prediction_columns: &[String],
    predictor: &P,
) -> Result<DataTable, ShapleyError> {
    let mut columns = table.spec().columns().to_vec();
    columns.extend(prediction_columns.iter().map(|c| ColumnSpec::new(c.clone(), DataType::Double)));
    let spec = TableSpec::new(columns)?;
    let n_predictions = prediction_columns.len();
    let rows = table
        .into_rows()
        .into_par_iter()
        .map(|row| {
            let predictions = predictor.predict(row.cells())?;
            if predictions.len() != n_predictions {
                return Err(ShapleyError::InvalidParameter(
                    format!("predictions of row '{}'", row.key()),
                    format!("{} values", n_predictions),
                    predictions.len().to_string(),
                ));
            }
            let (key, mut cells) = row.into_parts();
            cells.extend(predictions.into_iter().map(Cell::Double));
            Ok(Row::new(key, cells))
        })
        .collect::<Result<Vec<Row>, ShapleyError>>()?;
    let mut container = DataContainer::new(spec);
    for row in rows {
        container.add_row(row)?;
    }
    Ok(container.close())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table_from_rows;
    use crate::exec::{CancelFlag, NoopMonitor};
    use std::cell::Cell as StdCell;

    fn roi_spec() -> TableSpec {
        TableSpec::new(vec![
            ColumnSpec::new("name", DataType::Str),
            ColumnSpec::new("x0", DataType::Double),
            ColumnSpec::new("x1", DataType::Double),
            ColumnSpec::new("x2", DataType::Double),
        ])
        .unwrap()
    }

    fn table(rows: &[(&str, [f64; 3])]) -> DataTable {
        let rows = rows
            .iter()
            .map(|(k, x)| {
                let mut cells = vec![Cell::from(*k)];
                cells.extend(x.iter().map(|&v| Cell::Double(v)));
                Row::new(*k, cells)
            })
            .collect();
        table_from_rows(roi_spec(), rows).unwrap()
    }

    fn config() -> ShapleyConfig {
        ShapleyConfig::new(vec!["x0", "x1", "x2"], vec!["y"])
            .set_iterations_per_feature(5)
            .set_chunk_size(2)
            .set_seed(42)
    }

    fn linear(features: &[Cell]) -> Result<Vec<f64>, ShapleyError> {
        let w = [1.0, -2.0, 3.0];
        Ok(vec![features
            .iter()
            .zip(w.iter())
            .map(|(c, w)| c.as_f64().unwrap_or(0.0) * w)
            .sum()])
    }

    #[test]
    fn test_explain_linear_model() {
        let roi = table(&[("a", [1., 1., 1.]), ("b", [2., 0., -1.]), ("c", [0., 0., 0.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        let result = estimator.explain(&roi, &sampling, &linear, &NoopMonitor).unwrap();

        let names: Vec<&str> = result.spec().column_names().collect();
        assert_eq!(names, vec!["x0(y)", "x1(y)", "x2(y)"]);
        let keys: Vec<&str> = result.iter().map(|r| r.key().as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        let b = result.iter().nth(1).unwrap();
        for (cell, expected) in b.cells().iter().zip([2.0, 0.0, -3.0]) {
            assert!((cell.as_f64().unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_chunks_respect_chunk_size() {
        let roi = table(&[("a", [1., 1., 1.]), ("b", [2., 0., -1.]), ("c", [0., 0., 0.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        estimator.start(&roi, &sampling, &NoopMonitor).unwrap();
        let batch = 2 * 3 * 5;
        let first = estimator.next_chunk(&NoopMonitor).unwrap().unwrap();
        assert_eq!(first.size(), 2 * batch);
        assert_eq!(first.spec().num_columns(), 3);
        assert!(estimator.has_more_chunks());
        assert!(matches!(estimator.finish(), Err(ShapleyError::InvalidState(_))));
        let second = estimator.next_chunk(&NoopMonitor).unwrap().unwrap();
        assert_eq!(second.size(), batch);
        assert!(estimator.next_chunk(&NoopMonitor).unwrap().is_none());
    }

    #[test]
    fn test_single_shot_loop() {
        let roi = table(&[("a", [1., 2., 3.]), ("b", [3., 2., 1.])]);
        let sampling = table(&[("s0", [0., 1., 0.]), ("s1", [1., 0., 1.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        let perturbed = estimator.execute_loop_start(&roi, &sampling, &NoopMonitor).unwrap();
        assert_eq!(perturbed.size(), 2 * 2 * 3 * 5);
        let predicted = predict_table(perturbed, &["y".to_string()], &linear).unwrap();
        assert_eq!(
            estimator.configure_loop_end(predicted.spec()).unwrap().num_columns(),
            3
        );
        let result = estimator.execute_loop_end(&predicted, &NoopMonitor).unwrap();
        assert_eq!(result.size(), 2);
    }

    #[test]
    fn test_same_seed_same_result() {
        let roi = table(&[("a", [1., 2., 3.]), ("b", [3., 2., 1.])]);
        let sampling = table(&[("s0", [0., 1., 0.]), ("s1", [1., 0., 1.]), ("s2", [5., 5., 5.])]);
        let product = |f: &[Cell]| -> Result<Vec<f64>, ShapleyError> {
            Ok(vec![f.iter().map(|c| c.as_f64().unwrap_or(0.0)).product()])
        };
        let run = || {
            let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
            estimator.explain(&roi, &sampling, &product, &NoopMonitor).unwrap().into_rows()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_end_before_start() {
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        let predicted = predict_table(table(&[]), &["y".to_string()], &linear).unwrap();
        assert!(matches!(
            estimator.end_iteration(&predicted, &NoopMonitor),
            Err(ShapleyError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_roi_gives_empty_result() {
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        let result = estimator.explain(&table(&[]), &sampling, &linear, &NoopMonitor).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.spec().num_columns(), 3);
    }

    #[test]
    fn test_configuration_errors() {
        assert!(ShapleyValuesEstimator::new(config().set_iterations_per_feature(0)).is_err());
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator =
            ShapleyValuesEstimator::new(ShapleyConfig::new(vec!["x0", "z"], vec!["y"])).unwrap();
        assert_eq!(
            estimator.start(&table(&[("a", [1., 1., 1.])]), &sampling, &NoopMonitor).err(),
            Some(ShapleyError::MissingColumns {
                purpose: "feature".to_string(),
                columns: vec!["z".to_string()]
            })
        );
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        assert_eq!(
            estimator.start(&table(&[("a", [1., 1., 1.])]), &table(&[]), &NoopMonitor).err(),
            Some(ShapleyError::EmptySamplingSet)
        );
    }

    #[test]
    fn test_wrong_number_of_predictions() {
        let roi = table(&[("a", [1., 1., 1.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let two = |_: &[Cell]| -> Result<Vec<f64>, ShapleyError> { Ok(vec![0.0, 1.0]) };
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        assert!(matches!(
            estimator.explain(&roi, &sampling, &two, &NoopMonitor),
            Err(ShapleyError::InvalidParameter(..))
        ));
    }

    #[test]
    fn test_canceled_before_perturbation() {
        let roi = table(&[("a", [1., 1., 1.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let flag = CancelFlag::new();
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        estimator.start(&roi, &sampling, &flag).unwrap();
        flag.cancel();
        assert_eq!(estimator.next_chunk(&flag).err(), Some(ShapleyError::Canceled));
        assert!(estimator.has_more_chunks());
    }

    struct CancelAfter {
        remaining: StdCell<usize>,
    }

    impl ExecutionMonitor for CancelAfter {
        fn set_progress(&self, _fraction: f64, _message: &str) {}

        fn check_canceled(&self) -> Result<(), ShapleyError> {
            if self.remaining.get() == 0 {
                return Err(ShapleyError::Canceled);
            }
            self.remaining.set(self.remaining.get() - 1);
            Ok(())
        }
    }

    #[test]
    fn test_canceled_loop_end_commits_nothing() {
        let roi = table(&[("a", [1., 1., 1.]), ("b", [2., 2., 2.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        estimator.start(&roi, &sampling, &NoopMonitor).unwrap();
        let chunk = estimator.next_chunk(&NoopMonitor).unwrap().unwrap();
        let predicted = predict_table(chunk, &["y".to_string()], &linear).unwrap();
        let exec = CancelAfter {
            remaining: StdCell::new(1),
        };
        assert_eq!(
            estimator.end_iteration(&predicted, &exec).err(),
            Some(ShapleyError::Canceled)
        );
        let result = estimator.finish().unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_canceled_chunk_keeps_its_rows() {
        let roi = table(&[("a", [1., 1., 1.]), ("b", [2., 2., 2.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        estimator.start(&roi, &sampling, &NoopMonitor).unwrap();
        let exec = CancelAfter {
            remaining: StdCell::new(1),
        };
        assert_eq!(estimator.next_chunk(&exec).err(), Some(ShapleyError::Canceled));
        assert!(estimator.has_more_chunks());

        while let Some(chunk) = estimator.next_chunk(&NoopMonitor).unwrap() {
            let predicted = predict_table(chunk, &["y".to_string()], &linear).unwrap();
            estimator.end_iteration(&predicted, &NoopMonitor).unwrap();
        }
        let result = estimator.finish().unwrap();
        let keys: Vec<&str> = result.iter().map(|r| r.key().as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_reordered_predictions_fail() {
        let roi = table(&[("a", [1., 1., 1.])]);
        let sampling = table(&[("s", [0., 0., 0.])]);
        let mut estimator = ShapleyValuesEstimator::new(config()).unwrap();
        let perturbed = estimator.execute_loop_start(&roi, &sampling, &NoopMonitor).unwrap();
        let predicted = predict_table(perturbed, &["y".to_string()], &linear).unwrap();
        let spec = predicted.spec().clone();
        let mut rows = predicted.into_rows();
        rows.swap(2, 4);
        let reordered = table_from_rows(spec, rows).unwrap();
        assert!(matches!(
            estimator.execute_loop_end(&reordered, &NoopMonitor),
            Err(ShapleyError::UnexpectedOrder { .. })
        ));
    }
}
