//! Table preparer
//!
//! Resolves the configured feature and prediction columns against table specs
//! and restricts tables to one of the two column sets.
use crate::data::{ColumnSpec, DataTable, DataType, Row, TableSpec};
use crate::errors::ShapleyError;

/// Configured column names and the specs they resolved to.
#[derive(Debug, Clone)]
struct ColumnSet {
    purpose: &'static str,
    names: Vec<String>,
    columns: Vec<ColumnSpec>,
}

impl ColumnSet {
    fn new(purpose: &'static str, names: Vec<String>) -> Self {
        ColumnSet {
            purpose,
            names,
            columns: Vec::new(),
        }
    }

    /// Indices of the configured columns in `spec`, fails naming all missing columns.
    fn resolve(&self, spec: &TableSpec) -> Result<Vec<usize>, ShapleyError> {
        let mut missing = Vec::new();
        let mut indices = Vec::with_capacity(self.names.len());
        for name in &self.names {
            match spec.find_column_index(name) {
                Some(i) => indices.push(i),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(ShapleyError::MissingColumns {
                purpose: self.purpose.to_string(),
                columns: missing,
            })
        }
    }

    fn update(&mut self, spec: &TableSpec) -> Result<Vec<usize>, ShapleyError> {
        let indices = self.resolve(spec)?;
        self.columns = indices.iter().map(|&i| spec.column(i).clone()).collect();
        Ok(indices)
    }

    fn table_spec(&self) -> Result<TableSpec, ShapleyError> {
        TableSpec::new(self.columns.clone())
    }
}

/// Maps tables onto the feature and prediction columns of the loop.
#[derive(Debug, Clone)]
pub struct TablePreparer {
    features: ColumnSet,
    predictions: ColumnSet,
}

impl TablePreparer {
    pub fn new(feature_columns: Vec<String>, prediction_columns: Vec<String>) -> Self {
        TablePreparer {
            features: ColumnSet::new("feature", feature_columns),
            predictions: ColumnSet::new("prediction", prediction_columns),
        }
    }

    pub fn num_features(&self) -> usize {
        self.features.names.len()
    }

    pub fn num_prediction_columns(&self) -> usize {
        self.predictions.names.len()
    }

    /// Resolve the feature columns against the table of interest and return the spec of the perturbed table.
    pub fn loop_start_spec(&mut self, roi_spec: &TableSpec) -> Result<TableSpec, ShapleyError> {
        self.features.update(roi_spec)?;
        self.features.table_spec()
    }

    /// The sampling table must contain all feature columns with the same types.
    pub fn check_sampling_spec(&self, sampling_spec: &TableSpec) -> Result<(), ShapleyError> {
        let indices = self.features.resolve(sampling_spec)?;
        for (&i, expected) in indices.iter().zip(self.features.columns.iter()) {
            let found = sampling_spec.column(i);
            if found.data_type != expected.data_type {
                return Err(ShapleyError::InvalidParameter(
                    format!("sampling column '{}'", found.name),
                    format!("{:?}", expected.data_type),
                    format!("{:?}", found.data_type),
                ));
            }
        }
        Ok(())
    }

    /// Resolve and validate the prediction columns and return the spec of the Shapley values table.
    ///
    /// For every prediction column `p` and feature column `f` there is a column `f(p)`.
    pub fn loop_end_spec(&mut self, predicted_spec: &TableSpec) -> Result<TableSpec, ShapleyError> {
        self.update_predictions(predicted_spec)?;
        self.shapley_spec()
    }

    /// Spec of the Shapley values table from the configured column names.
    pub fn shapley_spec(&self) -> Result<TableSpec, ShapleyError> {
        let mut columns = Vec::with_capacity(self.num_features() * self.num_prediction_columns());
        for prediction in &self.predictions.names {
            for feature in &self.features.names {
                columns.push(ColumnSpec::new(format!("{}({})", feature, prediction), DataType::Double));
            }
        }
        TableSpec::new(columns)
    }

    fn update_predictions(&mut self, spec: &TableSpec) -> Result<Vec<usize>, ShapleyError> {
        let indices = self.predictions.update(spec)?;
        if let Some(c) = self.predictions.columns.iter().find(|c| !c.data_type.is_numeric()) {
            return Err(ShapleyError::NonNumericColumn(c.name.clone()));
        }
        Ok(indices)
    }

    /// Rows of `table` restricted to the feature columns.
    pub fn prepare_for_perturbation<'a>(
        &self,
        table: &'a DataTable,
    ) -> Result<impl Iterator<Item = Row> + 'a, ShapleyError> {
        let indices = self.features.resolve(table.spec())?;
        Ok(filter_rows(table, indices))
    }

    /// Rows of `table` restricted to the validated prediction columns.
    pub fn prepare_for_evaluation<'a>(
        &mut self,
        table: &'a DataTable,
    ) -> Result<impl Iterator<Item = Row> + 'a, ShapleyError> {
        let indices = self.update_predictions(table.spec())?;
        Ok(filter_rows(table, indices))
    }

    pub fn feature_spec(&self) -> Result<TableSpec, ShapleyError> {
        self.features.table_spec()
    }
}

fn filter_rows(table: &DataTable, indices: Vec<usize>) -> impl Iterator<Item = Row> + '_ {
    table.iter().map(move |r| r.project(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{table_from_rows, Cell};

    fn spec() -> TableSpec {
        TableSpec::new(vec![
            ColumnSpec::new("id", DataType::Str),
            ColumnSpec::new("x", DataType::Double),
            ColumnSpec::new("y", DataType::Int),
            ColumnSpec::new("pred", DataType::Double),
            ColumnSpec::new("label", DataType::Str),
        ])
        .unwrap()
    }

    fn preparer() -> TablePreparer {
        TablePreparer::new(vec!["y".into(), "x".into()], vec!["pred".into()])
    }

    #[test]
    fn test_loop_start_spec_keeps_configured_order() {
        let mut p = preparer();
        let start = p.loop_start_spec(&spec()).unwrap();
        let names: Vec<&str> = start.column_names().collect();
        assert_eq!(names, vec!["y", "x"]);
        assert_eq!(start.column(0).data_type, DataType::Int);
    }

    #[test]
    fn test_missing_columns_are_named() {
        let mut p = TablePreparer::new(vec!["x".into(), "a".into(), "b".into()], vec!["pred".into()]);
        assert_eq!(
            p.loop_start_spec(&spec()).err(),
            Some(ShapleyError::MissingColumns {
                purpose: "feature".to_string(),
                columns: vec!["a".to_string(), "b".to_string()],
            })
        );
    }

    #[test]
    fn test_loop_end_spec() {
        let mut p = TablePreparer::new(vec!["x".into(), "y".into()], vec!["pred".into(), "y".into()]);
        p.loop_start_spec(&spec()).unwrap();
        let end = p.loop_end_spec(&spec()).unwrap();
        let names: Vec<&str> = end.column_names().collect();
        assert_eq!(names, vec!["x(pred)", "y(pred)", "x(y)", "y(y)"]);
        assert!(end.columns().iter().all(|c| c.data_type == DataType::Double));
    }

    #[test]
    fn test_non_numeric_prediction_column() {
        let mut p = TablePreparer::new(vec!["x".into()], vec!["label".into()]);
        assert_eq!(
            p.loop_end_spec(&spec()).err(),
            Some(ShapleyError::NonNumericColumn("label".to_string()))
        );
    }

    #[test]
    fn test_sampling_spec_types_must_match() {
        let mut p = preparer();
        p.loop_start_spec(&spec()).unwrap();
        assert!(p.check_sampling_spec(&spec()).is_ok());
        let other = TableSpec::new(vec![
            ColumnSpec::new("x", DataType::Double),
            ColumnSpec::new("y", DataType::Str),
        ])
        .unwrap();
        assert!(matches!(
            p.check_sampling_spec(&other),
            Err(ShapleyError::InvalidParameter(..))
        ));
    }

    #[test]
    fn test_filtered_rows() {
        let table = table_from_rows(
            spec(),
            vec![Row::new(
                "r0",
                vec![
                    Cell::from("a"),
                    Cell::Double(1.5),
                    Cell::Int(2),
                    Cell::Double(0.25),
                    Cell::from("l"),
                ],
            )],
        )
        .unwrap();
        let mut p = preparer();
        let features: Vec<Row> = p.prepare_for_perturbation(&table).unwrap().collect();
        assert_eq!(features[0].cells(), &[Cell::Int(2), Cell::Double(1.5)]);
        let predictions: Vec<Row> = p.prepare_for_evaluation(&table).unwrap().collect();
        assert_eq!(predictions[0].cells(), &[Cell::Double(0.25)]);
        assert_eq!(predictions[0].key().as_str(), "r0");
    }
}
