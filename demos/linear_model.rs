//! Explain a small linear model on a synthetic data set.
use shapley_sampling::data::{table_from_rows, ColumnSpec, DataType};
use shapley_sampling::exec::CancelFlag;
use shapley_sampling::{Cell, Row, ShapleyConfig, ShapleyError, ShapleyValuesEstimator, TableSpec};

fn model(features: &[Cell]) -> Result<Vec<f64>, ShapleyError> {
    let x: Vec<f64> = features.iter().map(|c| c.as_f64().unwrap_or(0.0)).collect();
    Ok(vec![3.0 * x[0] - 2.0 * x[1] + 0.5 * x[0] * x[2]])
}

fn main() -> Result<(), ShapleyError> {
    let spec = TableSpec::new(vec![
        ColumnSpec::new("age", DataType::Double),
        ColumnSpec::new("income", DataType::Double),
        ColumnSpec::new("score", DataType::Double),
    ])?;
    let sampling: Vec<Row> = (0..50)
        .map(|i| {
            let i = i as f64;
            Row::new(
                format!("bg{}", i),
                vec![Cell::Double(i % 7.0), Cell::Double(i % 5.0), Cell::Double(i % 3.0)],
            )
        })
        .collect();
    let roi = vec![
        Row::new("alice", vec![Cell::Double(6.0), Cell::Double(1.0), Cell::Double(2.0)]),
        Row::new("bob", vec![Cell::Double(0.0), Cell::Double(4.0), Cell::Double(0.0)]),
    ];
    let sampling = table_from_rows(spec.clone(), sampling)?;
    let roi = table_from_rows(spec, roi)?;

    let config = ShapleyConfig::new(vec!["age", "income", "score"], vec!["prediction"])
        .set_iterations_per_feature(500)
        .set_seed(0);
    let mut estimator = ShapleyValuesEstimator::new(config)?;
    let result = estimator.explain(&roi, &sampling, &model, &CancelFlag::new())?;

    let names: Vec<&str> = result.spec().column_names().collect();
    println!("{}", names.join("\t"));
    for row in result.iter() {
        let values: Vec<String> = row
            .cells()
            .iter()
            .map(|c| format!("{:.4}", c.as_f64().unwrap_or(f64::NAN)))
            .collect();
        println!("{}\t{}", row.key(), values.join("\t"));
    }
    Ok(())
}
